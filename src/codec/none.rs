use std::io::Read;

use byteorder::{BigEndian, ByteOrder};

use crate::{codec::peek_payload, Result};

use super::{ChunkCodec, RecordBatch};

/// Stores the serialized batch as is. Useful as a baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompressionCodec;
impl NoCompressionCodec {
    pub const REGISTRATION_CODE: i8 = -4;
}
impl ChunkCodec for NoCompressionCodec {
    fn name(&self) -> &'static str {
        "not-compressed"
    }

    fn registration_code(&self) -> i8 {
        Self::REGISTRATION_CODE
    }

    fn encode(&mut self, batch: &RecordBatch) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        batch.serialize_into(&mut payload)?;
        Ok(payload)
    }

    fn decode(&mut self, payload: &[u8]) -> Result<RecordBatch> {
        RecordBatch::deserialize(payload)
    }

    fn validate(&self, first_byte: u8, input: &mut dyn Read) -> bool {
        if first_byte as i8 != Self::REGISTRATION_CODE {
            return false;
        }
        match peek_payload(input, 4) {
            Some((length, header)) if header.len() == 4 => {
                let num_records = BigEndian::read_u32(&header) as usize;
                num_records <= (length - 4) / 4
            }
            _ => false,
        }
    }
}
