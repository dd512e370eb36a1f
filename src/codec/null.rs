use std::io::Read;

use crate::{codec::peek_payload, error::CodecError, Result};

use super::{ChunkCodec, RecordBatch};

/// Discards every record. Only meant for measuring writer overhead.
///
/// Chunks written with this codec carry a zero length, so a null-coded stream
/// reads back as empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCodec;
impl NullCodec {
    pub const REGISTRATION_CODE: i8 = -5;
}
impl ChunkCodec for NullCodec {
    fn name(&self) -> &'static str {
        "null"
    }

    fn registration_code(&self) -> i8 {
        Self::REGISTRATION_CODE
    }

    fn encode(&mut self, _batch: &RecordBatch) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn decode(&mut self, payload: &[u8]) -> Result<RecordBatch> {
        if payload.is_empty() {
            Ok(RecordBatch::new())
        } else {
            Err(CodecError::NullPayload(payload.len()).into())
        }
    }

    fn validate(&self, first_byte: u8, input: &mut dyn Read) -> bool {
        first_byte as i8 == Self::REGISTRATION_CODE
            && matches!(peek_payload(input, 0), Some((0, _)))
    }
}
