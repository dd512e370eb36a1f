use std::io::{Read, Write};

use bzip2::{read::BzDecoder, write::BzEncoder, Compression};

use crate::{codec::peek_payload, Result};

use super::{ChunkCodec, RecordBatch};

const BZIP2_MAGIC: &[u8; 3] = b"BZh";

/// Compresses chunks with bzip2
#[derive(Debug, Clone, Default)]
pub struct Bzip2Codec {
    buffer: Vec<u8>,
}
impl Bzip2Codec {
    pub const REGISTRATION_CODE: i8 = -3;
}
impl ChunkCodec for Bzip2Codec {
    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn registration_code(&self) -> i8 {
        Self::REGISTRATION_CODE
    }

    fn encode(&mut self, batch: &RecordBatch) -> Result<Vec<u8>> {
        self.buffer.clear();
        batch.serialize_into(&mut self.buffer)?;
        let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.buffer)?;
        Ok(encoder.finish()?)
    }

    fn decode(&mut self, payload: &[u8]) -> Result<RecordBatch> {
        self.buffer.clear();
        BzDecoder::new(payload).read_to_end(&mut self.buffer)?;
        RecordBatch::deserialize(&self.buffer)
    }

    fn validate(&self, first_byte: u8, input: &mut dyn Read) -> bool {
        if first_byte as i8 != Self::REGISTRATION_CODE {
            return false;
        }
        matches!(peek_payload(input, BZIP2_MAGIC.len()), Some((_, magic)) if magic == BZIP2_MAGIC)
    }

    fn suggested_chunk_size(&self) -> usize {
        // bzip2 works on 900k blocks, smaller chunks compress poorly
        100_000
    }
}
