use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::{codec::peek_payload, Result};

use super::{ChunkCodec, RecordBatch};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compresses chunks with gzip. This is the default codec.
#[derive(Debug, Clone)]
pub struct GzipCodec {
    level: Compression,

    /// Reusable buffer for the uncompressed batch
    buffer: Vec<u8>,
}
impl Default for GzipCodec {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}
impl GzipCodec {
    pub const REGISTRATION_CODE: i8 = -1;

    #[must_use]
    pub fn new(level: Compression) -> Self {
        Self {
            level,
            buffer: Vec::new(),
        }
    }
}
impl ChunkCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn registration_code(&self) -> i8 {
        Self::REGISTRATION_CODE
    }

    fn encode(&mut self, batch: &RecordBatch) -> Result<Vec<u8>> {
        self.buffer.clear();
        batch.serialize_into(&mut self.buffer)?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(self.buffer.len() / 2), self.level);
        encoder.write_all(&self.buffer)?;
        Ok(encoder.finish()?)
    }

    fn decode(&mut self, payload: &[u8]) -> Result<RecordBatch> {
        self.buffer.clear();
        GzDecoder::new(payload).read_to_end(&mut self.buffer)?;
        RecordBatch::deserialize(&self.buffer)
    }

    fn validate(&self, first_byte: u8, input: &mut dyn Read) -> bool {
        if first_byte as i8 != Self::REGISTRATION_CODE {
            return false;
        }
        match peek_payload(input, GZIP_MAGIC.len()) {
            Some((_, magic)) => magic == GZIP_MAGIC,
            None => false,
        }
    }
}
