use std::io::Read;

use zstd::stream::{copy_decode, copy_encode};

use crate::{codec::peek_payload, Result};

use super::{ChunkCodec, RecordBatch};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Compresses chunks with zstd
#[derive(Debug, Clone, Default)]
pub struct ZstdCodec {
    level: i32,
    buffer: Vec<u8>,
}
impl ZstdCodec {
    pub const REGISTRATION_CODE: i8 = -6;

    /// Creates a codec with the given compression level (0 selects the zstd default)
    #[must_use]
    pub fn new(level: i32) -> Self {
        Self {
            level,
            buffer: Vec::new(),
        }
    }
}
impl ChunkCodec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn registration_code(&self) -> i8 {
        Self::REGISTRATION_CODE
    }

    fn encode(&mut self, batch: &RecordBatch) -> Result<Vec<u8>> {
        self.buffer.clear();
        batch.serialize_into(&mut self.buffer)?;
        let mut payload = Vec::default();
        copy_encode(self.buffer.as_slice(), &mut payload, self.level)?;
        Ok(payload)
    }

    fn decode(&mut self, payload: &[u8]) -> Result<RecordBatch> {
        self.buffer.clear();
        copy_decode(payload, &mut self.buffer)?;
        RecordBatch::deserialize(&self.buffer)
    }

    fn validate(&self, first_byte: u8, input: &mut dyn Read) -> bool {
        if first_byte as i8 != Self::REGISTRATION_CODE {
            return false;
        }
        matches!(peek_payload(input, ZSTD_MAGIC.len()), Some((_, magic)) if magic == ZSTD_MAGIC)
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_zstd_levels() {
        let batch = (0..1000)
            .map(|i| format!("{i:08}"))
            .collect::<RecordBatch>();
        for level in [0, 1, 19] {
            let mut codec = ZstdCodec::new(level);
            let payload = codec.encode(&batch).unwrap();
            assert_eq!(&payload[..4], &ZSTD_MAGIC);
            assert_eq!(codec.decode(&payload).unwrap(), batch);
        }
    }
}
