use std::io::Read;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::{
    error::CodecError,
    utils::{read_fully, slice_and_increment},
    Result,
};

use super::{peek_payload, ChunkCodec, GzipCodec, RecordBatch};

/// Size of the `[dense length][crc32]` prefix of a hybrid payload
const HYBRID_PREFIX_SIZE: usize = 8;

/// Splits a batch into a dense custom-encoded stream and a residual batch.
///
/// The dense stream is stored verbatim (guarded by a CRC32) and the residual
/// batch is compressed with gzip.
pub trait CollectionHandler: Send {
    /// Moves whatever the handler can encode densely into `dense` and returns
    /// the records that remain.
    fn compress_collection(&mut self, batch: &RecordBatch, dense: &mut Vec<u8>)
        -> Result<RecordBatch>;

    /// Rebuilds the original batch from the dense stream and the residual records
    fn decompress_collection(&mut self, dense: &[u8], residual: &RecordBatch)
        -> Result<RecordBatch>;
}

/// Moves a fixed-width prefix of every record into the dense stream.
///
/// Each record contributes `[u16 prefix length][prefix]` to the dense stream
/// and its remaining bytes to the residual batch, so the width need not be
/// known when decoding.
#[derive(Debug, Clone, Copy)]
pub struct PrefixColumnHandler {
    width: u16,
}
impl PrefixColumnHandler {
    pub const DEFAULT_WIDTH: u16 = 16;

    #[must_use]
    pub fn new(width: u16) -> Self {
        Self { width }
    }
}
impl Default for PrefixColumnHandler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WIDTH)
    }
}
impl CollectionHandler for PrefixColumnHandler {
    fn compress_collection(
        &mut self,
        batch: &RecordBatch,
        dense: &mut Vec<u8>,
    ) -> Result<RecordBatch> {
        let mut residual = RecordBatch::new();
        for record in batch.iter() {
            let split = record.len().min(usize::from(self.width));
            dense.write_u16::<BigEndian>(split as u16)?;
            dense.extend_from_slice(&record[..split]);
            residual.push(&record[split..]);
        }
        Ok(residual)
    }

    fn decompress_collection(
        &mut self,
        dense: &[u8],
        residual: &RecordBatch,
    ) -> Result<RecordBatch> {
        let mut offset = 0;
        let mut batch = RecordBatch::new();
        let mut record = Vec::new();
        for suffix in residual.iter() {
            let split = slice_and_increment(&mut offset, 2, dense)
                .map(BigEndian::read_u16)
                .ok_or(CodecError::MalformedBatch("dense stream too short"))?;
            let prefix = slice_and_increment(&mut offset, usize::from(split), dense)
                .ok_or(CodecError::MalformedBatch("dense prefix too short"))?;
            record.clear();
            record.extend_from_slice(prefix);
            record.extend_from_slice(suffix);
            batch.push(&record);
        }
        if offset != dense.len() {
            return Err(CodecError::MalformedBatch("dense stream has extra records").into());
        }
        Ok(batch)
    }
}

/// Combines a [`CollectionHandler`] dense stream with gzip for the residual.
///
/// Payload layout: `[u32 dense length][u32 crc32 of dense][dense][gzip residual]`,
/// integers big-endian.
pub struct HybridCodec {
    handler: Box<dyn CollectionHandler>,
    fallback: GzipCodec,
}
impl Default for HybridCodec {
    fn default() -> Self {
        Self::new(Box::new(PrefixColumnHandler::default()))
    }
}
impl HybridCodec {
    pub const REGISTRATION_CODE: i8 = -2;

    #[must_use]
    pub fn new(handler: Box<dyn CollectionHandler>) -> Self {
        Self {
            handler,
            fallback: GzipCodec::default(),
        }
    }
}
impl ChunkCodec for HybridCodec {
    fn name(&self) -> &'static str {
        "hybrid-1"
    }

    fn registration_code(&self) -> i8 {
        Self::REGISTRATION_CODE
    }

    fn encode(&mut self, batch: &RecordBatch) -> Result<Vec<u8>> {
        let mut dense = Vec::new();
        let residual = self.handler.compress_collection(batch, &mut dense)?;
        let z_residual = self.fallback.encode(&residual)?;

        let mut payload = Vec::with_capacity(HYBRID_PREFIX_SIZE + dense.len() + z_residual.len());
        payload.write_u32::<BigEndian>(dense.len() as u32)?;
        payload.write_u32::<BigEndian>(crc32fast::hash(&dense))?;
        payload.extend_from_slice(&dense);
        payload.extend_from_slice(&z_residual);

        log::trace!(
            "hybrid chunk: {} records, {} dense bytes, {} residual bytes",
            batch.len(),
            dense.len(),
            z_residual.len()
        );
        Ok(payload)
    }

    fn decode(&mut self, payload: &[u8]) -> Result<RecordBatch> {
        let mut offset = 0;
        let dense_len = slice_and_increment(&mut offset, 4, payload)
            .map(BigEndian::read_u32)
            .ok_or(CodecError::MalformedBatch("missing dense length"))?;
        let expected = slice_and_increment(&mut offset, 4, payload)
            .map(BigEndian::read_u32)
            .ok_or(CodecError::MalformedBatch("missing dense checksum"))?;
        let dense = slice_and_increment(&mut offset, dense_len as usize, payload)
            .ok_or(CodecError::MalformedBatch("dense stream extends past payload"))?;

        let actual = crc32fast::hash(dense);
        if actual != expected {
            return Err(CodecError::ChecksumMismatch { expected, actual }.into());
        }

        let residual = self.fallback.decode(&payload[offset..])?;
        self.handler.decompress_collection(dense, &residual)
    }

    fn validate(&self, first_byte: u8, input: &mut dyn Read) -> bool {
        if first_byte as i8 != Self::REGISTRATION_CODE {
            return false;
        }
        let Some((length, prefix)) = peek_payload(input, HYBRID_PREFIX_SIZE) else {
            return false;
        };
        if prefix.len() != HYBRID_PREFIX_SIZE {
            return false;
        }
        let dense_len = BigEndian::read_u32(&prefix[..4]) as usize;
        let expected = BigEndian::read_u32(&prefix[4..]);
        if dense_len > length - HYBRID_PREFIX_SIZE {
            return false;
        }
        let mut dense = vec![0u8; dense_len];
        match read_fully(input, &mut dense) {
            Ok(n) if n == dense_len => crc32fast::hash(&dense) == expected,
            _ => false,
        }
    }
}
