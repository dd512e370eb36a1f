use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::{error::CodecError, utils::slice_and_increment, utils::Span, Result};

/// An ordered collection of opaque records.
///
/// Records are stored back to back in a single buffer. On the wire a batch is
/// `[u32 record count]` followed by `[u32 length][bytes]` per record, all
/// big-endian, before any codec compresses it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    data: Vec<u8>,
    spans: Vec<Span>,
}
impl RecordBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the batch
    pub fn push(&mut self, record: &[u8]) {
        self.spans.push(Span::new(self.data.len(), record.len()));
        self.data.extend_from_slice(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Total number of record bytes held by the batch
    #[must_use]
    pub fn num_bytes(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.spans.get(idx).map(|span| &self.data[span.range()])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.spans.iter().map(|span| &self.data[span.range()])
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.spans.clear();
    }

    /// Number of bytes produced by [`serialize_into`](Self::serialize_into)
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        4 + 4 * self.spans.len() + self.data.len()
    }

    /// Writes the uncompressed wire form of the batch onto `dst`
    pub fn serialize_into(&self, dst: &mut Vec<u8>) -> Result<()> {
        dst.reserve(self.serialized_len());
        dst.write_u32::<BigEndian>(self.spans.len() as u32)?;
        for record in self.iter() {
            dst.write_u32::<BigEndian>(record.len() as u32)?;
            dst.extend_from_slice(record);
        }
        Ok(())
    }

    /// Parses the uncompressed wire form of a batch
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let num_records = slice_and_increment(&mut offset, 4, bytes)
            .map(BigEndian::read_u32)
            .ok_or(CodecError::MalformedBatch("missing record count"))?
            as usize;

        // every record carries at least its length prefix
        if num_records > (bytes.len() - offset) / 4 {
            return Err(CodecError::MalformedBatch("record count exceeds payload").into());
        }

        let mut batch = Self {
            data: Vec::with_capacity(bytes.len() - offset - 4 * num_records),
            spans: Vec::with_capacity(num_records),
        };
        for _ in 0..num_records {
            let len = slice_and_increment(&mut offset, 4, bytes)
                .map(BigEndian::read_u32)
                .ok_or(CodecError::MalformedBatch("missing record length"))?;
            let record = slice_and_increment(&mut offset, len as usize, bytes)
                .ok_or(CodecError::MalformedBatch("record extends past payload"))?;
            batch.push(record);
        }
        if offset != bytes.len() {
            return Err(CodecError::MalformedBatch("trailing bytes after records").into());
        }
        Ok(batch)
    }
}

impl<T: AsRef<[u8]>> FromIterator<T> for RecordBatch {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut batch = Self::new();
        for record in iter {
            batch.push(record.as_ref());
        }
        batch
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let mut batch = RecordBatch::new();
        batch.push(b"first");
        batch.push(b"");
        batch.push(b"third");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.get(0), Some(&b"first"[..]));
        assert_eq!(batch.get(1), Some(&b""[..]));
        assert_eq!(batch.get(2), Some(&b"third"[..]));
        assert_eq!(batch.get(3), None);
        assert_eq!(batch.num_bytes(), 10);
    }

    #[test]
    fn test_serialized_layout() {
        let batch: RecordBatch = [b"ab".as_slice(), b"c".as_slice()].into_iter().collect();
        let mut buf = Vec::new();
        batch.serialize_into(&mut buf).unwrap();
        assert_eq!(buf.len(), batch.serialized_len());
        assert_eq!(
            buf,
            vec![0, 0, 0, 2, 0, 0, 0, 2, b'a', b'b', 0, 0, 0, 1, b'c']
        );
        assert_eq!(RecordBatch::deserialize(&buf).unwrap(), batch);
    }

    #[test]
    fn test_deserialize_empty() {
        let batch = RecordBatch::deserialize(&[0, 0, 0, 0]).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_deserialize_rejects_truncation() {
        assert!(RecordBatch::deserialize(&[0, 0]).is_err());
        assert!(RecordBatch::deserialize(&[0, 0, 0, 1, 0, 0, 0, 9, 1]).is_err());
        assert!(RecordBatch::deserialize(&[0, 0, 0, 200]).is_err());
    }

    #[test]
    fn test_deserialize_rejects_trailing_bytes() {
        assert!(RecordBatch::deserialize(&[0, 0, 0, 0, 7]).is_err());
    }
}
