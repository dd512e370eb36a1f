use std::{fs, io::Read, path::Path};

use byteorder::{BigEndian, ByteOrder};

use crate::{error::PermutationError, utils::slice_and_increment, Result};

/// Location of one permutation piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermutationBlock {
    pub first_small_index: u32,
    pub n: u32,

    /// Byte offset of the piece header
    pub offset: usize,
}
impl PermutationBlock {
    fn contains(&self, small_index: u32) -> bool {
        small_index >= self.first_small_index && small_index - self.first_small_index < self.n
    }
}

/// Maps small indices back to query indices
#[derive(Debug, Clone, Default)]
pub struct PermutationReader {
    data: Vec<u8>,

    /// Sorted by first small index
    blocks: Vec<PermutationBlock>,
}
impl PermutationReader {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let mut blocks = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let piece_start = offset;
            let header = slice_and_increment(&mut offset, 8, &data)
                .ok_or(PermutationError::Truncated(piece_start))?;
            let n = BigEndian::read_i32(&header[..4]);
            let first_small_index = BigEndian::read_i32(&header[4..]);
            let (Ok(n), Ok(first_small_index)) = (u32::try_from(n), u32::try_from(first_small_index))
            else {
                return Err(PermutationError::InvalidPiece {
                    offset: piece_start,
                    n,
                }
                .into());
            };
            slice_and_increment(&mut offset, n as usize * 4, &data)
                .ok_or(PermutationError::Truncated(piece_start))?;
            blocks.push(PermutationBlock {
                first_small_index,
                n,
                offset: piece_start,
            });
        }
        blocks.sort_by_key(|block| block.first_small_index);
        log::debug!("loaded {} permutation blocks", blocks.len());
        Ok(Self { data, blocks })
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::new(data)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(fs::read(path)?)
    }

    #[must_use]
    pub fn blocks(&self) -> &[PermutationBlock] {
        &self.blocks
    }

    /// Original query index of `small_index`, if any piece covers it
    #[must_use]
    pub fn query_index(&self, small_index: u32) -> Option<u32> {
        let idx = self
            .blocks
            .partition_point(|block| block.first_small_index <= small_index);
        let block = self.blocks.get(idx.checked_sub(1)?)?;
        if !block.contains(small_index) {
            return None;
        }
        let at = block.offset + 8 + (small_index - block.first_small_index) as usize * 4;
        let query = BigEndian::read_i32(self.data.get(at..at + 4)?);
        u32::try_from(query).ok()
    }
}

#[cfg(test)]
mod testing {
    use std::{collections::HashMap, io::Write};

    use super::*;
    use crate::perms::PermutationWriter;

    fn write_pieces(pieces: &[HashMap<u32, u32>]) -> Vec<u8> {
        let mut writer = PermutationWriter::new(Vec::new());
        for piece in pieces {
            writer.append(piece).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn test_query_index_lookup() {
        let low: HashMap<u32, u32> = (0..100).map(|q| (q, q + 1)).collect();
        let high: HashMap<u32, u32> = (300..310).map(|q| (q, q + 1)).collect();
        let reader = PermutationReader::new(write_pieces(&[high, low])).unwrap();
        assert_eq!(reader.blocks().len(), 2);
        assert_eq!(reader.blocks()[0].first_small_index, 1);

        for small in 1..=100 {
            assert_eq!(reader.query_index(small), Some(small - 1));
        }
        for small in 301..=310 {
            assert_eq!(reader.query_index(small), Some(small - 1));
        }
        assert_eq!(reader.query_index(0), None);
        assert_eq!(reader.query_index(101), None);
        assert_eq!(reader.query_index(200), None);
        assert_eq!(reader.query_index(250), None);
        assert_eq!(reader.query_index(311), None);
    }

    #[test]
    fn test_many_pieces() {
        let piece: HashMap<u32, u32> = (0..5000).map(|q| (4999 - q, q * 2)).collect();
        let reader = PermutationReader::new(write_pieces(&[piece])).unwrap();
        assert_eq!(reader.blocks().len(), 5000);
        assert_eq!(reader.query_index(0), Some(4999));
        assert_eq!(reader.query_index(2 * 4999), Some(0));
        assert_eq!(reader.query_index(1), None);
    }

    #[test]
    fn test_empty_permutation() {
        let reader = PermutationReader::new(Vec::new()).unwrap();
        assert!(reader.blocks().is_empty());
        assert_eq!(reader.query_index(0), None);
    }

    #[test]
    fn test_open_file() {
        let bytes = write_pieces(&[HashMap::from([(7, 0), (9, 1)])]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        let reader = PermutationReader::open(file.path()).unwrap();
        assert_eq!(reader.query_index(1), Some(9));
        let reader = PermutationReader::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(reader.query_index(0), Some(7));
    }

    #[test]
    fn test_malformed_pieces() {
        let bytes = write_pieces(&[HashMap::from([(7, 0), (9, 1)])]);
        let err = PermutationReader::new(bytes[..bytes.len() - 2].to_vec()).unwrap_err();
        assert!(err.to_string().contains("truncated at byte 0"));

        let mut negative = bytes.clone();
        negative[..4].copy_from_slice(&(-3i32).to_be_bytes());
        let err = PermutationReader::new(negative).unwrap_err();
        assert!(err.to_string().contains("n = -3"));
    }
}
