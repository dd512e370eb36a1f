use std::{collections::HashMap, io::Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::{error::PermutationError, Result};

use super::DEFAULT_PERMUTATION_CHUNK_SIZE;

/// End of the piece that starts at `start` in `sorted_small`.
///
/// A piece holds consecutive small indices and at most `chunk_size` entries.
#[must_use]
pub fn break_point(start: usize, sorted_small: &[u32], chunk_size: usize) -> usize {
    if start >= sorted_small.len() {
        return sorted_small.len();
    }
    let n = chunk_size.min(sorted_small.len() - start);
    let mut previous = sorted_small[start];
    for offset in start + 1..start + n {
        let small = sorted_small[offset];
        if previous.checked_add(1) != Some(small) {
            return offset;
        }
        previous = small;
    }
    start + n
}

/// Writes query-index permutation pieces.
///
/// Each piece is `[i32 BE n][i32 BE first small index][n x i32 BE query index]`.
pub struct PermutationWriter<W: Write> {
    inner: W,
    chunk_size: usize,
    num_written: u64,
    num_pieces: u64,
}
impl<W: Write> PermutationWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_chunk_size(inner, DEFAULT_PERMUTATION_CHUNK_SIZE)
    }

    pub fn with_chunk_size(inner: W, chunk_size: usize) -> Self {
        Self {
            inner,
            chunk_size: chunk_size.max(1),
            num_written: 0,
            num_pieces: 0,
        }
    }

    /// Appends a mapping from query index to small index
    pub fn append(&mut self, piece: &HashMap<u32, u32>) -> Result<()> {
        if piece.is_empty() {
            return Ok(());
        }
        let mut pairs: Vec<(u32, u32)> = piece.iter().map(|(&query, &small)| (small, query)).collect();
        pairs.sort_unstable();
        let small: Vec<u32> = pairs.iter().map(|&(small, _)| small).collect();

        let mut start = 0;
        while start < small.len() {
            let end = break_point(start, &small, self.chunk_size);
            self.write_piece(&pairs[start..end])?;
            start = end;
        }
        self.inner.flush()?;
        Ok(())
    }

    fn write_piece(&mut self, pairs: &[(u32, u32)]) -> Result<()> {
        let to_i32 = |value: u32| i32::try_from(value).map_err(|_| PermutationError::IndexOverflow(value));
        let n = u32::try_from(pairs.len()).map_err(|_| PermutationError::IndexOverflow(u32::MAX))?;

        // the whole piece is checked before any of it reaches the sink
        let mut words = Vec::with_capacity(pairs.len() + 2);
        words.push(to_i32(n)?);
        words.push(to_i32(pairs[0].0)?);
        for &(_, query) in pairs {
            words.push(to_i32(query)?);
        }
        let mut buffer = Vec::with_capacity(words.len() * 4);
        for word in words {
            buffer.write_i32::<BigEndian>(word)?;
        }
        self.inner.write_all(&buffer)?;
        self.num_written += pairs.len() as u64;
        self.num_pieces += 1;
        Ok(())
    }

    /// Number of query indices written
    #[must_use]
    pub fn num_written(&self) -> u64 {
        self.num_written
    }

    #[must_use]
    pub fn num_pieces(&self) -> u64 {
        self.num_pieces
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_break_point_at_gap() {
        assert_eq!(break_point(0, &[0, 1, 2, 4, 5], DEFAULT_PERMUTATION_CHUNK_SIZE), 3);
        assert_eq!(break_point(3, &[0, 1, 2, 4, 5], DEFAULT_PERMUTATION_CHUNK_SIZE), 5);
    }

    #[test]
    fn test_break_point_at_chunk_size() {
        let small = [0, 1, 2, 3, 4, 5];
        assert_eq!(break_point(1, &small, 2), 3);
        assert_eq!(break_point(4, &small, 20), 6);
        assert_eq!(break_point(6, &small, 20), 6);
        assert_eq!(break_point(0, &[], 20), 0);
    }

    #[test]
    fn test_piece_layout() {
        let mut writer = PermutationWriter::new(Vec::new());
        let piece = HashMap::from([(30, 1), (10, 0), (50, 3)]);
        writer.append(&piece).unwrap();
        assert_eq!(writer.num_written(), 3);
        assert_eq!(writer.num_pieces(), 2);
        let bytes = writer.into_inner();
        let words: Vec<i32> = bytes
            .chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(words, vec![2, 0, 10, 30, 1, 3, 50]);
    }

    #[test]
    fn test_each_append_starts_fresh() {
        let mut writer = PermutationWriter::with_chunk_size(Vec::new(), 4);
        writer
            .append(&(0..10).map(|q| (q, q)).collect::<HashMap<_, _>>())
            .unwrap();
        assert_eq!(writer.num_pieces(), 3);
        writer.append(&HashMap::from([(100, 10)])).unwrap();
        writer.append(&HashMap::new()).unwrap();
        assert_eq!(writer.num_pieces(), 4);
        assert_eq!(writer.num_written(), 11);
    }

    #[test]
    fn test_index_overflow() {
        let mut writer = PermutationWriter::new(Vec::new());
        let err = writer
            .append(&HashMap::from([(u32::MAX, 0)]))
            .unwrap_err();
        assert!(err.to_string().contains("exceeds the permutation range"));
    }

    #[test]
    fn test_rejected_piece_writes_nothing() {
        let mut writer = PermutationWriter::new(Vec::new());
        writer.append(&HashMap::from([(4, 0)])).unwrap();
        let err = writer
            .append(&HashMap::from([(1, 7), (u32::MAX, 8)]))
            .unwrap_err();
        assert!(err.to_string().contains(&u32::MAX.to_string()));
        assert_eq!(writer.num_pieces(), 1);
        assert_eq!(writer.num_written(), 1);
        assert_eq!(writer.into_inner().len(), 12);
    }
}
