use std::io::Write;

use crate::Result;

use super::CountsWriter;

/// Builds a counts stream from per-position observations.
///
/// Positions must be appended in increasing order. Equal counts at adjacent
/// positions are merged into one run and skipped positions hold a zero count.
pub struct CountWriterHelper<W: Write> {
    delegate: CountsWriter<W>,

    /// Run not yet handed to the delegate as `(count, length)`
    pending: Option<(i64, u64)>,
}
impl<W: Write> CountWriterHelper<W> {
    pub fn new(delegate: CountsWriter<W>) -> Self {
        Self {
            delegate,
            pending: None,
        }
    }

    /// First position not yet covered by a run
    #[must_use]
    pub fn next_position(&self) -> u64 {
        self.delegate.position() + self.pending.map_or(0, |(_, length)| length)
    }

    /// Records `count` at `position`.
    ///
    /// # Panics
    ///
    /// Panics if `position` precedes a previously appended position.
    pub fn append_count_at_position(&mut self, count: i64, position: u64) -> Result<()> {
        let next = self.next_position();
        assert!(
            position >= next,
            "position {position} appended after position {}",
            next - 1
        );
        let count = if count < 0 {
            log::warn!("negative count {count} at position {position} replaced by zero");
            0
        } else {
            count
        };
        if position > next {
            self.extend(0, position - next)?;
        }
        self.extend(count, 1)
    }

    fn extend(&mut self, count: i64, length: u64) -> Result<()> {
        if let Some((pending_count, pending_length)) = self.pending.as_mut() {
            if *pending_count == count {
                *pending_length += length;
                return Ok(());
            }
        }
        self.flush_pending()?;
        self.pending = Some((count, length));
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some((count, length)) = self.pending.take() {
            self.delegate.append_count(count, length)?;
        }
        Ok(())
    }

    /// Writes the last run, returns the stream to zero and finishes the delegate
    pub fn finish(mut self) -> Result<W> {
        let last_count = self.pending.map(|(count, _)| count);
        self.flush_pending()?;
        if last_count.is_some_and(|count| count != 0) {
            self.delegate.append_count(0, 1)?;
        }
        self.delegate.finish()
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::counts::{testing::transitions, CountsReader, CountsWriterBuilder};

    fn helper() -> CountWriterHelper<Vec<u8>> {
        CountWriterHelper::new(CountsWriterBuilder::default().build(Vec::new()).unwrap())
    }

    #[test]
    fn test_merges_equal_counts() {
        let mut helper = helper();
        for (position, count) in [(0, 1), (1, 1), (2, 1), (3, 4), (4, 4)] {
            helper.append_count_at_position(count, position).unwrap();
        }
        assert_eq!(helper.next_position(), 5);
        let bytes = helper.finish().unwrap();
        assert_eq!(
            transitions(CountsReader::new(&bytes).unwrap()),
            vec![(0, 3, 1), (3, 2, 4), (5, 1, 0)]
        );
    }

    #[test]
    fn test_fills_gaps_with_zero() {
        let mut helper = helper();
        helper.append_count_at_position(3, 5).unwrap();
        helper.append_count_at_position(3, 6).unwrap();
        helper.append_count_at_position(2, 10).unwrap();
        helper.append_count_at_position(0, 11).unwrap();
        let bytes = helper.finish().unwrap();
        assert_eq!(
            transitions(CountsReader::new(&bytes).unwrap()),
            vec![(0, 5, 0), (5, 2, 3), (7, 3, 0), (10, 1, 2), (11, 1, 0)]
        );
    }

    #[test]
    fn test_negative_counts_become_zero() {
        let mut helper = helper();
        helper.append_count_at_position(0, 0).unwrap();
        helper.append_count_at_position(-4, 1).unwrap();
        let bytes = helper.finish().unwrap();
        assert_eq!(transitions(CountsReader::new(&bytes).unwrap()), vec![(0, 2, 0)]);
    }

    #[test]
    fn test_empty_helper() {
        let bytes = helper().finish().unwrap();
        assert!(transitions(CountsReader::new(&bytes).unwrap()).is_empty());
    }

    #[test]
    #[should_panic(expected = "appended after position")]
    fn test_positions_must_increase() {
        let mut helper = helper();
        helper.append_count_at_position(1, 4).unwrap();
        helper.append_count_at_position(1, 4).unwrap();
    }
}
