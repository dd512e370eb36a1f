use std::io::Write;

use crate::{error::CountsError, Result};

use super::{
    bitstream::{zigzag_encode, BitWriter},
    END_OF_DATA_MARKER, TRANSITION_CODE_OFFSET,
};

/// Builder for [`CountsWriter`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CountsWriterBuilder {
    initial_count: Option<i64>,
}
impl CountsWriterBuilder {
    /// Count the first transition is delta-encoded against (0 by default)
    #[must_use]
    pub fn initial_count(mut self, initial_count: i64) -> Self {
        self.initial_count = Some(initial_count);
        self
    }

    pub fn build<W: Write>(self, inner: W) -> Result<CountsWriter<W>> {
        CountsWriter::new(inner, self.initial_count.unwrap_or(0))
    }
}

/// Append-only writer of delta-encoded count transitions.
pub struct CountsWriter<W: Write> {
    bits: BitWriter<W>,
    initial_count: i64,
    previous_count: i64,
    num_transitions: u64,

    /// Sum of all run lengths written so far
    position: u64,
}
impl<W: Write> CountsWriter<W> {
    pub fn new(inner: W, initial_count: i64) -> Result<Self> {
        let mut bits = BitWriter::new(inner);
        bits.write_delta(zigzag_encode(initial_count).saturating_add(1))?;
        Ok(Self {
            bits,
            initial_count,
            previous_count: initial_count,
            num_transitions: 0,
            position: 0,
        })
    }

    /// Appends a run of `length` positions holding `count`.
    ///
    /// # Panics
    ///
    /// Panics if `length` is zero or if `count` equals the previously appended
    /// count; callers must merge equal runs before writing them.
    pub fn append_count(&mut self, count: i64, length: u64) -> Result<()> {
        assert!(length > 0, "run length must be positive");
        assert!(
            self.num_transitions == 0 || count != self.previous_count,
            "count {count} repeats the previous run at position {}",
            self.position
        );
        let code = zigzag_encode(count.wrapping_sub(self.previous_count))
            .checked_add(TRANSITION_CODE_OFFSET)
            .ok_or(CountsError::ValueOverflow(self.bits.bits_written()))?;
        self.bits.write_gamma(code)?;
        self.bits.write_gamma(length)?;

        self.previous_count = count;
        self.num_transitions += 1;
        self.position += length;
        Ok(())
    }

    #[must_use]
    pub fn initial_count(&self) -> i64 {
        self.initial_count
    }

    /// Count of the last appended run
    #[must_use]
    pub fn previous_count(&self) -> i64 {
        self.previous_count
    }

    #[must_use]
    pub fn num_transitions(&self) -> u64 {
        self.num_transitions
    }

    /// Position following the last appended run
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[must_use]
    pub fn bits_written(&self) -> u64 {
        self.bits.bits_written()
    }

    /// Writes the end-of-data marker and returns the sink
    pub fn finish(mut self) -> Result<W> {
        self.bits.write_gamma(END_OF_DATA_MARKER)?;
        log::debug!(
            "counts stream finished: {} transitions over {} positions in {} bits",
            self.num_transitions,
            self.position,
            self.bits.bits_written()
        );
        self.bits.finish()
    }
}
