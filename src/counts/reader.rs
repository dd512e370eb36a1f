use crate::{error::CountsError, Result};

use super::{
    bitstream::{zigzag_decode, BitReader},
    CountBlock, CountIndex, CountSource, END_OF_DATA_MARKER, TRANSITION_CODE_OFFSET,
};

/// A decoded transition that has been read but not yet consumed
#[derive(Debug, Clone, Copy)]
struct Lookahead {
    count: i64,
    length: u64,
}

/// Decodes a counts stream held in memory.
///
/// The reader starts before the first transition. Attaching a [`CountIndex`]
/// lets [`CountsReader::reposition`] jump close to a target position instead
/// of scanning from the start of the stream.
#[derive(Debug, Clone)]
pub struct CountsReader<'a> {
    bits: BitReader<'a>,
    index: Option<CountIndex>,

    /// Bit offset of the first transition
    data_start: u64,
    initial_count: i64,

    lookahead: Option<Lookahead>,
    end_of_stream: bool,
    started: bool,

    position: u64,
    length: u64,
    count: i64,
    previous_count: i64,
    num_transitions: u64,

    /// Positions of the current run not yet returned by `next_count_at_position`
    pos_remaining: u64,
}
impl<'a> CountsReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut bits = BitReader::new(data);
        let initial_count = zigzag_decode(bits.read_delta()? - 1);
        let data_start = bits.position();
        Ok(Self {
            bits,
            index: None,
            data_start,
            initial_count,
            lookahead: None,
            end_of_stream: false,
            started: false,
            position: 0,
            length: 0,
            count: initial_count,
            previous_count: initial_count,
            num_transitions: 0,
            pos_remaining: 0,
        })
    }

    /// Creates a reader that repositions with the help of `index`
    pub fn with_index(data: &'a [u8], index: CountIndex) -> Result<Self> {
        let mut reader = Self::new(data)?;
        reader.index = Some(index);
        Ok(reader)
    }

    #[must_use]
    pub fn index(&self) -> Option<&CountIndex> {
        self.index.as_ref()
    }

    #[must_use]
    pub fn initial_count(&self) -> i64 {
        self.initial_count
    }

    /// Difference between the current count and the count of the previous run
    #[must_use]
    pub fn delta_count(&self) -> i64 {
        self.count - self.previous_count
    }

    /// Number of transitions consumed since the start of the stream
    #[must_use]
    pub fn num_transitions(&self) -> u64 {
        self.num_transitions
    }

    /// Captures the state right after the current transition
    pub(crate) fn snapshot(&self) -> CountBlock {
        CountBlock {
            bit_offset: self.bits.position(),
            position: self.position,
            length: self.length,
            count: self.count,
            num_transitions: self.num_transitions,
        }
    }

    fn restore(&mut self, block: &CountBlock) {
        self.bits.seek(block.bit_offset);
        self.lookahead = None;
        self.end_of_stream = false;
        self.started = true;
        self.position = block.position;
        self.length = block.length;
        self.count = block.count;
        self.previous_count = block.count;
        self.num_transitions = block.num_transitions;
        self.pos_remaining = 0;
    }

    /// Rewinds to the state right after construction
    pub fn reset(&mut self) {
        self.bits.seek(self.data_start);
        self.lookahead = None;
        self.end_of_stream = false;
        self.started = false;
        self.position = 0;
        self.length = 0;
        self.count = self.initial_count;
        self.previous_count = self.initial_count;
        self.num_transitions = 0;
        self.pos_remaining = 0;
    }

    fn read_lookahead(&mut self) -> Result<Option<Lookahead>> {
        let code = self.bits.read_gamma()?;
        if code == END_OF_DATA_MARKER {
            return Ok(None);
        }
        let delta = zigzag_decode(code - TRANSITION_CODE_OFFSET);
        let length = self.bits.read_gamma()?;
        // deltas are written wrapped, so wrapping restores the exact count
        let count = self.count.wrapping_add(delta);
        Ok(Some(Lookahead { count, length }))
    }

    /// Moves to any position, forward or backward.
    ///
    /// On success the current run is the first one starting at or after
    /// `target`. When no such run exists the reader is left past the end of
    /// the data, reporting `target` as its position with a zero count and
    /// length, and `false` is returned.
    pub fn reposition(&mut self, target: u64) -> Result<bool> {
        let block = self.index.as_ref().and_then(|index| index.block_before(target));
        match block {
            Some(block) => self.restore(&block),
            None => self.reset(),
        }
        if self.skip_to(target)? {
            Ok(true)
        } else {
            self.position = target;
            self.count = 0;
            self.length = 0;
            self.pos_remaining = 0;
            Ok(false)
        }
    }

    /// Checks whether a count is available for one more position
    pub fn has_next_position(&mut self) -> Result<bool> {
        if self.pos_remaining > 0 {
            return Ok(true);
        }
        self.has_next_transition()
    }

    /// Returns the count at the next position, one position at a time
    pub fn next_count_at_position(&mut self) -> Result<i64> {
        if self.pos_remaining == 0 {
            self.next_transition()?;
        }
        self.pos_remaining -= 1;
        Ok(self.count)
    }
}

impl CountSource for CountsReader<'_> {
    fn has_next_transition(&mut self) -> Result<bool> {
        if self.lookahead.is_some() {
            return Ok(true);
        }
        if self.end_of_stream {
            return Ok(false);
        }
        match self.read_lookahead()? {
            Some(lookahead) => {
                self.lookahead = Some(lookahead);
                Ok(true)
            }
            None => {
                self.end_of_stream = true;
                Ok(false)
            }
        }
    }

    fn next_transition(&mut self) -> Result<()> {
        if !self.has_next_transition()? {
            return Err(CountsError::NoMoreTransitions.into());
        }
        let Some(next) = self.lookahead.take() else {
            return Err(CountsError::NoMoreTransitions.into());
        };
        self.position = if self.started {
            self.position + self.length
        } else {
            0
        };
        self.started = true;
        self.previous_count = self.count;
        self.count = next.count;
        self.length = next.length;
        self.num_transitions += 1;
        self.pos_remaining = next.length;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn count(&self) -> i64 {
        self.count
    }
}
