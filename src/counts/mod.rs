//! Delta-encoded positional counts
//!
//! A counts stream stores a step function `count(position)` as a sequence of
//! transitions: each transition starts a run of `length` positions holding the
//! same `count`. The first run starts at position 0 and runs are contiguous.
//!
//! The stream is a bit sequence, most significant bit first:
//!
//! ```text
//! delta(zigzag(initial_count) + 1)
//! repeat {
//!   gamma(zigzag(count - previous_count) + 2)
//!   gamma(length)
//! }
//! gamma(1)                               end-of-data marker
//! ```
//!
//! Transition codes are at least 2, so the marker can never be mistaken for a
//! transition.

mod archive;
pub mod bitstream;
mod helper;
mod index;
mod reader;
mod runs;
mod writer;

use auto_impl::auto_impl;

use crate::Result;

pub use archive::{CountsArchiveReader, CountsArchiveWriter};
pub use helper::CountWriterHelper;
pub use index::{CountBlock, CountIndex, CountIndexBuilder};
pub use reader::CountsReader;
pub use runs::RunsReader;
pub use writer::{CountsWriter, CountsWriterBuilder};

/// Gamma value terminating a counts stream
pub const END_OF_DATA_MARKER: u64 = 1;

/// Offset added to zigzag-encoded deltas so they never collide with the marker
pub(crate) const TRANSITION_CODE_OFFSET: u64 = 2;

/// Number of transitions between two skip-index entries
pub const DEFAULT_TRANSITIONS_PER_BLOCK: usize = 10_000;

/// A sequential source of count transitions
#[auto_impl(&mut, Box)]
pub trait CountSource {
    /// Checks whether another transition follows without consuming it
    fn has_next_transition(&mut self) -> Result<bool>;

    /// Moves to the next transition
    fn next_transition(&mut self) -> Result<()>;

    /// First position of the current run
    fn position(&self) -> u64;

    /// Number of positions in the current run
    fn length(&self) -> u64;

    /// Count of the current run
    fn count(&self) -> i64;

    /// Advances at least one transition, then until `position() >= target`.
    ///
    /// Returns `false` if the source ended before reaching `target`.
    fn skip_to(&mut self, target: u64) -> Result<bool> {
        while self.has_next_transition()? {
            self.next_transition()?;
            if self.position() >= target {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
