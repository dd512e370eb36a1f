//! Combinators over one or more [`CountSource`](crate::counts::CountSource)s
//!
//! - [`UnionReader`] merges several sources into one transition stream.
//! - [`FixedBinning`] and [`AdaptiveBinning`] summarize runs into bins.
//! - [`PeakFinder`] extracts stretches above a threshold.

mod binning;
mod peaks;
mod union;

pub use binning::{AdaptiveBinning, Bin, FixedBinning};
pub use peaks::{Peak, PeakFinder};
pub use union::UnionReader;
