//! Query-index permutations
//!
//! Maps the compact "small" index assigned to a record back to its original
//! query index. The mapping is stored as pieces of consecutive small indices.

mod reader;
mod writer;

pub use reader::{PermutationBlock, PermutationReader};
pub use writer::{break_point, PermutationWriter};

/// Maximum number of entries in one piece
pub const DEFAULT_PERMUTATION_CHUNK_SIZE: usize = 1000;
