//! # goby
//!
//! Storage primitives for large collections of opaque records and positional
//! count data.
//!
//! - [`chunks`]: a chunked message container of codec-compressed record batches,
//!   splittable by byte range for parallel processing.
//! - [`codec`]: the pluggable chunk codecs (gzip, bzip2, hybrid, zstd, not-compressed, null).
//! - [`counts`]: delta-encoded positional counts with a skip index and a multi-entry archive.
//! - [`aggregate`]: union, binning and peak finding over count sources.
//! - [`perms`]: query-index permutations.

pub mod aggregate;
pub mod chunks;
pub mod codec;
pub mod counts;
pub mod error;
pub mod perms;
mod utils;

pub use chunks::{ChunkProcessor, ChunkReader, ChunkWriter, ChunkWriterBuilder, MmapChunkReader};
pub use codec::{ChunkCodec, CodecKind, CodecRegistry, RecordBatch};
pub use counts::{CountSource, CountsReader, CountsWriter, CountsWriterBuilder};
pub use error::{Error, IntoGobyError, Result};
pub use utils::Span;
