//! Chunked record containers
//!
//! A container is a sequence of self-delimited chunks:
//!
//! ```text
//! repeat {
//!   DELIMITER  (7 bytes of 0xFF)
//!   CODEC_CODE (1 signed byte)
//!   LENGTH     (4-byte big-endian signed int; 0 = end of stream)
//!   PAYLOAD    (LENGTH bytes, codec-specific)
//! }
//! ```
//!
//! The delimiter lets a reader starting at an arbitrary byte offset find the
//! next chunk boundary, which is how a container is split between workers.

mod parallel;
mod reader;
mod writer;

pub use parallel::{ChunkProcessor, MmapChunkReader};
pub use reader::ChunkReader;
pub use writer::{ChunkWriter, ChunkWriterBuilder, WriterStats};

/// Value of every delimiter byte
pub const DELIMITER_CONTENT: u8 = 0xFF;

/// Number of delimiter bytes preceding each chunk
pub const DELIMITER_LENGTH: usize = 7;

/// Size of the big-endian length field
pub const SIZE_OF_MESSAGE_LENGTH: usize = 4;

/// Bytes of framing before the payload of a chunk
pub const CHUNK_HEADER_SIZE: usize = DELIMITER_LENGTH + 1 + SIZE_OF_MESSAGE_LENGTH;

/// Number of records buffered before a chunk is written
pub const DEFAULT_ENTRIES_PER_CHUNK: usize = 10_000;

/// Framing information of a chunk read from a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Byte offset of the first delimiter byte
    pub offset: u64,

    /// Registration code of the codec that wrote the payload
    pub codec: i8,

    /// Number of payload bytes
    pub length: u32,

    /// Number of records decoded from the payload
    pub num_records: usize,
}
impl ChunkHeader {
    /// Byte offset just past the end of this chunk
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + CHUNK_HEADER_SIZE as u64 + u64::from(self.length)
    }
}
