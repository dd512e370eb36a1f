use std::error::Error as StdError;

/// Custom Result type for goby operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the goby library, encompassing all possible error cases
/// that can occur while framing chunks, encoding counts or reading archives.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors related to chunk framing
    #[error("Error processing chunk: {0}")]
    ChunkError(#[from] ChunkError),

    /// Errors raised by chunk codecs
    #[error("Error in chunk codec: {0}")]
    CodecError(#[from] CodecError),

    /// Errors related to delta-encoded counts
    #[error("Error processing counts: {0}")]
    CountsError(#[from] CountsError),

    /// Errors related to skip indices
    #[error("Error processing Index: {0}")]
    IndexError(#[from] IndexError),

    /// Errors related to counts archives
    #[error("Error processing archive: {0}")]
    ArchiveError(#[from] ArchiveError),

    /// Errors related to query index permutations
    #[error("Error processing permutation: {0}")]
    PermutationError(#[from] PermutationError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// UTF-8 conversion errors
    #[error("Error with UTF8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Generic errors for other unexpected situations
    #[error("Generic error: {0}")]
    GenericError(#[from] Box<dyn StdError + Send + Sync>),
}
impl Error {
    /// Checks if the error is an embedded checksum failure
    ///
    /// A checksum failure means the chunk payload is corrupt and must not be
    /// trusted; it is never recovered from silently.
    #[must_use]
    pub fn is_corrupt_chunk(&self) -> bool {
        matches!(self, Self::CodecError(CodecError::ChecksumMismatch { .. }))
    }
}

/// Errors that can occur while writing or reading framed chunks
#[derive(thiserror::Error, Debug)]
pub enum ChunkError {
    /// A chunk length field was negative
    #[error("Invalid chunk length ({0}) at byte position {1}")]
    InvalidLength(i32, u64),

    /// An encoded payload does not fit in the signed 32-bit length field
    #[error("Encoded chunk of {0} bytes exceeds the maximum chunk size")]
    ChunkTooLarge(usize),

    /// The byte range requested from a split-aware reader is inverted
    #[error("Invalid range specified: start ({start}) is greater than end ({end})")]
    InvalidRange { start: u64, end: u64 },

    /// The number of entries per chunk must be at least one
    #[error("Entries per chunk must be positive")]
    ZeroEntriesPerChunk,
}

/// Errors raised by chunk codecs and the codec registry
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// A chunk names a codec that is not registered
    #[error("Unknown codec registration code: {0}")]
    UnknownCodec(i8),

    /// The codec name could not be parsed
    #[error("Unknown codec name: {0}")]
    UnknownCodecName(String),

    /// A codec was registered twice under the same code
    #[error("Codec registration code {0} is already in use")]
    DuplicateCodec(i8),

    /// The embedded checksum does not match the recomputed value
    #[error("Corrupt chunk: checksum mismatch (expected {expected:#010x}, found {actual:#010x})")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The decoded batch buffer is not a well-formed list of records
    #[error("Malformed record batch: {0}")]
    MalformedBatch(&'static str),

    /// The null codec discards data and cannot decode a non-empty payload
    #[error("The null codec cannot decode a payload of {0} bytes")]
    NullPayload(usize),
}

/// Errors that can occur while writing or reading delta-encoded counts
#[derive(thiserror::Error, Debug)]
pub enum CountsError {
    /// `next_transition` was called on an exhausted stream
    #[error("No more transitions in counts stream")]
    NoMoreTransitions,

    /// The bit stream ended before the end-of-data marker
    #[error("Counts stream truncated at bit {0}")]
    TruncatedStream(u64),

    /// An encoded value does not fit the expected range
    #[error("Encoded value out of range at bit {0}")]
    ValueOverflow(u64),

    /// The textual `(length,count)` form could not be parsed
    #[error("Malformed runs description: {0}")]
    MalformedRuns(String),

    /// Transitions per index block must be at least one
    #[error("Transitions per index block must be positive")]
    ZeroTransitionsPerBlock,
}

/// Errors related to skip indices
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// When the magic number in the index doesn't match the expected value
    #[error("Invalid magic number: {0:?}")]
    InvalidMagicNumber([u8; 8]),

    /// The index bytes are not a whole number of entries
    #[error("Unable to cast index bytes ({0}) into entries")]
    IndexCastingError(usize),
}

/// Errors related to counts archives
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    /// The archive header or footer magic is wrong
    #[error("Invalid archive magic: {0:?}")]
    InvalidMagic([u8; 8]),

    /// The archive version is not supported
    #[error("Unsupported archive version: {0}")]
    InvalidVersion(u8),

    /// The archive file is too small to hold a header and footer
    #[error("Archive truncated: {0} bytes")]
    Truncated(usize),

    /// No entry was found for the requested identifier
    #[error("No counts entry named {0}")]
    MissingEntry(String),

    /// No entry was found for the requested reference index
    #[error("No counts entry with reference index {0}")]
    MissingIndex(u32),

    /// An identifier was added twice
    #[error("Duplicate counts entry: {0}")]
    DuplicateEntry(String),

    /// A directory record points outside of the file
    #[error("Directory entry {name} points outside of the archive ({end} > {len})")]
    EntryOutOfBounds { name: String, end: u64, len: u64 },
}

/// Errors related to query index permutations
#[derive(thiserror::Error, Debug)]
pub enum PermutationError {
    /// A piece header is inconsistent
    #[error("Invalid permutation piece at byte {offset}: n = {n}")]
    InvalidPiece { offset: usize, n: i32 },

    /// The permutation stream ended mid-piece
    #[error("Permutation stream truncated at byte {0}")]
    Truncated(usize),

    /// Index values must fit the signed on-disk representation
    #[error("Index {0} exceeds the permutation range")]
    IndexOverflow(u32),
}

/// Trait for converting arbitrary errors into `Error`
pub trait IntoGobyError {
    fn into_goby_error(self) -> Error;
}

// Implement conversion for Box<dyn Error>
impl<E> IntoGobyError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_goby_error(self) -> Error {
        Error::GenericError(Box::new(self))
    }
}
