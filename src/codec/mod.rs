//! Pluggable chunk codecs
//!
//! A [`ChunkCodec`] turns a [`RecordBatch`] into the payload of one chunk and
//! back. Every codec is identified on the wire by a signed registration code
//! written right after the chunk delimiter. Readers resolve that code through a
//! [`CodecRegistry`], an explicit table of constructors.
//!
//! | codec          | code |
//! |----------------|------|
//! | gzip (default) | -1   |
//! | hybrid         | -2   |
//! | bzip2          | -3   |
//! | not-compressed | -4   |
//! | null           | -5   |
//! | zstd           | -6   |

mod batch;
mod bzip2;
mod gzip;
mod hybrid;
mod none;
mod null;
mod zstd;

use std::{collections::BTreeMap, fmt, io::Read, str::FromStr, sync::Arc};

use byteorder::{BigEndian, ReadBytesExt};

use crate::{
    chunks::{DELIMITER_CONTENT, DELIMITER_LENGTH, DEFAULT_ENTRIES_PER_CHUNK},
    error::CodecError,
    utils::read_fully,
    Result,
};

pub use self::bzip2::Bzip2Codec;
pub use self::zstd::ZstdCodec;
pub use batch::RecordBatch;
pub use gzip::GzipCodec;
pub use hybrid::{CollectionHandler, HybridCodec, PrefixColumnHandler};
pub use none::NoCompressionCodec;
pub use null::NullCodec;

/// Strategy for encoding a batch of records into a chunk payload
pub trait ChunkCodec: Send {
    /// Human readable name of the codec
    fn name(&self) -> &'static str;

    /// Signed byte identifying the codec on the wire
    fn registration_code(&self) -> i8;

    /// Encodes a batch into the payload bytes of one chunk
    fn encode(&mut self, batch: &RecordBatch) -> Result<Vec<u8>>;

    /// Decodes the payload bytes of one chunk
    fn decode(&mut self, payload: &[u8]) -> Result<RecordBatch>;

    /// Checks whether the stream holds a well-formed chunk of this codec.
    ///
    /// `first_byte` is the codec byte that followed the delimiter and `input`
    /// is positioned at the length field. Never fails: any I/O problem or
    /// unexpected byte returns `false`.
    fn validate(&self, first_byte: u8, input: &mut dyn Read) -> bool;

    /// Number of records per chunk this codec works best with
    fn suggested_chunk_size(&self) -> usize {
        DEFAULT_ENTRIES_PER_CHUNK
    }
}

/// Reads the length field and up to `n` bytes of payload for validation.
///
/// Returns `None` when the length is negative or the stream is short.
pub(crate) fn peek_payload(input: &mut dyn Read, n: usize) -> Option<(usize, Vec<u8>)> {
    let length = input.read_i32::<BigEndian>().ok()?;
    let length = usize::try_from(length).ok()?;
    let mut prefix = vec![0u8; n.min(length)];
    if read_fully(input, &mut prefix).ok()? != prefix.len() {
        return None;
    }
    Some((length, prefix))
}

/// The built-in codec variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecKind {
    #[default]
    Gzip,
    Hybrid,
    Bzip2,
    None,
    Null,
    Zstd,
}
impl CodecKind {
    pub const ALL: [CodecKind; 6] = [
        Self::Gzip,
        Self::Hybrid,
        Self::Bzip2,
        Self::None,
        Self::Null,
        Self::Zstd,
    ];

    #[must_use]
    pub fn registration_code(&self) -> i8 {
        match self {
            Self::Gzip => GzipCodec::REGISTRATION_CODE,
            Self::Hybrid => HybridCodec::REGISTRATION_CODE,
            Self::Bzip2 => Bzip2Codec::REGISTRATION_CODE,
            Self::None => NoCompressionCodec::REGISTRATION_CODE,
            Self::Null => NullCodec::REGISTRATION_CODE,
            Self::Zstd => ZstdCodec::REGISTRATION_CODE,
        }
    }

    #[must_use]
    pub fn from_registration_code(code: i8) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.registration_code() == code)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Hybrid => "hybrid-1",
            Self::Bzip2 => "bzip2",
            Self::None => "not-compressed",
            Self::Null => "null",
            Self::Zstd => "zstd",
        }
    }

    /// Creates a fresh codec instance
    #[must_use]
    pub fn create(&self) -> Box<dyn ChunkCodec> {
        match self {
            Self::Gzip => Box::new(GzipCodec::default()),
            Self::Hybrid => Box::new(HybridCodec::default()),
            Self::Bzip2 => Box::new(Bzip2Codec::default()),
            Self::None => Box::new(NoCompressionCodec::default()),
            Self::Null => Box::new(NullCodec),
            Self::Zstd => Box::new(ZstdCodec::default()),
        }
    }
}
impl FromStr for CodecKind {
    type Err = CodecError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(Self::Gzip),
            "hybrid" | "hybrid-1" => Ok(Self::Hybrid),
            "bzip2" | "bz2" => Ok(Self::Bzip2),
            "none" | "not-compressed" | "raw" => Ok(Self::None),
            "null" => Ok(Self::Null),
            "zstd" | "zst" => Ok(Self::Zstd),
            _ => Err(CodecError::UnknownCodecName(s.to_string())),
        }
    }
}
impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Constructor stored in a [`CodecRegistry`]
pub type CodecConstructor = Arc<dyn Fn() -> Box<dyn ChunkCodec> + Send + Sync>;

/// Table mapping registration codes to codec constructors.
///
/// The default registry holds every [`CodecKind`]. Custom codecs may be added
/// under unused codes.
#[derive(Clone)]
pub struct CodecRegistry {
    table: BTreeMap<i8, CodecConstructor>,
}
impl Default for CodecRegistry {
    fn default() -> Self {
        let mut table: BTreeMap<i8, CodecConstructor> = BTreeMap::new();
        for kind in CodecKind::ALL {
            table.insert(kind.registration_code(), Arc::new(move || kind.create()));
        }
        Self { table }
    }
}
impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codes", &self.table.keys().collect::<Vec<_>>())
            .finish()
    }
}
impl CodecRegistry {
    /// A registry with no codecs
    #[must_use]
    pub fn empty() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// Registers a constructor under `code`, refusing to replace an existing entry
    pub fn register<F>(&mut self, code: i8, constructor: F) -> Result<()>
    where
        F: Fn() -> Box<dyn ChunkCodec> + Send + Sync + 'static,
    {
        if self.table.contains_key(&code) {
            return Err(CodecError::DuplicateCodec(code).into());
        }
        self.table.insert(code, Arc::new(constructor));
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, code: i8) -> bool {
        self.table.contains_key(&code)
    }

    pub fn codes(&self) -> impl Iterator<Item = i8> + '_ {
        self.table.keys().copied()
    }

    /// Instantiates the codec registered under `code`
    pub fn create(&self, code: i8) -> Result<Box<dyn ChunkCodec>> {
        match self.table.get(&code) {
            Some(constructor) => Ok(constructor()),
            None => Err(CodecError::UnknownCodec(code).into()),
        }
    }

    /// Identifies the codec of the chunk at the start of `input`.
    ///
    /// Consumes the delimiter, codec byte and as much of the payload as the
    /// codec's validation needs. Returns `None` when the bytes do not form a
    /// chunk of any registered codec.
    pub fn detect<R: Read>(&self, input: &mut R) -> Result<Option<i8>> {
        let mut delimiter = [0u8; DELIMITER_LENGTH];
        if read_fully(input, &mut delimiter)? != DELIMITER_LENGTH
            || delimiter.iter().any(|&b| b != DELIMITER_CONTENT)
        {
            return Ok(None);
        }
        let mut code = [0u8; 1];
        if read_fully(input, &mut code)? != 1 {
            return Ok(None);
        }
        let code = code[0] as i8;
        if !self.contains(code) {
            return Ok(None);
        }
        let codec = self.create(code)?;
        Ok(codec.validate(code as u8, input).then_some(code))
    }
}
