use std::{
    io::{Read, Seek, SeekFrom},
    ops::Range,
};

use byteorder::{BigEndian, ByteOrder};

use crate::{
    codec::{ChunkCodec, CodecRegistry, RecordBatch},
    error::ChunkError,
    utils::read_fully,
    Result,
};

use super::{ChunkHeader, CHUNK_HEADER_SIZE, DELIMITER_CONTENT, DELIMITER_LENGTH};

/// Size of the blocks read while scanning for a chunk boundary
const SCAN_BUFFER_SIZE: usize = 64 * 1024;

/// Reads the chunks of a container and iterates over their records.
///
/// A malformed delimiter or a truncated header or payload ends the stream
/// quietly (with a warning) so files left behind by an interrupted writer
/// remain readable up to the last complete chunk. An unknown codec or a
/// corrupt payload is an error.
pub struct ChunkReader<R: Read> {
    inner: R,

    registry: CodecRegistry,

    /// Codec of the last chunk, replaced when the code changes
    codec: Option<(i8, Box<dyn ChunkCodec>)>,

    /// Records of the current chunk
    batch: RecordBatch,

    /// Index of the next record in `batch`
    cursor: usize,

    /// Reusable payload buffer
    payload: Vec<u8>,

    /// Absolute offset of the next unread byte
    position: u64,

    /// Absolute offset of the current chunk
    chunk_start: u64,

    /// Chunks starting at or after this offset belong to another reader
    end: Option<u64>,

    exhausted: bool,
}
impl<R: Read> ChunkReader<R> {
    /// Reads a container from the start of `inner` with every built-in codec
    pub fn new(inner: R) -> Self {
        Self::with_registry(inner, CodecRegistry::default())
    }

    pub fn with_registry(inner: R, registry: CodecRegistry) -> Self {
        Self {
            inner,
            registry,
            codec: None,
            batch: RecordBatch::new(),
            cursor: 0,
            payload: Vec::new(),
            position: 0,
            chunk_start: 0,
            end: None,
            exhausted: false,
        }
    }

    /// Reads the next chunk into the current batch.
    ///
    /// Returns `None` at the end of the stream (or of the reader's range).
    pub fn read_chunk(&mut self) -> Result<Option<ChunkHeader>> {
        match self.next_chunk() {
            Ok(Some(header)) => Ok(Some(header)),
            Ok(None) => {
                self.exhausted = true;
                self.batch.clear();
                self.cursor = 0;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn next_chunk(&mut self) -> Result<Option<ChunkHeader>> {
        if self.exhausted {
            return Ok(None);
        }
        let start = self.position;
        if self.end.is_some_and(|end| start >= end) {
            return Ok(None);
        }

        let mut header = [0u8; CHUNK_HEADER_SIZE];
        let n = read_fully(&mut self.inner, &mut header)?;
        self.position += n as u64;
        if n == 0 {
            log::debug!("container ended at {start} without a terminator");
            return Ok(None);
        }
        if n < CHUNK_HEADER_SIZE {
            log::warn!("truncated chunk header at byte {start} ({n} bytes), treating as end of stream");
            return Ok(None);
        }
        if header[..DELIMITER_LENGTH]
            .iter()
            .any(|&b| b != DELIMITER_CONTENT)
        {
            log::warn!("invalid chunk delimiter at byte {start}, treating as end of stream");
            return Ok(None);
        }

        let code = header[DELIMITER_LENGTH] as i8;
        self.install_codec(code)?;

        let length = BigEndian::read_i32(&header[DELIMITER_LENGTH + 1..]);
        if length == 0 {
            return Ok(None);
        }
        let length = u32::try_from(length).map_err(|_| ChunkError::InvalidLength(length, start))?;

        self.payload.resize(length as usize, 0);
        let n = read_fully(&mut self.inner, &mut self.payload)?;
        self.position += n as u64;
        if n < self.payload.len() {
            log::warn!(
                "truncated chunk payload at byte {start} ({n} of {length} bytes), treating as end of stream"
            );
            return Ok(None);
        }

        let Some((_, codec)) = self.codec.as_mut() else {
            return Ok(None);
        };
        self.batch = codec.decode(&self.payload)?;
        self.cursor = 0;
        self.chunk_start = start;

        log::trace!(
            "read chunk at offset {start}: {} records, {length} bytes ({})",
            self.batch.len(),
            codec.name()
        );
        Ok(Some(ChunkHeader {
            offset: start,
            codec: code,
            length,
            num_records: self.batch.len(),
        }))
    }

    fn install_codec(&mut self, code: i8) -> Result<()> {
        if !matches!(self.codec, Some((current, _)) if current == code) {
            let codec = self.registry.create(code)?;
            self.codec = Some((code, codec));
        }
        Ok(())
    }

    /// Checks whether another record is available, reading chunks as needed
    pub fn has_next(&mut self) -> Result<bool> {
        while self.cursor >= self.batch.len() {
            if self.read_chunk()?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns the next record of the current chunk.
    ///
    /// Call [`has_next`](Self::has_next) first to move across chunks.
    pub fn next_record(&mut self) -> Option<&[u8]> {
        if self.cursor >= self.batch.len() {
            return None;
        }
        self.cursor += 1;
        self.batch.get(self.cursor - 1)
    }

    /// Records of the chunk read last
    #[must_use]
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Absolute offset of the next unread byte
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Absolute offset of the chunk read last
    #[must_use]
    pub fn chunk_start(&self) -> u64 {
        self.chunk_start
    }

    /// Name of the codec of the chunk read last
    #[must_use]
    pub fn codec_name(&self) -> Option<&'static str> {
        self.codec.as_ref().map(|(_, codec)| codec.name())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ChunkReader<R> {
    /// Reads only the chunks that start within `range`.
    ///
    /// The reader scans forward from `range.start` to the first chunk boundary.
    /// A chunk that starts before `range.end` is read completely even if it
    /// extends past it; the reader of the next range skips it. Readers over
    /// adjacent ranges therefore see every chunk exactly once.
    pub fn with_range(inner: R, range: Range<u64>) -> Result<Self> {
        Self::with_range_and_registry(inner, range, CodecRegistry::default())
    }

    pub fn with_range_and_registry(
        mut inner: R,
        range: Range<u64>,
        registry: CodecRegistry,
    ) -> Result<Self> {
        if range.start > range.end {
            return Err(ChunkError::InvalidRange {
                start: range.start,
                end: range.end,
            }
            .into());
        }
        let boundary = if range.is_empty() {
            None
        } else {
            find_boundary(&mut inner, range.start, &registry)?
        };

        let mut reader = Self::with_registry(inner, registry);
        reader.end = Some(range.end);
        match boundary {
            Some(offset) if offset < range.end => {
                reader.inner.seek(SeekFrom::Start(offset))?;
                reader.position = offset;
                reader.chunk_start = offset;
            }
            _ => reader.exhausted = true,
        }
        Ok(reader)
    }

    /// Resumes reading at the first chunk starting at or after `offset`.
    ///
    /// `offset` is typically one returned by [`ChunkWriter::push`](super::ChunkWriter::push).
    /// Records left in the current batch are dropped. Returns `false` if no
    /// chunk of this reader's range starts at or after `offset`.
    pub fn seek(&mut self, offset: u64) -> Result<bool> {
        self.batch.clear();
        self.cursor = 0;
        let boundary = find_boundary(&mut self.inner, offset, &self.registry)?
            .filter(|boundary| self.end.map_or(true, |end| *boundary < end));
        let Some(boundary) = boundary else {
            self.exhausted = true;
            return Ok(false);
        };
        self.inner.seek(SeekFrom::Start(boundary))?;
        self.position = boundary;
        self.chunk_start = boundary;
        self.exhausted = false;
        Ok(true)
    }
}

/// Finds the offset of the first chunk starting at or after `start`.
///
/// A boundary is a run of at least seven delimiter bytes followed by a
/// registered codec byte. Gzip registers as `0xFF`, so its delimiter and code
/// form a run of eight, ended by the first byte of the (non-negative) length.
fn find_boundary<R: Read + Seek>(
    inner: &mut R,
    start: u64,
    registry: &CodecRegistry,
) -> Result<Option<u64>> {
    let delimiter_code_registered = registry.contains(DELIMITER_CONTENT as i8);
    inner.seek(SeekFrom::Start(start))?;

    let mut buf = vec![0u8; SCAN_BUFFER_SIZE];
    let mut block_start = start;
    let mut run = 0usize;
    loop {
        let n = read_fully(inner, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        let block = &buf[..n];
        let mut i = 0;
        while i < n {
            if run == 0 {
                match memchr::memchr(DELIMITER_CONTENT, &block[i..]) {
                    Some(skip) => i += skip,
                    None => break,
                }
            }
            let byte = block[i];
            if byte == DELIMITER_CONTENT {
                run += 1;
            } else {
                let offset = block_start + i as u64;
                if run >= DELIMITER_LENGTH && registry.contains(byte as i8) {
                    return Ok(Some(offset - DELIMITER_LENGTH as u64));
                }
                if run > DELIMITER_LENGTH && delimiter_code_registered {
                    return Ok(Some(offset - DELIMITER_LENGTH as u64 - 1));
                }
                run = 0;
            }
            i += 1;
        }
        block_start += n as u64;
    }
}
