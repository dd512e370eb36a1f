use std::{fmt, io::Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::{
    codec::{ChunkCodec, CodecKind, RecordBatch},
    error::ChunkError,
    Result,
};

use super::{DEFAULT_ENTRIES_PER_CHUNK, DELIMITER_CONTENT, DELIMITER_LENGTH, SIZE_OF_MESSAGE_LENGTH};

/// Builder for [`ChunkWriter`]
#[derive(Default)]
pub struct ChunkWriterBuilder {
    codec: Option<CodecKind>,
    custom_codec: Option<Box<dyn ChunkCodec>>,
    entries_per_chunk: Option<usize>,
}
impl ChunkWriterBuilder {
    /// Selects one of the built-in codecs (gzip by default)
    #[must_use]
    pub fn codec(mut self, codec: CodecKind) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Uses a caller-provided codec, taking precedence over [`codec`](Self::codec)
    #[must_use]
    pub fn custom_codec(mut self, codec: Box<dyn ChunkCodec>) -> Self {
        self.custom_codec = Some(codec);
        self
    }

    /// Number of records buffered before a chunk is written
    #[must_use]
    pub fn entries_per_chunk(mut self, entries_per_chunk: usize) -> Self {
        self.entries_per_chunk = Some(entries_per_chunk);
        self
    }

    pub fn build<W: Write>(self, inner: W) -> Result<ChunkWriter<W>> {
        let entries_per_chunk = self.entries_per_chunk.unwrap_or(DEFAULT_ENTRIES_PER_CHUNK);
        if entries_per_chunk == 0 {
            return Err(ChunkError::ZeroEntriesPerChunk.into());
        }
        let codec = match self.custom_codec {
            Some(codec) => codec,
            None => self.codec.unwrap_or_default().create(),
        };
        Ok(ChunkWriter::new(inner, codec, entries_per_chunk))
    }
}

/// Running totals of a [`ChunkWriter`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub total_entries_written: u64,
    pub total_bytes_written: u64,
    pub num_chunks_written: u64,
}
impl WriterStats {
    #[must_use]
    pub fn bytes_per_entry(&self) -> f64 {
        if self.total_entries_written == 0 {
            0.0
        } else {
            self.total_bytes_written as f64 / self.total_entries_written as f64
        }
    }
}
impl fmt::Display for WriterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total logical entries written: {}", self.total_entries_written)?;
        writeln!(f, "Total bytes written: {}", self.total_bytes_written)?;
        writeln!(f, "Total chunks written: {}", self.num_chunks_written)?;
        write!(f, "Average bytes/logical entry: {:.3}", self.bytes_per_entry())
    }
}

/// Accumulates records and writes them to `inner` as delimited, compressed chunks.
///
/// The writer never closes `inner`; [`finish`](Self::finish) writes the
/// end-of-stream terminator and flushes, and [`into_inner`](Self::into_inner)
/// hands the sink back.
pub struct ChunkWriter<W: Write> {
    /// Internal writer for the chunks
    inner: W,

    /// Codec used for every chunk of this writer
    codec: Box<dyn ChunkCodec>,

    /// Records pending for the next chunk
    batch: RecordBatch,

    entries_per_chunk: usize,

    /// Logical entries, counting record multiplicity
    total_entries_written: u64,

    /// Payload and framing bytes of every chunk except the terminator
    total_bytes_written: u64,

    /// Every byte handed to `inner`
    written_bytes: u64,

    /// Offset of the most recently written chunk
    current_chunk_start_offset: u64,

    num_chunks_written: u64,
}
impl<W: Write> ChunkWriter<W> {
    fn new(inner: W, codec: Box<dyn ChunkCodec>, entries_per_chunk: usize) -> Self {
        Self {
            inner,
            codec,
            batch: RecordBatch::new(),
            entries_per_chunk,
            total_entries_written: 0,
            total_bytes_written: 0,
            written_bytes: 0,
            current_chunk_start_offset: 0,
            num_chunks_written: 0,
        }
    }

    /// Appends a record that represents `multiplicity` logical entries.
    ///
    /// Returns the byte offset of the chunk that holds the record. When this
    /// call fills the batch the chunk is written before returning.
    pub fn push(&mut self, record: &[u8], multiplicity: u32) -> Result<u64> {
        let chunk_start = self.written_bytes;
        self.batch.push(record);
        self.total_entries_written += u64::from(multiplicity.max(1));
        if self.batch.len() >= self.entries_per_chunk {
            self.flush()?;
        }
        Ok(chunk_start)
    }

    /// Writes the pending records as a chunk.
    ///
    /// Nothing is written when no records are pending, unless nothing was ever
    /// written; an empty container still gets one (empty) chunk.
    pub fn flush(&mut self) -> Result<()> {
        if self.total_entries_written > 0 && self.batch.is_empty() {
            return Ok(());
        }
        let payload = self.codec.encode(&self.batch)?;
        let length =
            i32::try_from(payload.len()).map_err(|_| ChunkError::ChunkTooLarge(payload.len()))?;

        self.current_chunk_start_offset = self.written_bytes;
        self.write_header(length)?;
        self.inner.write_all(&payload)?;
        self.inner.flush()?;
        self.written_bytes += payload.len() as u64;
        self.total_bytes_written += (DELIMITER_LENGTH + SIZE_OF_MESSAGE_LENGTH + 1 + payload.len()) as u64;
        self.num_chunks_written += 1;

        log::trace!(
            "wrote chunk {} at offset {}: {} records, {} bytes ({})",
            self.num_chunks_written,
            self.current_chunk_start_offset,
            self.batch.len(),
            payload.len(),
            self.codec.name()
        );
        self.batch.clear();
        Ok(())
    }

    /// Flushes pending records and writes the empty terminator chunk
    pub fn finish(&mut self) -> Result<()> {
        self.flush()?;
        self.write_header(0)?;
        self.inner.flush()?;
        log::debug!("{}", self.stats());
        Ok(())
    }

    fn write_header(&mut self, length: i32) -> Result<()> {
        self.inner.write_all(&[DELIMITER_CONTENT; DELIMITER_LENGTH])?;
        self.inner.write_i8(self.codec.registration_code())?;
        self.inner.write_i32::<BigEndian>(length)?;
        self.written_bytes += (DELIMITER_LENGTH + 1 + SIZE_OF_MESSAGE_LENGTH) as u64;
        Ok(())
    }

    #[must_use]
    pub fn total_entries_written(&self) -> u64 {
        self.total_entries_written
    }

    #[must_use]
    pub fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    #[must_use]
    pub fn current_chunk_start_offset(&self) -> u64 {
        self.current_chunk_start_offset
    }

    #[must_use]
    pub fn num_chunks_written(&self) -> u64 {
        self.num_chunks_written
    }

    /// Number of records waiting for the next chunk
    #[must_use]
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    #[must_use]
    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }

    #[must_use]
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            total_entries_written: self.total_entries_written,
            total_bytes_written: self.total_bytes_written,
            num_chunks_written: self.num_chunks_written,
        }
    }

    pub fn by_ref(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Returns the underlying sink without finishing the container
    pub fn into_inner(self) -> W {
        self.inner
    }
}
