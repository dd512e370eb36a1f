//! Multi-entry container of counts streams and their skip indices
//!
//! ```text
//! ArchiveHeader                          16 bytes
//! [counts stream][encoded CountIndex]    per entry
//! zstd(directory)
//! ArchiveFooter                          24 bytes
//! ```
//!
//! Directory records are little-endian:
//! `reference_index u32, name_len u32, name, counts_offset u64, counts_len u64,
//! index_offset u64, index_len u64`.

use std::{collections::HashMap, fs, io::Write, path::Path};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use bytemuck::{Pod, Zeroable};
use memmap2::Mmap;
use zstd::stream::{copy_decode, copy_encode};

use crate::{
    error::ArchiveError,
    utils::{slice_and_increment, Span},
    Result,
};

use super::{
    CountIndex, CountIndexBuilder, CountsReader, CountsWriter, CountsWriterBuilder,
    DEFAULT_TRANSITIONS_PER_BLOCK,
};

pub const ARCHIVE_MAGIC: &[u8; 8] = b"GOBYCNTS";
pub const ARCHIVE_VERSION: u8 = 1;

/// Upper bound on the buffer reserved from the footer's directory size
const MAX_DIRECTORY_PREALLOCATION: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
struct ArchiveHeader {
    magic: [u8; 8],
    version: u8,
    reserved: [u8; 7],
}
impl Default for ArchiveHeader {
    fn default() -> Self {
        Self {
            magic: *ARCHIVE_MAGIC,
            version: ARCHIVE_VERSION,
            reserved: [0; 7],
        }
    }
}
impl ArchiveHeader {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        if header.magic != *ARCHIVE_MAGIC {
            return Err(ArchiveError::InvalidMagic(header.magic).into());
        }
        if header.version != ARCHIVE_VERSION {
            return Err(ArchiveError::InvalidVersion(header.version).into());
        }
        Ok(header)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
struct ArchiveFooter {
    /// Number of bytes in the compressed directory
    z_bytes: u64,

    /// Number of bytes in the uncompressed directory
    u_bytes: u64,

    magic: [u8; 8],
}
impl ArchiveFooter {
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let footer: Self = bytemuck::pod_read_unaligned(bytes);
        if footer.magic != *ARCHIVE_MAGIC {
            return Err(ArchiveError::InvalidMagic(footer.magic).into());
        }
        Ok(footer)
    }
}

/// A directory record
#[derive(Debug, Clone, PartialEq, Eq)]
struct ArchiveEntry {
    reference_index: u32,
    identifier: String,
    counts: Span,
    index: Span,
}
impl ArchiveEntry {
    fn write_to(&self, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.write_u32::<LittleEndian>(self.reference_index)?;
        buffer.write_u32::<LittleEndian>(self.identifier.len() as u32)?;
        buffer.extend_from_slice(self.identifier.as_bytes());
        for span in [self.counts, self.index] {
            buffer.write_u64::<LittleEndian>(span.range().start as u64)?;
            buffer.write_u64::<LittleEndian>(span.len() as u64)?;
        }
        Ok(())
    }

    /// Reads the record at `offset`, checking that its spans end by `data_end`
    fn read_from(offset: &mut usize, bytes: &[u8], data_end: usize) -> Result<Self> {
        let mut take = |len: usize| {
            slice_and_increment(offset, len, bytes).ok_or(ArchiveError::Truncated(bytes.len()))
        };
        let reference_index = LittleEndian::read_u32(take(4)?);
        let name_len = LittleEndian::read_u32(take(4)?) as usize;
        let identifier = std::str::from_utf8(take(name_len)?)?.to_string();
        let mut spans = [Span::new(0, 0); 2];
        for span in &mut spans {
            let start = LittleEndian::read_u64(take(8)?);
            let len = LittleEndian::read_u64(take(8)?);
            let end = start.checked_add(len).filter(|end| *end <= data_end as u64);
            let Some(end) = end else {
                return Err(ArchiveError::EntryOutOfBounds {
                    name: identifier,
                    end: start.saturating_add(len),
                    len: data_end as u64,
                }
                .into());
            };
            *span = Span::new(start as usize, (end - start) as usize);
        }
        Ok(Self {
            reference_index,
            identifier,
            counts: spans[0],
            index: spans[1],
        })
    }
}

/// Writes counts streams for several references into one archive
pub struct CountsArchiveWriter<W: Write> {
    inner: W,
    entries: Vec<ArchiveEntry>,
    transitions_per_block: usize,

    /// Bytes written so far
    offset: usize,
}
impl<W: Write> CountsArchiveWriter<W> {
    pub fn new(inner: W) -> Result<Self> {
        Self::with_transitions_per_block(inner, DEFAULT_TRANSITIONS_PER_BLOCK)
    }

    pub fn with_transitions_per_block(mut inner: W, transitions_per_block: usize) -> Result<Self> {
        let header = ArchiveHeader::default();
        inner.write_all(bytemuck::bytes_of(&header))?;
        Ok(Self {
            inner,
            entries: Vec::new(),
            transitions_per_block,
            offset: size_of::<ArchiveHeader>(),
        })
    }

    /// A fresh in-memory writer for the next entry
    pub fn new_counts_writer(&self) -> Result<CountsWriter<Vec<u8>>> {
        CountsWriterBuilder::default().build(Vec::new())
    }

    /// Finishes `writer` and stores its stream under `identifier`
    pub fn add(
        &mut self,
        reference_index: u32,
        identifier: &str,
        writer: CountsWriter<Vec<u8>>,
    ) -> Result<()> {
        self.add_encoded(reference_index, identifier, writer.finish()?)
    }

    /// Stores an already finished counts stream under `identifier`
    pub fn add_encoded(
        &mut self,
        reference_index: u32,
        identifier: &str,
        counts: Vec<u8>,
    ) -> Result<()> {
        if self.entries.iter().any(|e| e.identifier == identifier) {
            return Err(ArchiveError::DuplicateEntry(identifier.to_string()).into());
        }
        if self.entries.iter().any(|e| e.reference_index == reference_index) {
            return Err(ArchiveError::DuplicateEntry(reference_index.to_string()).into());
        }

        let index = CountIndexBuilder::default()
            .transitions_per_block(self.transitions_per_block)
            .build(&counts)?
            .encoded()?;

        self.inner.write_all(&counts)?;
        self.inner.write_all(&index)?;
        let entry = ArchiveEntry {
            reference_index,
            identifier: identifier.to_string(),
            counts: Span::new(self.offset, counts.len()),
            index: Span::new(self.offset + counts.len(), index.len()),
        };
        self.offset += counts.len() + index.len();
        log::trace!(
            "archived counts for {identifier} ({} + {} bytes)",
            counts.len(),
            index.len()
        );
        self.entries.push(entry);
        Ok(())
    }

    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Writes the directory and footer and returns the sink
    pub fn finish(mut self) -> Result<W> {
        let mut directory = Vec::new();
        for entry in &self.entries {
            entry.write_to(&mut directory)?;
        }
        let mut encoded = Vec::default();
        copy_encode(directory.as_slice(), &mut encoded, 0)?;

        let footer = ArchiveFooter {
            z_bytes: encoded.len() as u64,
            u_bytes: directory.len() as u64,
            magic: *ARCHIVE_MAGIC,
        };
        self.inner.write_all(&encoded)?;
        self.inner.write_all(bytemuck::bytes_of(&footer))?;
        self.inner.flush()?;
        log::debug!("counts archive finished with {} entries", self.entries.len());
        Ok(self.inner)
    }
}

/// Memory-mapped counts archive
pub struct CountsArchiveReader {
    inner: Mmap,
    entries: Vec<ArchiveEntry>,
    by_identifier: HashMap<String, usize>,
    by_index: HashMap<u32, usize>,
}
impl CountsArchiveReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = fs::File::open(path)?;

        // Load the mmap
        let inner = unsafe { Mmap::map(&file) }?;
        let entries = Self::read_directory(&inner)?;

        let by_identifier = entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.identifier.clone(), idx))
            .collect();
        let by_index = entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.reference_index, idx))
            .collect();
        Ok(Self {
            inner,
            entries,
            by_identifier,
            by_index,
        })
    }

    fn read_directory(bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
        let header_size = size_of::<ArchiveHeader>();
        let footer_size = size_of::<ArchiveFooter>();
        if bytes.len() < header_size + footer_size {
            return Err(ArchiveError::Truncated(bytes.len()).into());
        }
        ArchiveHeader::from_bytes(&bytes[..header_size])?;
        let footer = ArchiveFooter::from_bytes(&bytes[bytes.len() - footer_size..])?;

        let directory_end = bytes.len() - footer_size;
        let directory_start = directory_end
            .checked_sub(footer.z_bytes as usize)
            .filter(|start| *start >= header_size)
            .ok_or(ArchiveError::Truncated(bytes.len()))?;
        let capacity = usize::try_from(footer.u_bytes)
            .unwrap_or(usize::MAX)
            .min(MAX_DIRECTORY_PREALLOCATION);
        let mut directory = Vec::with_capacity(capacity);
        copy_decode(&bytes[directory_start..directory_end], &mut directory)?;
        if directory.len() as u64 != footer.u_bytes {
            return Err(ArchiveError::Truncated(directory.len()).into());
        }

        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < directory.len() {
            let entry = ArchiveEntry::read_from(&mut offset, &directory, directory_start)?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Entry identifiers in insertion order
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.identifier.as_str())
    }

    /// Entry reference indices in insertion order
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|e| e.reference_index)
    }

    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.by_identifier.contains_key(identifier)
    }

    fn entry_reader(&self, entry: &ArchiveEntry) -> Result<CountsReader<'_>> {
        let index = CountIndex::decode(&self.inner[entry.index.range()])?;
        CountsReader::with_index(&self.inner[entry.counts.range()], index)
    }

    /// Reader over the counts stored under `identifier`
    pub fn counts_reader(&self, identifier: &str) -> Result<CountsReader<'_>> {
        let idx = self
            .by_identifier
            .get(identifier)
            .ok_or_else(|| ArchiveError::MissingEntry(identifier.to_string()))?;
        self.entry_reader(&self.entries[*idx])
    }

    /// Reader over the counts stored for `reference_index`
    pub fn counts_reader_by_index(&self, reference_index: u32) -> Result<CountsReader<'_>> {
        let idx = self
            .by_index
            .get(&reference_index)
            .ok_or(ArchiveError::MissingIndex(reference_index))?;
        self.entry_reader(&self.entries[*idx])
    }
}

#[cfg(test)]
mod testing {
    use std::io::Write;

    use super::*;
    use crate::counts::{testing::transitions, CountSource};

    fn write_archive(entries: &[(u32, &str, &[(u64, i64)])]) -> tempfile::NamedTempFile {
        let mut archive = CountsArchiveWriter::with_transitions_per_block(Vec::new(), 2).unwrap();
        for &(reference_index, identifier, runs) in entries {
            let mut writer = archive.new_counts_writer().unwrap();
            for &(length, count) in runs {
                writer.append_count(count, length).unwrap();
            }
            archive.add(reference_index, identifier, writer).unwrap();
        }
        assert_eq!(archive.num_entries(), entries.len());
        let bytes = archive.finish().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_header_layout() {
        assert_eq!(size_of::<ArchiveHeader>(), 16);
        assert_eq!(size_of::<ArchiveFooter>(), 24);
    }

    #[test]
    fn test_archive_round_trip() {
        let chr1: &[(u64, i64)] = &[(10, 0), (5, 3), (10, 0), (2, 8), (1, 0)];
        let chr2: &[(u64, i64)] = &[(100, 1)];
        let file = write_archive(&[(0, "chr1", chr1), (3, "chr2", chr2)]);

        let archive = CountsArchiveReader::new(file.path()).unwrap();
        assert_eq!(archive.num_entries(), 2);
        assert_eq!(archive.identifiers().collect::<Vec<_>>(), vec!["chr1", "chr2"]);
        assert_eq!(archive.indices().collect::<Vec<_>>(), vec![0, 3]);
        assert!(archive.contains("chr2"));
        assert!(!archive.contains("chr3"));

        let runs = transitions(archive.counts_reader("chr1").unwrap());
        let lengths: Vec<_> = runs.iter().map(|t| (t.1, t.2)).collect();
        assert_eq!(lengths, chr1);

        let mut reader = archive.counts_reader_by_index(3).unwrap();
        reader.next_transition().unwrap();
        assert_eq!((reader.position(), reader.length(), reader.count()), (0, 100, 1));
    }

    #[test]
    fn test_archive_readers_are_indexed() {
        let runs: Vec<(u64, i64)> = (0..50).map(|i| (10, i)).collect();
        let file = write_archive(&[(0, "chr1", runs.as_slice())]);
        let archive = CountsArchiveReader::new(file.path()).unwrap();
        let mut reader = archive.counts_reader("chr1").unwrap();
        assert_eq!(reader.index().map(CountIndex::num_blocks), Some(25));
        assert!(reader.reposition(255).unwrap());
        assert_eq!((reader.position(), reader.count()), (260, 26));
        assert!(reader.reposition(10).unwrap());
        assert_eq!((reader.position(), reader.count()), (10, 1));
    }

    #[test]
    fn test_missing_entries() {
        let file = write_archive(&[(0, "chr1", &[(1, 1)][..])]);
        let archive = CountsArchiveReader::new(file.path()).unwrap();
        let err = archive.counts_reader("chrX").unwrap_err();
        assert!(err.to_string().contains("No counts entry named chrX"));
        let err = archive.counts_reader_by_index(7).unwrap_err();
        assert!(err.to_string().contains("reference index 7"));
    }

    #[test]
    fn test_duplicate_entries() {
        let mut archive = CountsArchiveWriter::new(Vec::new()).unwrap();
        let writer = archive.new_counts_writer().unwrap();
        archive.add(0, "chr1", writer).unwrap();
        let writer = archive.new_counts_writer().unwrap();
        let err = archive.add(1, "chr1", writer).unwrap_err();
        assert!(err.to_string().contains("Duplicate counts entry: chr1"));
        let writer = archive.new_counts_writer().unwrap();
        assert!(archive.add(0, "chr2", writer).is_err());
    }

    #[test]
    fn test_empty_archive() {
        let file = write_archive(&[]);
        let archive = CountsArchiveReader::new(file.path()).unwrap();
        assert_eq!(archive.num_entries(), 0);
        assert_eq!(archive.identifiers().count(), 0);
    }

    #[test]
    fn test_corrupt_archives() {
        let file = write_archive(&[(0, "chr1", &[(1, 1)][..])]);
        let bytes = std::fs::read(file.path()).unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        let mut bad_version = bytes.clone();
        bad_version[8] = 9;
        let truncated = bytes[..bytes.len() - 3].to_vec();
        for (corrupt, message) in [
            (bad_magic, "Invalid archive magic"),
            (bad_version, "Unsupported archive version"),
            (truncated, "Invalid archive magic"),
            (vec![0u8; 10], "Archive truncated"),
        ] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(&corrupt).unwrap();
            file.flush().unwrap();
            let err = CountsArchiveReader::new(file.path()).err().unwrap();
            assert!(err.to_string().contains(message), "{err}");
        }

        for (counts_offset, counts_len) in [(u64::MAX - 2, 10), (16, 1 << 40)] {
            let mut directory = Vec::new();
            directory.extend_from_slice(&0u32.to_le_bytes());
            directory.extend_from_slice(&4u32.to_le_bytes());
            directory.extend_from_slice(b"chr1");
            for value in [counts_offset, counts_len, 16, 0] {
                directory.extend_from_slice(&value.to_le_bytes());
            }
            let mut encoded = Vec::new();
            copy_encode(directory.as_slice(), &mut encoded, 0).unwrap();
            let footer = ArchiveFooter {
                z_bytes: encoded.len() as u64,
                u_bytes: directory.len() as u64,
                magic: *ARCHIVE_MAGIC,
            };
            let mut corrupt = bytemuck::bytes_of(&ArchiveHeader::default()).to_vec();
            corrupt.extend_from_slice(&encoded);
            corrupt.extend_from_slice(bytemuck::bytes_of(&footer));

            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(&corrupt).unwrap();
            file.flush().unwrap();
            let err = CountsArchiveReader::new(file.path()).err().unwrap();
            assert!(err.to_string().contains("points outside of the archive"), "{err}");
        }
    }

    #[test]
    fn test_oversized_directory_size() {
        let file = write_archive(&[(0, "chr1", &[(1, 1)][..])]);
        let mut bytes = std::fs::read(file.path()).unwrap();
        let at = bytes.len() - size_of::<ArchiveFooter>() + 8;
        bytes[at..at + 8].copy_from_slice(&u64::MAX.to_le_bytes());

        let mut corrupt = tempfile::NamedTempFile::new().unwrap();
        corrupt.write_all(&bytes).unwrap();
        corrupt.flush().unwrap();
        let err = CountsArchiveReader::new(corrupt.path()).err().unwrap();
        assert!(err.to_string().contains("Archive truncated"), "{err}");
    }
}
