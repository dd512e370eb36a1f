use bytemuck::{Pod, Zeroable};
use zstd::stream::{copy_decode, copy_encode};

use crate::{
    error::{CountsError, IndexError},
    Result,
};

use super::{CountSource, CountsReader, DEFAULT_TRANSITIONS_PER_BLOCK};

/// Magic number identifying a serialized count index
pub const COUNT_INDEX_MAGIC: &[u8; 8] = b"GOBYCIDX";

/// Reader state captured right after a transition.
///
/// This is stored identically in memory and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroable, Pod, Default)]
#[repr(C)]
pub struct CountBlock {
    /// Bit offset of the code following the transition
    pub bit_offset: u64,

    /// First position of the run the transition starts
    pub position: u64,

    pub length: u64,
    pub count: i64,

    /// Number of transitions up to and including this one
    pub num_transitions: u64,
}

/// The header for a serialized index.
///
/// This is stored identically in memory and on disk.
#[derive(Debug, Clone, Copy, Zeroable, Pod)]
#[repr(C)]
struct CountIndexHeader {
    magic: [u8; 8],
    transitions_per_block: u64,
    num_blocks: u64,
}

/// Sparse skip index over a counts stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CountIndex {
    transitions_per_block: u64,
    blocks: Vec<CountBlock>,
}
impl CountIndex {
    #[must_use]
    pub fn new(transitions_per_block: u64, blocks: Vec<CountBlock>) -> Self {
        Self {
            transitions_per_block,
            blocks,
        }
    }

    /// Scans a counts stream, keeping one block every `transitions_per_block`
    pub fn build(data: &[u8], transitions_per_block: usize) -> Result<Self> {
        CountIndexBuilder::default()
            .transitions_per_block(transitions_per_block)
            .build(data)
    }

    /// The last block whose run starts strictly before `target`
    #[must_use]
    pub fn block_before(&self, target: u64) -> Option<CountBlock> {
        let idx = self.blocks.partition_point(|block| block.position < target);
        idx.checked_sub(1).map(|idx| self.blocks[idx])
    }

    #[must_use]
    pub fn blocks(&self) -> &[CountBlock] {
        &self.blocks
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn transitions_per_block(&self) -> u64 {
        self.transitions_per_block
    }

    /// Returns the byte representation of the blocks
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.blocks)
    }

    /// Builds the blocks from their byte representation
    pub fn from_bytes(transitions_per_block: u64, bytes: &[u8]) -> Result<Self> {
        let size = size_of::<CountBlock>();
        if bytes.len() % size != 0 {
            return Err(IndexError::IndexCastingError(bytes.len()).into());
        }
        // the input may come from an unaligned region of a mapped file
        let blocks = bytes
            .chunks_exact(size)
            .map(bytemuck::pod_read_unaligned::<CountBlock>)
            .collect();
        Ok(Self::new(transitions_per_block, blocks))
    }

    /// Encodes the index as a header followed by the ZSTD-compressed blocks
    pub fn encoded(&self) -> Result<Vec<u8>> {
        let header = CountIndexHeader {
            magic: *COUNT_INDEX_MAGIC,
            transitions_per_block: self.transitions_per_block,
            num_blocks: self.blocks.len() as u64,
        };
        let mut encoded = bytemuck::bytes_of(&header).to_vec();
        copy_encode(self.as_bytes(), &mut encoded, 0)?;
        Ok(encoded)
    }

    /// Decodes an index produced by [`CountIndex::encoded`]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header_size = size_of::<CountIndexHeader>();
        if bytes.len() < header_size {
            return Err(IndexError::IndexCastingError(bytes.len()).into());
        }
        let header: CountIndexHeader = bytemuck::pod_read_unaligned(&bytes[..header_size]);
        if header.magic != *COUNT_INDEX_MAGIC {
            return Err(IndexError::InvalidMagicNumber(header.magic).into());
        }

        let mut decoded = Vec::default();
        copy_decode(&bytes[header_size..], &mut decoded)?;
        let index = Self::from_bytes(header.transitions_per_block, &decoded)?;
        if index.num_blocks() as u64 != header.num_blocks {
            return Err(IndexError::IndexCastingError(decoded.len()).into());
        }
        Ok(index)
    }
}

/// Builds a [`CountIndex`] by scanning a counts stream
#[derive(Debug, Clone, Copy, Default)]
pub struct CountIndexBuilder {
    transitions_per_block: Option<usize>,
}
impl CountIndexBuilder {
    #[must_use]
    pub fn transitions_per_block(mut self, transitions_per_block: usize) -> Self {
        self.transitions_per_block = Some(transitions_per_block);
        self
    }

    pub fn build(self, data: &[u8]) -> Result<CountIndex> {
        let per_block = self
            .transitions_per_block
            .unwrap_or(DEFAULT_TRANSITIONS_PER_BLOCK);
        if per_block == 0 {
            return Err(CountsError::ZeroTransitionsPerBlock.into());
        }

        let mut reader = CountsReader::new(data)?;
        let mut blocks = Vec::new();
        let mut num_transitions = 0usize;
        while reader.has_next_transition()? {
            reader.next_transition()?;
            num_transitions += 1;
            if num_transitions % per_block == 0 {
                blocks.push(reader.snapshot());
            }
        }
        log::trace!(
            "indexed {num_transitions} transitions into {} blocks",
            blocks.len()
        );
        Ok(CountIndex::new(per_block as u64, blocks))
    }
}
