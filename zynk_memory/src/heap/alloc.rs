use crate::error::OutOfMemory;

/// Region of memory handed out by an [`Allocator`].
///
/// A block is only a token.
/// Copying it does not duplicate the allocation,
/// and dropping it does not free anything.
/// The generation distinguishes a live block
/// from an earlier block that used the same slot,
/// so stale tokens are rejected instead of freeing someone else’s memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Block
{
    slot: u32,
    generation: u32,
    offset: usize,
    size: usize,
}

impl Block
{
    /// Create a block token.
    ///
    /// Only allocators should call this.
    #[inline]
    pub fn new(slot: u32, generation: u32, offset: usize, size: usize) -> Self
    {
        Self{slot, generation, offset, size}
    }

    /// Index of the slot that tracks this block.
    #[inline]
    pub fn slot(self) -> u32
    {
        self.slot
    }

    /// Generation of the slot when this block was handed out.
    #[inline]
    pub fn generation(self) -> u32
    {
        self.generation
    }

    /// Offset of the block within the allocator’s pool.
    #[inline]
    pub fn offset(self) -> usize
    {
        self.offset
    }

    /// Number of bytes requested for this block.
    #[inline]
    pub fn size(self) -> usize
    {
        self.size
    }
}

/// Usage figures of an allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats
{
    /// Blocks allocated and not yet freed.
    pub live_blocks: usize,

    /// Bytes reserved by live blocks, including alignment padding.
    pub bytes_in_use: usize,

    /// Bytes available for future blocks.
    pub bytes_free: usize,

    /// Number of disjoint free ranges.
    /// Defragmenting brings this down.
    pub free_ranges: usize,
}

/// The arena contract every core allocation goes through.
///
/// Implementations need not zero fresh blocks.
/// Freeing a block that is not live in this allocator
/// must be reported by returning false; it must never corrupt state.
pub trait Allocator
{
    /// Reserve a block of at least `size` bytes.
    fn alloc(&mut self, size: usize) -> Result<Block, OutOfMemory>;

    /// Return a block to the allocator.
    ///
    /// Returns false if the block is not live in this allocator,
    /// including when it was already freed.
    fn free(&mut self, block: Block) -> bool;

    /// Maintenance hook.
    ///
    /// May be called at any time.
    /// Correctness never depends on it being called.
    fn defragment(&mut self);

    /// Bytes of a live block, or [`None`] if the block is not live.
    fn memory(&self, block: Block) -> Option<&[u8]>;

    /// Like [`memory`][`Self::memory`], but mutable.
    fn memory_mut(&mut self, block: Block) -> Option<&mut [u8]>;

    /// Current usage figures.
    fn stats(&self) -> ArenaStats;
}
