//! Helpers shared by the unit tests of this crate.

use crate::error::OutOfMemory;
use super::Allocator;
use super::Arena;
use super::ArenaConfig;
use super::ArenaStats;
use super::Block;
use super::Heap;

/// Install a logger once; later calls are no-ops.
pub (crate) fn init_logger()
{
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Heap on a default arena.
pub (crate) fn test_heap() -> Heap
{
    init_logger();
    Heap::with_arena(ArenaConfig::default()).unwrap()
}

/// In-memory fake that lets a fixed number of allocations succeed
/// and fails every allocation after that.
pub (crate) struct FailAfter
{
    inner: Arena,
    remaining: usize,
}

impl FailAfter
{
    pub (crate) fn new(successes: usize) -> Self
    {
        init_logger();
        let inner = Arena::new(ArenaConfig::default()).unwrap();
        Self{inner, remaining: successes}
    }
}

impl Allocator for FailAfter
{
    fn alloc(&mut self, size: usize) -> Result<Block, OutOfMemory>
    {
        if self.remaining == 0 {
            return Err(OutOfMemory);
        }
        self.remaining -= 1;
        self.inner.alloc(size)
    }

    fn free(&mut self, block: Block) -> bool
    {
        self.inner.free(block)
    }

    fn defragment(&mut self)
    {
        self.inner.defragment();
    }

    fn memory(&self, block: Block) -> Option<&[u8]>
    {
        self.inner.memory(block)
    }

    fn memory_mut(&mut self, block: Block) -> Option<&mut [u8]>
    {
        self.inner.memory_mut(block)
    }

    fn stats(&self) -> ArenaStats
    {
        self.inner.stats()
    }
}
