use crate::error::ArenaConfigError;
use crate::error::OutOfMemory;
use super::Allocator;
use super::ArenaStats;
use super::Block;

use alloc::vec::Vec;
use alloc::vec;
use bitflags::bitflags;
use log::debug;
use log::error;
use log::trace;

/// Every block starts and ends on a multiple of this many bytes.
pub const BLOCK_ALIGN: usize = 8;

/// Byte written over freed memory when [`ArenaFlags::POISON_ON_FREE`] is set.
pub const POISON_BYTE: u8 = 0xDD;

bitflags!
{
    /// Debugging behaviors of an arena.
    pub struct ArenaFlags: u8
    {
        /// Fill fresh blocks with zeroes.
        ///
        /// Without this flag, a fresh block contains
        /// whatever the previous occupant left behind.
        const ZERO_ON_ALLOC = 1 << 0;

        /// Overwrite freed blocks with [`POISON_BYTE`].
        const POISON_ON_FREE = 1 << 1;
    }
}

/// Sizing of an [`Arena`].
#[derive(Clone, Copy, Debug)]
pub struct ArenaConfig
{
    /// Total bytes the arena hands out.
    pub pool_size: usize,

    /// Maximum number of simultaneously live blocks.
    pub slot_count: usize,

    /// See [`ArenaFlags`].
    pub flags: ArenaFlags,
}

impl Default for ArenaConfig
{
    fn default() -> Self
    {
        Self{
            pool_size: 1024 * 1024,
            slot_count: 4096,
            flags: ArenaFlags::empty(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Range
{
    offset: usize,
    size: usize,
}

impl Range
{
    fn end(self) -> usize
    {
        self.offset + self.size
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot
{
    generation: u32,
    live: Option<Range>,
}

/// Fixed pool of bytes handed out in aligned blocks.
///
/// Live blocks are tracked in a slot table of fixed size;
/// free space is a list of ranges sorted by offset.
/// Allocation is first fit.
/// Freed ranges are not merged right away;
/// [`defragment`][`Allocator::defragment`] merges adjacent ranges,
/// and allocation does so by itself before reporting out-of-memory.
/// Live blocks never move.
pub struct Arena
{
    flags: ArenaFlags,
    slot_count: usize,
    pool: Vec<u8>,
    slots: Vec<Slot>,
    vacant_slots: Vec<u32>,
    free_ranges: Vec<Range>,
    bytes_in_use: usize,
}

impl Arena
{
    /// Create an arena with the given sizing.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaConfigError>
    {
        let ArenaConfig{pool_size, slot_count, flags} = config;

        if pool_size == 0 {
            return Err(ArenaConfigError::EmptyPool);
        }
        if pool_size < BLOCK_ALIGN {
            return Err(ArenaConfigError::PoolTooSmall{pool_size});
        }
        if slot_count == 0 {
            return Err(ArenaConfigError::NoSlots);
        }

        // The tail that cannot hold an aligned block is never handed out.
        let usable = pool_size - pool_size % BLOCK_ALIGN;

        // Every live block takes at least one aligned unit.
        if slot_count > usable / BLOCK_ALIGN || slot_count > u32::MAX as usize {
            return Err(ArenaConfigError::TooManySlots{
                slots: slot_count,
                pool_size,
            });
        }

        debug!("arena: {} bytes, {} slots", usable, slot_count);

        Ok(Self{
            flags,
            slot_count,
            pool: vec![0; pool_size],
            slots: Vec::with_capacity(slot_count),
            vacant_slots: Vec::new(),
            free_ranges: vec![Range{offset: 0, size: usable}],
            bytes_in_use: 0,
        })
    }

    /// Bytes a request of `size` actually reserves.
    fn reserved_size(size: usize) -> Option<usize>
    {
        let size = size.max(1);
        let padded = size.checked_add(BLOCK_ALIGN - 1)?;
        Some(padded - padded % BLOCK_ALIGN)
    }

    fn take_slot(&mut self) -> Option<u32>
    {
        if let Some(index) = self.vacant_slots.pop() {
            return Some(index);
        }
        if self.slots.len() < self.slot_count {
            let index = self.slots.len() as u32;
            self.slots.push(Slot{generation: 0, live: None});
            return Some(index);
        }
        None
    }

    fn take_range(&mut self, size: usize) -> Option<Range>
    {
        let position = self.free_ranges.iter()
            .position(|range| range.size >= size)?;

        let range = &mut self.free_ranges[position];
        let taken = Range{offset: range.offset, size};
        range.offset += size;
        range.size -= size;

        if range.size == 0 {
            self.free_ranges.remove(position);
        }

        Some(taken)
    }

    fn return_range(&mut self, range: Range)
    {
        let position = self.free_ranges
            .partition_point(|free| free.offset < range.offset);
        self.free_ranges.insert(position, range);
    }

    /// The live range behind a block, if the block is valid.
    fn live_range(&self, block: Block) -> Option<Range>
    {
        let slot = self.slots.get(block.slot() as usize)?;
        let range = slot.live?;
        let valid = slot.generation == block.generation()
            && range.offset == block.offset()
            && block.size() <= range.size;
        valid.then_some(range)
    }

    /// Merge adjacent free ranges.
    ///
    /// Returns the number of merges performed.
    fn coalesce(&mut self) -> usize
    {
        let before = self.free_ranges.len();
        let mut merged: Vec<Range> = Vec::with_capacity(before);

        for range in self.free_ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end() == range.offset =>
                    last.size += range.size,
                _ => merged.push(range),
            }
        }

        self.free_ranges = merged;
        before - self.free_ranges.len()
    }
}

impl Allocator for Arena
{
    fn alloc(&mut self, size: usize) -> Result<Block, OutOfMemory>
    {
        let reserved = Self::reserved_size(size).ok_or(OutOfMemory)?;

        let Some(slot) = self.take_slot() else {
            debug!("arena: no free slot for {} bytes", size);
            return Err(OutOfMemory);
        };

        let range = match self.take_range(reserved) {
            Some(range) => Some(range),
            None if self.coalesce() > 0 => self.take_range(reserved),
            None => None,
        };

        let Some(range) = range else {
            self.vacant_slots.push(slot);
            debug!("arena: no free range for {} bytes", size);
            return Err(OutOfMemory);
        };

        if self.flags.contains(ArenaFlags::ZERO_ON_ALLOC) {
            self.pool[range.offset .. range.end()].fill(0);
        }

        let entry = &mut self.slots[slot as usize];
        entry.live = Some(range);
        self.bytes_in_use += range.size;

        trace!("arena: alloc {} bytes at {}", size, range.offset);
        Ok(Block::new(slot, entry.generation, range.offset, size))
    }

    fn free(&mut self, block: Block) -> bool
    {
        let Some(range) = self.live_range(block) else {
            error!("arena: free of a block that is not live: {:?}", block);
            debug_assert!(false, "free of a block that is not live");
            return false;
        };

        if self.flags.contains(ArenaFlags::POISON_ON_FREE) {
            self.pool[range.offset .. range.end()].fill(POISON_BYTE);
        }

        let slot = &mut self.slots[block.slot() as usize];
        slot.live = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant_slots.push(block.slot());
        self.bytes_in_use -= range.size;
        self.return_range(range);

        trace!("arena: free {} bytes at {}", block.size(), range.offset);
        true
    }

    fn defragment(&mut self)
    {
        let merges = self.coalesce();
        debug!("arena: defragment merged {} ranges", merges);
    }

    fn memory(&self, block: Block) -> Option<&[u8]>
    {
        self.live_range(block)?;
        Some(&self.pool[block.offset() .. block.offset() + block.size()])
    }

    fn memory_mut(&mut self, block: Block) -> Option<&mut [u8]>
    {
        self.live_range(block)?;
        Some(&mut self.pool[block.offset() .. block.offset() + block.size()])
    }

    fn stats(&self) -> ArenaStats
    {
        ArenaStats{
            live_blocks: self.slots.iter().filter(|s| s.live.is_some()).count(),
            bytes_in_use: self.bytes_in_use,
            bytes_free: self.free_ranges.iter().map(|r| r.size).sum(),
            free_ranges: self.free_ranges.len(),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    use proptest::collection::vec as pvec;
    use proptest::proptest;

    fn small(pool_size: usize, slot_count: usize) -> Arena
    {
        let flags = ArenaFlags::empty();
        Arena::new(ArenaConfig{pool_size, slot_count, flags}).unwrap()
    }

    #[test]
    fn rejects_bad_sizing()
    {
        let flags = ArenaFlags::empty();
        let config = |pool_size, slot_count| ArenaConfig{pool_size, slot_count, flags};
        assert_eq!(Arena::new(config(0, 1)).err(), Some(ArenaConfigError::EmptyPool));
        assert_eq!(Arena::new(config(64, 0)).err(), Some(ArenaConfigError::NoSlots));
        assert_eq!(
            Arena::new(config(8, 9)).err(),
            Some(ArenaConfigError::TooManySlots{slots: 9, pool_size: 8}),
        );
    }

    #[test]
    fn rejects_pools_without_room_for_a_block()
    {
        let flags = ArenaFlags::empty();
        let config = |pool_size, slot_count| ArenaConfig{pool_size, slot_count, flags};
        assert_eq!(
            Arena::new(config(4, 1)).err(),
            Some(ArenaConfigError::PoolTooSmall{pool_size: 4}),
        );
        assert_eq!(
            Arena::new(config(BLOCK_ALIGN - 1, 1)).err(),
            Some(ArenaConfigError::PoolTooSmall{pool_size: BLOCK_ALIGN - 1}),
        );

        // 60 bytes hold seven aligned blocks, not eight.
        assert_eq!(
            Arena::new(config(60, 8)).err(),
            Some(ArenaConfigError::TooManySlots{slots: 8, pool_size: 60}),
        );

        // Every slot of the smallest accepted arena can be used.
        let mut arena = Arena::new(config(60, 7)).unwrap();
        for _ in 0 .. 7 {
            assert!(arena.alloc(1).is_ok());
        }
        assert_eq!(arena.alloc(1), Err(OutOfMemory));
    }

    #[test]
    fn alloc_rounds_up_and_free_returns_space()
    {
        let mut arena = small(64, 8);
        let block = arena.alloc(3).unwrap();
        assert_eq!(block.size(), 3);
        assert_eq!(arena.stats().bytes_in_use, BLOCK_ALIGN);
        assert_eq!(arena.memory(block).map(<[u8]>::len), Some(3));

        assert!(arena.free(block));
        assert_eq!(arena.stats().bytes_in_use, 0);
        assert_eq!(arena.stats().live_blocks, 0);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "not live"))]
    fn double_free_is_rejected()
    {
        let mut arena = small(64, 8);
        let block = arena.alloc(8).unwrap();
        assert!(arena.free(block));
        assert!(!arena.free(block));
    }

    #[test]
    fn stale_block_cannot_reach_new_occupant()
    {
        let mut arena = small(64, 1);
        let old = arena.alloc(8).unwrap();
        assert!(arena.free(old));
        let new = arena.alloc(8).unwrap();
        assert_eq!(old.slot(), new.slot());
        assert!(arena.memory(old).is_none());
        assert!(arena.memory(new).is_some());
    }

    #[test]
    fn out_of_slots_and_out_of_bytes()
    {
        let mut arena = small(64, 2);
        let a = arena.alloc(8).unwrap();
        let _b = arena.alloc(8).unwrap();
        assert_eq!(arena.alloc(8), Err(OutOfMemory));

        assert!(arena.free(a));
        assert_eq!(arena.alloc(128), Err(OutOfMemory));
        // The failed request must not leak the slot it briefly took.
        assert!(arena.alloc(8).is_ok());
    }

    #[test]
    fn fragmented_pool_coalesces_on_demand()
    {
        let mut arena = small(32, 4);
        let blocks: Vec<_> = (0 .. 4).map(|_| arena.alloc(8).unwrap()).collect();
        for &block in &blocks {
            assert!(arena.free(block));
        }
        assert_eq!(arena.stats().free_ranges, 4);

        // No single range holds 32 bytes until they are merged.
        let whole = arena.alloc(32).unwrap();
        assert_eq!(whole.offset(), 0);
    }

    #[test]
    fn defragment_merges_neighbors()
    {
        let mut arena = small(64, 8);
        let a = arena.alloc(8).unwrap();
        let b = arena.alloc(8).unwrap();
        let c = arena.alloc(8).unwrap();
        assert!(arena.free(a));
        assert!(arena.free(b));
        arena.defragment();
        assert_eq!(arena.stats().free_ranges, 2);
        assert!(arena.memory(c).is_some());
    }

    #[test]
    fn flags_zero_and_poison()
    {
        let flags = ArenaFlags::ZERO_ON_ALLOC | ArenaFlags::POISON_ON_FREE;
        let config = ArenaConfig{pool_size: 16, slot_count: 2, flags};
        let mut arena = Arena::new(config).unwrap();

        let block = arena.alloc(8).unwrap();
        arena.memory_mut(block).unwrap().fill(7);
        assert!(arena.free(block));
        assert!(arena.pool[.. 8].iter().all(|&b| b == POISON_BYTE));

        let block = arena.alloc(8).unwrap();
        assert!(arena.memory(block).unwrap().iter().all(|&b| b == 0));
    }

    proptest!
    {
        #[test]
        fn accounting_balances(sizes in pvec(0usize .. 200, 0 .. 64))
        {
            let mut arena = small(64 * 1024, 128);
            let blocks: Vec<_> = sizes.iter()
                .map(|&size| arena.alloc(size).unwrap())
                .collect();
            assert_eq!(arena.stats().live_blocks, blocks.len());

            for block in blocks {
                assert!(arena.free(block));
            }
            arena.defragment();

            let stats = arena.stats();
            assert_eq!(stats.live_blocks, 0);
            assert_eq!(stats.bytes_in_use, 0);
            assert_eq!(stats.bytes_free, 64 * 1024);
            assert_eq!(stats.free_ranges, 1);
        }
    }
}
