use crate::error::ArenaConfigError;
use crate::error::OutOfMemory;
use crate::object::NativeFn;
use super::Allocator;
use super::Arena;
use super::ArenaConfig;
use super::ArenaStats;
use super::Block;
use super::Field;
use super::field::MAX_FIELD_SIZE;

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use log::error;
use log::warn;

/// Shared handle to the allocator objects and scopes live in.
///
/// Cloning a heap clones the handle, not the memory.
/// Every object keeps a clone so that it can
/// give its blocks back when its last reference goes away.
///
/// The allocator is only ever borrowed for the duration of
/// a single allocation, free, or copy into or out of a block.
/// No caller-supplied code runs while it is borrowed.
#[derive(Clone)]
pub struct Heap
{
    allocator: Rc<RefCell<dyn Allocator>>,

    /// Host functions referred to by native function objects.
    /// Code cannot be stored as bytes, so headers store an index here.
    natives: Rc<RefCell<Vec<NativeFn>>>,
}

impl Heap
{
    // Looking for the methods that create objects of different kinds?
    // Those can be found in the `crate::object::*` modules.

    /// Create a heap on top of the given allocator.
    pub fn new<A>(allocator: A) -> Self
        where A: Allocator + 'static
    {
        Self{
            allocator: Rc::new(RefCell::new(allocator)),
            natives: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Create a heap on top of a fresh [`Arena`].
    pub fn with_arena(config: ArenaConfig) -> Result<Self, ArenaConfigError>
    {
        Ok(Self::new(Arena::new(config)?))
    }

    /// Reserve a block through the allocator.
    pub fn alloc(&self, size: usize) -> Result<Block, OutOfMemory>
    {
        let result = self.allocator.borrow_mut().alloc(size);
        if result.is_err() {
            warn!("heap: allocation of {} bytes failed", size);
        }
        result
    }

    /// Give a block back to the allocator.
    ///
    /// Returns false if the allocator did not own the block.
    pub fn free(&self, block: Block) -> bool
    {
        self.allocator.borrow_mut().free(block)
    }

    /// Run the allocator’s maintenance hook.
    pub fn defragment(&self)
    {
        self.allocator.borrow_mut().defragment();
    }

    /// Usage figures of the allocator.
    pub fn stats(&self) -> ArenaStats
    {
        self.allocator.borrow().stats()
    }

    /// Whether both handles refer to the same allocator.
    pub fn same_heap(&self, other: &Heap) -> bool
    {
        Rc::ptr_eq(&self.allocator, &other.allocator)
    }

    /// Pass the bytes of a live block to `then`.
    ///
    /// `then` runs while the allocator is borrowed,
    /// so it must not allocate, free, or drop values.
    pub (crate) fn with_memory<F, R>(&self, block: Block, then: F) -> Option<R>
        where F: FnOnce(&[u8]) -> R
    {
        let allocator = self.allocator.borrow();
        allocator.memory(block).map(then)
    }

    /// Like [`with_memory`][`Self::with_memory`], but mutable.
    pub (crate) fn with_memory_mut<F, R>(&self, block: Block, then: F)
        -> Option<R>
        where F: FnOnce(&mut [u8]) -> R
    {
        let mut allocator = self.allocator.borrow_mut();
        allocator.memory_mut(block).map(then)
    }

    /// Read the field at byte `at` of a live block.
    ///
    /// Reading a block that is not live breaks the allocator contract.
    /// It is logged, trips a debug assertion, and reads as zeroes.
    pub (crate) fn load<T>(&self, block: Block, at: usize) -> T
        where T: Field
    {
        let loaded = self.with_memory(block, |memory| {
            T::decode(&memory[at .. at + T::SIZE])
        });

        loaded.unwrap_or_else(|| {
            error!("heap: read from a block that is not live: {:?}", block);
            debug_assert!(false, "read from a block that is not live");
            T::decode(&[0; MAX_FIELD_SIZE][.. T::SIZE])
        })
    }

    /// Write the field at byte `at` of a live block.
    pub (crate) fn store<T>(&self, block: Block, at: usize, field: &T)
        where T: Field
    {
        let stored = self.with_memory_mut(block, |memory| {
            field.encode(&mut memory[at .. at + T::SIZE]);
        });

        if stored.is_none() {
            error!("heap: write to a block that is not live: {:?}", block);
            debug_assert!(false, "write to a block that is not live");
        }
    }

    /// Fill a live block with zeroes.
    pub (crate) fn zero(&self, block: Block)
    {
        self.with_memory_mut(block, |memory| memory.fill(0));
    }

    /// Index of `func` in the table of host functions.
    ///
    /// A function is added on first use and keeps its index afterwards.
    pub (crate) fn register_native(&self, func: NativeFn) -> usize
    {
        let mut natives = self.natives.borrow_mut();
        let known = natives.iter()
            .position(|&other| other as usize == func as usize);

        match known {
            Some(index) => index,
            None => {
                natives.push(func);
                natives.len() - 1
            },
        }
    }

    /// The host function at `index` in the table.
    pub (crate) fn native(&self, index: usize) -> Option<NativeFn>
    {
        self.natives.borrow().get(index).copied()
    }
}

impl fmt::Debug for Heap
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Heap")
            .field("stats", &self.stats())
            .field("natives", &self.natives.borrow().len())
            .finish()
    }
}
