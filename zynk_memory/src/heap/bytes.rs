use crate::error::OutOfMemory;
use super::Block;
use super::Field;
use super::Heap;

use alloc::vec::Vec;

/// Byte string stored in an arena block.
///
/// The block holds the bytes followed by a NUL terminator,
/// which is not counted in the length.
/// The bytes may themselves contain NUL.
///
/// This is only a token, like [`Block`].
/// It does not free its block on drop;
/// the owner must call [`free`][`Self::free`] exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub (crate) struct ArenaBytes
{
    block: Block,
    len: usize,
}

impl ArenaBytes
{
    /// Copy `bytes` into a fresh block.
    pub (crate) fn new(heap: &Heap, bytes: &[u8]) -> Result<Self, OutOfMemory>
    {
        let len = bytes.len();
        let size = len.checked_add(1).ok_or(OutOfMemory)?;
        let block = heap.alloc(size)?;

        let written = heap.with_memory_mut(block, |memory| {
            memory[.. len].copy_from_slice(bytes);
            memory[len] = 0;
        });

        if written.is_none() {
            heap.free(block);
            return Err(OutOfMemory);
        }

        Ok(Self{block, len})
    }

    /// Number of bytes, excluding the terminator.
    #[inline]
    pub (crate) fn len(&self) -> usize
    {
        self.len
    }

    /// Copy of the bytes, excluding the terminator.
    pub (crate) fn to_vec(&self, heap: &Heap) -> Option<Vec<u8>>
    {
        let len = self.len;
        heap.with_memory(self.block, |memory| memory[.. len].to_vec())
    }

    /// Compare with `other` byte for byte.
    pub (crate) fn eq_bytes(&self, heap: &Heap, other: &[u8]) -> bool
    {
        let len = self.len;
        len == other.len()
            && heap.with_memory(self.block, |m| &m[.. len] == other)
                .unwrap_or(false)
    }

    /// Give the block back to the heap.
    pub (crate) fn free(&self, heap: &Heap) -> bool
    {
        heap.free(self.block)
    }
}

impl Field for ArenaBytes
{
    const SIZE: usize = Block::SIZE + u64::SIZE;

    fn encode(&self, out: &mut [u8])
    {
        self.block.encode(&mut out[.. Block::SIZE]);
        (self.len as u64).encode(&mut out[Block::SIZE ..]);
    }

    fn decode(bytes: &[u8]) -> Self
    {
        Self{
            block: Block::decode(&bytes[.. Block::SIZE]),
            len: u64::decode(&bytes[Block::SIZE ..]) as usize,
        }
    }
}
