//! Memory allocation.
//!
//! # Allocators
//!
//! The runtime never calls the global allocator for the data it manages.
//! Object headers, string bytes, array slots and scope-table nodes
//! are all blocks handed out through the narrow [`Allocator`] contract,
//! and are read and written as encoded bytes inside those blocks.
//! Native function pointers are the exception:
//! the [`Heap`] keeps them in a table, and headers store an index.
//! The table below summarizes the parts of this module.
//!
//! | Item        | Role                                                  |
//! |-------------|-------------------------------------------------------|
//! | [`Allocator`] | Contract: `alloc`, `free`, `defragment`, memory access |
//! | [`Arena`]   | Fixed pool with a slot table and a first-fit free list |
//! | [`Heap`]    | Shared handle objects and scopes allocate through     |

pub use self::alloc::*;
pub use self::arena::*;
pub use self::heap::*;

pub (crate) use self::bytes::ArenaBytes;
pub (crate) use self::field::Field;

// The order of these declarations influences
// the order of the Heap impls in rustdoc.
mod heap;
mod alloc;
mod arena;
mod bytes;
mod field;

#[cfg(test)]
pub (crate) mod testing;
