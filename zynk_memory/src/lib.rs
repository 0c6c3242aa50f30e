//! Object memory and lexical scoping for the Zynk runtime.
//!
//! The crate is made of three layers, leaves first:
//!
//!  - [`heap`] wraps an arena [`Allocator`][`heap::Allocator`].
//!    Every allocation the runtime makes goes through a [`Heap`][`heap::Heap`].
//!  - [`object`] defines [`Value`][`object::Value`] and the
//!    reference-counted objects a value may point to.
//!  - [`scope`] implements variable scopes as fixed-capacity hash tables
//!    chained into [`Environment`][`scope::Environment`]s.
//!
//! Objects are reclaimed by reference counting alone.
//! There is no tracing collector and no cycle detection,
//! so an array that (transitively) contains itself is never reclaimed.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod error;
pub mod heap;
pub mod object;
pub mod scope;
