//! Errors reported by the heap, objects and scopes.
//!
//! All of these are ordinary, recoverable outcomes.
//! The evaluator decides what the user gets to see.

use alloc::string::String;
use thiserror::Error;

/// Raised when the arena cannot satisfy an allocation.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("arena out of memory")]
pub struct OutOfMemory;

/// Raised when an arena is configured with unusable sizes.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ArenaConfigError
{
    /// The pool has no bytes to hand out.
    #[error("arena pool size must be non-zero")]
    EmptyPool,

    /// The pool cannot hold a single aligned block.
    #[error("arena pool of {pool_size} bytes is smaller than one block")]
    PoolTooSmall
    {
        /// Requested pool size in bytes.
        pool_size: usize,
    },

    /// The arena could not track a single block.
    #[error("arena slot count must be non-zero")]
    NoSlots,

    /// More slots than the pool has aligned blocks;
    /// the excess slots could never be used.
    #[error("arena slot count {slots} exceeds the blocks a {pool_size}-byte pool holds")]
    TooManySlots
    {
        /// Requested number of slots.
        slots: usize,
        /// Requested pool size in bytes.
        pool_size: usize,
    },
}

/// Raised by scope table operations.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ScopeError
{
    /// Every slot of the table holds an active binding.
    #[error("scope table is full")]
    TableFull,

    /// The name is already bound in this table.
    /// Shadowing requires a nested environment.
    #[error("name is already defined in this scope")]
    AlreadyDefined,

    /// The name is not bound in this table.
    #[error("name is not defined in this scope")]
    NotFound,

    /// Tables must have room for at least one binding.
    #[error("scope table capacity must be between 1 and 2^32 - 1")]
    InvalidCapacity,

    /// See [`OutOfMemory`].
    #[error(transparent)]
    OutOfMemory(#[from] OutOfMemory),
}

/// Raised by array mutation.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ArrayError
{
    /// The object is not an array.
    #[error("object is not an array")]
    NotAnArray,

    /// The index is past the end of the array.
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds
    {
        /// Offending index.
        index: usize,
        /// Length of the array at the time.
        len: usize,
    },

    /// See [`OutOfMemory`].
    #[error(transparent)]
    OutOfMemory(#[from] OutOfMemory),
}

/// Raised when dispatching a call by name.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CallError
{
    /// No enclosing scope binds the name.
    #[error("undefined function `{0}`")]
    Unbound(String),

    /// The name is bound to something other than a native function.
    #[error("`{0}` is not a native function")]
    NotCallable(String),
}
