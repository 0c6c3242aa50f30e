//! Variable scopes.
//!
//! A [`ScopeTable`] holds the bindings of one lexical scope.
//! Its capacity is fixed when it is created;
//! once every slot holds a binding, further definitions fail
//! rather than growing the table.
//! An [`Environment`] pairs a table with the scope that encloses it.

pub use self::environment::*;
pub use self::hash::*;
pub use self::table::*;

mod environment;
mod hash;
mod table;

/// Capacity for scopes whose size nothing better predicts.
pub const DEFAULT_SCOPE_CAPACITY: usize = 64;
