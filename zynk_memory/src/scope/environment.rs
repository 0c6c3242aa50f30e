use crate::error::CallError;
use crate::error::ScopeError;
use crate::heap::Heap;
use crate::object::Value;
use super::ScopeTable;

use alloc::string::String;
use core::cell::RefCell;
use core::fmt;
use core::iter;
use log::debug;

/// One lexical scope: its own bindings plus the scope around it.
///
/// The enclosing scope is borrowed, not owned.
/// The borrow guarantees it outlives every scope nested in it,
/// so the chain can never dangle.
///
/// Bindings are mutated through a shared reference,
/// as outer scopes are shared by every scope nested in them.
/// Environments are confined to one thread.
pub struct Environment<'p>
{
    local: RefCell<ScopeTable>,
    enclosing: Option<&'p Environment<'p>>,
}

impl<'p> Environment<'p>
{
    /// Create a scope with room for `capacity` bindings.
    pub fn new(
        heap: &Heap,
        capacity: usize,
        enclosing: Option<&'p Environment<'p>>,
    ) -> Result<Self, ScopeError>
    {
        let local = RefCell::new(ScopeTable::new(heap, capacity)?);
        Ok(Self{local, enclosing})
    }

    /// Create a scope nested in this one, on the same heap.
    pub fn nested<'c>(&'c self, capacity: usize)
        -> Result<Environment<'c>, ScopeError>
        where 'p: 'c
    {
        let heap = self.heap();
        Environment::new(&heap, capacity, Some(self))
    }

    /// The scope this one is nested in, if any.
    #[inline]
    pub fn enclosing(&self) -> Option<&'p Environment<'p>>
    {
        self.enclosing
    }

    /// The heap this scope allocates in.
    pub fn heap(&self) -> Heap
    {
        self.local.borrow().heap().clone()
    }

    /// This scope followed by every scope around it, innermost first.
    pub fn chain(&self) -> impl Iterator<Item=&Environment<'p>>
    {
        iter::successors(Some(self), |env| env.enclosing)
    }

    /// Number of scopes around this one.
    pub fn depth(&self) -> usize
    {
        self.chain().count() - 1
    }

    /// Number of active bindings in this scope.
    pub fn count(&self) -> usize
    {
        self.local.borrow().count()
    }

    /// Maximum number of bindings in this scope.
    pub fn capacity(&self) -> usize
    {
        self.local.borrow().capacity()
    }

    /// See [`ScopeTable::define`].
    pub fn define(&self, name: &str, value: &Value) -> Result<(), ScopeError>
    {
        self.local.borrow_mut().define(name, value)
    }

    /// See [`ScopeTable::assign`].
    pub fn assign(&self, name: &str, value: &Value) -> Result<(), ScopeError>
    {
        self.local.borrow_mut().assign(name, value)
    }

    /// See [`ScopeTable::lookup`].
    ///
    /// Only this scope is searched; see [`resolve`][`Self::resolve`].
    pub fn lookup(&self, name: &str) -> Value
    {
        self.local.borrow().lookup(name)
    }

    /// See [`ScopeTable::delete`].
    pub fn delete(&self, name: &str) -> Result<(), ScopeError>
    {
        self.local.borrow_mut().delete(name)
    }

    /// The innermost scope, this one included, that binds `name`.
    pub fn resolve_scope(&self, name: &str) -> Option<&Environment<'p>>
    {
        self.chain().find(|env| env.local.borrow().contains(name))
    }

    /// Value of `name` in the innermost scope that binds it,
    /// or [`None`] if no scope does.
    pub fn resolve_binding(&self, name: &str) -> Option<Value>
    {
        self.chain().find_map(|env| env.local.borrow().get(name))
    }

    /// Like [`resolve_binding`][`Self::resolve_binding`],
    /// but [`Value::Null`] when unbound.
    pub fn resolve(&self, name: &str) -> Value
    {
        self.resolve_binding(name).unwrap_or(Value::Null)
    }

    /// Assign in the innermost scope that binds `name`.
    pub fn assign_resolved(&self, name: &str, value: &Value)
        -> Result<(), ScopeError>
    {
        match self.resolve_scope(name) {
            Some(env) => env.assign(name, value),
            None => {
                debug!("scope: cannot assign `{}`, unbound in every scope", name);
                Err(ScopeError::NotFound)
            },
        }
    }

    /// Call the native function bound to `name`.
    ///
    /// The name is resolved through the scope chain.
    /// The function runs with this scope as its environment;
    /// `args` are only borrowed for the call.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, CallError>
    {
        let Some(callee) = self.resolve_binding(name) else {
            return Err(CallError::Unbound(String::from(name)));
        };

        let Some(func) = callee.as_object().and_then(|o| o.native_fn()) else {
            return Err(CallError::NotCallable(String::from(name)));
        };

        debug!("scope: calling native `{}` with {} arguments", name, args.len());
        Ok(func(self, args))
    }

    /// Release every binding of this scope and free its table.
    ///
    /// Returns false if the allocator refused any of the blocks.
    pub fn destroy(self) -> bool
    {
        self.local.into_inner().destroy()
    }
}

impl<'p> fmt::Debug for Environment<'p>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Environment")
            .field("local", &*self.local.borrow())
            .field("depth", &self.depth())
            .finish()
    }
}
