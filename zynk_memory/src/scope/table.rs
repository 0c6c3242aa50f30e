use crate::error::ScopeError;
use crate::heap::ArenaBytes;
use crate::heap::Block;
use crate::heap::Field;
use crate::heap::Heap;
use crate::object::StoredValue;
use crate::object::Value;
use crate::object::release;
use super::hash;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use log::debug;
use log::trace;
use scopeguard::ScopeGuard;
use scopeguard::guard;

// Layout of an entry node.
// A node whose name is absent is a tombstone:
// the binding was deleted but the node stays on its chain
// until a later definition reuses it.
const NAME_AT: usize = 0;
const VALUE_AT: usize = NAME_AT + <Option<ArenaBytes>>::SIZE;
const NEXT_AT: usize = VALUE_AT + StoredValue::SIZE;
const FREE_AT: usize = NEXT_AT + <Option<Block>>::SIZE;
const BUCKET_AT: usize = FREE_AT + <Option<Block>>::SIZE;
const ENTRY_SIZE: usize = BUCKET_AT + u64::SIZE;

/// Size of one bucket head in the bucket array.
const HEAD_SIZE: usize = <Option<Block>>::SIZE;

/// Follows the links stored at one offset of each node.
struct Links<'t>
{
    heap: &'t Heap,
    next: Option<Block>,
    at: usize,
}

impl<'t> Iterator for Links<'t>
{
    type Item = Block;

    fn next(&mut self) -> Option<Block>
    {
        // The link is read before the node is yielded,
        // so the caller may free the node.
        let node = self.next?;
        self.next = self.heap.load(node, self.at);
        Some(node)
    }
}

/// Bindings of one lexical scope.
///
/// Names select a bucket by [`hash`] modulo the capacity;
/// each bucket is a chain of entry nodes in insertion order.
/// The bucket array and every node are arena blocks,
/// linked to each other by their encoded tokens.
/// Tombstones are additionally linked into a free list.
///
/// The number of active bindings never exceeds the capacity.
/// Nodes are only created when no tombstone is available,
/// so the number of nodes never exceeds it either,
/// and nothing is ever reallocated.
pub struct ScopeTable
{
    heap: Heap,
    capacity: usize,
    count: usize,
    nodes: usize,

    /// [`None`] once the table is torn down.
    buckets: Option<Block>,

    /// Most recently deleted tombstone.
    tombstones: Option<Block>,
}

impl ScopeTable
{
    /// Create an empty table that can hold `capacity` bindings.
    pub fn new(heap: &Heap, capacity: usize) -> Result<Self, ScopeError>
    {
        if capacity == 0 || capacity > u32::MAX as usize {
            return Err(ScopeError::InvalidCapacity);
        }

        let size = capacity.checked_mul(HEAD_SIZE)
            .ok_or(ScopeError::InvalidCapacity)?;
        let buckets = heap.alloc(size)?;
        heap.zero(buckets);

        Ok(Self{
            heap: heap.clone(),
            capacity,
            count: 0,
            nodes: 0,
            buckets: Some(buckets),
            tombstones: None,
        })
    }

    /// The heap entries are allocated in.
    #[inline]
    pub fn heap(&self) -> &Heap
    {
        &self.heap
    }

    /// Maximum number of active bindings.
    #[inline]
    pub fn capacity(&self) -> usize
    {
        self.capacity
    }

    /// Number of active bindings.
    #[inline]
    pub fn count(&self) -> usize
    {
        self.count
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.count == 0
    }

    /// Whether [`define`][`Self::define`] would fail for lack of room.
    #[inline]
    pub fn is_full(&self) -> bool
    {
        self.count == self.capacity
    }

    /// Number of entry nodes, tombstones included.
    #[inline]
    pub fn len_nodes(&self) -> usize
    {
        self.nodes
    }

    fn bucket_of(&self, name: &[u8]) -> usize
    {
        hash(name) as usize % self.capacity
    }

    fn head(&self, bucket: usize) -> Option<Block>
    {
        let buckets = self.buckets?;
        self.heap.load(buckets, bucket * HEAD_SIZE)
    }

    fn set_head(&self, bucket: usize, node: Option<Block>)
    {
        if let Some(buckets) = self.buckets {
            self.heap.store(buckets, bucket * HEAD_SIZE, &node);
        }
    }

    fn chain(&self, bucket: usize) -> Links<'_>
    {
        Links{heap: &self.heap, next: self.head(bucket), at: NEXT_AT}
    }

    fn free_list(&self) -> Links<'_>
    {
        Links{heap: &self.heap, next: self.tombstones, at: FREE_AT}
    }

    fn name_of(&self, node: Block) -> Option<ArenaBytes>
    {
        self.heap.load(node, NAME_AT)
    }

    fn link_of(&self, node: Block, at: usize) -> Option<Block>
    {
        self.heap.load(node, at)
    }

    fn find(&self, name: &[u8]) -> Option<Block>
    {
        self.chain(self.bucket_of(name)).find(|&node| {
            match self.name_of(node) {
                Some(stored) => stored.eq_bytes(&self.heap, name),
                None => false,
            }
        })
    }

    /// Link `node` to the end of a bucket chain.
    fn append(&self, bucket: usize, node: Block)
    {
        self.heap.store(node, BUCKET_AT, &(bucket as u64));
        self.heap.store(node, NEXT_AT, &None::<Block>);

        let tail = self.chain(bucket).last();
        match tail {
            Some(tail) => self.heap.store(tail, NEXT_AT, &Some(node)),
            None => self.set_head(bucket, Some(node)),
        }
    }

    /// Take `node` off its bucket chain.
    fn unlink(&self, node: Block)
    {
        let bucket = self.heap.load::<u64>(node, BUCKET_AT) as usize;
        let next = self.link_of(node, NEXT_AT);

        let previous = self.chain(bucket)
            .find(|&n| self.link_of(n, NEXT_AT) == Some(node));

        match previous {
            Some(previous) => self.heap.store(previous, NEXT_AT, &next),
            None => self.set_head(bucket, next),
        }
        self.heap.store(node, NEXT_AT, &None::<Block>);
    }

    fn push_tombstone(&mut self, node: Block)
    {
        self.heap.store(node, FREE_AT, &self.tombstones);
        self.tombstones = Some(node);
    }

    fn remove_tombstone(&mut self, node: Block)
    {
        let after = self.link_of(node, FREE_AT);

        if self.tombstones == Some(node) {
            self.tombstones = after;
        } else {
            let previous = self.free_list()
                .find(|&t| self.link_of(t, FREE_AT) == Some(node));
            if let Some(previous) = previous {
                self.heap.store(previous, FREE_AT, &after);
            }
        }

        self.heap.store(node, FREE_AT, &None::<Block>);
    }

    /// Find a tombstone to hold a new binding in `bucket`.
    ///
    /// A tombstone already on the bucket’s chain is preferred.
    /// Otherwise any tombstone is moved over from its own chain.
    fn reuse_tombstone(&mut self, bucket: usize) -> Option<Block>
    {
        let local = self.chain(bucket)
            .find(|&node| self.name_of(node).is_none());

        if let Some(node) = local {
            self.remove_tombstone(node);
            return Some(node);
        }

        let node = self.tombstones?;
        self.remove_tombstone(node);
        self.unlink(node);
        self.append(bucket, node);
        Some(node)
    }

    /// Allocate a fresh node at the end of a bucket chain.
    fn push_node(&mut self, bucket: usize) -> Result<Block, ScopeError>
    {
        let node = self.heap.alloc(ENTRY_SIZE)?;
        self.heap.zero(node);
        self.append(bucket, node);
        self.nodes += 1;
        Ok(node)
    }

    /// Bind `name` to `value` in this table.
    ///
    /// Fails if the table is full or `name` is already bound here.
    /// On success `value` is retained.
    /// On failure nothing changes.
    pub fn define(&mut self, name: &str, value: &Value) -> Result<(), ScopeError>
    {
        let key = name.as_bytes();

        if self.is_full() {
            debug!("scope: cannot define `{}`, table is full", name);
            return Err(ScopeError::TableFull);
        }
        if self.find(key).is_some() {
            debug!("scope: `{}` is already defined", name);
            return Err(ScopeError::AlreadyDefined);
        }

        let bucket = self.bucket_of(key);

        let heap = self.heap.clone();
        let stored = ArenaBytes::new(&heap, key)?;
        let stored = guard(stored, |stored| { stored.free(&heap); });

        let node = match self.reuse_tombstone(bucket) {
            Some(node) => node,
            None => self.push_node(bucket)?,
        };

        let stored = ScopeGuard::into_inner(stored);
        self.heap.store(node, NAME_AT, &Some(stored));
        self.heap.store(node, VALUE_AT, &value.retain_stored());
        self.count += 1;

        trace!("scope: defined `{}` in bucket {}", name, bucket);
        Ok(())
    }

    /// Rebind a name that is already bound in this table.
    ///
    /// Never creates a binding.
    /// On success the old value is released and `value` is retained.
    pub fn assign(&mut self, name: &str, value: &Value) -> Result<(), ScopeError>
    {
        let Some(node) = self.find(name.as_bytes()) else {
            debug!("scope: cannot assign `{}`, not defined here", name);
            return Err(ScopeError::NotFound);
        };

        let old: StoredValue = self.heap.load(node, VALUE_AT);
        self.heap.store(node, VALUE_AT, &value.retain_stored());
        release(old.adopt(&self.heap));
        Ok(())
    }

    /// A new reference to the value bound to `name` in this table,
    /// or [`None`] if it is not bound here.
    pub fn get(&self, name: &str) -> Option<Value>
    {
        let node = self.find(name.as_bytes())?;
        let stored: StoredValue = self.heap.load(node, VALUE_AT);
        Some(stored.retain(&self.heap))
    }

    /// Like [`get`][`Self::get`], but [`Value::Null`] when unbound.
    pub fn lookup(&self, name: &str) -> Value
    {
        self.get(name).unwrap_or(Value::Null)
    }

    /// Whether `name` is bound in this table.
    pub fn contains(&self, name: &str) -> bool
    {
        self.find(name.as_bytes()).is_some()
    }

    /// Remove the binding of `name` from this table.
    ///
    /// The bound value is released and the entry becomes a tombstone.
    pub fn delete(&mut self, name: &str) -> Result<(), ScopeError>
    {
        let Some(node) = self.find(name.as_bytes()) else {
            debug!("scope: cannot delete `{}`, not defined here", name);
            return Err(ScopeError::NotFound);
        };

        if let Some(stored) = self.name_of(node) {
            stored.free(&self.heap);
        }
        self.heap.store(node, NAME_AT, &None::<ArenaBytes>);

        let old: StoredValue = self.heap.load(node, VALUE_AT);
        self.heap.store(node, VALUE_AT, &StoredValue::Null);

        self.push_tombstone(node);
        self.count -= 1;
        release(old.adopt(&self.heap));

        trace!("scope: deleted `{}`", name);
        Ok(())
    }

    /// Names of the active bindings, in bucket then chain order.
    pub fn names(&self) -> Vec<String>
    {
        (0 .. self.capacity)
            .flat_map(|bucket| self.chain(bucket))
            .filter_map(|node| self.name_of(node))
            .filter_map(|stored| stored.to_vec(&self.heap))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .collect()
    }

    /// Release every bound value, then free every block.
    ///
    /// Safe to run more than once; later runs find nothing to do.
    fn teardown(&mut self) -> bool
    {
        let Some(buckets) = self.buckets else {
            return true;
        };

        for bucket in 0 .. self.capacity {
            for node in self.chain(bucket) {
                let value: StoredValue = self.heap.load(node, VALUE_AT);
                self.heap.store(node, VALUE_AT, &StoredValue::Null);
                release(value.adopt(&self.heap));
            }
        }

        let mut ok = true;
        for bucket in 0 .. self.capacity {
            for node in self.chain(bucket) {
                if let Some(stored) = self.name_of(node) {
                    ok &= stored.free(&self.heap);
                }
                ok &= self.heap.free(node);
            }
        }
        ok &= self.heap.free(buckets);

        self.buckets = None;
        self.tombstones = None;
        self.count = 0;
        self.nodes = 0;
        ok
    }

    /// Release every bound value and free the table.
    ///
    /// Returns false if the allocator refused any of the blocks.
    pub fn destroy(mut self) -> bool
    {
        self.teardown()
    }
}

impl Drop for ScopeTable
{
    fn drop(&mut self)
    {
        self.teardown();
    }
}

impl fmt::Debug for ScopeTable
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ScopeTable")
            .field("count", &self.count)
            .field("capacity", &self.capacity)
            .field("nodes", &self.nodes)
            .field("names", &self.names())
            .finish()
    }
}
