//! Values and the reference-counted objects they point to.
//!
//! # In-memory representation
//!
//! Every object is a header block in the arena.
//! The header starts with the reference count and the [`Kind`],
//! followed by a payload whose layout depends on the kind.
//! Payloads refer to further blocks (string bytes, array slots)
//! by their [`Block`] tokens, encoded in place.
//! Nothing about an object lives outside the arena,
//! except the host code of native functions,
//! which the [`Heap`] keeps in a table that headers index into.
//!
//! # Reference counting
//!
//! An [`ObjRef`] is one counted reference to an object.
//! Cloning it is a retain; dropping it is a release.
//! Values stored in arena memory (array slots, scope bindings)
//! hold counted references in encoded form.
//! When the last reference goes away the object is destroyed:
//! its children are released in order,
//! then its buffers and finally its header go back to the arena.
//!
//! The count lives on the object only.
//! A [`Value`] carries no count of its own.
//!
//! Because references own their count,
//! a release can never outnumber its retains
//! and a value can never outlive the object it points to.
//! What reference counting cannot do is reclaim cycles:
//! an array that contains itself, directly or not, leaks.

pub use self::array::*;
pub use self::function::*;
pub use self::string::*;
pub use self::value::*;

use crate::error::OutOfMemory;
use crate::heap::ArenaBytes;
use crate::heap::Block;
use crate::heap::Field;
use crate::heap::Heap;

use core::fmt;
use log::trace;
use scopeguard::ScopeGuard;
use scopeguard::guard;

mod array;
mod function;
mod string;
mod value;

/// Offset of the reference count in a header.
const COUNT_AT: usize = 0;

/// Offset of the kind in a header.
const KIND_AT: usize = 8;

/// Offset of the kind-specific payload in a header.
const PAYLOAD_AT: usize = 16;

/// Size of a header, payload included.
const HEADER_SIZE: usize = 56;

/// Determines the layout of the payload of an object.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind
{
    String,
    Array,
    Function,
    NativeFunction,
}

impl Field for Kind
{
    const SIZE: usize = 1;

    fn encode(&self, out: &mut [u8])
    {
        out[0] = match self {
            Kind::String => 0,
            Kind::Array => 1,
            Kind::Function => 2,
            Kind::NativeFunction => 3,
        };
    }

    fn decode(bytes: &[u8]) -> Self
    {
        match bytes[0] {
            1 => Kind::Array,
            2 => Kind::Function,
            3 => Kind::NativeFunction,
            _ => Kind::String,
        }
    }
}

/// Counted reference to a heap object.
///
/// Equality is identity: two references are equal
/// when they point to the same object.
pub struct ObjRef
{
    heap: Heap,
    header: Block,
}

impl ObjRef
{
    /// Take over a reference that was held in arena storage.
    ///
    /// The count is not changed;
    /// the storage must no longer consider itself a holder.
    pub (crate) fn adopt(heap: &Heap, header: Block) -> Self
    {
        Self{heap: heap.clone(), header}
    }

    /// Start holding another reference to an object
    /// that arena storage refers to.
    pub (crate) fn retain_stored(heap: &Heap, header: Block) -> Self
    {
        let this = Self::adopt(heap, header);
        this.set_count(this.count() + 1);
        this
    }

    /// Start holding another reference inside arena storage.
    ///
    /// Returns the token the storage keeps;
    /// it is given back with [`adopt`][`Self::adopt`].
    pub (crate) fn retain_into_storage(&self) -> Block
    {
        self.set_count(self.count() + 1);
        self.header
    }

    fn count(&self) -> u64
    {
        self.heap.load(self.header, COUNT_AT)
    }

    fn set_count(&self, count: u64)
    {
        self.heap.store(self.header, COUNT_AT, &count);
    }

    /// Read a payload field of the header.
    fn load<T>(&self, at: usize) -> T
        where T: Field
    {
        self.heap.load(self.header, PAYLOAD_AT + at)
    }

    /// Write a payload field of the header.
    fn store<T>(&self, at: usize, field: &T)
        where T: Field
    {
        self.heap.store(self.header, PAYLOAD_AT + at, field);
    }

    /// What kind of object this is.
    #[inline]
    pub fn kind(&self) -> Kind
    {
        self.heap.load(self.header, KIND_AT)
    }

    /// Number of live references to the object, this one included.
    pub fn ref_count(&self) -> usize
    {
        self.count() as usize
    }

    /// Whether both references point to the same object.
    #[inline]
    pub fn ptr_eq(&self, other: &ObjRef) -> bool
    {
        self.header == other.header && self.heap.same_heap(&other.heap)
    }

    /// The heap the object lives in.
    #[inline]
    pub fn heap(&self) -> &Heap
    {
        &self.heap
    }

    /// Release the children, free the buffers, then free the header.
    fn destroy(&mut self)
    {
        let kind = self.kind();

        match kind {
            Kind::String | Kind::Function | Kind::NativeFunction => {
                let bytes: ArenaBytes = self.load(0);
                bytes.free(&self.heap);
            },
            Kind::Array => {
                self.destroy_slots();
            },
        }

        self.heap.free(self.header);
        trace!("object: destroyed {:?}", kind);
    }
}

impl Clone for ObjRef
{
    fn clone(&self) -> Self
    {
        Self::retain_stored(&self.heap, self.header)
    }
}

impl Drop for ObjRef
{
    fn drop(&mut self)
    {
        match self.count() {
            0 | 1 => self.destroy(),
            count => self.set_count(count - 1),
        }
    }
}

impl PartialEq for ObjRef
{
    fn eq(&self, other: &Self) -> bool
    {
        self.ptr_eq(other)
    }
}

impl Eq for ObjRef
{
}

impl fmt::Debug for ObjRef
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ObjRef")
            .field("kind", &self.kind())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Shared implementation of the object constructors.
impl Heap
{
    /// Allocate an object header, then write the payload with `init`.
    ///
    /// `init` receives the header block and the offset of the payload.
    /// If it fails, the header is given back before returning,
    /// so a failed construction leaves no blocks behind.
    /// `init` must clean up its own partial allocations.
    fn new_object<F>(&self, kind: Kind, init: F) -> Result<ObjRef, OutOfMemory>
        where F: FnOnce(&Heap, Block, usize) -> Result<(), OutOfMemory>
    {
        let header = self.alloc(HEADER_SIZE)?;
        let header = guard(header, |header| { self.free(header); });

        self.zero(*header);
        init(self, *header, PAYLOAD_AT)?;

        let header = ScopeGuard::into_inner(header);
        self.store(header, COUNT_AT, &1u64);
        self.store(header, KIND_AT, &kind);

        trace!("object: created {:?}", kind);
        Ok(ObjRef{heap: self.clone(), header})
    }
}
