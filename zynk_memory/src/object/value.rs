use crate::heap::Block;
use crate::heap::Field;
use crate::heap::Heap;
use super::Kind;
use super::ObjRef;

/// Tagged value, copied into stack slots, array slots and bindings.
///
/// Copying a value is [`Clone`];
/// for [`Value::Object`] that retains the object.
#[derive(Clone, Debug, Default)]
pub enum Value
{
    /// Absence of a value; also the failure sentinel of constructors.
    #[default]
    Null,

    #[allow(missing_docs)]
    Bool(bool),

    #[allow(missing_docs)]
    Number(f64),

    #[allow(missing_docs)]
    Byte(u8),

    /// Counted reference to a heap object.
    Object(ObjRef),
}

impl Value
{
    /// The null value.
    #[inline]
    pub const fn null() -> Self
    {
        Value::Null
    }

    /// A boolean value.
    #[inline]
    pub const fn boolean(b: bool) -> Self
    {
        Value::Bool(b)
    }

    /// A number value.
    #[inline]
    pub const fn number(d: f64) -> Self
    {
        Value::Number(d)
    }

    /// A byte value.
    #[inline]
    pub const fn byte(b: u8) -> Self
    {
        Value::Byte(b)
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn is_null(&self) -> bool
    {
        matches!(self, Value::Null)
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn as_bool(&self) -> Option<bool>
    {
        match *self { Value::Bool(b) => Some(b), _ => None }
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn as_number(&self) -> Option<f64>
    {
        match *self { Value::Number(d) => Some(d), _ => None }
    }

    #[allow(missing_docs)]
    #[inline]
    pub fn as_byte(&self) -> Option<u8>
    {
        match *self { Value::Byte(b) => Some(b), _ => None }
    }

    /// The object this value refers to, if any.
    #[inline]
    pub fn as_object(&self) -> Option<&ObjRef>
    {
        match self { Value::Object(o) => Some(o), _ => None }
    }

    /// Kind of the object this value refers to, if any.
    pub fn object_kind(&self) -> Option<Kind>
    {
        self.as_object().map(ObjRef::kind)
    }

    /// Reference count of the object this value refers to, if any.
    pub fn ref_count(&self) -> Option<usize>
    {
        self.as_object().map(ObjRef::ref_count)
    }
}

/// Objects compare by identity, numbers by IEEE equality.
impl PartialEq for Value
{
    fn eq(&self, other: &Self) -> bool
    {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value
{
    fn from(b: bool) -> Self
    {
        Value::Bool(b)
    }
}

impl From<f64> for Value
{
    fn from(d: f64) -> Self
    {
        Value::Number(d)
    }
}

impl From<u8> for Value
{
    fn from(b: u8) -> Self
    {
        Value::Byte(b)
    }
}

impl From<ObjRef> for Value
{
    fn from(o: ObjRef) -> Self
    {
        Value::Object(o)
    }
}

/// A value as it is encoded in arena memory.
///
/// An object is stored as its header token;
/// whoever writes one holds a counted reference
/// and must either adopt it back or release it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub (crate) enum StoredValue
{
    Null,
    Bool(bool),
    Number(f64),
    Byte(u8),
    Object(Block),
}

impl Value
{
    /// Start holding another reference to this value in arena storage.
    pub (crate) fn retain_stored(&self) -> StoredValue
    {
        match self {
            Value::Null => StoredValue::Null,
            Value::Bool(b) => StoredValue::Bool(*b),
            Value::Number(d) => StoredValue::Number(*d),
            Value::Byte(b) => StoredValue::Byte(*b),
            Value::Object(o) => StoredValue::Object(o.retain_into_storage()),
        }
    }
}

impl StoredValue
{
    /// Move the stored reference out of arena storage.
    ///
    /// The storage must be overwritten or discarded afterwards.
    pub (crate) fn adopt(self, heap: &Heap) -> Value
    {
        match self {
            StoredValue::Null => Value::Null,
            StoredValue::Bool(b) => Value::Bool(b),
            StoredValue::Number(d) => Value::Number(d),
            StoredValue::Byte(b) => Value::Byte(b),
            StoredValue::Object(header) => Value::Object(ObjRef::adopt(heap, header)),
        }
    }

    /// A new reference to the stored value; the storage keeps its own.
    pub (crate) fn retain(self, heap: &Heap) -> Value
    {
        match self {
            StoredValue::Object(header) =>
                Value::Object(ObjRef::retain_stored(heap, header)),
            other => other.adopt(heap),
        }
    }
}

impl Field for StoredValue
{
    const SIZE: usize = 1 + Block::SIZE;

    fn encode(&self, out: &mut [u8])
    {
        out[.. Self::SIZE].fill(0);
        let (tag, payload) = out[.. Self::SIZE].split_at_mut(1);
        tag[0] = match *self {
            StoredValue::Null => 0,
            StoredValue::Bool(b) => { payload[0] = b as u8; 1 },
            StoredValue::Number(d) => { d.to_bits().encode(payload); 2 },
            StoredValue::Byte(b) => { payload[0] = b; 3 },
            StoredValue::Object(header) => { header.encode(payload); 4 },
        };
    }

    fn decode(bytes: &[u8]) -> Self
    {
        let payload = &bytes[1 .. Self::SIZE];
        match bytes[0] {
            1 => StoredValue::Bool(payload[0] != 0),
            2 => StoredValue::Number(f64::from_bits(u64::decode(payload))),
            3 => StoredValue::Byte(payload[0]),
            4 => StoredValue::Object(Block::decode(payload)),
            _ => StoredValue::Null,
        }
    }
}

/// Start holding another reference to `value`.
///
/// Returns the new reference.
/// For values that are not objects this is a plain copy.
#[inline]
pub fn retain(value: &Value) -> Value
{
    value.clone()
}

/// Stop holding `value`.
///
/// If it was the last reference to an object, the object is destroyed.
/// For values that are not objects this does nothing.
#[inline]
pub fn release(value: Value)
{
    drop(value);
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::heap::testing::test_heap;

    use proptest::proptest;

    #[test]
    fn primitives_are_untouched()
    {
        for value in [Value::null(), Value::boolean(true), Value::number(1.5), Value::byte(7)] {
            let copy = retain(&value);
            assert_eq!(copy, value);
            assert_eq!(copy.ref_count(), None);
            release(copy);
            release(value);
        }
    }

    #[test]
    fn retain_is_identity_passthrough()
    {
        let heap = test_heap();
        let value = heap.string("Compartiendo memoria!");
        let copy = retain(&value);
        assert_eq!(copy, value);
        assert_eq!(value.ref_count(), Some(2));
    }

    #[test]
    fn reassignment_keeps_other_holder_alive()
    {
        let heap = test_heap();
        let mut a = heap.string("Primer Valor");
        let b = retain(&a);
        assert_eq!(a.ref_count(), Some(2));

        let old = core::mem::replace(&mut a, heap.string("Segundo Valor"));
        release(old);

        assert_eq!(a.ref_count(), Some(1));
        assert_eq!(b.ref_count(), Some(1));
        assert_eq!(b.as_object().unwrap().to_text().as_deref(), Some("Primer Valor"));

        release(a);
        release(b);
        assert_eq!(heap.stats().live_blocks, 0);
    }

    #[test]
    fn last_release_frees_blocks()
    {
        let heap = test_heap();
        let value = heap.string("Hola Zynk!");
        assert_eq!(value.ref_count(), Some(1));
        assert!(heap.stats().live_blocks > 0);
        release(value);
        assert_eq!(heap.stats().live_blocks, 0);
    }

    #[test]
    fn nan_is_not_equal_to_itself()
    {
        assert_ne!(Value::number(f64::NAN), Value::number(f64::NAN));
        assert_ne!(Value::number(0.0), Value::byte(0));
    }

    #[test]
    fn stored_references_are_counted()
    {
        let heap = test_heap();
        let value = heap.string("stored");

        let stored = value.retain_stored();
        assert_eq!(value.ref_count(), Some(2));

        let read = stored.retain(&heap);
        assert_eq!(read, value);
        assert_eq!(value.ref_count(), Some(3));
        release(read);

        release(stored.adopt(&heap));
        assert_eq!(value.ref_count(), Some(1));

        assert_eq!(Value::number(2.5).retain_stored().adopt(&heap), Value::number(2.5));
    }

    proptest!
    {
        #[test]
        fn retain_release_balance(retains in 0usize .. 64)
        {
            let heap = test_heap();
            let value = heap.string("balance");
            let before = value.ref_count();

            let held: alloc::vec::Vec<Value> =
                (0 .. retains).map(|_| retain(&value)).collect();
            assert_eq!(value.ref_count(), before.map(|c| c + retains));

            for h in held {
                release(h);
            }
            assert_eq!(value.ref_count(), before);
        }
    }
}
