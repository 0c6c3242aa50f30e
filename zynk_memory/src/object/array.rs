use crate::error::ArrayError;
use crate::error::OutOfMemory;
use crate::heap::Block;
use crate::heap::Field;
use crate::heap::Heap;
use super::Kind;
use super::ObjRef;
use super::StoredValue;
use super::Value;
use super::release;

use log::trace;

/// Offsets in the payload of an array.
const LEN_AT: usize = 0;
const CAPACITY_AT: usize = 8;
const BUFFER_AT: usize = 16;

/// Smallest capacity an array grows to.
const MIN_GROWN_CAPACITY: usize = 4;

/// Bytes of a slot buffer with room for `capacity` values.
fn buffer_size(capacity: usize) -> Result<usize, OutOfMemory>
{
    capacity.checked_mul(StoredValue::SIZE).ok_or(OutOfMemory)
}

/// Methods for creating array objects.
impl Heap
{
    /// Create an empty array object with room for `capacity` values.
    ///
    /// The object header and the slot buffer are separate blocks.
    pub fn try_array(&self, capacity: usize) -> Result<Value, OutOfMemory>
    {
        let size = buffer_size(capacity)?;
        let object = self.new_object(Kind::Array, |heap, header, payload| {
            let buffer = heap.alloc(size)?;
            heap.store(header, payload + LEN_AT, &0u64);
            heap.store(header, payload + CAPACITY_AT, &(capacity as u64));
            heap.store(header, payload + BUFFER_AT, &buffer);
            Ok(())
        })?;
        Ok(Value::Object(object))
    }

    /// Like [`try_array`][`Self::try_array`],
    /// but returns [`Value::Null`] on failure.
    pub fn array(&self, capacity: usize) -> Value
    {
        self.try_array(capacity).unwrap_or(Value::Null)
    }
}

/// Iterator over new references to the values of an array object.
///
/// Created by [`ObjRef::array_values`].
/// The array may be changed while iterating;
/// the iterator stops at whatever the length is by then.
pub struct ArrayValues<'a>
{
    array: &'a ObjRef,
    index: usize,
}

impl<'a> Iterator for ArrayValues<'a>
{
    type Item = Value;

    fn next(&mut self) -> Option<Value>
    {
        let value = self.array.get(self.index).ok()?;
        self.index += 1;
        Some(value)
    }
}

/// Methods for inspecting and mutating array objects.
///
/// Every slot holds one counted reference.
/// Storing a value into a slot retains it;
/// the value it overwrites is released.
impl ObjRef
{
    fn require_array(&self) -> Result<(), ArrayError>
    {
        match self.kind() {
            Kind::Array => Ok(()),
            _ => Err(ArrayError::NotAnArray),
        }
    }

    fn slots_len(&self) -> usize
    {
        self.load::<u64>(LEN_AT) as usize
    }

    fn slots_capacity(&self) -> usize
    {
        self.load::<u64>(CAPACITY_AT) as usize
    }

    fn buffer(&self) -> Block
    {
        self.load(BUFFER_AT)
    }

    fn load_slot(&self, buffer: Block, index: usize) -> StoredValue
    {
        self.heap().load(buffer, index * StoredValue::SIZE)
    }

    fn store_slot(&self, buffer: Block, index: usize, slot: &StoredValue)
    {
        self.heap().store(buffer, index * StoredValue::SIZE, slot);
    }

    /// Move the slots to a buffer twice the size.
    ///
    /// On failure the array is unchanged.
    fn grow(&self) -> Result<(), OutOfMemory>
    {
        let capacity = self.slots_capacity().checked_mul(2)
            .ok_or(OutOfMemory)?
            .max(MIN_GROWN_CAPACITY);

        let buffer = self.heap().alloc(buffer_size(capacity)?)?;
        let old = self.buffer();

        // The references move with the slots; no count changes.
        for index in 0 .. self.slots_len() {
            let slot = self.load_slot(old, index);
            self.store_slot(buffer, index, &slot);
        }

        self.heap().free(old);
        self.store(BUFFER_AT, &buffer);
        self.store(CAPACITY_AT, &(capacity as u64));

        trace!("array: grew to {} slots", capacity);
        Ok(())
    }

    /// Release every value in index order, then free the buffer.
    pub (super) fn destroy_slots(&self)
    {
        let buffer = self.buffer();
        for index in 0 .. self.slots_len() {
            release(self.load_slot(buffer, index).adopt(self.heap()));
        }
        self.heap().free(buffer);
    }

    /// Number of values in the array object.
    ///
    /// If the object is not an array, this method returns [`None`].
    pub fn array_len(&self) -> Option<usize>
    {
        self.require_array().ok().map(|()| self.slots_len())
    }

    /// Number of values the array object can hold without growing.
    ///
    /// If the object is not an array, this method returns [`None`].
    pub fn array_capacity(&self) -> Option<usize>
    {
        self.require_array().ok().map(|()| self.slots_capacity())
    }

    /// A new reference to the value at `index`.
    pub fn get(&self, index: usize) -> Result<Value, ArrayError>
    {
        self.require_array()?;
        let len = self.slots_len();
        if index >= len {
            return Err(ArrayError::IndexOutOfBounds{index, len});
        }
        Ok(self.load_slot(self.buffer(), index).retain(self.heap()))
    }

    /// Overwrite the value at `index`.
    ///
    /// `value` is retained and the previous value is released.
    pub fn set(&self, index: usize, value: &Value) -> Result<(), ArrayError>
    {
        self.require_array()?;
        let len = self.slots_len();
        if index >= len {
            return Err(ArrayError::IndexOutOfBounds{index, len});
        }

        let buffer = self.buffer();
        let old = self.load_slot(buffer, index);
        self.store_slot(buffer, index, &value.retain_stored());

        // Released after the new value is in place,
        // so destroying the old value never observes a stale slot.
        release(old.adopt(self.heap()));
        Ok(())
    }

    /// Append `value`, growing the buffer if it is full.
    ///
    /// `value` is retained.
    /// If growing fails, the array is unchanged.
    pub fn push(&self, value: &Value) -> Result<(), ArrayError>
    {
        self.require_array()?;
        let len = self.slots_len();
        if len == self.slots_capacity() {
            self.grow()?;
        }

        self.store_slot(self.buffer(), len, &value.retain_stored());
        self.store(LEN_AT, &(len as u64 + 1));
        Ok(())
    }

    /// Remove and return the last value.
    ///
    /// The slot’s reference moves to the caller,
    /// so the object’s count does not change.
    pub fn pop(&self) -> Result<Option<Value>, ArrayError>
    {
        self.require_array()?;
        let len = self.slots_len();
        if len == 0 {
            return Ok(None);
        }

        let slot = self.load_slot(self.buffer(), len - 1);
        self.store(LEN_AT, &(len as u64 - 1));
        Ok(Some(slot.adopt(self.heap())))
    }

    /// New references to the values of the array object, in index order.
    ///
    /// If the object is not an array, this method returns [`None`].
    pub fn array_values(&self) -> Option<ArrayValues<'_>>
    {
        self.require_array().ok()?;
        Some(ArrayValues{array: self, index: 0})
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::heap::ArenaConfig;
    use crate::heap::ArenaFlags;
    use crate::heap::testing::FailAfter;
    use crate::heap::testing::test_heap;

    use proptest::proptest;

    fn array(value: &Value) -> &ObjRef
    {
        value.as_object().unwrap()
    }

    #[test]
    fn nested_strings_are_released_with_the_array()
    {
        let heap = test_heap();
        let one = heap.string("Elemento Uno");
        let two = heap.string("Elemento Dos");
        let three = heap.string("Elemento Tres");

        let list = heap.array(5);
        for s in [&one, &two, &three] {
            array(&list).push(s).unwrap();
            assert_eq!(s.ref_count(), Some(2));
        }
        assert_eq!(array(&list).array_len(), Some(3));

        release(list);
        for s in [&one, &two, &three] {
            assert_eq!(s.ref_count(), Some(1));
        }

        release(one);
        release(two);
        release(three);
        assert_eq!(heap.stats().live_blocks, 0);
    }

    #[test]
    fn children_without_other_holders_die_with_the_array()
    {
        let heap = test_heap();
        let list = heap.array(2);
        array(&list).push(&heap.string("a")).unwrap();
        array(&list).push(&heap.string("b")).unwrap();
        release(list);
        assert_eq!(heap.stats().live_blocks, 0);
    }

    #[test]
    fn set_releases_old_and_retains_new()
    {
        let heap = test_heap();
        let old = heap.string("old");
        let new = heap.string("new");
        let list = heap.array(1);

        array(&list).push(&old).unwrap();
        assert_eq!(old.ref_count(), Some(2));

        array(&list).set(0, &new).unwrap();
        assert_eq!(old.ref_count(), Some(1));
        assert_eq!(new.ref_count(), Some(2));
        assert_eq!(array(&list).get(0).unwrap(), new);

        // Storing the same value again must not drop it.
        array(&list).set(0, &new).unwrap();
        assert_eq!(new.ref_count(), Some(2));
    }

    #[test]
    fn set_out_of_bounds_leaves_counts_alone()
    {
        let heap = test_heap();
        let value = heap.string("v");
        let list = heap.array(4);
        assert_eq!(
            array(&list).set(0, &value),
            Err(ArrayError::IndexOutOfBounds{index: 0, len: 0}),
        );
        assert_eq!(value.ref_count(), Some(1));
    }

    #[test]
    fn pop_moves_the_reference_out()
    {
        let heap = test_heap();
        let value = heap.string("v");
        let list = heap.array(1);
        array(&list).push(&value).unwrap();

        let popped = array(&list).pop().unwrap().unwrap();
        assert_eq!(value.ref_count(), Some(2));
        release(popped);
        assert_eq!(value.ref_count(), Some(1));
        assert_eq!(array(&list).pop(), Ok(None));
    }

    #[test]
    fn push_grows_through_the_arena()
    {
        let heap = test_heap();
        let list = heap.array(0);
        for i in 0 .. 9 {
            array(&list).push(&Value::number(i as f64)).unwrap();
        }
        assert_eq!(array(&list).array_len(), Some(9));
        assert_eq!(array(&list).array_capacity(), Some(16));
        assert_eq!(array(&list).get(8), Ok(Value::number(8.0)));
        // Header and the current buffer only.
        assert_eq!(heap.stats().live_blocks, 2);
    }

    #[test]
    fn failed_growth_changes_nothing()
    {
        // Header, buffer and the string’s header and bytes.
        let heap = Heap::new(FailAfter::new(4));
        let list = heap.array(1);
        let value = heap.string("v");
        array(&list).push(&value).unwrap();

        let result = array(&list).push(&value);
        assert_eq!(result, Err(ArrayError::OutOfMemory(OutOfMemory)));
        assert_eq!(array(&list).array_len(), Some(1));
        assert_eq!(array(&list).array_capacity(), Some(1));
        assert_eq!(value.ref_count(), Some(2));
    }

    #[test]
    fn buffer_failure_frees_header()
    {
        let heap = Heap::new(FailAfter::new(1));
        assert!(heap.array(8).is_null());
        assert_eq!(heap.stats().live_blocks, 0);
    }

    #[test]
    fn not_an_array()
    {
        let heap = test_heap();
        let value = heap.string("s");
        let object = value.as_object().unwrap();
        assert_eq!(object.push(&Value::Null), Err(ArrayError::NotAnArray));
        assert_eq!(object.array_len(), None);
        assert!(object.array_values().is_none());
    }

    #[test]
    fn values_iterate_in_order()
    {
        let heap = test_heap();
        let list = heap.array(3);
        for i in 0 .. 3 {
            array(&list).push(&Value::byte(i)).unwrap();
        }
        let text = heap.string("t");
        array(&list).push(&text).unwrap();

        let values: Vec<Value> = array(&list).array_values().unwrap().collect();
        assert_eq!(values[.. 3], [Value::byte(0), Value::byte(1), Value::byte(2)]);
        assert_eq!(values[3], text);
        assert_eq!(text.ref_count(), Some(3));
    }

    #[test]
    fn slots_are_arena_bytes()
    {
        let heap = test_heap();
        let list = heap.array(8);

        // A 56-byte header and eight 25-byte slots, both already aligned.
        assert_eq!(heap.stats().live_blocks, 2);
        assert_eq!(heap.stats().bytes_in_use, 56 + 200);

        array(&list).push(&Value::number(1.5)).unwrap();
        let buffer = array(&list).buffer();
        let slot: StoredValue = heap.load(buffer, 0);
        assert_eq!(slot, StoredValue::Number(1.5));
    }

    #[test]
    fn arena_ceiling_bounds_the_array()
    {
        let flags = ArenaFlags::empty();
        let heap = Heap::with_arena(ArenaConfig{pool_size: 512, slot_count: 16, flags}).unwrap();
        let list = heap.array(0);

        let mut pushed = 0;
        let error = loop {
            match array(&list).push(&Value::number(pushed as f64)) {
                Ok(()) => pushed += 1,
                Err(error) => break error,
            }
        };

        // Growing to sixteen slots needs 400 contiguous bytes,
        // which a 512-byte pool holding the header and old buffer lacks.
        assert_eq!(error, ArrayError::OutOfMemory(OutOfMemory));
        assert_eq!(pushed, 8);
        assert_eq!(array(&list).array_capacity(), Some(8));
        assert_eq!(array(&list).get(7), Ok(Value::number(7.0)));

        release(list);
        assert_eq!(heap.stats().live_blocks, 0);
    }

    proptest!
    {
        #[test]
        fn nesting_is_reclaimed(depth in 1usize .. 24, width in 1usize .. 6)
        {
            let heap = test_heap();
            let leaf = heap.string("leaf");

            let mut outer = heap.array(width);
            for _ in 0 .. width {
                array(&outer).push(&leaf).unwrap();
            }
            for _ in 1 .. depth {
                let next = heap.array(1);
                array(&next).push(&outer).unwrap();
                outer = next;
            }
            assert_eq!(leaf.ref_count(), Some(1 + width));

            release(outer);
            assert_eq!(leaf.ref_count(), Some(1));
            release(leaf);
            assert_eq!(heap.stats().live_blocks, 0);
        }
    }
}
