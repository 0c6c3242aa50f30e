use crate::error::OutOfMemory;
use crate::heap::ArenaBytes;
use crate::heap::Heap;
use super::Kind;
use super::ObjRef;
use super::Value;

use alloc::string::String;
use alloc::vec::Vec;

/// Offset of the byte buffer in the payload of a string.
const BYTES_AT: usize = 0;

/// Methods for creating string objects.
impl Heap
{
    /// Create a string object holding a copy of `text`.
    ///
    /// The object header and the byte buffer are separate blocks.
    /// If either allocation fails, nothing stays allocated.
    pub fn try_string(&self, text: impl AsRef<[u8]>) -> Result<Value, OutOfMemory>
    {
        let text = text.as_ref();
        let object = self.new_object(Kind::String, |heap, header, payload| {
            let bytes = ArenaBytes::new(heap, text)?;
            heap.store(header, payload + BYTES_AT, &bytes);
            Ok(())
        })?;
        Ok(Value::Object(object))
    }

    /// Like [`try_string`][`Self::try_string`],
    /// but returns [`Value::Null`] on failure.
    pub fn string(&self, text: impl AsRef<[u8]>) -> Value
    {
        self.try_string(text).unwrap_or(Value::Null)
    }
}

/// Methods for inspecting string objects.
impl ObjRef
{
    fn string_buffer(&self) -> Option<ArenaBytes>
    {
        (self.kind() == Kind::String).then(|| self.load(BYTES_AT))
    }

    /// Copy of the bytes of the string object.
    ///
    /// If the object is not a string, this method returns [`None`].
    pub fn string_bytes(&self) -> Option<Vec<u8>>
    {
        self.string_buffer()?.to_vec(self.heap())
    }

    /// Pass the bytes of the string object to `then`.
    ///
    /// `then` sees a copy,
    /// so it may create and release objects on the same heap.
    /// If the object is not a string, this method returns [`None`].
    pub fn with_string_bytes<F, R>(&self, then: F) -> Option<R>
        where F: FnOnce(&[u8]) -> R
    {
        let bytes = self.string_bytes()?;
        Some(then(&bytes))
    }

    /// Length in bytes of the string object.
    ///
    /// If the object is not a string, this method returns [`None`].
    pub fn string_len(&self) -> Option<usize>
    {
        self.string_buffer().map(|bytes| bytes.len())
    }

    /// Copy of the string object, with invalid UTF-8 replaced.
    ///
    /// If the object is not a string, this method returns [`None`].
    pub fn to_text(&self) -> Option<String>
    {
        self.with_string_bytes(|b| String::from_utf8_lossy(b).into_owned())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::heap::testing::FailAfter;
    use crate::heap::testing::test_heap;
    use crate::object::release;

    use proptest::collection::vec as pvec;
    use proptest::proptest;

    #[test]
    fn creates_with_count_one()
    {
        let heap = test_heap();
        let value = heap.string("Hola Zynk!");
        let object = value.as_object().unwrap();
        assert_eq!(object.kind(), Kind::String);
        assert_eq!(object.ref_count(), 1);
        assert_eq!(object.string_len(), Some(10));
        assert_eq!(object.to_text().as_deref(), Some("Hola Zynk!"));
    }

    #[test]
    fn header_failure_yields_null()
    {
        let heap = Heap::new(FailAfter::new(0));
        assert!(heap.string("x").is_null());
        assert_eq!(heap.stats().live_blocks, 0);
    }

    #[test]
    fn buffer_failure_frees_header()
    {
        let heap = Heap::new(FailAfter::new(1));
        assert_eq!(heap.try_string("x"), Err(OutOfMemory));
        assert_eq!(heap.stats().live_blocks, 0);
    }

    #[test]
    fn not_a_string()
    {
        let heap = test_heap();
        let value = heap.array(1);
        let object = value.as_object().unwrap();
        assert_eq!(object.string_len(), None);
        assert_eq!(object.string_bytes(), None);
        assert_eq!(object.to_text(), None);
    }

    #[test]
    fn copy_inside_the_byte_accessor()
    {
        let heap = test_heap();
        let original = heap.string("copiame");
        let object = original.as_object().unwrap();

        let copy = object.with_string_bytes(|b| heap.string(b)).unwrap();
        assert_ne!(copy, original);
        assert_eq!(copy.as_object().unwrap().to_text().as_deref(), Some("copiame"));

        let joined = object.with_string_bytes(|b| {
            let mut text = b.to_vec();
            copy.as_object().unwrap().with_string_bytes(|c| text.extend_from_slice(c));
            heap.string(text)
        }).unwrap();
        assert_eq!(joined.as_object().unwrap().string_len(), Some(14));

        release(copy);
        release(joined);
        assert_eq!(original.ref_count(), Some(1));
    }

    #[test]
    fn release_inside_the_byte_accessor()
    {
        let heap = test_heap();
        let kept = heap.string("kept");
        let other = heap.string("other");
        let baseline = heap.stats().live_blocks;

        let len = kept.as_object().unwrap()
            .with_string_bytes(|b| { release(other); b.len() });
        assert_eq!(len, Some(4));
        assert_eq!(heap.stats().live_blocks, baseline - 2);
    }

    proptest!
    {
        #[test]
        fn bytes_survive(text in pvec(proptest::num::u8::ANY, 0 .. 256))
        {
            let heap = test_heap();
            let value = heap.string(&text);
            let object = value.as_object().unwrap();
            assert_eq!(object.with_string_bytes(|b| b.to_vec()), Some(text.clone()));
            assert_eq!(object.string_len(), Some(text.len()));
        }
    }
}
