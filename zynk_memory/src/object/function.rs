use crate::error::OutOfMemory;
use crate::heap::ArenaBytes;
use crate::heap::Heap;
use crate::scope::Environment;
use super::Kind;
use super::ObjRef;
use super::Value;

use alloc::string::String;

/// Host function callable from Zynk code.
///
/// It receives the environment of the call site
/// and the arguments, borrowed for the duration of the call.
pub type NativeFn = for<'e, 'p> fn(&'e Environment<'p>, &[Value]) -> Value;

/// Offsets in the payload of a function or native function.
const NAME_AT: usize = 0;
const NATIVE_AT: usize = 32;

/// Methods for creating function objects.
impl Heap
{
    /// Create a function object with the given name.
    ///
    /// The body is resolved by the evaluator, not stored here.
    pub fn try_function(&self, name: &str) -> Result<Value, OutOfMemory>
    {
        let object = self.new_object(Kind::Function, |heap, header, payload| {
            let name = ArenaBytes::new(heap, name.as_bytes())?;
            heap.store(header, payload + NAME_AT, &name);
            Ok(())
        })?;
        Ok(Value::Object(object))
    }

    /// Like [`try_function`][`Self::try_function`],
    /// but returns [`Value::Null`] on failure.
    pub fn function(&self, name: &str) -> Value
    {
        self.try_function(name).unwrap_or(Value::Null)
    }

    /// Create a native function object.
    pub fn try_native_function(&self, name: &str, func: NativeFn)
        -> Result<Value, OutOfMemory>
    {
        let object = self.new_object(Kind::NativeFunction, |heap, header, payload| {
            let name = ArenaBytes::new(heap, name.as_bytes())?;
            let index = heap.register_native(func) as u64;
            heap.store(header, payload + NAME_AT, &name);
            heap.store(header, payload + NATIVE_AT, &index);
            Ok(())
        })?;
        Ok(Value::Object(object))
    }

    /// Like [`try_native_function`][`Self::try_native_function`],
    /// but returns [`Value::Null`] on failure.
    pub fn native_function(&self, name: &str, func: NativeFn) -> Value
    {
        self.try_native_function(name, func).unwrap_or(Value::Null)
    }
}

/// Methods for inspecting function objects.
impl ObjRef
{
    /// Name of the function or native function object.
    ///
    /// If the object is neither, this method returns [`None`].
    pub fn function_name(&self) -> Option<String>
    {
        let name: ArenaBytes = match self.kind() {
            Kind::Function | Kind::NativeFunction => self.load(NAME_AT),
            _ => return None,
        };
        let bytes = name.to_vec(self.heap())?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The host function behind a native function object.
    ///
    /// If the object is not a native function, this method returns [`None`].
    pub fn native_fn(&self) -> Option<NativeFn>
    {
        if self.kind() != Kind::NativeFunction {
            return None;
        }
        let index: u64 = self.load(NATIVE_AT);
        self.heap().native(index as usize)
    }
}
