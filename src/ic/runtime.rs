//! Generic property access
//!
//! The operations generic stubs perform and miss handlers fall back to. Unlike the raw
//! heap accessors these throw for `undefined` and `null` receivers and accept arbitrary
//! key values.

use crate::error::{messages, Error, Result};
use crate::heap::{Heap, Name, Value};

/// Property name a non-index key converts to
pub(crate) fn key_to_name(heap: &mut Heap, key: Value) -> Name {
    let text = heap.to_display_string(key);
    heap.intern(&text)
}

fn load_error(heap: &Heap, receiver: Value, key: &str) -> Error {
    Error::type_error(
        messages::NON_OBJECT_PROPERTY_LOAD,
        messages::non_object_property_load(key, &heap.describe(receiver)),
    )
}

fn store_error(heap: &Heap, receiver: Value, key: &str) -> Error {
    Error::type_error(
        messages::NON_OBJECT_PROPERTY_STORE,
        messages::non_object_property_store(key, &heap.describe(receiver)),
    )
}

/// `receiver.name`
pub fn get_named(heap: &mut Heap, receiver: Value, name: Name) -> Result<Value> {
    if receiver.is_nullish() {
        return Err(load_error(heap, receiver, heap.name_str(name)));
    }
    heap.get_property(receiver, name)
}

/// `receiver[key]`
pub fn get_keyed(heap: &mut Heap, receiver: Value, key: Value) -> Result<Value> {
    if receiver.is_nullish() {
        let key = heap.to_display_string(key);
        return Err(load_error(heap, receiver, &key));
    }
    if let Some(index) = heap.key_as_array_index(key) {
        return heap.get_element(receiver, index);
    }
    let name = key_to_name(heap, key);
    heap.get_property(receiver, name)
}

/// `receiver.name = value`
pub fn set_named(heap: &mut Heap, receiver: Value, name: Name, value: Value, strict: bool) -> Result<Value> {
    if receiver.is_nullish() {
        return Err(store_error(heap, receiver, heap.name_str(name)));
    }
    if let Some(index) = heap.name_as_array_index(name) {
        return heap.set_element(receiver, index, value, strict);
    }
    heap.set_property(receiver, name, value, strict)
}

/// `receiver[key] = value`
pub fn set_keyed(heap: &mut Heap, receiver: Value, key: Value, value: Value, strict: bool) -> Result<Value> {
    if receiver.is_nullish() {
        let key = heap.to_display_string(key);
        return Err(store_error(heap, receiver, &key));
    }
    if let Some(index) = heap.key_as_array_index(key) {
        return heap.set_element(receiver, index, value, strict);
    }
    let name = key_to_name(heap, key);
    heap.set_property(receiver, name, value, strict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_keyed_access_converts_keys() {
        let mut heap = Heap::new();
        let object = Value::Object(heap.new_object());
        let key = heap.new_string("7");
        set_keyed(&mut heap, object, key, Value::Smi(3), false).unwrap();
        assert_eq!(get_keyed(&mut heap, object, Value::Smi(7)).unwrap(), Value::Smi(3));

        let half = heap.allocate_heap_number(1.5);
        set_keyed(&mut heap, object, half, Value::Boolean(true), false).unwrap();
        let name = heap.intern("1.5");
        assert_eq!(get_named(&mut heap, object, name).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_nullish_receivers_throw() {
        let mut heap = Heap::new();
        let x = heap.intern("x");
        let err = get_named(&mut heap, Value::Undefined, x).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
        assert_eq!(err.template(), Some(messages::NON_OBJECT_PROPERTY_LOAD));
        let err = set_keyed(&mut heap, Value::Null, Value::Smi(0), Value::Smi(1), false).unwrap_err();
        assert_eq!(err.template(), Some(messages::NON_OBJECT_PROPERTY_STORE));
    }
}
