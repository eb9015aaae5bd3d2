//! Stub execution
//!
//! Runs a stub against concrete operands. A stub first checks its guards (name,
//! receiver shape, pinned prototypes, absent dictionary entries); if any fails the
//! access misses and the caller falls back to the miss handler. Element stubs can also
//! ask for the site to be forced generic when the key or index is one they will never
//! handle.

use std::rc::Rc;

use super::compiler::receiver_shape;
use super::runtime;
use super::state::{GrowMode, IcKind, IcState, StringStubState};
use super::stub::{ElementLoadTarget, ElementStoreTarget, Handler, Holder, Stub};
use crate::error::Result;
use crate::heap::{ElementsKind, ElementsStorage, Heap, Name, ObjectId, ShapeId, Value};
use crate::isolate::Isolate;

/// Outcome of running a stub
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Dispatch {
    Hit(Value),
    Miss,
    /// Miss, and the site should stop specializing
    MissForceGeneric,
}

/// Property key of an access
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Key {
    Named(Name),
    Keyed(Value),
}

impl Key {
    /// The key as a name, if it is one without conversion
    pub(crate) fn name(self, heap: &Heap) -> Option<Name> {
        match self {
            Key::Named(name) => Some(name),
            Key::Keyed(value) if heap.is_internalized_string(value) => {
                heap.string_value(value).and_then(|text| heap.lookup_name(text))
            }
            Key::Keyed(_) => None,
        }
    }

    fn value(self) -> Option<Value> {
        match self {
            Key::Keyed(value) => Some(value),
            Key::Named(_) => None,
        }
    }
}

fn object_id(heap: &Heap, receiver: Value) -> Option<ObjectId> {
    heap.as_js_object(receiver).map(|(id, _)| id)
}

fn holder_id(heap: &Heap, receiver: Value, holder: Holder) -> Option<ObjectId> {
    match holder {
        Holder::Receiver => object_id(heap, receiver),
        Holder::Object(id) => Some(id),
    }
}

fn owns_in_dictionary(heap: &Heap, object: ObjectId, name: Name) -> bool {
    heap.js_object(object)
        .is_some_and(|o| o.dictionary.contains_key(&name))
}

/// Whether every guard of `stub` holds for this access
fn guards_hold(heap: &Heap, stub: &Stub, receiver: Value, name: Option<Name>) -> bool {
    if let Some(expected) = stub.name() {
        if name != Some(expected) {
            return false;
        }
    }
    if !stub.receiver_shapes().is_empty() {
        match receiver_shape(heap, receiver) {
            Some(shape) if stub.receiver_shapes().contains(&shape) => {}
            _ => return false,
        }
    }
    let prototypes_intact = stub
        .prototype_checks()
        .iter()
        .all(|&(object, shape)| heap.js_object(object).is_some_and(|o| o.shape == shape));
    if !prototypes_intact {
        return false;
    }
    match stub.name() {
        Some(name) => stub.absent_checks().iter().all(|&holder| {
            holder_id(heap, receiver, holder).is_some_and(|id| !owns_in_dictionary(heap, id, name))
        }),
        None => true,
    }
}

/// Shape a megamorphic site probes the stub cache with
pub(crate) fn probe_shape(heap: &Heap, kind: IcKind, receiver: Value) -> Option<ShapeId> {
    if kind.is_call() && !heap.is_js_object(receiver) {
        let prototype = heap.get_prototype(receiver);
        return heap.map_of(prototype);
    }
    receiver_shape(heap, receiver)
}

fn probe(isolate: &mut Isolate, stub: &Stub, receiver: Value, name: Option<Name>) -> Option<Rc<Stub>> {
    let name = name?;
    let shape = probe_shape(&isolate.heap, stub.kind(), receiver)?;
    isolate
        .stub_cache
        .get(name, shape, stub.kind())
        .filter(|found| found.state() == IcState::Monomorphic)
}

fn element_index(key: Value) -> Option<usize> {
    key.as_smi().filter(|&i| i >= 0).map(|i| i as usize)
}

fn value_fits(heap: &Heap, kind: ElementsKind, value: Value) -> bool {
    match kind.storage() {
        ElementsStorage::Smi => value.is_smi(),
        ElementsStorage::Double => heap.is_number(value),
        ElementsStorage::Tagged => true,
    }
}

// ==================== Loads ====================

/// Run a load stub
pub(crate) fn load(isolate: &mut Isolate, stub: &Stub, receiver: Value, key: Key) -> Result<Dispatch> {
    let name = key.name(&isolate.heap);
    match stub.handler() {
        Handler::Initialize | Handler::Premonomorphic => return Ok(Dispatch::Miss),
        Handler::Megamorphic => {
            return match probe(isolate, stub, receiver, name) {
                Some(found) => load(isolate, &found, receiver, key),
                None => Ok(Dispatch::Miss),
            };
        }
        Handler::Generic => {
            let value = match key {
                Key::Named(name) => runtime::get_named(&mut isolate.heap, receiver, name)?,
                Key::Keyed(value) => runtime::get_keyed(&mut isolate.heap, receiver, value)?,
            };
            return Ok(Dispatch::Hit(value));
        }
        _ => {}
    }
    if !guards_hold(&isolate.heap, stub, receiver, name) {
        return Ok(Dispatch::Miss);
    }
    let heap = &mut isolate.heap;
    let value = match stub.handler() {
        Handler::LoadField { holder, index } => match holder_id(heap, receiver, *holder) {
            Some(holder) => heap.field_value(holder, *index),
            None => return Ok(Dispatch::Miss),
        },
        Handler::LoadConstant(value) => *value,
        Handler::LoadNonexistent => Value::Undefined,
        Handler::LoadNormal => {
            let found = name.zip(object_id(heap, receiver)).and_then(|(n, id)| heap.dictionary_value(id, n));
            match found {
                Some(value) => value,
                None => return Ok(Dispatch::Miss),
            }
        }
        Handler::LoadGlobal { global, .. } => match name.and_then(|n| heap.dictionary_value(*global, n)) {
            Some(value) => value,
            None => return Ok(Dispatch::Miss),
        },
        Handler::LoadViaGetter { getter, .. } => heap.call_function(*getter, receiver, &[])?,
        Handler::LoadInterceptor { holder } => {
            let Some(name) = name else {
                return Ok(Dispatch::Miss);
            };
            match holder_id(heap, receiver, *holder).and_then(|h| heap.interceptor_value(h, name)) {
                Some(value) => value,
                None => heap.get_property(receiver, name)?,
            }
        }
        Handler::LoadStringLength => match heap.string(receiver) {
            Some(string) => Value::Smi(string.length() as i32),
            None => return Ok(Dispatch::Miss),
        },
        Handler::LoadStringWrapperLength => {
            match heap.string_length(receiver).filter(|_| heap.is_string_wrapper(receiver)) {
                Some(length) => Value::Smi(length as i32),
                None => return Ok(Dispatch::Miss),
            }
        }
        Handler::LoadArrayLength => match heap.array_length(receiver) {
            Some(length) => Value::Smi(length as i32),
            None => return Ok(Dispatch::Miss),
        },
        Handler::LoadFunctionPrototype => match heap.function_data(receiver) {
            Some(data) => data.prototype,
            None => return Ok(Dispatch::Miss),
        },
        Handler::LoadElement(_) => return Ok(load_element(heap, receiver, key)),
        Handler::LoadElementPolymorphic(targets) => {
            let shape = receiver_shape(heap, receiver);
            let position = stub.receiver_shapes().iter().position(|s| Some(*s) == shape);
            return Ok(match position.and_then(|i| targets.get(i)) {
                Some(ElementLoadTarget::Elements(_)) => load_element(heap, receiver, key),
                Some(ElementLoadTarget::String) => load_indexed_string(heap, receiver, key),
                None => Dispatch::Miss,
            });
        }
        Handler::LoadIndexedString => return Ok(load_indexed_string(heap, receiver, key)),
        Handler::LoadNonStrictArguments => return Ok(load_arguments(heap, receiver, key)),
        _ => return Ok(Dispatch::Miss),
    };
    Ok(Dispatch::Hit(value))
}

fn load_element(heap: &Heap, receiver: Value, key: Key) -> Dispatch {
    let Some(index) = key.value().and_then(element_index) else {
        return Dispatch::MissForceGeneric;
    };
    let Some((_, object)) = heap.as_js_object(receiver) else {
        return Dispatch::Miss;
    };
    match object.elements.get(index) {
        Some(&value) if !value.is_hole() => Dispatch::Hit(value),
        _ => Dispatch::MissForceGeneric,
    }
}

fn load_indexed_string(heap: &mut Heap, receiver: Value, key: Key) -> Dispatch {
    let Some(index) = key.value().and_then(element_index) else {
        return Dispatch::Miss;
    };
    let unit = heap
        .string_value(receiver)
        .and_then(|text| text.encode_utf16().nth(index));
    match unit {
        Some(unit) => Dispatch::Hit(heap.new_string(String::from_utf16_lossy(&[unit]))),
        None => Dispatch::Miss,
    }
}

fn load_arguments(heap: &Heap, receiver: Value, key: Key) -> Dispatch {
    if !heap.is_non_strict_arguments(receiver) {
        return Dispatch::Miss;
    }
    let Some(index) = key.value().and_then(element_index) else {
        return Dispatch::Miss;
    };
    match heap.as_js_object(receiver).and_then(|(_, o)| o.elements.get(index).copied()) {
        Some(value) if !value.is_hole() => Dispatch::Hit(value),
        _ => Dispatch::Miss,
    }
}

// ==================== Stores ====================

/// Run a store stub
pub(crate) fn store(isolate: &mut Isolate, stub: &Stub, receiver: Value, key: Key, value: Value) -> Result<Dispatch> {
    let name = key.name(&isolate.heap);
    let strict = stub.extra_ic_state().strict_mode.is_strict();
    match stub.handler() {
        Handler::Initialize | Handler::Premonomorphic => return Ok(Dispatch::Miss),
        Handler::Megamorphic => {
            return match probe(isolate, stub, receiver, name) {
                Some(found) => store(isolate, &found, receiver, key, value),
                None => Ok(Dispatch::Miss),
            };
        }
        Handler::Generic => {
            match key {
                Key::Named(name) => runtime::set_named(&mut isolate.heap, receiver, name, value, strict)?,
                Key::Keyed(key) => runtime::set_keyed(&mut isolate.heap, receiver, key, value, strict)?,
            };
            return Ok(Dispatch::Hit(value));
        }
        _ => {}
    }
    if !guards_hold(&isolate.heap, stub, receiver, name) {
        return Ok(Dispatch::Miss);
    }
    let heap = &mut isolate.heap;
    let Some(object) = object_id(heap, receiver) else {
        return Ok(Dispatch::Miss);
    };
    match stub.handler() {
        Handler::StoreField { index, transition: None } => heap.set_field(object, *index, value),
        Handler::StoreField {
            index,
            transition: Some(target),
        } => {
            if let Some(o) = heap.js_object_mut(object) {
                o.shape = *target;
                if o.fields.len() <= *index {
                    o.fields.resize(*index + 1, Value::Undefined);
                }
                o.fields[*index] = value;
            }
        }
        Handler::StoreNormal | Handler::StoreGlobal { .. } => {
            let target = match stub.handler() {
                Handler::StoreGlobal { global } => *global,
                _ => object,
            };
            let Some(name) = name else {
                return Ok(Dispatch::Miss);
            };
            match heap.dictionary_entry(target, name) {
                Some(entry) if !entry.attributes.contains(crate::heap::PropertyAttributes::READ_ONLY) => {
                    heap.set_dictionary_value(target, name, value);
                }
                _ => return Ok(Dispatch::Miss),
            }
        }
        Handler::StoreViaSetter { setter } => {
            heap.call_function(*setter, receiver, &[value])?;
        }
        Handler::StoreArrayLength => {
            if !heap.is_array(receiver) || !value.as_smi().is_some_and(|v| v >= 0) {
                return Ok(Dispatch::Miss);
            }
            heap.set_array_length(object, value)?;
        }
        Handler::StoreGlobalProxy => {
            let Some(name) = name else {
                return Ok(Dispatch::Miss);
            };
            heap.set_property(receiver, name, value, strict)?;
        }
        Handler::StoreElement { kind, grow } => {
            return Ok(store_element(heap, object, key, value, *kind, *grow, None));
        }
        Handler::StoreElementPolymorphic(targets) => {
            let shape = receiver_shape(heap, receiver);
            let position = stub.receiver_shapes().iter().position(|s| Some(*s) == shape);
            let grow = stub.extra_ic_state().grow_mode;
            return Ok(match position.and_then(|i| targets.get(i)) {
                Some(ElementStoreTarget::Store { kind }) => store_element(heap, object, key, value, *kind, grow, None),
                Some(ElementStoreTarget::TransitionAndStore { to, kind }) => {
                    store_element(heap, object, key, value, *kind, grow, Some(*to))
                }
                None => Dispatch::Miss,
            });
        }
        Handler::StoreNonStrictArguments => return Ok(store_arguments(heap, receiver, object, key, value)),
        _ => return Ok(Dispatch::Miss),
    }
    Ok(Dispatch::Hit(value))
}

fn store_element(
    heap: &mut Heap,
    object: ObjectId,
    key: Key,
    value: Value,
    kind: ElementsKind,
    grow: GrowMode,
    transition: Option<ShapeId>,
) -> Dispatch {
    let Some(index) = key.value().and_then(element_index) else {
        return Dispatch::MissForceGeneric;
    };
    if !value_fits(heap, kind, value) {
        return Dispatch::Miss;
    }
    let is_array = heap.is_array(Value::Object(object));
    let Some(o) = heap.js_object_mut(object) else {
        return Dispatch::Miss;
    };
    let length = o.elements.len();
    let appends = index == length && grow == GrowMode::AllowGrowth && is_array;
    if index > length || (index == length && !appends) {
        return Dispatch::MissForceGeneric;
    }
    if let Some(to) = transition {
        o.shape = to;
    }
    if appends {
        o.elements.push(value);
    } else {
        o.elements[index] = value;
    }
    Dispatch::Hit(value)
}

fn store_arguments(heap: &mut Heap, receiver: Value, object: ObjectId, key: Key, value: Value) -> Dispatch {
    if !heap.is_non_strict_arguments(receiver) {
        return Dispatch::Miss;
    }
    let Some(index) = key.value().and_then(element_index) else {
        return Dispatch::Miss;
    };
    match heap.js_object_mut(object).and_then(|o| o.elements.get_mut(index)) {
        Some(slot) => {
            *slot = value;
            Dispatch::Hit(value)
        }
        None => Dispatch::Miss,
    }
}

// ==================== Calls ====================

/// Run a call stub; a hit yields the function to invoke
pub(crate) fn call(isolate: &mut Isolate, stub: &Stub, receiver: Value, key: Key, args: &[Value]) -> Result<Dispatch> {
    let name = key.name(&isolate.heap);
    match stub.handler() {
        Handler::Initialize | Handler::Premonomorphic => return Ok(Dispatch::Miss),
        Handler::Megamorphic | Handler::Generic => {
            if stub.state() == IcState::Megamorphic {
                if let Some(found) = probe(isolate, stub, receiver, name) {
                    if let Dispatch::Hit(callee) = call(isolate, &found, receiver, key, args)? {
                        return Ok(Dispatch::Hit(callee));
                    }
                }
                if stub.kind() == IcKind::Call {
                    return Ok(Dispatch::Miss);
                }
            }
            // Keyed call sites past monomorphic look the function up generically
            let callee = match key {
                Key::Named(name) => runtime::get_named(&mut isolate.heap, receiver, name)?,
                Key::Keyed(key) => runtime::get_keyed(&mut isolate.heap, receiver, key)?,
            };
            return Ok(if isolate.heap.is_function(callee) {
                Dispatch::Hit(callee)
            } else {
                Dispatch::Miss
            });
        }
        _ => {}
    }
    if !guards_hold(&isolate.heap, stub, receiver, name) {
        return Ok(Dispatch::Miss);
    }
    let heap = &mut isolate.heap;
    let callee = match stub.handler() {
        Handler::CallField { holder, index } => match holder_id(heap, receiver, *holder) {
            Some(holder) => heap.field_value(holder, *index),
            None => return Ok(Dispatch::Miss),
        },
        Handler::CallConstant { function } => {
            let specialized = stub.extra_ic_state().string_stub == StringStubState::Default;
            if specialized && super::call::string_index_out_of_bounds(heap, *function, receiver, args) {
                return Ok(Dispatch::Miss);
            }
            *function
        }
        Handler::CallNormal => {
            let found = name.zip(object_id(heap, receiver)).and_then(|(n, id)| heap.dictionary_value(id, n));
            match found {
                Some(value) => value,
                None => return Ok(Dispatch::Miss),
            }
        }
        Handler::CallGlobal { global, function } => match name.and_then(|n| heap.dictionary_value(*global, n)) {
            Some(value) if value == *function => value,
            _ => return Ok(Dispatch::Miss),
        },
        Handler::CallInterceptor { .. } => match name {
            Some(name) => heap.get_property(receiver, name)?,
            None => return Ok(Dispatch::Miss),
        },
        Handler::CallArguments => match load_arguments(heap, receiver, key) {
            Dispatch::Hit(value) => value,
            _ => return Ok(Dispatch::Miss),
        },
        _ => return Ok(Dispatch::Miss),
    };
    Ok(if heap.is_function(callee) {
        Dispatch::Hit(callee)
    } else {
        Dispatch::Miss
    })
}
