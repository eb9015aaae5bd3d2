//! Named store miss handling

use std::rc::Rc;

use super::compiler::{compile_monomorphic, monomorphic_spec};
use super::site::CallSite;
use super::state::{IcKind, IcState};
use super::stub::{Handler, Stub, StubSpec};
use crate::error::{messages, Error, Result};
use crate::heap::{Heap, LookupResult, Name, ObjectId, PropertyAttributes, PropertyKind, Value};
use crate::isolate::Isolate;

/// Resolve a missed store of `receiver.name = value`, updating the site
pub(crate) fn resolve_store(
    isolate: &mut Isolate,
    site: &mut CallSite,
    receiver: Value,
    name: Name,
    value: Value,
) -> Result<Value> {
    let strict = site.extra_ic_state().strict_mode.is_strict();
    let heap = &isolate.heap;
    if receiver.is_nullish() {
        return Err(Error::type_error(
            messages::NON_OBJECT_PROPERTY_STORE,
            messages::non_object_property_store(heap.name_str(name), &heap.describe(receiver)),
        ));
    }
    if strict && heap.is_string(receiver) && name == heap.roots().length {
        return Err(Error::type_error(
            messages::STRICT_READ_ONLY_PROPERTY,
            messages::strict_read_only_property(heap.name_str(name), &heap.describe(receiver)),
        ));
    }
    let Some(object) = receiver.as_object().filter(|_| heap.is_js_object(receiver)) else {
        return Ok(value);
    };
    if let Some(index) = heap.name_as_array_index(name) {
        return isolate.heap.set_element(receiver, index, value, strict);
    }

    let state = super::state_from(isolate, site, receiver, Some(name));
    let use_ic = isolate.config.use_ic;
    let kind = site.kind();
    let extra = site.extra_ic_state();
    let heap = &isolate.heap;

    if use_ic && kind == IcKind::Store && heap.is_array(receiver) && name == heap.roots().length && !is_dictionary(heap, object) {
        let spec = StubSpec::new(kind, IcState::Monomorphic, extra, Handler::StoreArrayLength).with_name(name);
        let stub = isolate.stubs.shared(spec);
        super::set_target(isolate, site, stub);
        super::trace(isolate, site, isolate.heap.name_str(name), state);
        return isolate.heap.set_property(receiver, name, value, strict);
    }

    if heap.is_global_proxy(receiver) {
        if use_ic && kind == IcKind::Store {
            let spec = StubSpec::new(kind, IcState::Megamorphic, extra, Handler::StoreGlobalProxy);
            let stub = isolate.stubs.shared(spec);
            super::set_target(isolate, site, stub);
            super::trace(isolate, site, isolate.heap.name_str(name), state);
        }
        return isolate.heap.set_property(receiver, name, value, strict);
    }

    let (cacheable, lookup) = lookup_for_write(heap, object, name);
    if cacheable {
        if use_ic {
            update_caches(isolate, site, state, receiver, object, name, &lookup);
        }
    } else if strict && !lookup.is_found() && heap.is_global_object(receiver) {
        return Err(Error::reference_error(
            messages::NOT_DEFINED,
            messages::not_defined(heap.name_str(name)),
        ));
    }
    isolate.heap.set_property(receiver, name, value, strict)
}

fn is_dictionary(heap: &Heap, object: ObjectId) -> bool {
    heap.js_object(object)
        .is_some_and(|o| heap.shape(o.shape).is_dictionary)
}

/// Found, writable, and (for a transition) not shadowed by anything up the chain
fn store_cacheable(heap: &Heap, object: ObjectId, lookup: &LookupResult) -> bool {
    match lookup {
        LookupResult::NotFound => false,
        LookupResult::Transition { descriptor, .. } => {
            !descriptor.attributes.contains(PropertyAttributes::READ_ONLY)
                && !heap
                    .lookup_real_named_property_in_prototypes(object, descriptor.name)
                    .is_found()
        }
        _ => !lookup.is_read_only(),
    }
}

/// Lookup for a store to `object.name`.
///
/// Returns whether the result can be specialized on, along with the result itself.
/// Own properties and existing transitions are preferred; failing that, only a setter
/// somewhere up the chain is worth caching.
fn lookup_for_write(heap: &Heap, object: ObjectId, name: Name) -> (bool, LookupResult) {
    let mut lookup = heap.local_lookup(object, name);
    if !lookup.is_found() {
        lookup = heap.lookup_transition(object, name);
    }
    if !store_cacheable(heap, object, &lookup) {
        let lookup = heap.lookup(Value::Object(object), name);
        let setter = matches!(
            lookup,
            LookupResult::Property {
                kind: PropertyKind::Accessor { .. },
                ..
            }
        );
        return (setter && store_cacheable(heap, object, &lookup), lookup);
    }
    if lookup.is_interceptor() {
        let lookup = heap.local_lookup_real_named_property(object, name);
        return (store_cacheable(heap, object, &lookup), lookup);
    }
    (true, lookup)
}

fn update_caches(
    isolate: &mut Isolate,
    site: &mut CallSite,
    state: IcState,
    receiver: Value,
    object: ObjectId,
    name: Name,
    lookup: &LookupResult,
) {
    let code = if state == IcState::Uninitialized && super::strategy(site.kind()).uses_premonomorphic {
        isolate.stubs.premonomorphic_stub(site.kind(), site.extra_ic_state())
    } else {
        let computed = match site.kind() {
            IcKind::KeyedStore => compute_keyed_store_monomorphic(isolate, site, receiver, name, lookup),
            _ => compute_store_monomorphic(isolate, site, receiver, object, name, lookup),
        };
        let Some(code) = computed else {
            return;
        };
        code
    };
    super::patch_cache(isolate, site, state, receiver, name, code);
    super::trace(isolate, site, isolate.heap.name_str(name), state);
}

fn compile(
    isolate: &mut Isolate,
    site: &CallSite,
    receiver: Value,
    name: Name,
    handler: Handler,
    holder: Option<ObjectId>,
) -> Option<Rc<Stub>> {
    let spec = monomorphic_spec(
        &isolate.heap,
        site.kind(),
        site.extra_ic_state(),
        handler,
        receiver,
        holder,
        name,
    )?;
    compile_monomorphic(&mut isolate.stubs, &mut isolate.heap, receiver, name, spec)
}

/// Field store onto an existing field or through a transition that adds one
fn field_store(lookup: &LookupResult) -> Option<(Handler, Option<ObjectId>)> {
    match *lookup {
        LookupResult::Property {
            holder,
            kind: PropertyKind::Field(index),
            ..
        } => Some((
            Handler::StoreField {
                index,
                transition: None,
            },
            Some(holder),
        )),
        LookupResult::Transition {
            target, descriptor, ..
        } => match descriptor.kind {
            PropertyKind::Field(index) if descriptor.attributes.is_empty() => Some((
                Handler::StoreField {
                    index,
                    transition: Some(target),
                },
                None,
            )),
            _ => None,
        },
        _ => None,
    }
}

fn compute_store_monomorphic(
    isolate: &mut Isolate,
    site: &CallSite,
    receiver: Value,
    object: ObjectId,
    name: Name,
    lookup: &LookupResult,
) -> Option<Rc<Stub>> {
    let heap = &isolate.heap;
    let (handler, holder) = match *lookup {
        LookupResult::Property {
            holder,
            kind: PropertyKind::Normal,
            ..
        } => {
            if heap.is_global_object(receiver) {
                (Handler::StoreGlobal { global: object }, Some(holder))
            } else if holder == object {
                (Handler::StoreNormal, Some(holder))
            } else {
                return None;
            }
        }
        LookupResult::Property {
            holder,
            kind: PropertyKind::Accessor { setter, .. },
            ..
        } => {
            if !heap.is_function(setter)
                || heap.is_global_object(Value::Object(holder))
                || is_dictionary(heap, holder)
            {
                return None;
            }
            (Handler::StoreViaSetter { setter }, Some(holder))
        }
        _ => field_store(lookup)?,
    };
    compile(isolate, site, receiver, name, handler, holder)
}

/// Keyed sites specialize named stores only onto fields
fn compute_keyed_store_monomorphic(
    isolate: &mut Isolate,
    site: &CallSite,
    receiver: Value,
    name: Name,
    lookup: &LookupResult,
) -> Option<Rc<Stub>> {
    match field_store(lookup) {
        Some((handler, holder)) => compile(isolate, site, receiver, name, handler, holder),
        None => Some(isolate.stubs.generic_stub(site.kind(), site.extra_ic_state())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_for_write_prefers_transitions() {
        let mut heap = Heap::new();
        let x = heap.intern("x");
        let a = heap.new_object();
        heap.add_property(a, x, Value::Smi(1), PropertyAttributes::empty());
        let b = heap.new_object();
        let (cacheable, lookup) = lookup_for_write(&heap, b, x);
        assert!(cacheable);
        assert!(matches!(lookup, LookupResult::Transition { .. }));
        assert!(field_store(&lookup).is_some_and(|(_, holder)| holder.is_none()));
    }

    #[test]
    fn test_read_only_prototype_blocks_transition() {
        let mut heap = Heap::new();
        let x = heap.intern("x");
        let proto = heap.new_object();
        heap.add_property(proto, x, Value::Smi(1), PropertyAttributes::READ_ONLY);
        let sibling = heap.new_object_with_prototype(Value::Object(proto));
        heap.add_property(sibling, x, Value::Smi(2), PropertyAttributes::empty());
        let object = heap.new_object_with_prototype(Value::Object(proto));
        let (cacheable, _) = lookup_for_write(&heap, object, x);
        assert!(!cacheable);
    }

    #[test]
    fn test_setter_on_prototype_is_cacheable() {
        fn setter(_: &mut Heap, _: Value, _: &[Value]) -> Result<Value> {
            Ok(Value::Undefined)
        }
        let mut heap = Heap::new();
        let x = heap.intern("x");
        let proto = heap.new_object();
        let setter = Value::Object(heap.new_native_function("set x", 1, setter));
        heap.add_accessor(proto, x, Value::Undefined, setter);
        let object = heap.new_object_with_prototype(Value::Object(proto));
        let (cacheable, lookup) = lookup_for_write(&heap, object, x);
        assert!(cacheable);
        assert_eq!(lookup.holder(), Some(proto));
    }
}
