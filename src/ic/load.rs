//! Named load miss handling
//!
//! Shared by named load sites and keyed load sites whose key is a name.

use std::rc::Rc;

use super::compiler::{compile_monomorphic, monomorphic_spec};
use super::site::CallSite;
use super::state::{IcKind, IcState};
use super::stub::{Handler, Holder, Stub, StubSpec};
use crate::error::{messages, Error, Result};
use crate::heap::{LookupResult, PropertyAttributes, PropertyKind, Value};
use crate::heap::{Name, ObjectId};
use crate::isolate::Isolate;

/// Resolve a missed load of `receiver.name`, updating the site
pub(crate) fn resolve_load(isolate: &mut Isolate, site: &mut CallSite, receiver: Value, name: Name) -> Result<Value> {
    if receiver.is_nullish() {
        let heap = &isolate.heap;
        return Err(Error::type_error(
            messages::NON_OBJECT_PROPERTY_LOAD,
            messages::non_object_property_load(heap.name_str(name), &heap.describe(receiver)),
        ));
    }
    let state = super::state_from(isolate, site, receiver, Some(name));

    if let Some(value) = load_intrinsic(isolate, site, state, receiver, name) {
        return Ok(value);
    }

    if let Some(index) = isolate.heap.name_as_array_index(name) {
        if site.kind() == IcKind::KeyedLoad && isolate.config.use_ic {
            let generic = isolate.stubs.generic_stub(site.kind(), site.extra_ic_state());
            super::set_target(isolate, site, generic);
            super::trace(isolate, site, isolate.heap.name_str(name), state);
        }
        return isolate.heap.get_element(receiver, index);
    }

    let lookup = isolate.heap.lookup(receiver, name);
    if !lookup.is_found() && isolate.heap.is_global_object(receiver) {
        return Err(Error::reference_error(
            messages::NOT_DEFINED,
            messages::not_defined(isolate.heap.name_str(name)),
        ));
    }
    if isolate.config.use_ic {
        update_caches(isolate, site, state, receiver, name, &lookup);
    }
    isolate.heap.get_property_with_lookup(receiver, &lookup, name)
}

/// `length` of strings and arrays and `prototype` of functions get dedicated stubs
fn load_intrinsic(
    isolate: &mut Isolate,
    site: &mut CallSite,
    state: IcState,
    receiver: Value,
    name: Name,
) -> Option<Value> {
    let heap = &isolate.heap;
    let roots = heap.roots();
    let is_wrapper = heap.is_string_wrapper(receiver);
    let (handler, wrapper_handler) = if name == roots.length && (heap.is_string(receiver) || is_wrapper) {
        let handler = if is_wrapper {
            Handler::LoadStringWrapperLength
        } else {
            Handler::LoadStringLength
        };
        (handler, Some(Handler::LoadStringWrapperLength))
    } else if name == roots.length && heap.is_array(receiver) {
        (Handler::LoadArrayLength, None)
    } else if name == roots.prototype && heap.is_function(receiver) {
        (Handler::LoadFunctionPrototype, None)
    } else {
        return None;
    };
    let value = heap.get_intrinsic(receiver, name)?;

    if isolate.config.use_ic {
        let kind = site.kind();
        let extra = site.extra_ic_state();
        let spec = |handler: Handler| StubSpec::new(kind, IcState::Monomorphic, extra, handler).with_name(name);
        let stub = match state {
            IcState::Uninitialized => Some(isolate.stubs.premonomorphic_stub(kind, extra)),
            IcState::Premonomorphic => Some(isolate.stubs.shared(spec(handler))),
            IcState::Monomorphic if is_wrapper => wrapper_handler.map(|h| isolate.stubs.shared(spec(h))),
            IcState::Megamorphic => None,
            _ => Some(isolate.stubs.megamorphic_stub(kind, extra)),
        };
        if let Some(stub) = stub {
            super::set_target(isolate, site, stub);
            super::trace(isolate, site, isolate.heap.name_str(name), state);
        }
    }
    Some(value)
}

fn update_caches(
    isolate: &mut Isolate,
    site: &mut CallSite,
    state: IcState,
    receiver: Value,
    name: Name,
    lookup: &LookupResult,
) {
    let heap = &isolate.heap;
    if !heap.is_js_object(receiver) || heap.is_global_proxy(receiver) {
        return;
    }
    let code = if state == IcState::Uninitialized && super::strategy(site.kind()).uses_premonomorphic {
        isolate.stubs.premonomorphic_stub(site.kind(), site.extra_ic_state())
    } else {
        let computed = match site.kind() {
            IcKind::KeyedLoad => compute_keyed_load_monomorphic(isolate, site, receiver, name, lookup),
            _ => compute_load_monomorphic(isolate, site, receiver, name, lookup),
        };
        let Some(code) = computed else {
            return;
        };
        code
    };
    super::patch_cache(isolate, site, state, receiver, name, code);
    super::trace(isolate, site, isolate.heap.name_str(name), state);
}

fn holder_of(receiver: Value, holder: ObjectId) -> Holder {
    if receiver.as_object() == Some(holder) {
        Holder::Receiver
    } else {
        Holder::Object(holder)
    }
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

fn compute_load_monomorphic(
    isolate: &mut Isolate,
    site: &CallSite,
    receiver: Value,
    name: Name,
    lookup: &LookupResult,
) -> Option<Rc<Stub>> {
    let heap = &isolate.heap;
    let (handler, holder) = match *lookup {
        LookupResult::NotFound => (Handler::LoadNonexistent, None),
        LookupResult::Property {
            holder,
            kind,
            attributes,
        } => {
            let handler = match kind {
                PropertyKind::Field(index) => Handler::LoadField {
                    holder: holder_of(receiver, holder),
                    index,
                },
                PropertyKind::Constant(value) => Handler::LoadConstant(value),
                PropertyKind::Normal => {
                    if heap.is_global_object(Value::Object(holder)) {
                        Handler::LoadGlobal {
                            global: holder,
                            dont_delete: attributes.contains(PropertyAttributes::DONT_DELETE),
                        }
                    } else if receiver.as_object() == Some(holder) {
                        Handler::LoadNormal
                    } else {
                        return None;
                    }
                }
                PropertyKind::Accessor { getter, .. } => {
                    let holder_value = Value::Object(holder);
                    let fast_holder = heap
                        .map_of(holder_value)
                        .is_some_and(|shape| !heap.shape(shape).is_dictionary);
                    if !heap.is_function(getter) || heap.is_global_object(holder_value) || !fast_holder {
                        return None;
                    }
                    Handler::LoadViaGetter {
                        holder: holder_of(receiver, holder),
                        getter,
                    }
                }
            };
            (handler, Some(holder))
        }
        LookupResult::Interceptor { holder } => (
            Handler::LoadInterceptor {
                holder: holder_of(receiver, holder),
            },
            Some(holder),
        ),
        LookupResult::Transition { .. } => return None,
    };
    compile(isolate, site, receiver, name, handler, holder)
}

/// Keyed sites specialize named loads only for fields, constants and interceptors
fn compute_keyed_load_monomorphic(
    isolate: &mut Isolate,
    site: &CallSite,
    receiver: Value,
    name: Name,
    lookup: &LookupResult,
) -> Option<Rc<Stub>> {
    let (handler, holder) = match *lookup {
        LookupResult::NotFound | LookupResult::Transition { .. } => return None,
        LookupResult::Property {
            holder,
            kind: PropertyKind::Field(index),
            ..
        } => (
            Handler::LoadField {
                holder: holder_of(receiver, holder),
                index,
            },
            holder,
        ),
        LookupResult::Property {
            holder,
            kind: PropertyKind::Constant(value),
            ..
        } => (Handler::LoadConstant(value), holder),
        LookupResult::Interceptor { holder } => (
            Handler::LoadInterceptor {
                holder: holder_of(receiver, holder),
            },
            holder,
        ),
        LookupResult::Property { .. } => {
            return Some(isolate.stubs.generic_stub(site.kind(), site.extra_ic_state()));
        }
    };
    compile(isolate, site, receiver, name, handler, Some(holder))
}
