//! Call miss handling
//!
//! A call site resolves the function to invoke; the caller performs the invocation.
//! Unlike loads, a monomorphic call site decides between prototype failure, a refined
//! extra state and going megamorphic only once it knows what it would patch in.

use std::rc::Rc;

use super::compiler::{compile_monomorphic, monomorphic_spec};
use super::dispatch::{probe_shape, Key};
use super::site::CallSite;
use super::state::{ExtraIcState, IcKind, IcState, StringStubState};
use super::stub::{Handler, Holder, Stub, StubSpec};
use super::runtime;
use crate::error::{messages, Error, Result};
use crate::heap::{BuiltinFunctionId, Heap, LookupResult, Name, ObjectId, PropertyKind, Value};
use crate::isolate::Isolate;

/// Whether calling string builtin `function` on `receiver` reads past either end
pub(crate) fn string_index_out_of_bounds(heap: &Heap, function: Value, receiver: Value, args: &[Value]) -> bool {
    let is_string_builtin = heap
        .function_shared(function)
        .and_then(|shared| shared.builtin)
        .is_some_and(|id| matches!(id, BuiltinFunctionId::StringCharAt | BuiltinFunctionId::StringCharCodeAt));
    if !is_string_builtin {
        return false;
    }
    let (Some(length), Some(index)) = (
        heap.string_length(receiver).filter(|_| heap.is_string(receiver)),
        args.first().and_then(|&arg| heap.number_value(arg)),
    ) else {
        return false;
    };
    let index = if index.is_nan() { 0.0 } else { index.trunc() };
    index < 0.0 || index >= length as f64
}

fn not_found(heap: &Heap, receiver: Value, name: Name) -> Error {
    if heap.is_global_object(receiver) {
        Error::reference_error(messages::NOT_DEFINED, messages::not_defined(heap.name_str(name)))
    } else {
        Error::type_error(
            messages::UNDEFINED_METHOD,
            messages::undefined_method(heap.name_str(name), &heap.describe(receiver)),
        )
    }
}

fn not_a_function(heap: &Heap, receiver: Value, key: &str) -> Error {
    Error::type_error(
        messages::PROPERTY_NOT_FUNCTION,
        messages::property_not_function(key, &heap.describe(receiver)),
    )
}

fn non_object_call(heap: &Heap, receiver: Value, key: &str) -> Error {
    Error::type_error(
        messages::NON_OBJECT_PROPERTY_CALL,
        messages::non_object_property_call(key, &heap.describe(receiver)),
    )
}

/// An interceptor that neither serves `name` nor has a real property behind it
fn interceptor_absent(heap: &Heap, lookup: &LookupResult, name: Name) -> bool {
    let LookupResult::Interceptor { holder } = *lookup else {
        return false;
    };
    heap.interceptor_value(holder, name).is_none()
        && !heap.local_lookup_real_named_property(holder, name).is_found()
        && !heap.lookup_real_named_property_in_prototypes(holder, name).is_found()
}

/// Resolve the function a missed `receiver.name(...args)` invokes
pub(crate) fn resolve_call(
    isolate: &mut Isolate,
    site: &mut CallSite,
    receiver: Value,
    name: Name,
    args: &[Value],
) -> Result<Value> {
    if receiver.is_nullish() {
        let heap = &isolate.heap;
        return Err(non_object_call(heap, receiver, heap.name_str(name)));
    }
    let state = super::state_from(isolate, site, receiver, Some(name));

    if let Some(index) = isolate.heap.name_as_array_index(name) {
        let element = isolate.heap.get_element(receiver, index)?;
        if isolate.heap.is_callable(element) {
            return Ok(element);
        }
    }

    let lookup = isolate.heap.lookup(receiver, name);
    if !lookup.is_found() {
        return Err(not_found(&isolate.heap, receiver, name));
    }
    if isolate.config.use_ic {
        update_caches(isolate, site, state, receiver, name, &lookup, args);
    }

    let heap = &mut isolate.heap;
    if interceptor_absent(heap, &lookup, name) {
        return Err(not_found(heap, receiver, name));
    }
    let callee = heap.get_property_with_lookup(receiver, &lookup, name)?;
    if heap.is_callable(callee) {
        Ok(callee)
    } else {
        Err(not_a_function(heap, receiver, heap.name_str(name)))
    }
}

/// Resolve the function a missed `receiver[key](...args)` invokes
pub(crate) fn resolve_keyed_call(
    isolate: &mut Isolate,
    site: &mut CallSite,
    receiver: Value,
    key: Value,
    args: &[Value],
) -> Result<Value> {
    if let Some(name) = Key::Keyed(key).name(&isolate.heap) {
        return resolve_call(isolate, site, receiver, name, args);
    }
    if receiver.is_nullish() {
        let heap = &isolate.heap;
        return Err(non_object_call(heap, receiver, &heap.to_display_string(key)));
    }
    let state = site.target_state();
    if isolate.config.use_ic && state != IcState::Megamorphic {
        let extra = site.extra_ic_state();
        let stub = if isolate.heap.is_non_strict_arguments(receiver) {
            let spec = StubSpec::new(site.kind(), IcState::Megamorphic, extra, Handler::CallArguments);
            isolate.stubs.shared(spec)
        } else {
            isolate.stubs.megamorphic_stub(site.kind(), extra)
        };
        super::set_target(isolate, site, stub);
        super::trace(isolate, site, isolate.heap.to_display_string(key), state);
    }
    let heap = &mut isolate.heap;
    let callee = runtime::get_keyed(heap, receiver, key)?;
    if heap.is_callable(callee) {
        Ok(callee)
    } else {
        Err(not_a_function(heap, receiver, &heap.to_display_string(key)))
    }
}

/// Whether any dictionary-mode object sits between `receiver` and `holder`
fn has_normal_objects_in_chain(heap: &Heap, receiver: Value, holder: ObjectId) -> bool {
    let mut current = receiver;
    while current.as_object() != Some(holder) {
        match heap.as_js_object(current) {
            Some((_, object)) if heap.shape(object.shape).is_dictionary => return true,
            _ => {}
        }
        let next = heap.get_prototype(current);
        if next.is_null() || next == current {
            return false;
        }
        current = next;
    }
    false
}

/// A refined extra state when a string builtin was just called out of bounds
fn try_update_extra_ic_state(
    heap: &Heap,
    lookup: &LookupResult,
    receiver: Value,
    extra: ExtraIcState,
    args: &[Value],
) -> Option<ExtraIcState> {
    let LookupResult::Property {
        kind: PropertyKind::Constant(function),
        ..
    } = *lookup
    else {
        return None;
    };
    if extra.string_stub != StringStubState::Default || !string_index_out_of_bounds(heap, function, receiver, args) {
        return None;
    }
    Some(extra.with_string_stub(StringStubState::IndexOutOfBounds))
}

fn update_caches(
    isolate: &mut Isolate,
    site: &mut CallSite,
    mut state: IcState,
    receiver: Value,
    name: Name,
    lookup: &LookupResult,
    args: &[Value],
) {
    let Some(holder) = lookup.holder().filter(|_| lookup.is_property() || lookup.is_interceptor()) else {
        return;
    };
    if receiver.as_object() != Some(holder) && has_normal_objects_in_chain(&isolate.heap, receiver, holder) {
        return;
    }
    let kind = site.kind();
    let extra = site.extra_ic_state();
    let code = match state {
        IcState::Uninitialized if super::strategy(kind).uses_premonomorphic => {
            Some(isolate.stubs.premonomorphic_stub(kind, extra))
        }
        IcState::Monomorphic => {
            let refined = match kind {
                IcKind::Call => try_update_extra_ic_state(&isolate.heap, lookup, receiver, extra, args),
                _ => None,
            };
            if let Some(refined) = refined {
                compute_monomorphic(isolate, site, refined, receiver, name, lookup)
            } else if kind == IcKind::Call
                && super::try_remove_invalid_prototype_dependent_stub(isolate, &Rc::clone(site.target()), receiver, name)
            {
                state = IcState::MonomorphicPrototypeFailure;
                compute_monomorphic(isolate, site, extra, receiver, name, lookup)
            } else {
                Some(isolate.stubs.megamorphic_stub(kind, extra))
            }
        }
        _ => compute_monomorphic(isolate, site, extra, receiver, name, lookup),
    };
    let Some(code) = code else {
        return;
    };

    match state {
        IcState::Uninitialized | IcState::Premonomorphic | IcState::MonomorphicPrototypeFailure => {
            super::set_target(isolate, site, code);
        }
        IcState::Monomorphic => {
            if code.state() != IcState::Monomorphic {
                let old = Rc::clone(site.target());
                if let Some(shape) = super::megamorphic_cache_shape(&old) {
                    isolate.stub_cache.set(name, shape, old);
                }
            }
            super::set_target(isolate, site, code);
        }
        IcState::Megamorphic => {
            if let Some(shape) = probe_shape(&isolate.heap, kind, receiver) {
                isolate.stub_cache.set(name, shape, code);
            }
        }
        IcState::Polymorphic | IcState::Generic | IcState::DebugStub => {}
    }
    super::trace(isolate, site, isolate.heap.name_str(name), state);
}

fn holder_of(receiver: Value, holder: ObjectId) -> Holder {
    if receiver.as_object() == Some(holder) {
        Holder::Receiver
    } else {
        Holder::Object(holder)
    }
}

fn compute_monomorphic(
    isolate: &mut Isolate,
    site: &CallSite,
    extra: ExtraIcState,
    receiver: Value,
    name: Name,
    lookup: &LookupResult,
) -> Option<Rc<Stub>> {
    let heap = &isolate.heap;
    let (handler, holder) = match *lookup {
        LookupResult::Property {
            holder,
            kind: PropertyKind::Field(index),
            ..
        } => (
            Handler::CallField {
                holder: holder_of(receiver, holder),
                index,
            },
            holder,
        ),
        LookupResult::Property {
            holder,
            kind: PropertyKind::Constant(function),
            ..
        } if heap.is_function(function) => (Handler::CallConstant { function }, holder),
        LookupResult::Property {
            holder,
            kind: PropertyKind::Normal,
            ..
        } if heap.is_js_object(receiver) => {
            if heap.is_global_object(Value::Object(holder)) {
                let function = heap.dictionary_value(holder, name).filter(|&f| heap.is_function(f))?;
                (Handler::CallGlobal { global: holder, function }, holder)
            } else if receiver.as_object() == Some(holder) {
                (Handler::CallNormal, holder)
            } else {
                return None;
            }
        }
        LookupResult::Interceptor { holder } => (
            Handler::CallInterceptor {
                holder: holder_of(receiver, holder),
            },
            holder,
        ),
        _ => return None,
    };
    let spec = monomorphic_spec(heap, site.kind(), extra, handler, receiver, Some(holder), name)?;
    compile_monomorphic(&mut isolate.stubs, &mut isolate.heap, receiver, name, spec)
}
