//! Keyed load and store miss handling
//!
//! Keys that are (or convert to) names take the named paths. Integer keys on objects
//! specialize on the receiver's elements kind: one shape gives a monomorphic element
//! stub, a handful give a polymorphic one, and anything beyond
//! `max_keyed_polymorphism` shapes goes generic for good.

use std::rc::Rc;

use super::dispatch::Key;
use super::site::CallSite;
use super::state::{GrowMode, IcState};
use super::stub::{ElementLoadTarget, ElementStoreTarget, Handler, Stub, StubSpec};
use super::{load, runtime, store};
use crate::error::Result;
use crate::heap::{ElementsKind, Heap, ObjectId, ShapeId, Value, SMI_MAX, SMI_MIN};
use crate::isolate::Isolate;

/// Cheap key normalization done before a keyed miss is resolved.
///
/// Integral heap numbers become small integers; NaN, `undefined` and internalized
/// strings become names.
pub(crate) fn try_convert_key(heap: &Heap, key: Value) -> Key {
    if heap.is_heap_number(key) {
        if let Some(number) = heap.number_value(key) {
            if number.is_nan() {
                return Key::Named(heap.roots().nan);
            }
            let truncated = number as i64;
            if truncated as f64 == number && (i64::from(SMI_MIN)..=i64::from(SMI_MAX)).contains(&truncated) {
                return Key::Keyed(Value::Smi(truncated as i32));
            }
        }
        return Key::Keyed(key);
    }
    if key == Value::Undefined {
        return Key::Named(heap.roots().undefined);
    }
    match Key::Keyed(key).name(heap) {
        Some(name) => Key::Named(name),
        None => Key::Keyed(key),
    }
}

fn elements_kind(heap: &Heap, shape: ShapeId) -> ElementsKind {
    heap.shape(shape).elements_kind
}

fn targets_handler(site: &CallSite, handler: &Handler) -> bool {
    site.target().handler() == handler
}

// ==================== Loads ====================

/// Resolve a missed `receiver[key]`
pub(crate) fn resolve_keyed_load(
    isolate: &mut Isolate,
    site: &mut CallSite,
    receiver: Value,
    key: Value,
    force_generic: bool,
) -> Result<Value> {
    let key = match try_convert_key(&isolate.heap, key) {
        Key::Named(name) => return load::resolve_load(isolate, site, receiver, name),
        Key::Keyed(key) => key,
    };
    let state = site.target_state();
    if isolate.config.use_ic {
        let heap = &isolate.heap;
        let stub = if force_generic {
            super::trace_generic(isolate, site, "force generic");
            isolate.stubs.generic_stub(site.kind(), site.extra_ic_state())
        } else if heap.is_string(receiver) && heap.is_number(key) {
            if state == IcState::Uninitialized {
                string_stub(isolate, site)
            } else {
                isolate.stubs.generic_stub(site.kind(), site.extra_ic_state())
            }
        } else if heap.is_non_strict_arguments(receiver) {
            let spec = StubSpec::new(
                site.kind(),
                IcState::Monomorphic,
                site.extra_ic_state(),
                Handler::LoadNonStrictArguments,
            );
            isolate.stubs.shared(spec)
        } else if heap.is_js_object(receiver)
            && key.is_smi()
            && !targets_handler(site, &Handler::LoadNonStrictArguments)
        {
            load_element_stub(isolate, site, receiver)
        } else {
            isolate.stubs.generic_stub(site.kind(), site.extra_ic_state())
        };
        super::set_target(isolate, site, stub);
        super::trace(isolate, site, isolate.heap.to_display_string(key), state);
    }
    runtime::get_keyed(&mut isolate.heap, receiver, key)
}

fn string_stub(isolate: &mut Isolate, site: &CallSite) -> Rc<Stub> {
    let spec = StubSpec::new(
        site.kind(),
        IcState::Monomorphic,
        site.extra_ic_state(),
        Handler::LoadIndexedString,
    );
    isolate.stubs.shared(spec)
}

fn monomorphic_element_load(isolate: &mut Isolate, site: &CallSite, shape: ShapeId) -> Rc<Stub> {
    let kind = elements_kind(&isolate.heap, shape);
    let spec = StubSpec::new(
        site.kind(),
        IcState::Monomorphic,
        site.extra_ic_state(),
        Handler::LoadElement(kind),
    )
    .with_receiver_shapes(vec![shape]);
    isolate.stubs.shared(spec)
}

/// Element load stub for `receiver` given what the site has seen so far
fn load_element_stub(isolate: &mut Isolate, site: &CallSite, receiver: Value) -> Rc<Stub> {
    let extra = site.extra_ic_state();
    let Some(receiver_shape) = isolate.heap.map_of(receiver) else {
        return isolate.stubs.generic_stub(site.kind(), extra);
    };
    let target = Rc::clone(site.target());
    let state = target.state();
    if matches!(state, IcState::Uninitialized | IcState::Premonomorphic) {
        return monomorphic_element_load(isolate, site, receiver_shape);
    }

    let is_string_stub = matches!(target.handler(), Handler::LoadIndexedString);
    let mut shapes = if is_string_stub {
        vec![isolate.heap.roots().string_shape]
    } else {
        target.receiver_shapes().to_vec()
    };
    if shapes.is_empty() {
        return monomorphic_element_load(isolate, site, receiver_shape);
    }
    let heap = &isolate.heap;
    if state == IcState::Monomorphic
        && elements_kind(heap, shapes[0]).is_more_general_transition(elements_kind(heap, receiver_shape))
    {
        // Most receivers that transition once stay transitioned
        return monomorphic_element_load(isolate, site, receiver_shape);
    }

    if shapes.contains(&receiver_shape) {
        super::trace_generic(isolate, site, "same shape added twice");
        return isolate.stubs.generic_stub(site.kind(), extra);
    }
    shapes.push(receiver_shape);
    if shapes.len() > isolate.config.max_keyed_polymorphism {
        super::trace_generic(isolate, site, "max polymorph exceeded");
        return isolate.stubs.generic_stub(site.kind(), extra);
    }

    let string_shape = heap.roots().string_shape;
    let targets = shapes
        .iter()
        .map(|&shape| {
            if shape == string_shape {
                ElementLoadTarget::String
            } else {
                ElementLoadTarget::Elements(elements_kind(heap, shape))
            }
        })
        .collect();
    let spec = StubSpec::new(
        site.kind(),
        IcState::Polymorphic,
        extra,
        Handler::LoadElementPolymorphic(targets),
    )
    .with_receiver_shapes(shapes);
    isolate.stubs.shared(spec)
}

// ==================== Stores ====================

/// Resolve a missed `receiver[key] = value`
pub(crate) fn resolve_keyed_store(
    isolate: &mut Isolate,
    site: &mut CallSite,
    receiver: Value,
    key: Value,
    value: Value,
    force_generic: bool,
) -> Result<Value> {
    let strict = site.extra_ic_state().strict_mode.is_strict();
    let key = match try_convert_key(&isolate.heap, key) {
        Key::Named(name) => return store::resolve_store(isolate, site, receiver, name, value),
        Key::Keyed(key) => key,
    };
    let state = site.target_state();
    if isolate.config.use_ic {
        let heap = &isolate.heap;
        let object = receiver.as_object().filter(|_| heap.is_js_object(receiver));
        let stub = match object {
            _ if force_generic => {
                super::trace_generic(isolate, site, "force generic");
                isolate.stubs.generic_stub(site.kind(), site.extra_ic_state())
            }
            Some(_) if heap.is_non_strict_arguments(receiver) => {
                let spec = StubSpec::new(
                    site.kind(),
                    IcState::Monomorphic,
                    site.extra_ic_state(),
                    Handler::StoreNonStrictArguments,
                );
                isolate.stubs.shared(spec)
            }
            Some(object) if key.is_smi() && !targets_handler(site, &Handler::StoreNonStrictArguments) => {
                let (transition, grow) = store_stub_kind(heap, object, key, value);
                store_element_stub(isolate, site, object, transition, grow)
            }
            _ => isolate.stubs.generic_stub(site.kind(), site.extra_ic_state()),
        };
        super::set_target(isolate, site, stub);
        super::trace(isolate, site, isolate.heap.to_display_string(key), state);
    }
    runtime::set_keyed(&mut isolate.heap, receiver, key, value, strict)
}

/// Elements kind the store forces `object` into, and whether it appends to an array
fn store_stub_kind(heap: &Heap, object: ObjectId, key: Value, value: Value) -> (Option<ElementsKind>, GrowMode) {
    let receiver = Value::Object(object);
    let kind = heap.elements_kind_of(receiver).unwrap_or(ElementsKind::Holey);
    let grow = match (heap.array_length(receiver), key.as_smi()) {
        (Some(length), Some(index)) if index >= 0 && index as usize >= length => GrowMode::AllowGrowth,
        _ => GrowMode::DoNotAllowGrowth,
    };
    let required = kind.union(heap.elements_kind_for(value));
    let transition =
        (required.storage() != kind.storage()).then(|| ElementsKind::from_parts(required.storage(), kind.is_holey()));
    (transition, grow)
}

fn monomorphic_element_store(isolate: &mut Isolate, site: &CallSite, shape: ShapeId, grow: GrowMode) -> Rc<Stub> {
    let kind = elements_kind(&isolate.heap, shape);
    let spec = StubSpec::new(
        site.kind(),
        IcState::Monomorphic,
        site.extra_ic_state().with_grow_mode(grow),
        Handler::StoreElement { kind, grow },
    )
    .with_receiver_shapes(vec![shape]);
    isolate.stubs.shared(spec)
}

/// Element store stub for `object` given what the site has seen so far
fn store_element_stub(
    isolate: &mut Isolate,
    site: &CallSite,
    object: ObjectId,
    transition: Option<ElementsKind>,
    grow: GrowMode,
) -> Rc<Stub> {
    let extra = site.extra_ic_state();
    let Some(receiver_shape) = isolate.heap.map_of(Value::Object(object)) else {
        return isolate.stubs.generic_stub(site.kind(), extra);
    };
    let transitioned = match transition {
        Some(kind) => isolate.heap.elements_transition_shape(receiver_shape, kind),
        None => receiver_shape,
    };
    let target = Rc::clone(site.target());
    let state = target.state();
    let mut shapes = target.receiver_shapes().to_vec();
    if matches!(state, IcState::Uninitialized | IcState::Premonomorphic) || shapes.is_empty() {
        return monomorphic_element_store(isolate, site, transitioned, grow);
    }
    let heap = &isolate.heap;
    if state == IcState::Monomorphic
        && transition.is_some()
        && elements_kind(heap, shapes[0]).is_more_general_transition(elements_kind(heap, receiver_shape))
    {
        return monomorphic_element_store(isolate, site, transitioned, grow);
    }

    let mut added = false;
    for shape in [receiver_shape, transitioned] {
        if !shapes.contains(&shape) {
            shapes.push(shape);
            added = true;
        }
    }
    if !added {
        super::trace_generic(isolate, site, "same shape added twice");
        return isolate.stubs.generic_stub(site.kind(), extra);
    }
    if shapes.len() > isolate.config.max_keyed_polymorphism {
        super::trace_generic(isolate, site, "max polymorph exceeded");
        return isolate.stubs.generic_stub(site.kind(), extra);
    }

    let grow = if extra.grow_mode == GrowMode::AllowGrowth {
        GrowMode::AllowGrowth
    } else {
        grow
    };
    let targets = shapes
        .iter()
        .map(|&shape| match most_general_transition(heap, shape, &shapes) {
            Some(to) => ElementStoreTarget::TransitionAndStore {
                to,
                kind: elements_kind(heap, to),
            },
            None => ElementStoreTarget::Store {
                kind: elements_kind(heap, shape),
            },
        })
        .collect();
    let spec = StubSpec::new(
        site.kind(),
        IcState::Polymorphic,
        extra.with_grow_mode(grow),
        Handler::StoreElementPolymorphic(targets),
    )
    .with_receiver_shapes(shapes);
    isolate.stubs.shared(spec)
}

/// The most general listed shape `shape` has an elements transition to
fn most_general_transition(heap: &Heap, shape: ShapeId, shapes: &[ShapeId]) -> Option<ShapeId> {
    shapes
        .iter()
        .copied()
        .filter(|&other| other != shape && heap.shape(shape).elements_transition_for(elements_kind(heap, other)) == Some(other))
        .max_by_key(|&other| {
            let kind = elements_kind(heap, other);
            (kind.storage(), kind.is_holey())
        })
}
