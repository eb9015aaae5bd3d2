//! Stub compilation
//!
//! [`StubCompiler`] turns a [`StubSpec`] into a shared [`Stub`]. Identical specs always
//! produce the same stub, so a site that re-specializes to an equivalent handler keeps
//! the same identity. Named monomorphic stubs are additionally registered in the code
//! cache of the shape that holds them, which is what prototype-failure detection
//! consults later.

use std::rc::Rc;

use rustc_hash::FxHashMap as HashMap;

use super::state::{ExtraIcState, IcKind, IcState};
use super::stub::{CacheHolder, Handler, Holder, Stub, StubId, StubSpec};
use crate::heap::{Heap, Name, ObjectId, ShapeId, Value};

#[derive(Debug, Default)]
pub struct StubCompiler {
    next_id: u32,
    compiled: HashMap<StubSpec, Rc<Stub>>,
}

impl StubCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stub for `spec`, compiling it on first request
    pub fn shared(&mut self, spec: StubSpec) -> Rc<Stub> {
        if let Some(stub) = self.compiled.get(&spec) {
            return Rc::clone(stub);
        }
        let id = StubId(self.next_id);
        self.next_id += 1;
        let stub = Rc::new(Stub::new(id, spec.clone()));
        self.compiled.insert(spec, Rc::clone(&stub));
        stub
    }

    /// A monomorphic stub for `name`, registered in `cache_shape`'s code cache
    pub fn monomorphic(&mut self, heap: &mut Heap, cache_shape: ShapeId, name: Name, spec: StubSpec) -> Rc<Stub> {
        if let Some(stub) = heap
            .shape(cache_shape)
            .find_in_code_cache(name, |stub| stub.spec() == &spec)
        {
            return stub;
        }
        let stub = self.shared(spec);
        heap.shape_mut(cache_shape).update_code_cache(name, Rc::clone(&stub));
        stub
    }

    pub fn initialize_stub(&mut self, kind: IcKind, extra: ExtraIcState) -> Rc<Stub> {
        self.shared(StubSpec::new(kind, IcState::Uninitialized, extra, Handler::Initialize))
    }

    pub fn premonomorphic_stub(&mut self, kind: IcKind, extra: ExtraIcState) -> Rc<Stub> {
        self.shared(StubSpec::new(kind, IcState::Premonomorphic, extra, Handler::Premonomorphic))
    }

    /// Keyed loads and stores have no megamorphic probe and go generic instead
    pub fn megamorphic_stub(&mut self, kind: IcKind, extra: ExtraIcState) -> Rc<Stub> {
        if matches!(kind, IcKind::KeyedLoad | IcKind::KeyedStore) {
            return self.generic_stub(kind, extra);
        }
        self.shared(StubSpec::new(kind, IcState::Megamorphic, extra, Handler::Megamorphic))
    }

    pub fn generic_stub(&mut self, kind: IcKind, extra: ExtraIcState) -> Rc<Stub> {
        self.shared(StubSpec::new(kind, IcState::Generic, extra, Handler::Generic))
    }

    /// Number of distinct stubs compiled so far
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Shape a stub guards the receiver with.
///
/// Small integers are checked against the heap-number shape; other immediates have no
/// shape and cannot be specialized on.
pub(crate) fn receiver_shape(heap: &Heap, receiver: Value) -> Option<ShapeId> {
    match receiver {
        Value::Smi(_) => Some(heap.roots().heap_number_shape),
        _ => heap.map_of(receiver),
    }
}

/// Where stubs for `receiver` are registered
pub(crate) fn cache_holder_for(heap: &Heap, receiver: Value) -> CacheHolder {
    if heap.is_js_object(receiver) {
        CacheHolder::OwnShape
    } else {
        CacheHolder::PrototypeShape
    }
}

/// Shape whose code cache holds stubs of the given holder kind for `receiver`
pub(crate) fn code_cache_shape(heap: &Heap, receiver: Value, holder: CacheHolder) -> Option<ShapeId> {
    match holder {
        CacheHolder::OwnShape => {
            if heap.is_js_object(receiver) {
                heap.map_of(receiver)
            } else {
                None
            }
        }
        CacheHolder::PrototypeShape => {
            let prototype = heap.get_prototype(receiver);
            if prototype.is_null() {
                None
            } else {
                heap.map_of(prototype)
            }
        }
    }
}

/// Checks guarding a read of `name` along `receiver`'s prototype chain
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ChainGuards {
    pub prototype_checks: Vec<(ObjectId, ShapeId)>,
    pub absent_checks: Vec<Holder>,
}

/// Guards for the objects between `receiver` and `holder`.
///
/// Fast-mode prototypes are pinned by shape, the holder included. Dictionary-mode
/// objects cannot be pinned that way and are checked for not owning the name instead.
/// With no holder the whole chain is covered.
pub(crate) fn chain_guards(heap: &Heap, receiver: Value, holder: Option<ObjectId>) -> ChainGuards {
    let mut guards = ChainGuards::default();
    if let Some((id, object)) = heap.as_js_object(receiver) {
        if Some(id) == holder {
            return guards;
        }
        if heap.shape(object.shape).is_dictionary {
            guards.absent_checks.push(Holder::Receiver);
        }
    }
    let mut current = heap.get_prototype(receiver);
    while let Some((id, object)) = heap.as_js_object(current) {
        let shape = object.shape;
        if Some(id) == holder {
            guards.prototype_checks.push((id, shape));
            break;
        }
        if heap.shape(shape).is_dictionary {
            guards.absent_checks.push(Holder::Object(id));
        } else {
            guards.prototype_checks.push((id, shape));
        }
        current = heap.get_prototype(current);
    }
    guards
}

/// A monomorphic spec for `receiver` carrying the chain guards up to `holder`
pub(crate) fn monomorphic_spec(
    heap: &Heap,
    kind: IcKind,
    extra: ExtraIcState,
    handler: Handler,
    receiver: Value,
    holder: Option<ObjectId>,
    name: Name,
) -> Option<StubSpec> {
    let shape = receiver_shape(heap, receiver)?;
    let guards = chain_guards(heap, receiver, holder);
    Some(
        StubSpec::new(kind, IcState::Monomorphic, extra, handler)
            .with_name(name)
            .with_receiver_shapes(vec![shape])
            .with_prototype_checks(guards.prototype_checks)
            .with_absent_checks(guards.absent_checks)
            .with_cache_holder(cache_holder_for(heap, receiver)),
    )
}

/// Compile `spec` and register it in the code cache matching its holder kind
pub(crate) fn compile_monomorphic(
    stubs: &mut StubCompiler,
    heap: &mut Heap,
    receiver: Value,
    name: Name,
    spec: StubSpec,
) -> Option<Rc<Stub>> {
    let cache_shape = code_cache_shape(heap, receiver, spec.cache_holder)?;
    Some(stubs.monomorphic(heap, cache_shape, name, spec))
}
