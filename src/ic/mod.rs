//! Inline caches
//!
//! Every property access, call, comparison and arithmetic operation in optimized code
//! goes through a [`CallSite`]. The site holds a [`Stub`]; running the stub either
//! produces the result (a hit) or misses into a resolver that looks the operation up
//! generically, picks a better stub and patches the site.
//!
//! Property sites move through the states
//!
//! ```text
//! Uninitialized -> Premonomorphic -> Monomorphic -> Megamorphic
//!                                        |   ^
//!                                        v   |
//!                          MonomorphicPrototypeFailure
//! ```
//!
//! Keyed element sites go `Monomorphic -> Polymorphic -> Generic` instead of through the
//! megamorphic stub cache. `Generic` is terminal.
//!
//! | kind       | premonomorphic | prototype failure | megamorphic cache |
//! |------------|----------------|-------------------|-------------------|
//! | Load       | yes            | on miss           | yes               |
//! | KeyedLoad  | yes            | no                | no                |
//! | Store      | yes            | on miss           | yes               |
//! | KeyedStore | yes            | no                | no                |
//! | Call       | yes            | on cache update   | yes               |
//! | KeyedCall  | yes            | no                | yes               |

pub mod arith;
mod call;
pub mod compare;
pub mod compiler;
pub(crate) mod dispatch;
mod keyed;
mod load;
pub mod runtime;
pub mod site;
pub mod state;
mod store;
pub mod stub;
pub mod stub_cache;

use std::fmt;
use std::rc::Rc;

pub use arith::{
    BinaryOpStub, BinaryOperation, BinaryTypeInfo, ToBooleanTypes, UnaryOpStub, UnaryOperation, UnaryTypeInfo,
};
pub use compare::{CompareOp, CompareState, CompareStub};
pub use compiler::StubCompiler;
pub use site::CallSite;
pub use state::{ExtraIcState, GrowMode, IcKind, IcState, StrictMode, StringStubState};
pub use stub::{CacheHolder, Handler, Holder, Stub, StubId, StubSpec};
pub use stub_cache::{StubCache, StubCacheStats};

pub(crate) use call::{resolve_call, resolve_keyed_call};
pub(crate) use keyed::{resolve_keyed_load, resolve_keyed_store};
pub(crate) use load::resolve_load;
pub(crate) use store::resolve_store;

use crate::heap::{Name, ShapeId, Value};
use crate::isolate::Isolate;
use compiler::code_cache_shape;
use dispatch::probe_shape;

/// When a kind checks for prototype-chain changes behind a monomorphic miss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrototypeFailure {
    Never,
    /// Before the miss is resolved
    OnMiss,
    /// Only once the resolver has a replacement stub
    OnCacheUpdate,
}

/// Per-kind policy for the property state machine
#[derive(Debug, Clone, Copy)]
pub(crate) struct IcStrategy {
    pub kind: IcKind,
    pub uses_premonomorphic: bool,
    pub prototype_failure: PrototypeFailure,
    pub updates_megamorphic_cache: bool,
}

const fn strategy_for(
    kind: IcKind,
    uses_premonomorphic: bool,
    prototype_failure: PrototypeFailure,
    updates_megamorphic_cache: bool,
) -> IcStrategy {
    IcStrategy {
        kind,
        uses_premonomorphic,
        prototype_failure,
        updates_megamorphic_cache,
    }
}

const STRATEGIES: [IcStrategy; 10] = [
    strategy_for(IcKind::Load, true, PrototypeFailure::OnMiss, true),
    strategy_for(IcKind::KeyedLoad, true, PrototypeFailure::Never, false),
    strategy_for(IcKind::Store, true, PrototypeFailure::OnMiss, true),
    strategy_for(IcKind::KeyedStore, true, PrototypeFailure::Never, false),
    strategy_for(IcKind::Call, true, PrototypeFailure::OnCacheUpdate, true),
    strategy_for(IcKind::KeyedCall, true, PrototypeFailure::Never, true),
    strategy_for(IcKind::Compare, false, PrototypeFailure::Never, false),
    strategy_for(IcKind::UnaryOp, false, PrototypeFailure::Never, false),
    strategy_for(IcKind::BinaryOp, false, PrototypeFailure::Never, false),
    strategy_for(IcKind::ToBoolean, false, PrototypeFailure::Never, false),
];

pub(crate) fn strategy(kind: IcKind) -> &'static IcStrategy {
    &STRATEGIES[kind.index()]
}

/// The state a miss at `site` should be resolved from.
///
/// A monomorphic site that misses on a receiver whose own code cache still holds the
/// site's stub can only have missed because a prototype changed. That stub is dropped
/// from the code cache and the site reports `MonomorphicPrototypeFailure`, which lets it
/// re-specialize in place instead of going megamorphic.
pub(crate) fn state_from(isolate: &mut Isolate, site: &CallSite, receiver: Value, name: Option<Name>) -> IcState {
    let state = site.target_state();
    let Some(name) = name else {
        return state;
    };
    if state != IcState::Monomorphic || receiver.is_nullish() {
        return state;
    }
    if strategy(site.kind()).prototype_failure != PrototypeFailure::OnMiss {
        return state;
    }
    if try_remove_invalid_prototype_dependent_stub(isolate, site.target(), receiver, name) {
        IcState::MonomorphicPrototypeFailure
    } else {
        state
    }
}

/// Drop `target` from the code cache it was registered in for `receiver`.
///
/// Returns whether it was there.
pub(crate) fn try_remove_invalid_prototype_dependent_stub(
    isolate: &mut Isolate,
    target: &Stub,
    receiver: Value,
    name: Name,
) -> bool {
    let heap = &mut isolate.heap;
    let Some(shape) = code_cache_shape(heap, receiver, target.cache_holder()) else {
        return false;
    };
    match heap.shape(shape).index_in_code_cache(name, target) {
        Some(index) => {
            heap.shape_mut(shape).remove_from_code_cache(name, index);
            true
        }
        None => false,
    }
}

fn update_megamorphic_cache(isolate: &mut Isolate, name: Name, shape: ShapeId, stub: Rc<Stub>) {
    isolate.stub_cache.set(name, shape, stub);
}

/// Shape a megamorphic probe would find `stub` under.
///
/// Stubs for primitive receivers are probed by their prototype's shape, which is the
/// first prototype they pin.
pub(crate) fn megamorphic_cache_shape(stub: &Stub) -> Option<ShapeId> {
    match stub.cache_holder() {
        CacheHolder::OwnShape => stub.find_first_shape(),
        CacheHolder::PrototypeShape => stub.prototype_checks().first().map(|&(_, shape)| shape),
    }
}

/// Install `code` at `site` according to the state the miss was resolved from
pub(crate) fn patch_cache(
    isolate: &mut Isolate,
    site: &mut CallSite,
    state: IcState,
    receiver: Value,
    name: Name,
    code: Rc<Stub>,
) {
    let kind = site.kind();
    let policy = strategy(kind);
    match state {
        IcState::Uninitialized | IcState::Premonomorphic | IcState::MonomorphicPrototypeFailure => {
            set_target(isolate, site, code);
        }
        IcState::Monomorphic => {
            if site.target().id() == code.id() {
                return;
            }
            if policy.updates_megamorphic_cache {
                let old = Rc::clone(site.target());
                if let Some(shape) = megamorphic_cache_shape(&old) {
                    update_megamorphic_cache(isolate, name, shape, old);
                }
                if let Some(shape) = probe_shape(&isolate.heap, kind, receiver) {
                    update_megamorphic_cache(isolate, name, shape, code);
                }
            }
            let megamorphic = isolate.stubs.megamorphic_stub(kind, site.extra_ic_state());
            set_target(isolate, site, megamorphic);
        }
        IcState::Megamorphic => {
            if policy.updates_megamorphic_cache {
                if let Some(shape) = probe_shape(&isolate.heap, kind, receiver) {
                    update_megamorphic_cache(isolate, name, shape, code);
                }
            }
        }
        IcState::Polymorphic => {
            let generic = isolate.stubs.generic_stub(kind, site.extra_ic_state());
            set_target(isolate, site, generic);
        }
        IcState::Generic | IcState::DebugStub => {}
    }
}

/// Patch `site` to `stub`, unless inline caching is turned off
pub(crate) fn set_target(isolate: &Isolate, site: &mut CallSite, stub: Rc<Stub>) {
    if !isolate.config.use_ic {
        return;
    }
    site.patch(stub);
}

/// Emit the `[Kind (old->new) #key]` trace line for a resolved miss
pub(crate) fn trace(isolate: &Isolate, site: &CallSite, key: impl fmt::Display, old: IcState) {
    if !isolate.config.trace_ic {
        return;
    }
    tracing::debug!(
        target: "bailout::ic",
        "[{} ({}->{}) #{}]",
        site.kind(),
        old.transition_mark(),
        site.state().transition_mark(),
        key
    );
}

/// Log why a site gave up on specializing
pub(crate) fn trace_generic(isolate: &Isolate, site: &CallSite, reason: &str) {
    if isolate.config.trace_ic {
        tracing::debug!(target: "bailout::ic", "[{}: going generic ({})]", site.kind(), reason);
    }
}

/// Reset `site` to its initial stub.
///
/// Type-feedback sites keep what they learned, except comparisons specialized on a
/// particular object shape, which go back to uninitialized.
pub fn clear(isolate: &mut Isolate, site: &mut CallSite) {
    let target = Rc::clone(site.target());
    if target.state() == IcState::Uninitialized {
        return;
    }
    let kind = site.kind();
    let replacement = match (kind, target.handler()) {
        (IcKind::Compare, Handler::Compare(stub)) if stub.state == CompareState::KnownObject => {
            isolate.stubs.shared(CompareStub::uninitialized(stub.op).spec())
        }
        (IcKind::Compare | IcKind::UnaryOp | IcKind::BinaryOp | IcKind::ToBoolean, _) => return,
        _ => isolate.stubs.initialize_stub(kind, site.extra_ic_state()),
    };
    tracing::trace!(target: "bailout::ic", kind = %kind, from = %target, "clearing inline cache");
    site.patch(replacement);
}
