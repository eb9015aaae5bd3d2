//! Call sites
//!
//! A [`CallSite`] is the mutable cell generated code dispatches through. It holds the
//! current stub and the first shape that stub checks. Patching writes the stub first and
//! the shape second, so a re-entrant miss handler that reads the site between the two
//! writes sees a stale shape next to a valid stub, never the reverse.

use std::rc::Rc;

use super::state::{ExtraIcState, IcKind, IcState};
use super::stub::Stub;
use crate::heap::ShapeId;

#[derive(Debug, Clone)]
pub struct CallSite {
    kind: IcKind,
    target: Rc<Stub>,
    cached_shape: Option<ShapeId>,
    /// A debugger break overlays the site
    debug_break: bool,
    patch_count: u32,
}

impl CallSite {
    pub(crate) fn new(target: Rc<Stub>) -> Self {
        let cached_shape = target.find_first_shape();
        Self {
            kind: target.kind(),
            target,
            cached_shape,
            debug_break: false,
            patch_count: 0,
        }
    }

    pub fn kind(&self) -> IcKind {
        self.kind
    }

    /// Observable state; `DebugStub` while a break overlays the site
    pub fn state(&self) -> IcState {
        if self.debug_break {
            IcState::DebugStub
        } else {
            self.target.state()
        }
    }

    /// State of the stub under any debugger overlay
    pub fn target_state(&self) -> IcState {
        self.target.state()
    }

    pub fn target(&self) -> &Rc<Stub> {
        &self.target
    }

    pub fn cached_shape(&self) -> Option<ShapeId> {
        self.cached_shape
    }

    pub fn extra_ic_state(&self) -> ExtraIcState {
        self.target.extra_ic_state()
    }

    /// Number of times the site has been patched
    pub fn patch_count(&self) -> u32 {
        self.patch_count
    }

    pub fn has_debug_break(&self) -> bool {
        self.debug_break
    }

    /// Overlay (or remove) a debugger break.
    ///
    /// Misses taken while the overlay is on still patch the stub underneath; the
    /// overlay only changes what [`state`](Self::state) reports.
    pub fn set_debug_break(&mut self, enabled: bool) {
        self.debug_break = enabled;
    }

    pub(crate) fn patch(&mut self, stub: Rc<Stub>) {
        let shape = stub.find_first_shape();
        self.target = stub;
        self.cached_shape = shape;
        self.patch_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ic::stub::{Handler, StubId, StubSpec};

    fn stub(id: u32, state: IcState, shapes: Vec<ShapeId>) -> Rc<Stub> {
        let spec = StubSpec::new(IcKind::Load, state, ExtraIcState::default(), Handler::Initialize)
            .with_receiver_shapes(shapes);
        Rc::new(Stub::new(StubId(id), spec))
    }

    #[test]
    fn test_patch_updates_stub_and_shape() {
        let mut site = CallSite::new(stub(0, IcState::Uninitialized, vec![]));
        assert_eq!(site.cached_shape(), None);
        site.patch(stub(1, IcState::Monomorphic, vec![ShapeId(7), ShapeId(9)]));
        assert_eq!(site.state(), IcState::Monomorphic);
        assert_eq!(site.cached_shape(), Some(ShapeId(7)));
        assert_eq!(site.patch_count(), 1);
    }

    #[test]
    fn test_debug_overlay_masks_state() {
        let mut site = CallSite::new(stub(0, IcState::Uninitialized, vec![]));
        site.set_debug_break(true);
        assert_eq!(site.state(), IcState::DebugStub);
        site.patch(stub(1, IcState::Premonomorphic, vec![]));
        assert_eq!(site.state(), IcState::DebugStub);
        assert_eq!(site.target_state(), IcState::Premonomorphic);
        site.set_debug_break(false);
        assert_eq!(site.state(), IcState::Premonomorphic);
    }
}
