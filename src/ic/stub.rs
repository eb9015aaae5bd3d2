//! Stubs: the specialized handlers installed at call sites
//!
//! A [`Stub`] is immutable once built. It records the state it represents, the shapes it
//! was specialized for, the prototype-chain assumptions it depends on and the
//! [`Handler`] that performs the access. Stubs are shared through `Rc`; equality of
//! stubs is identity of their [`StubId`].

use std::fmt;

use super::arith::{BinaryOpStub, ToBooleanTypes, UnaryOpStub};
use super::compare::CompareStub;
use super::state::{ExtraIcState, GrowMode, IcKind, IcState};
use crate::heap::{ElementsKind, Name, ObjectId, ShapeId, Value};

/// Unique stub identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StubId(pub(crate) u32);

impl fmt::Display for StubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stub#{}", self.0)
    }
}

/// Object a stub reads a property from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Holder {
    /// The receiver itself
    Receiver,
    /// A fixed object on the receiver's prototype chain
    Object(ObjectId),
}

/// What a polymorphic keyed load does for one receiver shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementLoadTarget {
    Elements(ElementsKind),
    /// Character access on a primitive string
    String,
}

/// What a polymorphic keyed store does for one receiver shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementStoreTarget {
    Store { kind: ElementsKind },
    /// Move the receiver to `to` before storing
    TransitionAndStore { to: ShapeId, kind: ElementsKind },
}

/// Which shape a stub is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheHolder {
    /// The receiver's own shape
    #[default]
    OwnShape,
    /// The shape of the prototype of a primitive receiver
    PrototypeShape,
}

/// The operation a stub performs once its guards pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Handler {
    /// Always misses; installed on fresh sites
    Initialize,
    /// Always misses; delays specialization by one execution
    Premonomorphic,
    /// Probes the global stub cache
    Megamorphic,
    /// Full runtime semantics, never misses
    Generic,

    LoadField { holder: Holder, index: usize },
    LoadConstant(Value),
    /// The property is known to be absent along the checked chain
    LoadNonexistent,
    LoadNormal,
    LoadGlobal { global: ObjectId, dont_delete: bool },
    LoadViaGetter { holder: Holder, getter: Value },
    LoadInterceptor { holder: Holder },
    LoadStringLength,
    LoadStringWrapperLength,
    LoadArrayLength,
    LoadFunctionPrototype,

    LoadElement(ElementsKind),
    LoadElementPolymorphic(Vec<ElementLoadTarget>),
    LoadIndexedString,
    LoadNonStrictArguments,

    StoreField { index: usize, transition: Option<ShapeId> },
    StoreNormal,
    StoreGlobal { global: ObjectId },
    StoreViaSetter { setter: Value },
    StoreArrayLength,
    StoreGlobalProxy,

    StoreElement { kind: ElementsKind, grow: GrowMode },
    StoreElementPolymorphic(Vec<ElementStoreTarget>),
    StoreNonStrictArguments,

    CallField { holder: Holder, index: usize },
    CallConstant { function: Value },
    CallNormal,
    CallGlobal { global: ObjectId, function: Value },
    CallInterceptor { holder: Holder },
    CallArguments,

    Compare(CompareStub),
    UnaryOp(UnaryOpStub),
    BinaryOp(BinaryOpStub),
    ToBoolean(ToBooleanTypes),
}

impl Handler {
    /// Short handler name for traces
    pub fn name(&self) -> &'static str {
        match self {
            Handler::Initialize => "Initialize",
            Handler::Premonomorphic => "PreMonomorphic",
            Handler::Megamorphic => "Megamorphic",
            Handler::Generic => "Generic",
            Handler::LoadField { .. } => "LoadField",
            Handler::LoadConstant(_) => "LoadConstant",
            Handler::LoadNonexistent => "LoadNonexistent",
            Handler::LoadNormal => "LoadNormal",
            Handler::LoadGlobal { .. } => "LoadGlobal",
            Handler::LoadViaGetter { .. } => "LoadViaGetter",
            Handler::LoadInterceptor { .. } => "LoadInterceptor",
            Handler::LoadStringLength => "StringLength",
            Handler::LoadStringWrapperLength => "StringWrapperLength",
            Handler::LoadArrayLength => "ArrayLength",
            Handler::LoadFunctionPrototype => "FunctionPrototype",
            Handler::LoadElement(_) => "LoadElement",
            Handler::LoadElementPolymorphic(_) => "LoadElementPolymorphic",
            Handler::LoadIndexedString => "IndexedString",
            Handler::LoadNonStrictArguments => "LoadNonStrictArguments",
            Handler::StoreField { .. } => "StoreField",
            Handler::StoreNormal => "StoreNormal",
            Handler::StoreGlobal { .. } => "StoreGlobal",
            Handler::StoreViaSetter { .. } => "StoreViaSetter",
            Handler::StoreArrayLength => "StoreArrayLength",
            Handler::StoreGlobalProxy => "StoreGlobalProxy",
            Handler::StoreElement { .. } => "StoreElement",
            Handler::StoreElementPolymorphic(_) => "StoreElementPolymorphic",
            Handler::StoreNonStrictArguments => "StoreNonStrictArguments",
            Handler::CallField { .. } => "CallField",
            Handler::CallConstant { .. } => "CallConstant",
            Handler::CallNormal => "CallNormal",
            Handler::CallGlobal { .. } => "CallGlobal",
            Handler::CallInterceptor { .. } => "CallInterceptor",
            Handler::CallArguments => "CallArguments",
            Handler::Compare(_) => "Compare",
            Handler::UnaryOp(_) => "UnaryOp",
            Handler::BinaryOp(_) => "BinaryOp",
            Handler::ToBoolean(_) => "ToBoolean",
        }
    }
}

/// Everything that determines what a stub does; two equal specs are interchangeable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StubSpec {
    pub kind: IcKind,
    pub state: IcState,
    pub extra: ExtraIcState,
    pub handler: Handler,
    /// Name the stub was specialized on; the key must match it
    pub name: Option<Name>,
    /// Shapes the stub accepts, in insertion order
    pub receiver_shapes: Vec<ShapeId>,
    /// Prototype-chain objects whose shape must not have changed
    pub prototype_checks: Vec<(ObjectId, ShapeId)>,
    /// Dictionary-mode objects on the chain that must not own `name`
    pub absent_checks: Vec<Holder>,
    pub cache_holder: CacheHolder,
}

impl StubSpec {
    pub fn new(kind: IcKind, state: IcState, extra: ExtraIcState, handler: Handler) -> Self {
        Self {
            kind,
            state,
            extra,
            handler,
            name: None,
            receiver_shapes: Vec::new(),
            prototype_checks: Vec::new(),
            absent_checks: Vec::new(),
            cache_holder: CacheHolder::OwnShape,
        }
    }

    pub fn with_name(mut self, name: Name) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_receiver_shapes(mut self, shapes: Vec<ShapeId>) -> Self {
        self.receiver_shapes = shapes;
        self
    }

    pub fn with_prototype_checks(mut self, checks: Vec<(ObjectId, ShapeId)>) -> Self {
        self.prototype_checks = checks;
        self
    }

    pub fn with_absent_checks(mut self, checks: Vec<Holder>) -> Self {
        self.absent_checks = checks;
        self
    }

    pub fn with_cache_holder(mut self, holder: CacheHolder) -> Self {
        self.cache_holder = holder;
        self
    }
}

/// An immutable, shareable specialized handler
#[derive(Debug)]
pub struct Stub {
    id: StubId,
    spec: StubSpec,
}

impl Stub {
    pub(crate) fn new(id: StubId, spec: StubSpec) -> Self {
        Self { id, spec }
    }

    pub fn id(&self) -> StubId {
        self.id
    }

    pub fn spec(&self) -> &StubSpec {
        &self.spec
    }

    pub fn kind(&self) -> IcKind {
        self.spec.kind
    }

    pub fn state(&self) -> IcState {
        self.spec.state
    }

    pub fn extra_ic_state(&self) -> ExtraIcState {
        self.spec.extra
    }

    pub fn handler(&self) -> &Handler {
        &self.spec.handler
    }

    pub fn name(&self) -> Option<Name> {
        self.spec.name
    }

    pub fn receiver_shapes(&self) -> &[ShapeId] {
        &self.spec.receiver_shapes
    }

    pub fn prototype_checks(&self) -> &[(ObjectId, ShapeId)] {
        &self.spec.prototype_checks
    }

    pub fn absent_checks(&self) -> &[Holder] {
        &self.spec.absent_checks
    }

    pub fn cache_holder(&self) -> CacheHolder {
        self.spec.cache_holder
    }

    /// First shape the stub checks, if it checks any
    pub fn find_first_shape(&self) -> Option<ShapeId> {
        self.spec.receiver_shapes.first().copied()
    }

    /// Whether the stub's guards depend on objects other than the receiver
    pub fn is_prototype_dependent(&self) -> bool {
        !self.spec.prototype_checks.is_empty()
    }
}

impl PartialEq for Stub {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Stub {}

impl fmt::Display for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.id, self.spec.kind, self.spec.handler.name())?;
        if !self.spec.receiver_shapes.is_empty() {
            let shapes: Vec<String> = self.spec.receiver_shapes.iter().map(|s| s.to_string()).collect();
            write!(f, " [{}]", shapes.join(", "))?;
        }
        Ok(())
    }
}
