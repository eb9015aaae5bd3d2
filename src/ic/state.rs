//! Inline cache states, kinds and extra state

use std::fmt;

/// Observed polymorphism of a call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcState {
    Uninitialized,
    Premonomorphic,
    Monomorphic,
    /// Monomorphic stub whose prototype-chain assumptions no longer hold
    MonomorphicPrototypeFailure,
    Polymorphic,
    Megamorphic,
    Generic,
    /// A debugger break stub overlays the site
    DebugStub,
}

impl IcState {
    /// Single-character mark used in trace lines
    pub fn transition_mark(self) -> char {
        match self {
            IcState::Uninitialized => '0',
            IcState::Premonomorphic => '.',
            IcState::Monomorphic => '1',
            IcState::MonomorphicPrototypeFailure => '^',
            IcState::Polymorphic => 'P',
            IcState::Megamorphic => 'N',
            IcState::Generic => 'G',
            IcState::DebugStub => 'D',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IcState::Uninitialized => "UNINITIALIZED",
            IcState::Premonomorphic => "PREMONOMORPHIC",
            IcState::Monomorphic => "MONOMORPHIC",
            IcState::MonomorphicPrototypeFailure => "MONOMORPHIC_PROTOTYPE_FAILURE",
            IcState::Polymorphic => "POLYMORPHIC",
            IcState::Megamorphic => "MEGAMORPHIC",
            IcState::Generic => "GENERIC",
            IcState::DebugStub => "DEBUG_STUB",
        }
    }
}

impl fmt::Display for IcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Family of access a call site performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcKind {
    Load,
    KeyedLoad,
    Store,
    KeyedStore,
    Call,
    KeyedCall,
    Compare,
    UnaryOp,
    BinaryOp,
    ToBoolean,
}

impl IcKind {
    pub const ALL: [IcKind; 10] = [
        IcKind::Load,
        IcKind::KeyedLoad,
        IcKind::Store,
        IcKind::KeyedStore,
        IcKind::Call,
        IcKind::KeyedCall,
        IcKind::Compare,
        IcKind::UnaryOp,
        IcKind::BinaryOp,
        IcKind::ToBoolean,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IcKind::Load => "LoadIC",
            IcKind::KeyedLoad => "KeyedLoadIC",
            IcKind::Store => "StoreIC",
            IcKind::KeyedStore => "KeyedStoreIC",
            IcKind::Call => "CallIC",
            IcKind::KeyedCall => "KeyedCallIC",
            IcKind::Compare => "CompareIC",
            IcKind::UnaryOp => "UnaryOpIC",
            IcKind::BinaryOp => "BinaryOpIC",
            IcKind::ToBoolean => "ToBooleanIC",
        }
    }

    pub fn is_keyed(self) -> bool {
        matches!(self, IcKind::KeyedLoad | IcKind::KeyedStore | IcKind::KeyedCall)
    }

    /// Kinds whose stubs are chosen from property lookups
    pub fn is_property_access(self) -> bool {
        matches!(
            self,
            IcKind::Load | IcKind::KeyedLoad | IcKind::Store | IcKind::KeyedStore | IcKind::Call | IcKind::KeyedCall
        )
    }

    pub fn is_call(self) -> bool {
        matches!(self, IcKind::Call | IcKind::KeyedCall)
    }

    pub fn is_store(self) -> bool {
        matches!(self, IcKind::Store | IcKind::KeyedStore)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for IcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Language mode of the code containing a store site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StrictMode {
    #[default]
    NonStrict,
    Strict,
}

impl StrictMode {
    pub fn is_strict(self) -> bool {
        self == StrictMode::Strict
    }
}

/// Whether keyed element stores may append past the end of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GrowMode {
    #[default]
    DoNotAllowGrowth,
    AllowGrowth,
}

/// Call-site specialization for string builtins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StringStubState {
    #[default]
    Default,
    /// The builtin was seen with an out-of-bounds index
    IndexOutOfBounds,
}

/// Kind-specific data carried by a stub alongside its state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExtraIcState {
    pub strict_mode: StrictMode,
    pub grow_mode: GrowMode,
    pub string_stub: StringStubState,
}

impl ExtraIcState {
    pub fn strict() -> Self {
        Self {
            strict_mode: StrictMode::Strict,
            ..Self::default()
        }
    }

    pub fn with_strict_mode(mut self, mode: StrictMode) -> Self {
        self.strict_mode = mode;
        self
    }

    pub fn with_grow_mode(mut self, mode: GrowMode) -> Self {
        self.grow_mode = mode;
        self
    }

    pub fn with_string_stub(mut self, state: StringStubState) -> Self {
        self.string_stub = state;
        self
    }
}
