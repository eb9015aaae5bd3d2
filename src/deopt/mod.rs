//! Deoptimization
//!
//! When an assumption baked into optimized code stops holding, the optimized frame is
//! replaced by the equivalent unoptimized frames and execution continues in baseline
//! code. One optimized frame can stand for several unoptimized ones because of
//! inlining, so a bailout may produce a JS frame per inlined function plus the
//! arguments adaptor, construct stub and accessor stub frames between them.
//!
//! A bailout runs in two phases:
//!
//! 1. **Translation.** The [`Deoptimizer`] decodes the [`translation`] recorded for the
//!    bailout point and fills one [`FrameDescription`] per output frame from the input
//!    frame. This phase holds a [`NoAllocationScope`](crate::heap::NoAllocationScope):
//!    values that need a heap box (unboxed doubles, integers outside the small integer
//!    range) and captured arguments objects are written as placeholders and recorded
//!    on the side.
//! 2. **Materialization.** With allocation allowed again, heap numbers are boxed first,
//!    then one arguments object per frame is built, and the placeholders are
//!    overwritten.
//!
//! The same machinery runs in reverse for on-stack replacement ([`osr`]), and without
//! replacing anything for the debugger ([`DeoptimizedFrameInfo`]).

pub mod code;
pub mod deoptimizer;
pub mod frame;
mod materialize;
pub mod osr;
pub mod registry;
pub mod slot_ref;
pub mod translation;

use std::fmt;

pub use code::{
    Builtins, Code, CodeKind, CodeSpace, DeoptEntry, DeoptimizationInputData, DeoptimizationOutputData,
    FullCodeState, PcAndState,
};
pub use deoptimizer::{
    BailoutRequest, DeferredArgumentsObject, DeferredHeapNumber, DeoptimizedFrameInfo, Deoptimizer, Resumption,
};
pub use frame::{FixedSlot, FrameDescription, FrameType, RegisterFile, Stack, Word, FIXED_FRAME_SLOTS};
pub use osr::{object_to_int32, object_to_uint32};
pub use registry::{DeoptimizingCodeHandle, DeoptimizingCodeRegistry};
pub use slot_ref::SlotRef;
pub use translation::{
    decode_commands, encode, Opcode, Translation, TranslationBuffer, TranslationCommand, TranslationIterator,
};

/// Index of a code object in the [`CodeSpace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeId(pub(crate) u32);

impl CodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code#{}", self.0)
    }
}

/// Identifies a point in the unoptimized code a frame can resume at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BailoutId(pub u32);

impl fmt::Display for BailoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a frame is being deoptimized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BailoutType {
    /// A guard in the optimized code failed
    Eager,
    /// The code was invalidated while the frame was suspended in a call
    Lazy,
    /// An interpreted frame is moving into optimized code
    Osr,
    /// The debugger wants to look at an optimized frame
    Debugger,
}

impl BailoutType {
    /// Banner used in trace output
    pub fn message(self) -> &'static str {
        match self {
            BailoutType::Eager | BailoutType::Lazy => "DEOPT",
            BailoutType::Debugger => "DEOPT FOR DEBUGGER",
            BailoutType::Osr => "OSR",
        }
    }
}

impl fmt::Display for BailoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BailoutType::Eager => "eager",
            BailoutType::Lazy => "lazy",
            BailoutType::Osr => "osr",
            BailoutType::Debugger => "debugger",
        };
        f.write_str(name)
    }
}
