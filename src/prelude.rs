//! Prelude module for convenient imports
//!
//! The types most embedders and tests touch. Import everything from this module for
//! quick access:
//!
//! ```no_run
//! use bailout::prelude::*;
//!
//! let mut isolate = Isolate::new();
//! let mut site = isolate.binary_op_site(BinaryOperation::Add);
//! let sum = isolate.binary_op(&mut site, Value::Smi(1), Value::Smi(2));
//! assert_eq!(sum, Value::Smi(3));
//! ```

// Context and configuration
pub use crate::config::EngineConfig;
pub use crate::isolate::Isolate;

// Error handling
pub use crate::error::{Error, ErrorKind, OsrAbort, OsrAbortReason, Result};

// Object model
pub use crate::heap::{ElementsKind, Heap, Name, ObjectId, PropertyAttributes, ShapeId, SharedId, Value};

// Inline caches
pub use crate::ic::{
    BinaryOperation, CallSite, CompareOp, ExtraIcState, IcKind, IcState, StrictMode, UnaryOperation,
};

// Deoptimization
pub use crate::deopt::{
    BailoutId, BailoutRequest, BailoutType, Code, CodeId, CodeKind, DeoptEntry, DeoptimizationInputData,
    DeoptimizationOutputData, FrameDescription, FrameType, FullCodeState, Resumption, Translation,
    TranslationBuffer, TranslationCommand, Word,
};
