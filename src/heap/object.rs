//! Heap object layouts

use rustc_hash::FxHashMap as HashMap;

use super::shape::{PropertyAttributes, ShapeId};
use super::{Heap, Name, ObjectId, Value};
use crate::deopt::CodeId;
use crate::error::Result;

/// Host function callable from stubs and the runtime: `(heap, receiver, arguments)`
pub type NativeFn = fn(&mut Heap, Value, &[Value]) -> Result<Value>;

/// Index of a shared function info
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SharedId(pub(crate) u32);

/// Builtins the call IC specializes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunctionId {
    StringCharAt,
    StringCharCodeAt,
}

/// Per-function data shared by every closure of the same literal
#[derive(Debug, Clone)]
pub struct SharedFunctionInfo {
    pub name: String,
    pub formal_parameter_count: usize,
    /// Unoptimized (baseline) code
    pub code: Option<CodeId>,
    /// Number of times optimized code for this function was deoptimized
    pub deopt_count: u32,
    /// Set once the deoptimization budget is exhausted
    pub optimization_disabled: bool,
    pub builtin: Option<BuiltinFunctionId>,
}

/// Function-specific part of a JS object
#[derive(Debug, Clone)]
pub struct FunctionData {
    pub shared: SharedId,
    /// Code currently installed (optimized or baseline)
    pub code: Option<CodeId>,
    pub context: Value,
    /// Value of the `prototype` property
    pub prototype: Value,
    pub native: Option<NativeFn>,
}

/// What kind of JS object this is, with any class-specific payload
#[derive(Debug, Clone)]
pub enum ObjectClass {
    Plain,
    Array,
    Function(FunctionData),
    /// Wraps a primitive string value
    StringWrapper(Value),
    Global,
    /// Forwards to the global object
    GlobalProxy(ObjectId),
    Arguments { callee: Value, strict: bool },
}

/// Slow-mode property entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DictionaryEntry {
    pub value: Value,
    pub attributes: PropertyAttributes,
}

/// A JavaScript object
#[derive(Debug, Clone)]
pub struct JsObject {
    pub shape: ShapeId,
    pub class: ObjectClass,
    /// In-object fields, indexed by `PropertyKind::Field`
    pub fields: Vec<Value>,
    /// Properties of dictionary-mode objects
    pub dictionary: HashMap<Name, DictionaryEntry>,
    pub elements: Vec<Value>,
    /// Values served by the named interceptor
    pub interceptor: HashMap<Name, Value>,
    /// Function invoked when this non-function object is called
    pub call_handler: Option<ObjectId>,
}

impl JsObject {
    pub(crate) fn new(shape: ShapeId, class: ObjectClass) -> Self {
        Self {
            shape,
            class,
            fields: Vec::new(),
            dictionary: HashMap::default(),
            elements: Vec::new(),
            interceptor: HashMap::default(),
            call_handler: None,
        }
    }

    pub fn function(&self) -> Option<&FunctionData> {
        match &self.class {
            ObjectClass::Function(data) => Some(data),
            _ => None,
        }
    }
}

/// A primitive string
#[derive(Debug, Clone)]
pub struct JsString {
    pub value: String,
    pub internalized: bool,
}

impl JsString {
    /// Length in UTF-16 code units
    pub fn length(&self) -> usize {
        self.value.encode_utf16().count()
    }
}

/// Anything that lives in the heap arena
#[derive(Debug, Clone)]
pub enum HeapObject {
    Number(f64),
    String(JsString),
    Object(JsObject),
}
