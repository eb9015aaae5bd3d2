//! Compare IC
//!
//! Comparison sites record the operand types they have seen and install a stub that
//! handles exactly those types inline. Every miss widens the recorded types along a
//! fixed lattice; there is no path back to a narrower state.

use std::cmp::Ordering;
use std::fmt;

use super::site::CallSite;
use super::state::{ExtraIcState, IcKind, IcState};
use super::stub::{Handler, StubSpec};
use crate::heap::{Heap, ShapeId, Value};
use crate::isolate::Isolate;

/// Comparison operator of a compare site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `===`
    StrictEq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl CompareOp {
    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::StrictEq)
    }

    pub fn is_ordered_relational(self) -> bool {
        !self.is_equality()
    }

    pub fn name(self) -> &'static str {
        match self {
            CompareOp::Eq => "EQ",
            CompareOp::StrictEq => "EQ_STRICT",
            CompareOp::Lt => "LT",
            CompareOp::Gt => "GT",
            CompareOp::Lte => "LTE",
            CompareOp::Gte => "GTE",
        }
    }
}

/// Operand and handler states of a compare stub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareState {
    Uninitialized,
    Smi,
    Number,
    /// Internalized strings, compared by identity
    InternalizedString,
    String,
    Object,
    /// Objects that all share one shape
    KnownObject,
    Generic,
}

impl CompareState {
    pub fn name(self) -> &'static str {
        match self {
            CompareState::Uninitialized => "UNINITIALIZED",
            CompareState::Smi => "SMI",
            CompareState::Number => "NUMBER",
            CompareState::InternalizedString => "INTERNALIZED_STRING",
            CompareState::String => "STRING",
            CompareState::Object => "OBJECT",
            CompareState::KnownObject => "KNOWN_OBJECT",
            CompareState::Generic => "GENERIC",
        }
    }

    /// Call-site state a stub in this compare state represents
    pub fn ic_state(self) -> IcState {
        match self {
            CompareState::Uninitialized => IcState::Uninitialized,
            CompareState::Generic => IcState::Generic,
            _ => IcState::Monomorphic,
        }
    }
}

impl fmt::Display for CompareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters of a compare stub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompareStub {
    pub op: CompareOp,
    pub left: CompareState,
    pub right: CompareState,
    pub state: CompareState,
    /// Shape both operands must have in the known-object state
    pub known_shape: Option<ShapeId>,
}

impl CompareStub {
    pub fn uninitialized(op: CompareOp) -> Self {
        Self {
            op,
            left: CompareState::Uninitialized,
            right: CompareState::Uninitialized,
            state: CompareState::Uninitialized,
            known_shape: None,
        }
    }

    pub(crate) fn spec(self) -> StubSpec {
        StubSpec::new(
            IcKind::Compare,
            self.state.ic_state(),
            ExtraIcState::default(),
            Handler::Compare(self),
        )
    }

    /// Whether the stub handles `x op y` without missing
    pub fn handles(&self, heap: &Heap, x: Value, y: Value) -> bool {
        match self.state {
            CompareState::Uninitialized => false,
            CompareState::Smi => x.is_smi() && y.is_smi(),
            CompareState::Number => {
                let numeric = |v: Value| {
                    heap.is_number(v) || (self.op.is_ordered_relational() && v.is_undefined())
                };
                numeric(x) && numeric(y)
            }
            CompareState::InternalizedString => {
                heap.is_internalized_string(x) && heap.is_internalized_string(y)
            }
            CompareState::String => heap.is_string(x) && heap.is_string(y),
            CompareState::Object => heap.is_js_object(x) && heap.is_js_object(y),
            CompareState::KnownObject => {
                heap.is_js_object(x)
                    && heap.is_js_object(y)
                    && self.known_shape.is_some()
                    && heap.map_of(x) == self.known_shape
                    && heap.map_of(y) == self.known_shape
            }
            CompareState::Generic => true,
        }
    }
}

/// New recorded state of one operand
pub fn input_state(heap: &Heap, old: CompareState, value: Value) -> CompareState {
    match old {
        CompareState::Uninitialized => {
            if value.is_smi() {
                return CompareState::Smi;
            }
            if heap.is_heap_number(value) {
                return CompareState::Number;
            }
            if heap.is_internalized_string(value) {
                return CompareState::InternalizedString;
            }
            if heap.is_string(value) {
                return CompareState::String;
            }
            if heap.is_js_object(value) {
                return CompareState::Object;
            }
        }
        CompareState::Smi => {
            if value.is_smi() {
                return CompareState::Smi;
            }
            if heap.is_heap_number(value) {
                return CompareState::Number;
            }
        }
        CompareState::Number => {
            if heap.is_number(value) {
                return CompareState::Number;
            }
        }
        CompareState::InternalizedString => {
            if heap.is_internalized_string(value) {
                return CompareState::InternalizedString;
            }
            if heap.is_string(value) {
                return CompareState::String;
            }
        }
        CompareState::String => {
            if heap.is_string(value) {
                return CompareState::String;
            }
        }
        CompareState::Object => {
            if heap.is_js_object(value) {
                return CompareState::Object;
            }
        }
        // Operands are never recorded as known objects
        CompareState::KnownObject | CompareState::Generic => {}
    }
    CompareState::Generic
}

/// New handler state after `stub` missed on `x op y`
pub fn target_state(heap: &Heap, stub: &CompareStub, x: Value, y: Value) -> CompareState {
    let op = stub.op;
    match stub.state {
        CompareState::Uninitialized => {
            if x.is_smi() && y.is_smi() {
                return CompareState::Smi;
            }
            if heap.is_number(x) && heap.is_number(y) {
                return CompareState::Number;
            }
            // Ordered comparisons treat undefined as NaN
            if op.is_ordered_relational()
                && ((heap.is_number(x) && y.is_undefined()) || (heap.is_number(y) && x.is_undefined()))
            {
                return CompareState::Number;
            }
            if heap.is_internalized_string(x) && heap.is_internalized_string(y) {
                return if op.is_equality() {
                    CompareState::InternalizedString
                } else {
                    CompareState::String
                };
            }
            if heap.is_string(x) && heap.is_string(y) {
                return CompareState::String;
            }
            if !op.is_equality() {
                return CompareState::Generic;
            }
            if heap.is_js_object(x) && heap.is_js_object(y) {
                return if heap.map_of(x) == heap.map_of(y) {
                    CompareState::KnownObject
                } else {
                    CompareState::Object
                };
            }
            CompareState::Generic
        }
        CompareState::Smi => {
            if heap.is_number(x) && heap.is_number(y) {
                CompareState::Number
            } else {
                CompareState::Generic
            }
        }
        CompareState::InternalizedString => {
            if heap.is_string(x) && heap.is_string(y) {
                CompareState::String
            } else {
                CompareState::Generic
            }
        }
        CompareState::Number => {
            // One side turning from a small integer into a heap number keeps the state
            if (stub.left == CompareState::Smi && heap.is_heap_number(x))
                || (stub.right == CompareState::Smi && heap.is_heap_number(y))
            {
                CompareState::Number
            } else {
                CompareState::Generic
            }
        }
        CompareState::KnownObject => {
            if heap.is_js_object(x) && heap.is_js_object(y) {
                CompareState::Object
            } else {
                CompareState::Generic
            }
        }
        CompareState::String | CompareState::Object | CompareState::Generic => CompareState::Generic,
    }
}

/// The stub a site moves to after missing on `x op y`
pub fn next_stub(heap: &Heap, current: &CompareStub, x: Value, y: Value) -> CompareStub {
    let state = target_state(heap, current, x, y);
    CompareStub {
        op: current.op,
        left: input_state(heap, current.left, x),
        right: input_state(heap, current.right, y),
        state,
        known_shape: if state == CompareState::KnownObject {
            heap.map_of(x)
        } else {
            None
        },
    }
}

/// Evaluate `x op y`
pub fn compare_values(heap: &Heap, op: CompareOp, x: Value, y: Value) -> bool {
    match op {
        CompareOp::StrictEq => strict_equals(heap, x, y),
        CompareOp::Eq => loose_equals(heap, x, y),
        CompareOp::Lt => relational(heap, x, y) == Some(Ordering::Less),
        CompareOp::Gt => relational(heap, x, y) == Some(Ordering::Greater),
        CompareOp::Lte => matches!(relational(heap, x, y), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gte => matches!(relational(heap, x, y), Some(Ordering::Greater | Ordering::Equal)),
    }
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Hole | Value::ArgumentsMarker => Value::Undefined,
        other => other,
    }
}

fn strict_equals(heap: &Heap, x: Value, y: Value) -> bool {
    let (x, y) = (normalize(x), normalize(y));
    if let (Some(a), Some(b)) = (heap.number_value(x), heap.number_value(y)) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (heap.string_value(x), heap.string_value(y)) {
        return a == b;
    }
    x == y
}

fn loose_equals(heap: &Heap, x: Value, y: Value) -> bool {
    let (x, y) = (normalize(x), normalize(y));
    if x.is_nullish() || y.is_nullish() {
        return x.is_nullish() && y.is_nullish();
    }
    let object = |v: Value| heap.is_js_object(v);
    match (object(x), object(y)) {
        (true, true) => x == y,
        // Objects are not converted to primitives here
        (true, false) | (false, true) => false,
        (false, false) => {
            if heap.is_string(x) && heap.is_string(y) {
                return heap.string_value(x) == heap.string_value(y);
            }
            heap.to_number(x) == heap.to_number(y)
        }
    }
}

fn relational(heap: &Heap, x: Value, y: Value) -> Option<Ordering> {
    let (x, y) = (normalize(x), normalize(y));
    if let (Some(a), Some(b)) = (heap.string(x), heap.string(y)) {
        return Some(a.value.encode_utf16().cmp(b.value.encode_utf16()));
    }
    heap.to_number(x).partial_cmp(&heap.to_number(y))
}

/// Run a compare site on `x` and `y`, updating it on a miss
pub fn compare(isolate: &mut Isolate, site: &mut CallSite, x: Value, y: Value) -> Value {
    let Handler::Compare(current) = *site.target().handler() else {
        crate::error::fatal(format!("compare site holds a {} stub", site.target().kind()));
    };
    if !current.handles(&isolate.heap, x, y) {
        update_caches(isolate, site, &current, x, y);
    }
    Value::Boolean(compare_values(&isolate.heap, current.op, x, y))
}

fn update_caches(isolate: &mut Isolate, site: &mut CallSite, current: &CompareStub, x: Value, y: Value) {
    let next = next_stub(&isolate.heap, current, x, y);
    if isolate.config.trace_ic {
        tracing::debug!(
            target: "bailout::ic",
            "[CompareIC (({}+{}={})->({}+{}={}))#{}]",
            current.left,
            current.right,
            current.state,
            next.left,
            next.right,
            next.state,
            current.op.name()
        );
    }
    let stub = isolate.stubs.shared(next.spec());
    super::set_target(isolate, site, stub);
}
