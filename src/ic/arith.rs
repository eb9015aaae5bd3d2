//! Unary, binary and to-boolean ICs
//!
//! Like compare sites these record operand types rather than shapes. A stub handles
//! the operand types it was built for inline; anything else misses, widens the
//! recorded types and re-patches the site. Results are always computed with full
//! semantics so a miss never changes the value an operation produces.

use std::fmt;

use bitflags::bitflags;

use super::site::CallSite;
use super::state::{ExtraIcState, IcKind, IcState};
use super::stub::{Handler, StubSpec};
use crate::heap::{to_int32, to_uint32, Heap, Value};
use crate::isolate::Isolate;

// ==================== Unary operations ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperation {
    /// Negation, `-x`
    Sub,
    /// `~x`
    BitNot,
}

impl UnaryOperation {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOperation::Sub => "SUB",
            UnaryOperation::BitNot => "BIT_NOT",
        }
    }
}

/// Operand type recorded by a unary stub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnaryTypeInfo {
    Uninitialized,
    Smi,
    Number,
    Generic,
}

impl UnaryTypeInfo {
    pub fn name(self) -> &'static str {
        match self {
            UnaryTypeInfo::Uninitialized => "Uninitialized",
            UnaryTypeInfo::Smi => "Smi",
            UnaryTypeInfo::Number => "Number",
            UnaryTypeInfo::Generic => "Generic",
        }
    }

    pub fn ic_state(self) -> IcState {
        match self {
            UnaryTypeInfo::Uninitialized => IcState::Uninitialized,
            UnaryTypeInfo::Smi | UnaryTypeInfo::Number => IcState::Monomorphic,
            UnaryTypeInfo::Generic => IcState::Generic,
        }
    }

    fn of(heap: &Heap, operand: Value) -> Self {
        if operand.is_smi() {
            UnaryTypeInfo::Smi
        } else if heap.is_heap_number(operand) {
            UnaryTypeInfo::Number
        } else {
            UnaryTypeInfo::Generic
        }
    }

    /// Type after observing `current` in a stub that recorded `self`
    pub fn widen(self, current: UnaryTypeInfo) -> UnaryTypeInfo {
        match self {
            UnaryTypeInfo::Uninitialized => current,
            UnaryTypeInfo::Smi if current == UnaryTypeInfo::Generic => UnaryTypeInfo::Generic,
            UnaryTypeInfo::Smi => UnaryTypeInfo::Number,
            UnaryTypeInfo::Number | UnaryTypeInfo::Generic => UnaryTypeInfo::Generic,
        }
    }
}

impl fmt::Display for UnaryTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnaryOpStub {
    pub op: UnaryOperation,
    pub operand: UnaryTypeInfo,
}

impl UnaryOpStub {
    pub fn uninitialized(op: UnaryOperation) -> Self {
        Self {
            op,
            operand: UnaryTypeInfo::Uninitialized,
        }
    }

    pub(crate) fn spec(self) -> StubSpec {
        StubSpec::new(
            IcKind::UnaryOp,
            self.operand.ic_state(),
            ExtraIcState::default(),
            Handler::UnaryOp(self),
        )
    }

    /// Whether the stub computes `result` from `operand` without missing
    pub fn handles(&self, heap: &Heap, operand: Value, result: Value) -> bool {
        match self.operand {
            UnaryTypeInfo::Uninitialized => false,
            UnaryTypeInfo::Smi => operand.is_smi() && result.is_smi(),
            UnaryTypeInfo::Number => heap.is_number(operand),
            UnaryTypeInfo::Generic => true,
        }
    }
}

/// Evaluate a unary operation
pub fn unary_operation(heap: &mut Heap, op: UnaryOperation, operand: Value) -> Value {
    match op {
        UnaryOperation::Sub => {
            let value = heap.to_number(operand);
            heap.new_number(-value)
        }
        UnaryOperation::BitNot => {
            let value = to_int32(heap.to_number(operand));
            heap.new_number(f64::from(!value))
        }
    }
}

/// Run a unary-operation site
pub fn unary_op(isolate: &mut Isolate, site: &mut CallSite, operand: Value) -> Value {
    let Handler::UnaryOp(current) = *site.target().handler() else {
        crate::error::fatal(format!("unary site holds a {} stub", site.target().kind()));
    };
    let result = unary_operation(&mut isolate.heap, current.op, operand);
    if !current.handles(&isolate.heap, operand, result) {
        let observed = UnaryTypeInfo::of(&isolate.heap, operand);
        let next = UnaryOpStub {
            op: current.op,
            operand: current.operand.widen(observed),
        };
        if isolate.config.trace_ic {
            tracing::debug!(
                target: "bailout::ic",
                "[UnaryOpIC ({}->{})#{}]",
                current.operand,
                next.operand,
                current.op.name()
            );
        }
        let stub = isolate.stubs.shared(next.spec());
        super::set_target(isolate, site, stub);
    }
    result
}

// ==================== Binary operations ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperation {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitOr,
    BitAnd,
    BitXor,
    Sar,
    Shr,
    Shl,
}

impl BinaryOperation {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOperation::Add => "ADD",
            BinaryOperation::Sub => "SUB",
            BinaryOperation::Mul => "MUL",
            BinaryOperation::Div => "DIV",
            BinaryOperation::Mod => "MOD",
            BinaryOperation::BitOr => "BIT_OR",
            BinaryOperation::BitAnd => "BIT_AND",
            BinaryOperation::BitXor => "BIT_XOR",
            BinaryOperation::Sar => "SAR",
            BinaryOperation::Shr => "SHR",
            BinaryOperation::Shl => "SHL",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOperation::BitOr
                | BinaryOperation::BitAnd
                | BinaryOperation::BitXor
                | BinaryOperation::Sar
                | BinaryOperation::Shr
                | BinaryOperation::Shl
        )
    }
}

/// Operand or result type recorded by a binary stub, ordered from narrow to wide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinaryTypeInfo {
    Uninitialized,
    Smi,
    Int32,
    Number,
    /// `undefined` in arithmetic
    Oddball,
    String,
    Generic,
}

impl BinaryTypeInfo {
    pub fn name(self) -> &'static str {
        match self {
            BinaryTypeInfo::Uninitialized => "Uninitialized",
            BinaryTypeInfo::Smi => "Smi",
            BinaryTypeInfo::Int32 => "Int32",
            BinaryTypeInfo::Number => "Number",
            BinaryTypeInfo::Oddball => "Oddball",
            BinaryTypeInfo::String => "String",
            BinaryTypeInfo::Generic => "Generic",
        }
    }

    pub fn ic_state(self) -> IcState {
        match self {
            BinaryTypeInfo::Uninitialized => IcState::Uninitialized,
            BinaryTypeInfo::Generic => IcState::Generic,
            _ => IcState::Monomorphic,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, BinaryTypeInfo::Smi | BinaryTypeInfo::Int32 | BinaryTypeInfo::Number)
    }

    /// Type of `value` as an operand of `op`
    pub fn of(heap: &Heap, value: Value, op: BinaryOperation) -> Self {
        if value.is_smi() {
            return BinaryTypeInfo::Smi;
        }
        if let Some(number) = heap.number_value(value) {
            let is_int32 = number.fract() == 0.0
                && number >= f64::from(i32::MIN)
                && number <= f64::from(i32::MAX)
                && !(number == 0.0 && number.is_sign_negative());
            return if is_int32 {
                BinaryTypeInfo::Int32
            } else {
                BinaryTypeInfo::Number
            };
        }
        if heap.is_string(value) {
            return BinaryTypeInfo::String;
        }
        if value.is_undefined() {
            // Bitwise operations truncate undefined to 0
            return if op.is_bitwise() {
                BinaryTypeInfo::Int32
            } else {
                BinaryTypeInfo::Oddball
            };
        }
        BinaryTypeInfo::Generic
    }

    /// Recorded type after observing `value`
    fn widen(self, heap: &Heap, value: Value, op: BinaryOperation) -> Self {
        let observed = Self::of(heap, value, op);
        if self == BinaryTypeInfo::String {
            return if observed == BinaryTypeInfo::String {
                observed
            } else {
                BinaryTypeInfo::Generic
            };
        }
        self.max(observed)
    }

    fn accepts(self, observed: BinaryTypeInfo) -> bool {
        match self {
            BinaryTypeInfo::Generic => true,
            BinaryTypeInfo::String => observed == BinaryTypeInfo::String,
            _ => observed != BinaryTypeInfo::String && observed <= self,
        }
    }
}

impl fmt::Display for BinaryTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryOpStub {
    pub op: BinaryOperation,
    pub left: BinaryTypeInfo,
    pub right: BinaryTypeInfo,
    /// Widest result seen overflowing the operand types
    pub result: BinaryTypeInfo,
}

impl BinaryOpStub {
    pub fn uninitialized(op: BinaryOperation) -> Self {
        Self {
            op,
            left: BinaryTypeInfo::Uninitialized,
            right: BinaryTypeInfo::Uninitialized,
            result: BinaryTypeInfo::Uninitialized,
        }
    }

    pub fn overall(&self) -> BinaryTypeInfo {
        self.left.max(self.right)
    }

    pub(crate) fn spec(self) -> StubSpec {
        StubSpec::new(
            IcKind::BinaryOp,
            self.overall().ic_state(),
            ExtraIcState::default(),
            Handler::BinaryOp(self),
        )
    }

    /// Whether the stub computes `result` from `x` and `y` without missing
    pub fn handles(&self, heap: &Heap, x: Value, y: Value, result: Value) -> bool {
        let overall = self.overall();
        match overall {
            BinaryTypeInfo::Uninitialized => return false,
            BinaryTypeInfo::Generic => return true,
            _ => {}
        }
        if !self.left.accepts(BinaryTypeInfo::of(heap, x, self.op))
            || !self.right.accepts(BinaryTypeInfo::of(heap, y, self.op))
        {
            return false;
        }
        let produced = BinaryTypeInfo::of(heap, result, self.op);
        if produced.is_numeric() && overall.is_numeric() {
            produced <= overall.max(self.result)
        } else {
            true
        }
    }

    /// The stub a site moves to after missing on `x op y`
    pub fn next(&self, heap: &Heap, x: Value, y: Value) -> BinaryOpStub {
        let op = self.op;
        let mut left = self.left.widen(heap, x, op);
        let mut right = self.right.widen(heap, y, op);
        // String feedback is only useful for additions
        if (left == BinaryTypeInfo::String || right == BinaryTypeInfo::String) && op != BinaryOperation::Add {
            left = BinaryTypeInfo::Generic;
            right = BinaryTypeInfo::Generic;
        }
        let new_overall = left.max(right);
        let previous_overall = self.overall();
        let mut result = BinaryTypeInfo::Uninitialized;
        if new_overall == BinaryTypeInfo::Smi && previous_overall == BinaryTypeInfo::Smi {
            // Two small integers produced something wider
            result = match op {
                BinaryOperation::Div | BinaryOperation::Mul | BinaryOperation::Shr => BinaryTypeInfo::Number,
                _ => BinaryTypeInfo::Int32,
            };
        }
        if new_overall == BinaryTypeInfo::Int32
            && previous_overall == BinaryTypeInfo::Int32
            && left == self.left
            && right == self.right
        {
            result = BinaryTypeInfo::Number;
        }
        BinaryOpStub {
            op,
            left,
            right,
            result: result.max(self.result),
        }
    }
}

/// Evaluate a binary operation
pub fn binary_operation(heap: &mut Heap, op: BinaryOperation, x: Value, y: Value) -> Value {
    if op == BinaryOperation::Add && (heap.is_string(x) || heap.is_string(y)) {
        let text = heap.to_display_string(x) + &heap.to_display_string(y);
        return heap.new_string(text);
    }
    let (a, b) = (heap.to_number(x), heap.to_number(y));
    let value = match op {
        BinaryOperation::Add => a + b,
        BinaryOperation::Sub => a - b,
        BinaryOperation::Mul => a * b,
        BinaryOperation::Div => a / b,
        BinaryOperation::Mod => a % b,
        BinaryOperation::BitOr => f64::from(to_int32(a) | to_int32(b)),
        BinaryOperation::BitAnd => f64::from(to_int32(a) & to_int32(b)),
        BinaryOperation::BitXor => f64::from(to_int32(a) ^ to_int32(b)),
        BinaryOperation::Sar => f64::from(to_int32(a) >> (to_uint32(b) & 31)),
        BinaryOperation::Shl => f64::from(to_int32(a).wrapping_shl(to_uint32(b) & 31)),
        BinaryOperation::Shr => f64::from(to_uint32(a) >> (to_uint32(b) & 31)),
    };
    heap.new_number(value)
}

/// Run a binary-operation site
pub fn binary_op(isolate: &mut Isolate, site: &mut CallSite, x: Value, y: Value) -> Value {
    let Handler::BinaryOp(current) = *site.target().handler() else {
        crate::error::fatal(format!("binary site holds a {} stub", site.target().kind()));
    };
    let result = binary_operation(&mut isolate.heap, current.op, x, y);
    if !current.handles(&isolate.heap, x, y, result) {
        let next = current.next(&isolate.heap, x, y);
        if isolate.config.trace_ic {
            tracing::debug!(
                target: "bailout::ic",
                "[BinaryOpIC (({}+{})->(({}+{})->{}))#{}]",
                current.left,
                current.right,
                next.left,
                next.right,
                next.result,
                current.op.name()
            );
        }
        let stub = isolate.stubs.shared(next.spec());
        super::set_target(isolate, site, stub);
    }
    result
}

// ==================== ToBoolean ====================

bitflags! {
    /// Input types a to-boolean stub has seen
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ToBooleanTypes: u8 {
        const UNDEFINED = 1 << 0;
        const BOOLEAN = 1 << 1;
        const NULL = 1 << 2;
        const SMI = 1 << 3;
        const SPEC_OBJECT = 1 << 4;
        const STRING = 1 << 5;
        const HEAP_NUMBER = 1 << 6;
        const INTERNAL_OBJECT = 1 << 7;
    }
}

impl ToBooleanTypes {
    /// The single type bit describing `value`
    pub fn of(heap: &Heap, value: Value) -> ToBooleanTypes {
        match value {
            Value::Undefined => ToBooleanTypes::UNDEFINED,
            Value::Boolean(_) => ToBooleanTypes::BOOLEAN,
            Value::Null => ToBooleanTypes::NULL,
            Value::Smi(_) => ToBooleanTypes::SMI,
            Value::Hole | Value::ArgumentsMarker => ToBooleanTypes::INTERNAL_OBJECT,
            Value::Object(_) => {
                if heap.is_heap_number(value) {
                    ToBooleanTypes::HEAP_NUMBER
                } else if heap.is_string(value) {
                    ToBooleanTypes::STRING
                } else {
                    ToBooleanTypes::SPEC_OBJECT
                }
            }
        }
    }

    pub fn ic_state(self) -> IcState {
        if self.is_empty() {
            IcState::Uninitialized
        } else {
            IcState::Monomorphic
        }
    }

    pub(crate) fn spec(self) -> StubSpec {
        StubSpec::new(
            IcKind::ToBoolean,
            self.ic_state(),
            ExtraIcState::default(),
            Handler::ToBoolean(self),
        )
    }
}

/// Run a to-boolean site
pub fn to_boolean(isolate: &mut Isolate, site: &mut CallSite, value: Value) -> bool {
    let Handler::ToBoolean(current) = *site.target().handler() else {
        crate::error::fatal(format!("to-boolean site holds a {} stub", site.target().kind()));
    };
    let observed = ToBooleanTypes::of(&isolate.heap, value);
    if !current.contains(observed) {
        let next = current | observed;
        if isolate.config.trace_ic {
            tracing::debug!(target: "bailout::ic", "[ToBooleanIC ({:?}->{:?})]", current, next);
        }
        let stub = isolate.stubs.shared(next.spec());
        super::set_target(isolate, site, stub);
    }
    isolate.heap.to_boolean(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unary_widening_is_monotonic() {
        use UnaryTypeInfo::*;
        assert_eq!(Uninitialized.widen(Smi), Smi);
        assert_eq!(Smi.widen(Number), Number);
        assert_eq!(Smi.widen(Smi), Number);
        assert_eq!(Smi.widen(Generic), Generic);
        assert_eq!(Number.widen(Number), Generic);
    }

    #[test]
    fn test_unary_smi_stub_misses_on_minus_zero() {
        let mut heap = Heap::new();
        let stub = UnaryOpStub {
            op: UnaryOperation::Sub,
            operand: UnaryTypeInfo::Smi,
        };
        let result = unary_operation(&mut heap, UnaryOperation::Sub, Value::Smi(0));
        assert!(heap.is_heap_number(result));
        assert!(!stub.handles(&heap, Value::Smi(0), result));
        let result = unary_operation(&mut heap, UnaryOperation::Sub, Value::Smi(5));
        assert!(stub.handles(&heap, Value::Smi(5), result));
    }

    #[test]
    fn test_binary_operand_types() {
        let mut heap = Heap::new();
        let int = heap.allocate_heap_number(1_500_000_000.0);
        let half = heap.allocate_heap_number(0.5);
        let text = heap.new_string("x");
        assert_eq!(BinaryTypeInfo::of(&heap, Value::Smi(3), BinaryOperation::Add), BinaryTypeInfo::Smi);
        assert_eq!(BinaryTypeInfo::of(&heap, int, BinaryOperation::Add), BinaryTypeInfo::Int32);
        assert_eq!(BinaryTypeInfo::of(&heap, half, BinaryOperation::Add), BinaryTypeInfo::Number);
        assert_eq!(BinaryTypeInfo::of(&heap, text, BinaryOperation::Add), BinaryTypeInfo::String);
        assert_eq!(
            BinaryTypeInfo::of(&heap, Value::Undefined, BinaryOperation::BitOr),
            BinaryTypeInfo::Int32
        );
        assert_eq!(
            BinaryTypeInfo::of(&heap, Value::Undefined, BinaryOperation::Add),
            BinaryTypeInfo::Oddball
        );
    }

    #[test]
    fn test_binary_smi_overflow_widens_result() {
        let mut heap = Heap::new();
        let first = BinaryOpStub::uninitialized(BinaryOperation::Add).next(&heap, Value::Smi(1), Value::Smi(2));
        assert_eq!((first.left, first.right, first.result), (BinaryTypeInfo::Smi, BinaryTypeInfo::Smi, BinaryTypeInfo::Uninitialized));

        let big = Value::Smi(crate::heap::SMI_MAX);
        let sum = binary_operation(&mut heap, BinaryOperation::Add, big, big);
        assert!(!first.handles(&heap, big, big, sum));
        let second = first.next(&heap, big, big);
        assert_eq!(second.result, BinaryTypeInfo::Int32);
        assert!(second.handles(&heap, big, big, sum));

        let product = binary_operation(&mut heap, BinaryOperation::Mul, big, big);
        let mul = BinaryOpStub {
            op: BinaryOperation::Mul,
            ..first
        };
        assert_eq!(mul.next(&heap, big, big).result, BinaryTypeInfo::Number);
        assert!(heap.is_heap_number(product));
    }

    #[test]
    fn test_string_feedback_only_for_add() {
        let mut heap = Heap::new();
        let text = heap.new_string("a");
        let add = BinaryOpStub::uninitialized(BinaryOperation::Add).next(&heap, text, Value::Smi(1));
        assert_eq!(add.left, BinaryTypeInfo::String);
        let sub = BinaryOpStub::uninitialized(BinaryOperation::Sub).next(&heap, text, Value::Smi(1));
        assert_eq!((sub.left, sub.right), (BinaryTypeInfo::Generic, BinaryTypeInfo::Generic));
        assert_eq!(sub.spec().state, IcState::Generic);
    }

    #[test]
    fn test_binary_semantics() {
        let mut heap = Heap::new();
        let text = heap.new_string("n=");
        let joined = binary_operation(&mut heap, BinaryOperation::Add, text, Value::Smi(4));
        assert_eq!(heap.string_value(joined), Some("n=4"));
        assert_eq!(
            binary_operation(&mut heap, BinaryOperation::Shr, Value::Smi(-1), Value::Smi(28)),
            Value::Smi(15)
        );
        assert_eq!(
            binary_operation(&mut heap, BinaryOperation::Shl, Value::Smi(1), Value::Smi(33)),
            Value::Smi(2)
        );
        assert_eq!(
            binary_operation(&mut heap, BinaryOperation::Mod, Value::Smi(-7), Value::Smi(2)),
            Value::Smi(-1)
        );
    }

    #[test]
    fn test_to_boolean_types() {
        let mut heap = Heap::new();
        let text = heap.new_string("");
        let types = ToBooleanTypes::of(&heap, Value::Undefined) | ToBooleanTypes::of(&heap, text);
        assert!(types.contains(ToBooleanTypes::STRING));
        assert_eq!(types.ic_state(), IcState::Monomorphic);
        assert_eq!(ToBooleanTypes::empty().ic_state(), IcState::Uninitialized);
    }
}
