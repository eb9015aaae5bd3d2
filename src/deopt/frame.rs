//! Frame descriptions
//!
//! A [`FrameDescription`] is an index-addressed array of words standing for one stack
//! frame. Offsets count words up from the frame's top (its lowest address), so the
//! caller's part of the frame sits at the highest offsets:
//!
//! ```text
//!   offset size-1        receiver              \
//!          size-2-i      parameter i            | parameters area
//!          ...                                 /
//!          size-area-1   caller pc             \
//!          size-area-2   caller fp              | FIXED_FRAME_SLOTS
//!          size-area-3   context / marker       |
//!          size-area-4   function / marker     /
//!          ...           expressions, spill slots, frame-kind extras
//!   offset 0
//! ```

use std::fmt;

use super::code::FullCodeState;
use super::CodeId;
use crate::error::fatal;
use crate::heap::Value;

/// Words every frame reserves between its parameters and its body
pub const FIXED_FRAME_SLOTS: usize = 4;
pub const NUM_REGISTERS: usize = 8;
pub const NUM_DOUBLE_REGISTERS: usize = 8;

/// Highest address of the simulated stack; frames grow down from here
pub const STACK_BASE: usize = 0x10_0000;

/// One word of a frame or a general-purpose register
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Word {
    /// A value the collector can see
    Tagged(Value),
    /// Untagged integer held by optimized code
    Int(i64),
    /// Unboxed double held by optimized code
    Double(f64),
    /// A code object, as pushed by stub frames
    Code(CodeId),
    /// Never written
    #[default]
    Zap,
}

impl Word {
    pub fn as_tagged(self) -> Option<Value> {
        match self {
            Word::Tagged(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Word::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_double(self) -> Option<f64> {
        match self {
            Word::Double(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for Word {
    fn from(value: Value) -> Self {
        Word::Tagged(value)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Word::Tagged(value) => write!(f, "{}", value),
            Word::Int(value) => write!(f, "int {}", value),
            Word::Double(value) => write!(f, "double {}", value),
            Word::Code(code) => write!(f, "{}", code),
            Word::Zap => f.write_str("<zap>"),
        }
    }
}

/// What kind of frame a description stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Unoptimized function frame
    JavaScript,
    /// Frame of optimized code
    Optimized,
    /// Adapts an actual argument count to the formal one
    ArgumentsAdaptor,
    /// Frame of the construct stub, holding the allocated receiver
    Construct,
    /// Frame of an accessor stub
    Internal,
    /// Frame of a compiled code stub
    Stub,
    /// Frame a failed compiled stub resumes through
    StubFailureTrampoline,
}

impl FrameType {
    /// Small integer written in place of the context or function of non-JS frames
    pub fn marker(self) -> Value {
        Value::Smi(self as i32)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameType::JavaScript => "JAVA_SCRIPT",
            FrameType::Optimized => "OPTIMIZED",
            FrameType::ArgumentsAdaptor => "ARGUMENTS_ADAPTOR",
            FrameType::Construct => "CONSTRUCT",
            FrameType::Internal => "INTERNAL",
            FrameType::Stub => "STUB",
            FrameType::StubFailureTrampoline => "STUB_FAILURE_TRAMPOLINE",
        };
        f.write_str(name)
    }
}

/// The fixed words of a frame, counted from the parameters area down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedSlot {
    CallerPc = 0,
    CallerFp = 1,
    /// Context, or a frame type marker
    Context = 2,
    /// Function, or a frame type marker
    Function = 3,
}

impl FixedSlot {
    pub const ALL: [FixedSlot; FIXED_FRAME_SLOTS] =
        [FixedSlot::CallerPc, FixedSlot::CallerFp, FixedSlot::Context, FixedSlot::Function];
}

/// General-purpose and double registers saved at a bailout
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterFile {
    registers: [Word; NUM_REGISTERS],
    doubles: [f64; NUM_DOUBLE_REGISTERS],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            registers: [Word::Zap; NUM_REGISTERS],
            doubles: [0.0; NUM_DOUBLE_REGISTERS],
        }
    }
}

impl RegisterFile {
    pub fn register(&self, index: u32) -> Word {
        match self.registers.get(index as usize) {
            Some(word) => *word,
            None => fatal(format!("register r{} out of range", index)),
        }
    }

    pub fn set_register(&mut self, index: u32, word: Word) {
        match self.registers.get_mut(index as usize) {
            Some(slot) => *slot = word,
            None => fatal(format!("register r{} out of range", index)),
        }
    }

    pub fn double_register(&self, index: u32) -> f64 {
        match self.doubles.get(index as usize) {
            Some(value) => *value,
            None => fatal(format!("double register d{} out of range", index)),
        }
    }

    pub fn set_double_register(&mut self, index: u32, value: f64) {
        match self.doubles.get_mut(index as usize) {
            Some(slot) => *slot = value,
            None => fatal(format!("double register d{} out of range", index)),
        }
    }
}

/// One frame, either the optimized input of a bailout or one of its outputs
#[derive(Debug, Clone)]
pub struct FrameDescription {
    frame_type: FrameType,
    /// `None` for frames of compiled stubs
    function: Option<Value>,
    /// Receiver plus parameters, zero for stub and accessor frames
    parameters_area: usize,
    slots: Vec<Word>,
    top: usize,
    pc: usize,
    fp: usize,
    context: Value,
    state: FullCodeState,
    continuation: Option<usize>,
    registers: RegisterFile,
}

impl FrameDescription {
    /// A frame of `size` words, all zapped
    pub fn new(size: usize, frame_type: FrameType, function: Option<Value>, parameters_area: usize) -> Self {
        if size < parameters_area + FIXED_FRAME_SLOTS {
            fatal(format!(
                "frame of {} words cannot hold {} parameter words and the fixed part",
                size, parameters_area
            ));
        }
        Self {
            frame_type,
            function,
            parameters_area,
            slots: vec![Word::Zap; size],
            top: 0,
            pc: 0,
            fp: 0,
            context: Value::Undefined,
            state: FullCodeState::NoRegisters,
            continuation: None,
            registers: RegisterFile::default(),
        }
    }

    /// An optimized or unoptimized frame of a function with `formal_parameter_count`
    /// parameters and `height` words below the fixed part
    pub fn for_function(
        frame_type: FrameType,
        function: Value,
        formal_parameter_count: usize,
        height: usize,
    ) -> Self {
        let area = formal_parameter_count + 1;
        Self::new(area + FIXED_FRAME_SLOTS + height, frame_type, Some(function), area)
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn function(&self) -> Option<Value> {
        self.function
    }

    pub fn parameters_area(&self) -> usize {
        self.parameters_area
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn set_top(&mut self, top: usize) {
        self.top = top;
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    pub fn fp(&self) -> usize {
        self.fp
    }

    pub fn set_fp(&mut self, fp: usize) {
        self.fp = fp;
    }

    pub fn context(&self) -> Value {
        self.context
    }

    pub fn set_context(&mut self, context: Value) {
        self.context = context;
    }

    pub fn state(&self) -> FullCodeState {
        self.state
    }

    pub fn set_state(&mut self, state: FullCodeState) {
        self.state = state;
    }

    /// Where control goes once the frame is in place, for the innermost frame
    pub fn continuation(&self) -> Option<usize> {
        self.continuation
    }

    pub fn set_continuation(&mut self, continuation: usize) {
        self.continuation = Some(continuation);
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    pub fn slot(&self, offset: usize) -> Word {
        match self.slots.get(offset) {
            Some(word) => *word,
            None => fatal(format!("frame slot {} out of range (size {})", offset, self.size())),
        }
    }

    pub fn set_slot(&mut self, offset: usize, word: Word) {
        let size = self.size();
        match self.slots.get_mut(offset) {
            Some(slot) => *slot = word,
            None => fatal(format!("frame slot {} out of range (size {})", offset, size)),
        }
    }

    pub fn set_tagged(&mut self, offset: usize, value: Value) {
        self.set_slot(offset, Word::Tagged(value));
    }

    /// Absolute stack address of the word at `offset`
    pub fn address_of(&self, offset: usize) -> usize {
        self.top + offset
    }

    /// Offset of one of the fixed words
    pub fn fixed_slot_offset(&self, slot: FixedSlot) -> usize {
        self.size() - self.parameters_area - 1 - slot as usize
    }

    /// Offset of a spill slot (`index >= 0`) or an incoming parameter (`index < 0`,
    /// with `-1` the last parameter and `-area` the receiver)
    pub fn offset_from_slot_index(&self, index: i32) -> usize {
        let size = self.size() as i64;
        let area = self.parameters_area as i64;
        let base = if index >= 0 {
            size - (FIXED_FRAME_SLOTS as i64) - area
        } else {
            size - area
        };
        let offset = base - (i64::from(index) + 1);
        if offset < 0 || offset >= size {
            fatal(format!(
                "slot index {} outside a {} frame of {} words",
                index, self.frame_type, size
            ));
        }
        offset as usize
    }

    /// Number of parameters, not counting the receiver
    pub fn parameters_count(&self) -> usize {
        self.parameters_area.saturating_sub(1)
    }

    pub fn parameter(&self, index: usize) -> Word {
        self.slot(self.size() - 2 - index)
    }

    pub fn receiver(&self) -> Word {
        self.slot(self.size() - 1)
    }

    /// Words below the fixed part
    pub fn expression_count(&self) -> usize {
        self.size() - FIXED_FRAME_SLOTS - self.parameters_area
    }

    pub fn expression(&self, index: usize) -> Word {
        self.slot(self.expression_count() - 1 - index)
    }

    pub fn set_expression(&mut self, index: usize, word: Word) {
        let offset = self.expression_count() - 1 - index;
        self.set_slot(offset, word);
    }

    pub fn words(&self) -> &[Word] {
        &self.slots
    }
}

/// The simulated machine stack
#[derive(Debug, Clone, Default)]
pub struct Stack {
    frames: Vec<FrameDescription>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest address in use
    pub fn sp(&self) -> usize {
        self.frames.last().map_or(STACK_BASE, FrameDescription::top)
    }

    /// Push `frame` below the current top, linking its fp
    pub fn push(&mut self, mut frame: FrameDescription) -> usize {
        let top = self.sp() - frame.size();
        frame.set_top(top);
        let fp = frame.address_of(frame.fixed_slot_offset(FixedSlot::CallerFp));
        frame.set_fp(fp);
        self.frames.push(frame);
        self.frames.len() - 1
    }

    pub fn pop(&mut self) -> Option<FrameDescription> {
        self.frames.pop()
    }

    pub fn top_frame(&self) -> Option<&FrameDescription> {
        self.frames.last()
    }

    pub fn top_frame_mut(&mut self) -> Option<&mut FrameDescription> {
        self.frames.last_mut()
    }

    pub fn get(&self, index: usize) -> Option<&FrameDescription> {
        self.frames.get(index)
    }

    /// Replace the innermost frame by `frames`, outermost first.
    ///
    /// The replacement frames already carry their final addresses.
    pub fn replace_top(&mut self, frames: Vec<FrameDescription>) -> Option<FrameDescription> {
        let replaced = self.frames.pop();
        self.frames.extend(frames);
        replaced
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameDescription> {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function_frame() -> FrameDescription {
        // two parameters, three expressions
        FrameDescription::for_function(FrameType::JavaScript, Value::Smi(99), 2, 3)
    }

    #[test]
    fn test_fixed_slots_sit_below_parameters() {
        let frame = function_frame();
        assert_eq!(frame.size(), 3 + FIXED_FRAME_SLOTS + 3);
        assert_eq!(frame.fixed_slot_offset(FixedSlot::CallerPc), 6);
        assert_eq!(frame.fixed_slot_offset(FixedSlot::Function), 3);
        assert_eq!(frame.expression_count(), 3);
    }

    #[test]
    fn test_slot_indexes_map_to_offsets() {
        let frame = function_frame();
        // spill slots start right below the fixed part
        assert_eq!(frame.offset_from_slot_index(0), 2);
        assert_eq!(frame.offset_from_slot_index(2), 0);
        // negative indexes address the parameters area
        assert_eq!(frame.offset_from_slot_index(-1), 7);
        assert_eq!(frame.offset_from_slot_index(-3), 9);
    }

    #[test]
    fn test_parameters_and_expressions() {
        let mut frame = function_frame();
        frame.set_tagged(9, Value::Undefined);
        frame.set_tagged(8, Value::Smi(10));
        frame.set_tagged(7, Value::Smi(11));
        frame.set_expression(0, Word::Tagged(Value::Smi(20)));
        assert_eq!(frame.receiver(), Word::Tagged(Value::Undefined));
        assert_eq!(frame.parameter(0), Word::Tagged(Value::Smi(10)));
        assert_eq!(frame.parameter(1), Word::Tagged(Value::Smi(11)));
        assert_eq!(frame.slot(2), Word::Tagged(Value::Smi(20)));
        assert_eq!(frame.parameter(1), frame.slot(frame.offset_from_slot_index(-1)));
    }

    #[test]
    fn test_stack_push_links_frames() {
        let mut stack = Stack::new();
        stack.push(function_frame());
        stack.push(function_frame());
        let outer = stack.get(0).unwrap();
        let inner = stack.get(1).unwrap();
        assert_eq!(outer.top(), STACK_BASE - outer.size());
        assert_eq!(inner.top() + inner.size(), outer.top());
        assert_eq!(inner.fp(), inner.top() + inner.fixed_slot_offset(FixedSlot::CallerFp));
    }

    #[test]
    fn test_registers() {
        let mut registers = RegisterFile::default();
        registers.set_register(3, Word::Int(-4));
        registers.set_double_register(1, 2.5);
        assert_eq!(registers.register(3).as_int(), Some(-4));
        assert_eq!(registers.register(0), Word::Zap);
        assert_eq!(registers.double_register(1), 2.5);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_register_out_of_range_is_fatal() {
        RegisterFile::default().register(NUM_REGISTERS as u32);
    }
}
