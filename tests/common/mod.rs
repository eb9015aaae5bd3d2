//! Shared test helpers for integration tests

#![allow(dead_code)]

use bailout::deopt::frame::STACK_BASE;
use bailout::deopt::FixedSlot;
use bailout::prelude::*;

/// A function with baseline code, ready to get optimized code installed
pub struct FunctionFixture {
    pub function: Value,
    pub id: ObjectId,
    pub shared: SharedId,
    pub baseline: CodeId,
}

/// Create a function with `formal_parameter_count` parameters whose baseline code
/// resumes node `id` at pc offset `pc_offset` for every `(id, pc_offset)` in `points`
pub fn baseline_function(
    isolate: &mut Isolate,
    name: &str,
    formal_parameter_count: usize,
    points: &[(u32, usize)],
) -> FunctionFixture {
    let heap = isolate.heap_mut();
    let shared = heap.new_shared_function_info(name, formal_parameter_count, None);
    let mut output = DeoptimizationOutputData::new();
    for &(id, pc_offset) in points {
        output.add(BailoutId(id), pc_offset, FullCodeState::NoRegisters);
    }
    let baseline = isolate.add_code(Code::unoptimized(shared, 128, output));
    isolate.heap_mut().shared_mut(shared).code = Some(baseline);
    let id = isolate.heap_mut().new_function(shared);
    FunctionFixture {
        function: Value::Object(id),
        id,
        shared,
        baseline,
    }
}

/// One bailout point: the node it resumes, its pc offset and its translation
pub struct Point {
    pub ast_id: u32,
    pub pc: usize,
    pub translation_index: usize,
    pub arguments_stack_height: usize,
}

impl Point {
    pub fn entry(&self) -> DeoptEntry {
        DeoptEntry {
            ast_id: BailoutId(self.ast_id),
            translation_index: self.translation_index,
            arguments_stack_height: self.arguments_stack_height,
            pc: self.pc,
        }
    }
}

/// Add optimized code for `fixture` and install it
pub fn install_optimized(
    isolate: &mut Isolate,
    fixture: &FunctionFixture,
    stack_slots: usize,
    buffer: TranslationBuffer,
    points: &[Point],
    literals: Vec<Value>,
    osr_ast_id: Option<u32>,
) -> CodeId {
    let data = DeoptimizationInputData {
        translations: buffer.into_bytes(),
        entries: points.iter().map(Point::entry).collect(),
        literals,
        osr_ast_id: osr_ast_id.map(BailoutId),
    };
    let code = isolate.add_code(Code::optimized(fixture.shared, 64, stack_slots, data));
    assert!(isolate.install_optimized_code(fixture.id, code));
    code
}

/// Write caller pc and fp, an undefined context and the function marker
pub fn write_fixed_part(frame: &mut FrameDescription, function: Value) {
    frame.set_slot(frame.fixed_slot_offset(FixedSlot::CallerPc), Word::Int(0x42));
    frame.set_slot(frame.fixed_slot_offset(FixedSlot::CallerFp), Word::Int(STACK_BASE as i64));
    frame.set_tagged(frame.fixed_slot_offset(FixedSlot::Context), Value::Undefined);
    frame.set_tagged(frame.fixed_slot_offset(FixedSlot::Function), function);
}

/// An optimized frame of `fixture` stopped at `pc_offset` into `code`, with the
/// receiver and parameters in place and every spill slot zapped
pub fn optimized_frame(
    isolate: &Isolate,
    fixture: &FunctionFixture,
    code: CodeId,
    receiver: Value,
    parameters: &[Value],
    pc_offset: usize,
) -> FrameDescription {
    let stack_slots = isolate.code_space().get(code).stack_slots;
    let mut frame = FrameDescription::for_function(FrameType::Optimized, fixture.function, parameters.len(), stack_slots);
    write_fixed_part(&mut frame, fixture.function);
    let size = frame.size();
    frame.set_tagged(size - 1, receiver);
    for (i, value) in parameters.iter().enumerate() {
        frame.set_tagged(size - 2 - i, *value);
    }
    frame.set_pc(isolate.code_space().get(code).address(pc_offset));
    frame
}

/// An interpreted frame of `fixture` with the given expression stack
pub fn interpreted_frame(
    fixture: &FunctionFixture,
    receiver: Value,
    parameters: &[Value],
    expressions: &[Value],
) -> FrameDescription {
    let mut frame =
        FrameDescription::for_function(FrameType::JavaScript, fixture.function, parameters.len(), expressions.len());
    write_fixed_part(&mut frame, fixture.function);
    let size = frame.size();
    frame.set_tagged(size - 1, receiver);
    for (i, value) in parameters.iter().enumerate() {
        frame.set_tagged(size - 2 - i, *value);
    }
    for (i, value) in expressions.iter().enumerate() {
        frame.set_expression(i, Word::Tagged(*value));
    }
    frame
}

/// The tagged value of `word`, panicking on raw words
pub fn tagged(word: Word) -> Value {
    match word.as_tagged() {
        Some(value) => value,
        None => panic!("expected a tagged word, found {}", word),
    }
}

/// Number behind `value`, for Smis and heap numbers alike
pub fn number(isolate: &Isolate, value: Value) -> f64 {
    match isolate.heap().number_value(value) {
        Some(number) => number,
        None => panic!("{} is not a number", isolate.heap().describe(value)),
    }
}

/// An ordinary object with the given own data properties
pub fn object_with(isolate: &mut Isolate, properties: &[(&str, Value)]) -> ObjectId {
    let heap = isolate.heap_mut();
    let object = heap.new_object();
    for (name, value) in properties {
        let name = heap.intern(name);
        heap.add_property(object, name, *value, PropertyAttributes::empty());
    }
    object
}
