//! Code objects and the metadata the deoptimizer reads from them

use std::fmt;

use super::{BailoutId, CodeId};
use crate::error::fatal;
use crate::heap::{ShapeId, SharedId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeKind {
    /// Unoptimized (baseline) code of a function
    Function,
    OptimizedFunction,
    CompiledStub,
    Builtin,
}

/// What the baseline code expects in registers when a frame resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullCodeState {
    #[default]
    NoRegisters,
    /// The top of the expression stack lives in the accumulator
    TosRegister,
}

impl fmt::Display for FullCodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullCodeState::NoRegisters => f.write_str("NO_REGISTERS"),
            FullCodeState::TosRegister => f.write_str("TOS_REG"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcAndState {
    pub pc_offset: usize,
    pub state: FullCodeState,
}

/// Bailout id to resume point map of a piece of baseline code
#[derive(Debug, Clone, Default)]
pub struct DeoptimizationOutputData {
    points: Vec<(BailoutId, PcAndState)>,
}

impl DeoptimizationOutputData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: BailoutId, pc_offset: usize, state: FullCodeState) {
        self.points.push((id, PcAndState { pc_offset, state }));
    }

    pub fn with_point(mut self, id: BailoutId, pc_offset: usize, state: FullCodeState) -> Self {
        self.add(id, pc_offset, state);
        self
    }

    /// Linear scan; this only runs on a bailout
    pub fn find(&self, id: BailoutId) -> Option<PcAndState> {
        self.points.iter().find(|(point, _)| *point == id).map(|(_, pc)| *pc)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One bailout point of optimized code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeoptEntry {
    pub ast_id: BailoutId,
    /// Byte offset of the entry's BEGIN record in the translation buffer
    pub translation_index: usize,
    /// Outgoing arguments pushed below the spill slots at this point
    pub arguments_stack_height: usize,
    /// Offset of the point from the start of the code
    pub pc: usize,
}

/// Everything the deoptimizer needs to unwind a piece of optimized code
#[derive(Debug, Clone, Default)]
pub struct DeoptimizationInputData {
    pub translations: Vec<u8>,
    pub entries: Vec<DeoptEntry>,
    pub literals: Vec<Value>,
    pub osr_ast_id: Option<BailoutId>,
}

impl DeoptimizationInputData {
    pub fn entry(&self, bailout_id: usize) -> &DeoptEntry {
        match self.entries.get(bailout_id) {
            Some(entry) => entry,
            None => fatal(format!(
                "no deoptimization entry {} ({} recorded)",
                bailout_id,
                self.entries.len()
            )),
        }
    }

    pub fn literal(&self, index: u32) -> Value {
        match self.literals.get(index as usize) {
            Some(value) => *value,
            None => fatal(format!("literal {} out of range ({} recorded)", index, self.literals.len())),
        }
    }

    /// Entry recorded for the return address offset `pc_offset`
    pub fn entry_for_pc(&self, pc_offset: usize) -> Option<usize> {
        self.entries.iter().position(|entry| entry.pc == pc_offset)
    }

    /// Entry recorded for `ast_id`
    pub fn entry_for_ast_id(&self, ast_id: BailoutId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.ast_id == ast_id)
    }
}

/// A piece of generated code
#[derive(Debug, Clone)]
pub struct Code {
    pub kind: CodeKind,
    /// Assigned when the code is added to a [`CodeSpace`]
    pub instruction_start: usize,
    pub instruction_size: usize,
    /// Spill slots of optimized code
    pub stack_slots: usize,
    /// Register parameters of a compiled stub
    pub stub_parameter_count: usize,
    pub function: Option<SharedId>,
    pub deopt_input: Option<DeoptimizationInputData>,
    pub deopt_output: Option<DeoptimizationOutputData>,
    /// Shapes whose change invalidates this code
    pub dependent_shapes: Vec<ShapeId>,
    pub marked_for_deoptimization: bool,
    /// Offset frames resume at when a builtin is re-entered after a bailout
    pub continuation_offset: usize,
}

impl Code {
    pub fn new(kind: CodeKind, instruction_size: usize) -> Self {
        Self {
            kind,
            instruction_start: 0,
            instruction_size,
            stack_slots: 0,
            stub_parameter_count: 0,
            function: None,
            deopt_input: None,
            deopt_output: None,
            dependent_shapes: Vec::new(),
            marked_for_deoptimization: false,
            continuation_offset: 0,
        }
    }

    /// Baseline code of `function` with its resume points
    pub fn unoptimized(function: SharedId, instruction_size: usize, output: DeoptimizationOutputData) -> Self {
        let mut code = Self::new(CodeKind::Function, instruction_size);
        code.function = Some(function);
        code.deopt_output = Some(output);
        code
    }

    /// Optimized code of `function` with its bailout points
    pub fn optimized(
        function: SharedId,
        instruction_size: usize,
        stack_slots: usize,
        input: DeoptimizationInputData,
    ) -> Self {
        let mut code = Self::new(CodeKind::OptimizedFunction, instruction_size);
        code.function = Some(function);
        code.stack_slots = stack_slots;
        code.deopt_input = Some(input);
        code
    }

    /// A compiled stub taking `parameter_count` register parameters
    pub fn compiled_stub(instruction_size: usize, parameter_count: usize, input: DeoptimizationInputData) -> Self {
        let mut code = Self::new(CodeKind::CompiledStub, instruction_size);
        code.stub_parameter_count = parameter_count;
        code.deopt_input = Some(input);
        code
    }

    pub fn with_dependent_shape(mut self, shape: ShapeId) -> Self {
        self.dependent_shapes.push(shape);
        self
    }

    pub fn contains(&self, pc: usize) -> bool {
        pc >= self.instruction_start && pc < self.instruction_start + self.instruction_size
    }

    /// Absolute address of `offset` into the code
    pub fn address(&self, offset: usize) -> usize {
        self.instruction_start + offset
    }

    /// Where a frame re-entering this builtin resumes
    pub fn continuation(&self) -> usize {
        self.address(self.continuation_offset)
    }

    pub fn is_optimized(&self) -> bool {
        self.kind == CodeKind::OptimizedFunction
    }

    pub fn input_data(&self) -> &DeoptimizationInputData {
        match &self.deopt_input {
            Some(data) => data,
            None => fatal(format!("{:?} code has no deoptimization input data", self.kind)),
        }
    }
}

/// All code objects of an isolate, laid out at increasing addresses
#[derive(Debug, Clone)]
pub struct CodeSpace {
    codes: Vec<Code>,
    next_start: usize,
}

/// Base address of the first code object
const CODE_SPACE_START: usize = 0x1000;

impl Default for CodeSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeSpace {
    pub fn new() -> Self {
        Self {
            codes: Vec::new(),
            next_start: CODE_SPACE_START,
        }
    }

    /// Place `code` after the last code object
    pub fn add(&mut self, mut code: Code) -> CodeId {
        code.instruction_start = self.next_start;
        // keep code objects apart so a pc never matches two of them
        self.next_start += code.instruction_size.max(1) + 16;
        let id = CodeId(self.codes.len() as u32);
        self.codes.push(code);
        id
    }

    pub fn get(&self, id: CodeId) -> &Code {
        &self.codes[id.index()]
    }

    pub fn get_mut(&mut self, id: CodeId) -> &mut Code {
        &mut self.codes[id.index()]
    }

    /// The code object containing `pc`
    pub fn find_code_for_pc(&self, pc: usize) -> Option<CodeId> {
        let index = self.codes.partition_point(|code| code.instruction_start <= pc);
        let candidate = index.checked_sub(1)?;
        self.codes[candidate]
            .contains(pc)
            .then_some(CodeId(candidate as u32))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CodeId, &Code)> {
        self.codes
            .iter()
            .enumerate()
            .map(|(index, code)| (CodeId(index as u32), code))
    }
}

/// Builtins frames resume through after a bailout
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub arguments_adaptor: CodeId,
    pub construct_stub: CodeId,
    pub getter_stub: CodeId,
    pub setter_stub: CodeId,
    pub notify_deoptimized: CodeId,
    pub notify_lazy_deoptimized: CodeId,
    pub notify_osr: CodeId,
    pub notify_stub_failure: CodeId,
    pub stub_failure_trampoline: CodeId,
}

impl Builtins {
    /// Add the builtins to `space`
    pub fn install(space: &mut CodeSpace) -> Self {
        let mut builtin = |continuation_offset: usize| {
            let mut code = Code::new(CodeKind::Builtin, 64);
            code.continuation_offset = continuation_offset;
            space.add(code)
        };
        Self {
            arguments_adaptor: builtin(24),
            construct_stub: builtin(40),
            getter_stub: builtin(12),
            setter_stub: builtin(16),
            notify_deoptimized: builtin(0),
            notify_lazy_deoptimized: builtin(0),
            notify_osr: builtin(0),
            notify_stub_failure: builtin(0),
            stub_failure_trampoline: builtin(8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_space_finds_code_by_pc() {
        let mut space = CodeSpace::new();
        let a = space.add(Code::new(CodeKind::Builtin, 32));
        let b = space.add(Code::new(CodeKind::Builtin, 8));
        let start_b = space.get(b).instruction_start;
        assert_eq!(space.find_code_for_pc(space.get(a).address(31)), Some(a));
        assert_eq!(space.find_code_for_pc(start_b), Some(b));
        assert_eq!(space.find_code_for_pc(start_b + 8), None);
        assert_eq!(space.find_code_for_pc(0), None);
    }

    #[test]
    fn test_output_data_lookup() {
        let data = DeoptimizationOutputData::new()
            .with_point(BailoutId(3), 10, FullCodeState::NoRegisters)
            .with_point(BailoutId(7), 22, FullCodeState::TosRegister);
        assert_eq!(
            data.find(BailoutId(7)),
            Some(PcAndState {
                pc_offset: 22,
                state: FullCodeState::TosRegister
            })
        );
        assert_eq!(data.find(BailoutId(4)), None);
    }

    #[test]
    fn test_builtin_continuations_are_distinct() {
        let mut space = CodeSpace::new();
        let builtins = Builtins::install(&mut space);
        let adaptor = space.get(builtins.arguments_adaptor).continuation();
        let construct = space.get(builtins.construct_stub).continuation();
        assert_ne!(adaptor, construct);
        assert_eq!(space.find_code_for_pc(adaptor), Some(builtins.arguments_adaptor));
    }

    #[test]
    #[should_panic(expected = "no deoptimization entry")]
    fn test_missing_entry_is_fatal() {
        DeoptimizationInputData::default().entry(0);
    }
}
