//! Frame translation
//!
//! A [`Deoptimizer`] lives for one bailout. It is created from the optimized input
//! frame, fills its output frames by replaying the translation recorded at the bailout
//! point, and hands the frames back as a [`Resumption`] once their deferred heap
//! values are materialized.

use super::code::{DeoptimizationInputData, FullCodeState};
use super::frame::{FixedSlot, FrameDescription, FrameType, Word, FIXED_FRAME_SLOTS};
use super::translation::{Opcode, TranslationCommand, TranslationIterator};
use super::{BailoutId, BailoutType, CodeId};
use crate::error::{fatal, Result};
use crate::heap::{Heap, Value, SMI_MAX};
use crate::isolate::Isolate;

pub use super::materialize::DeoptimizedFrameInfo;

/// What the runtime knows at the moment a bailout is requested
#[derive(Debug, Clone, Copy)]
pub struct BailoutRequest {
    pub bailout_type: BailoutType,
    /// The optimized function, `None` for compiled stubs
    pub function: Option<Value>,
    /// Index of the deoptimization entry to run
    pub bailout_id: usize,
    /// Return address of the bailout; locates the code of lazy bailouts
    pub from: usize,
    /// Code to unwind when it is not the function's current code
    pub code: Option<CodeId>,
}

impl BailoutRequest {
    /// A guard in `function`'s current optimized code failed
    pub fn eager(function: Value, bailout_id: usize) -> Self {
        Self {
            bailout_type: BailoutType::Eager,
            function: Some(function),
            bailout_id,
            from: 0,
            code: None,
        }
    }

    /// A frame of code invalidated while it was suspended returned to `from`
    pub fn lazy(function: Value, bailout_id: usize, from: usize) -> Self {
        Self {
            bailout_type: BailoutType::Lazy,
            function: Some(function),
            bailout_id,
            from,
            code: None,
        }
    }

    /// Enter `function`'s optimized code from its interpreted frame
    pub fn osr(function: Value, from: usize) -> Self {
        Self {
            bailout_type: BailoutType::Osr,
            function: Some(function),
            bailout_id: 0,
            from,
            code: None,
        }
    }

    /// A compiled stub failed
    pub fn stub(code: CodeId, bailout_id: usize) -> Self {
        Self {
            bailout_type: BailoutType::Eager,
            function: None,
            bailout_id,
            from: 0,
            code: Some(code),
        }
    }
}

/// An unboxed number waiting for its heap box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeferredHeapNumber {
    pub frame_index: usize,
    pub offset: usize,
    pub value: f64,
}

/// An arguments object waiting to be allocated
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredArgumentsObject {
    pub frame_index: usize,
    pub offset: usize,
    /// Argument values read from the optimized frame, holes where unknown
    pub values: Vec<Value>,
}

/// A value produced by one translation command
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Translated {
    Tagged(Value),
    /// Needs a heap number
    Number(f64),
    /// Needs an arguments object
    Arguments(Vec<Value>),
}

impl Translated {
    fn from_int32(value: i32) -> Self {
        match Value::smi(i64::from(value)) {
            Some(smi) => Translated::Tagged(smi),
            None => Translated::Number(f64::from(value)),
        }
    }

    fn from_uint32(value: u32) -> Self {
        if value <= SMI_MAX as u32 {
            Translated::Tagged(Value::Smi(value as i32))
        } else {
            Translated::Number(f64::from(value))
        }
    }
}

/// The frames a bailout resumes in
#[derive(Debug, Clone)]
pub struct Resumption {
    /// Outermost first
    pub frames: Vec<FrameDescription>,
}

impl Resumption {
    pub fn innermost(&self) -> Option<&FrameDescription> {
        self.frames.last()
    }

    /// Where control goes once the frames are on the stack
    pub fn continuation(&self) -> Option<usize> {
        self.innermost().and_then(FrameDescription::continuation)
    }

    /// Resume point of the innermost frame
    pub fn pc(&self) -> usize {
        self.innermost().map_or(0, FrameDescription::pc)
    }

    pub fn state(&self) -> FullCodeState {
        self.innermost().map_or(FullCodeState::NoRegisters, FrameDescription::state)
    }
}

/// State of one bailout
#[derive(Debug)]
pub struct Deoptimizer {
    pub(super) bailout_type: BailoutType,
    pub(super) function: Option<Value>,
    pub(super) compiled_code: CodeId,
    pub(super) bailout_id: usize,
    pub(super) from: usize,
    pub(super) input: FrameDescription,
    pub(super) output: Vec<FrameDescription>,
    pub(super) output_count: usize,
    pub(super) jsframe_count: usize,
    pub(super) deferred_heap_numbers: Vec<DeferredHeapNumber>,
    pub(super) deferred_arguments_objects: Vec<DeferredArgumentsObject>,
    /// Last value translated into the current frame, for DUPLICATE
    last_value: Option<Translated>,
    pub(super) trace: bool,
}

impl Deoptimizer {
    /// Start a bailout of the optimized frame `input`.
    ///
    /// Counts the bailout against the function and disables further optimization of it
    /// once the configured budget is used up.
    pub fn new(isolate: &mut Isolate, request: BailoutRequest, input: FrameDescription) -> Self {
        let function = request.function.filter(|f| !f.is_smi());
        let leaves_optimized_code = matches!(request.bailout_type, BailoutType::Eager | BailoutType::Lazy);
        if let (Some(function), true) = (function, leaves_optimized_code) {
            count_deoptimization(isolate, function);
        }
        let compiled_code = find_optimized_code(isolate, &request, function);
        let trace = match request.bailout_type {
            BailoutType::Osr => isolate.config.trace_osr,
            _ => isolate.config.trace_deopt,
        };
        let deoptimizer = Self {
            bailout_type: request.bailout_type,
            function,
            compiled_code,
            bailout_id: request.bailout_id,
            from: request.from,
            input,
            output: Vec::new(),
            output_count: 0,
            jsframe_count: 0,
            deferred_heap_numbers: Vec::new(),
            deferred_arguments_objects: Vec::new(),
            last_value: None,
            trace,
        };
        if trace {
            tracing::debug!(
                target: "bailout::deopt",
                "**** {}: {} at bailout #{}, address {:#x}, frame size {}",
                request.bailout_type.message(),
                function_name(&isolate.heap, function),
                request.bailout_id,
                request.from,
                deoptimizer.input.size()
            );
        }
        deoptimizer
    }

    pub fn bailout_type(&self) -> BailoutType {
        self.bailout_type
    }

    pub fn compiled_code(&self) -> CodeId {
        self.compiled_code
    }

    pub fn input(&self) -> &FrameDescription {
        &self.input
    }

    pub fn output(&self) -> &[FrameDescription] {
        &self.output
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    pub fn jsframe_count(&self) -> usize {
        self.jsframe_count
    }

    pub fn deferred_heap_numbers(&self) -> &[DeferredHeapNumber] {
        &self.deferred_heap_numbers
    }

    pub fn deferred_arguments_objects(&self) -> &[DeferredArgumentsObject] {
        &self.deferred_arguments_objects
    }

    /// Translate the input frame into output frames.
    ///
    /// Only on-stack replacement can fail, and then leaves the input untouched.
    pub fn compute_output_frames(&mut self, isolate: &Isolate) -> Result<()> {
        if self.bailout_type == BailoutType::Osr {
            return self.compute_osr_output_frame(isolate);
        }
        self.do_compute_output_frames(isolate);
        Ok(())
    }

    /// Hand the translated frames over
    pub fn into_resumption(self) -> Resumption {
        Resumption { frames: self.output }
    }

    pub(super) fn do_compute_output_frames(&mut self, isolate: &Isolate) {
        let _no_allocation = isolate.heap.no_allocation_scope();
        let code = isolate.code_space.get(self.compiled_code);
        let data = code.input_data();
        let entry = *data.entry(self.bailout_id);
        if self.trace {
            tracing::debug!(
                target: "bailout::deopt",
                "[deoptimizing{}: begin {} @{}]",
                if self.bailout_type == BailoutType::Lazy { " (lazy)" } else { "" },
                function_name(&isolate.heap, self.function),
                self.bailout_id
            );
        }

        let mut iterator = TranslationIterator::new(&data.translations, entry.translation_index);
        let (count, _) = match iterator.next_command() {
            TranslationCommand::Begin {
                frame_count,
                js_frame_count,
            } => (frame_count as usize, js_frame_count),
            other => fatal(format!("translation starts with {} instead of BEGIN", other)),
        };
        self.output = Vec::with_capacity(count);
        self.output_count = count;

        for frame_index in 0..count {
            self.last_value = None;
            let opcode = iterator.next_opcode();
            match iterator.operands_of(opcode) {
                TranslationCommand::JsFrame {
                    bailout_id,
                    literal_id,
                    height,
                } => {
                    self.do_compute_js_frame(isolate, data, &mut iterator, frame_index, bailout_id, literal_id, height);
                    self.jsframe_count += 1;
                }
                TranslationCommand::ArgumentsAdaptorFrame { literal_id, height } => {
                    self.do_compute_arguments_adaptor_frame(isolate, data, &mut iterator, frame_index, literal_id, height)
                }
                TranslationCommand::ConstructStubFrame { literal_id, height } => {
                    self.do_compute_construct_stub_frame(isolate, data, &mut iterator, frame_index, literal_id, height)
                }
                TranslationCommand::GetterStubFrame { literal_id } => {
                    self.do_compute_accessor_stub_frame(isolate, data, &mut iterator, frame_index, literal_id, false)
                }
                TranslationCommand::SetterStubFrame { literal_id } => {
                    self.do_compute_accessor_stub_frame(isolate, data, &mut iterator, frame_index, literal_id, true)
                }
                TranslationCommand::CompiledStubFrame => {
                    self.do_compute_compiled_stub_frame(isolate, data, &mut iterator, frame_index)
                }
                other => fatal(format!("{} where output frame {} should start", other, frame_index)),
            }
        }

        if self.trace {
            if let Some(innermost) = self.output.last() {
                tracing::debug!(
                    target: "bailout::deopt",
                    "[deoptimizing: end {} => node={}, pc={:#x}, state={}]",
                    function_name(&isolate.heap, innermost.function()),
                    entry.ast_id,
                    innermost.pc(),
                    innermost.state()
                );
            }
        }
    }

    // ==================== Output frames ====================

    /// Top of output frame `frame_index`: frame 0 ends where the input frame ends, the
    /// others sit right below their predecessor
    fn output_top(&self, frame_index: usize, size: usize) -> usize {
        if frame_index == 0 {
            self.input.top() + self.input.size() - size
        } else {
            self.output[frame_index - 1].top() - size
        }
    }

    fn caller_pc_and_fp(&self, frame_index: usize) -> (Word, Word) {
        if frame_index == 0 {
            let input = &self.input;
            (
                input.slot(input.fixed_slot_offset(FixedSlot::CallerPc)),
                input.slot(input.fixed_slot_offset(FixedSlot::CallerFp)),
            )
        } else {
            let previous = &self.output[frame_index - 1];
            (Word::Int(previous.pc() as i64), Word::Int(previous.fp() as i64))
        }
    }

    fn caller_context(&self, frame_index: usize) -> Word {
        if frame_index == 0 {
            self.input.slot(self.input.fixed_slot_offset(FixedSlot::Context))
        } else {
            Word::Tagged(self.output[frame_index - 1].context())
        }
    }

    /// Place `frame` and write its caller pc and fp
    fn begin_frame(&mut self, frame_index: usize, mut frame: FrameDescription) {
        let top = self.output_top(frame_index, frame.size());
        frame.set_top(top);
        let (caller_pc, caller_fp) = self.caller_pc_and_fp(frame_index);
        frame.set_slot(frame.fixed_slot_offset(FixedSlot::CallerPc), caller_pc);
        frame.set_slot(frame.fixed_slot_offset(FixedSlot::CallerFp), caller_fp);
        let fp = frame.address_of(frame.fixed_slot_offset(FixedSlot::CallerFp));
        frame.set_fp(fp);
        self.output.push(frame);
    }

    fn frame_mut(&mut self, frame_index: usize) -> &mut FrameDescription {
        &mut self.output[frame_index]
    }

    /// Translate `count` values into consecutive slots ending just below `offset`
    fn translate_values(
        &mut self,
        data: &DeoptimizationInputData,
        iterator: &mut TranslationIterator<'_>,
        frame_index: usize,
        offset: usize,
        count: usize,
    ) -> usize {
        let mut offset = offset;
        for _ in 0..count {
            offset -= 1;
            self.do_translate_command(data, iterator, frame_index, offset);
        }
        offset
    }

    /// Set the continuation of the innermost frame to the notify builtin
    fn finish_frame(&mut self, isolate: &Isolate, frame_index: usize, notify: Option<CodeId>) {
        let is_topmost = frame_index + 1 == self.output_count;
        if !is_topmost || self.bailout_type == BailoutType::Debugger {
            return;
        }
        let builtins = &isolate.builtins;
        let notify = notify.unwrap_or(match self.bailout_type {
            BailoutType::Lazy => builtins.notify_lazy_deoptimized,
            _ => builtins.notify_deoptimized,
        });
        let continuation = isolate.code_space.get(notify).continuation();
        self.frame_mut(frame_index).set_continuation(continuation);
    }

    #[allow(clippy::too_many_arguments)]
    fn do_compute_js_frame(
        &mut self,
        isolate: &Isolate,
        data: &DeoptimizationInputData,
        iterator: &mut TranslationIterator<'_>,
        frame_index: usize,
        node_id: BailoutId,
        literal_id: u32,
        height: u32,
    ) {
        let function = data.literal(literal_id);
        let heap = &isolate.heap;
        let Some(function_data) = heap.function_data(function) else {
            fatal(format!("JS_FRAME literal {} is not a function", function));
        };
        let shared = heap.shared(function_data.shared);
        let height = height as usize;
        let frame = FrameDescription::for_function(
            FrameType::JavaScript,
            function,
            shared.formal_parameter_count,
            height,
        );
        let size = frame.size();
        let area = frame.parameters_area();
        if self.trace {
            tracing::debug!(
                target: "bailout::deopt",
                "  translating {} => node={}, height={}",
                shared.name,
                node_id,
                height
            );
        }
        self.begin_frame(frame_index, frame);
        self.translate_values(data, iterator, frame_index, size, area);

        let context = match frame_index {
            0 => self.caller_context(0),
            _ => Word::Tagged(function_data.context),
        };
        let frame = self.frame_mut(frame_index);
        frame.set_slot(frame.fixed_slot_offset(FixedSlot::Context), context);
        if let Some(context) = context.as_tagged() {
            frame.set_context(context);
        }
        frame.set_tagged(frame.fixed_slot_offset(FixedSlot::Function), function);
        self.translate_values(data, iterator, frame_index, height, height);

        let Some(unoptimized) = shared.code.map(|code| isolate.code_space.get(code)) else {
            fatal(format!("[method: {}] has no unoptimized code to resume in", shared.name));
        };
        let point = unoptimized.deopt_output.as_ref().and_then(|output| output.find(node_id));
        let Some(point) = point else {
            fatal(format!(
                "unable to find pc offset during deoptimization: [couldn't find pc offset for node={}] [method: {}]",
                node_id, shared.name
            ));
        };
        let pc = unoptimized.address(point.pc_offset);
        let frame = self.frame_mut(frame_index);
        frame.set_pc(pc);
        frame.set_state(point.state);
        self.finish_frame(isolate, frame_index, None);
    }

    fn do_compute_arguments_adaptor_frame(
        &mut self,
        isolate: &Isolate,
        data: &DeoptimizationInputData,
        iterator: &mut TranslationIterator<'_>,
        frame_index: usize,
        literal_id: u32,
        height: u32,
    ) {
        let function = data.literal(literal_id);
        let height = height as usize;
        if height == 0 {
            fatal("arguments adaptor frame without a receiver");
        }
        let size = height + FIXED_FRAME_SLOTS + 1;
        if self.trace {
            tracing::debug!(
                target: "bailout::deopt",
                "  translating arguments adaptor => height={}",
                height - 1
            );
        }
        let frame = FrameDescription::new(size, FrameType::ArgumentsAdaptor, Some(function), height);
        self.begin_frame(frame_index, frame);
        self.translate_values(data, iterator, frame_index, size, height);

        let pc = isolate.code_space.get(isolate.builtins.arguments_adaptor).continuation();
        let frame = self.frame_mut(frame_index);
        frame.set_tagged(
            frame.fixed_slot_offset(FixedSlot::Context),
            FrameType::ArgumentsAdaptor.marker(),
        );
        frame.set_tagged(frame.fixed_slot_offset(FixedSlot::Function), function);
        frame.set_tagged(0, Value::Smi(height as i32 - 1));
        frame.set_pc(pc);
        self.finish_frame(isolate, frame_index, None);
    }

    fn do_compute_construct_stub_frame(
        &mut self,
        isolate: &Isolate,
        data: &DeoptimizationInputData,
        iterator: &mut TranslationIterator<'_>,
        frame_index: usize,
        literal_id: u32,
        height: u32,
    ) {
        let function = data.literal(literal_id);
        let height = height as usize;
        if height == 0 {
            fatal("construct stub frame without a receiver");
        }
        let size = height + FIXED_FRAME_SLOTS + 2;
        if self.trace {
            tracing::debug!(
                target: "bailout::deopt",
                "  translating construct stub => height={}",
                height
            );
        }
        let frame = FrameDescription::new(size, FrameType::Construct, Some(function), height);
        self.begin_frame(frame_index, frame);
        self.translate_values(data, iterator, frame_index, size, height);

        let context = self.caller_context(frame_index);
        let pc = isolate.code_space.get(isolate.builtins.construct_stub).continuation();
        let frame = self.frame_mut(frame_index);
        frame.set_slot(frame.fixed_slot_offset(FixedSlot::Context), context);
        if let Some(context) = context.as_tagged() {
            frame.set_context(context);
        }
        frame.set_tagged(frame.fixed_slot_offset(FixedSlot::Function), FrameType::Construct.marker());
        frame.set_tagged(1, Value::Smi(height as i32 - 1));
        // the allocated object was passed as the receiver
        let receiver = frame.receiver();
        frame.set_slot(0, receiver);
        frame.set_pc(pc);
        self.finish_frame(isolate, frame_index, None);
    }

    fn do_compute_accessor_stub_frame(
        &mut self,
        isolate: &Isolate,
        data: &DeoptimizationInputData,
        iterator: &mut TranslationIterator<'_>,
        frame_index: usize,
        literal_id: u32,
        is_setter: bool,
    ) {
        let accessor = data.literal(literal_id);
        let size = FIXED_FRAME_SLOTS + 1 + usize::from(is_setter);
        if self.trace {
            tracing::debug!(
                target: "bailout::deopt",
                "  translating {} stub => height=0",
                if is_setter { "setter" } else { "getter" }
            );
        }
        let frame = FrameDescription::new(size, FrameType::Internal, Some(accessor), 0);
        self.begin_frame(frame_index, frame);

        let builtins = &isolate.builtins;
        let stub = if is_setter { builtins.setter_stub } else { builtins.getter_stub };
        let context = self.caller_context(frame_index);
        let frame = self.frame_mut(frame_index);
        frame.set_slot(frame.fixed_slot_offset(FixedSlot::Context), context);
        if let Some(context) = context.as_tagged() {
            frame.set_context(context);
        }
        frame.set_tagged(frame.fixed_slot_offset(FixedSlot::Function), FrameType::Internal.marker());
        frame.set_slot(usize::from(is_setter), Word::Code(stub));

        // the receiver is passed in a register and never lands in the frame
        let opcode = iterator.next_opcode();
        iterator.skip(opcode.operand_count());
        if is_setter {
            self.do_translate_command(data, iterator, frame_index, 0);
        }
        let pc = isolate.code_space.get(stub).continuation();
        self.frame_mut(frame_index).set_pc(pc);
        self.finish_frame(isolate, frame_index, None);
    }

    fn do_compute_compiled_stub_frame(
        &mut self,
        isolate: &Isolate,
        data: &DeoptimizationInputData,
        iterator: &mut TranslationIterator<'_>,
        frame_index: usize,
    ) {
        if frame_index != 0 {
            fatal("compiled stub frame must be the outermost output frame");
        }
        let parameter_count = isolate.code_space.get(self.compiled_code).stub_parameter_count;
        let size = FIXED_FRAME_SLOTS + parameter_count;
        if self.trace {
            tracing::debug!(
                target: "bailout::deopt",
                "  translating compiled stub => {} register parameters",
                parameter_count
            );
        }
        let frame = FrameDescription::new(size, FrameType::StubFailureTrampoline, None, 0);
        self.begin_frame(frame_index, frame);

        let context = self.caller_context(frame_index);
        let frame = self.frame_mut(frame_index);
        frame.set_slot(frame.fixed_slot_offset(FixedSlot::Context), context);
        if let Some(context) = context.as_tagged() {
            frame.set_context(context);
        }
        frame.set_tagged(
            frame.fixed_slot_offset(FixedSlot::Function),
            FrameType::StubFailureTrampoline.marker(),
        );
        self.translate_values(data, iterator, frame_index, parameter_count, parameter_count);

        let builtins = isolate.builtins;
        let pc = isolate.code_space.get(builtins.stub_failure_trampoline).continuation();
        self.frame_mut(frame_index).set_pc(pc);
        self.finish_frame(isolate, frame_index, Some(builtins.notify_stub_failure));
    }

    // ==================== Values ====================

    /// Translate one value into `offset` of output frame `frame_index`.
    ///
    /// A DUPLICATE marker (or a run of them) makes the marked command stand for the
    /// value translated just before it; the marked command's own location is not read.
    fn do_translate_command(
        &mut self,
        data: &DeoptimizationInputData,
        iterator: &mut TranslationIterator<'_>,
        frame_index: usize,
        offset: usize,
    ) {
        let mut opcode = iterator.next_opcode();
        if opcode == Opcode::Duplicate {
            while opcode == Opcode::Duplicate {
                opcode = iterator.next_opcode();
            }
            if opcode.is_frame_kind() || opcode == Opcode::Begin {
                fatal(format!("{} marked as duplicate inside frame {}", opcode, frame_index));
            }
            iterator.skip(opcode.operand_count());
            let Some(previous) = self.last_value.clone() else {
                fatal(format!("DUPLICATE without a preceding value in frame {}", frame_index));
            };
            self.write_translated(frame_index, offset, previous, &"DUPLICATE");
            return;
        }

        let command = iterator.operands_of(opcode);
        let input = &self.input;
        let value = match command {
            TranslationCommand::Register(reg) => {
                Translated::Tagged(tagged_input(input.registers().register(reg), &command))
            }
            TranslationCommand::Int32Register(reg) => {
                Translated::from_int32(int_input(input.registers().register(reg), &command) as i32)
            }
            TranslationCommand::Uint32Register(reg) => {
                Translated::from_uint32(int_input(input.registers().register(reg), &command) as u32)
            }
            TranslationCommand::DoubleRegister(reg) => Translated::Number(input.registers().double_register(reg)),
            TranslationCommand::StackSlot(index) => {
                let word = input.slot(input.offset_from_slot_index(index));
                Translated::Tagged(tagged_input(word, &command))
            }
            TranslationCommand::Int32StackSlot(index) => {
                let word = input.slot(input.offset_from_slot_index(index));
                Translated::from_int32(int_input(word, &command) as i32)
            }
            TranslationCommand::Uint32StackSlot(index) => {
                let word = input.slot(input.offset_from_slot_index(index));
                Translated::from_uint32(int_input(word, &command) as u32)
            }
            TranslationCommand::DoubleStackSlot(index) => {
                let word = input.slot(input.offset_from_slot_index(index));
                match word {
                    Word::Double(value) => Translated::Number(value),
                    other => fatal(format!("{} reads {}, expected an unboxed double", command, other)),
                }
            }
            TranslationCommand::Literal(literal_id) => Translated::Tagged(data.literal(literal_id)),
            TranslationCommand::ArgumentsObject {
                args_known,
                args_index,
                args_length,
            } => {
                // both counts include the receiver
                let first = args_index + 1;
                let length = (args_length as usize).saturating_sub(1);
                let values = (0..length)
                    .map(|i| {
                        if args_known {
                            let word = input.slot(input.offset_from_slot_index(first + i as i32));
                            tagged_input(word, &command)
                        } else {
                            Value::Hole
                        }
                    })
                    .collect();
                Translated::Arguments(values)
            }
            other => fatal(format!("{} inside output frame {}", other, frame_index)),
        };
        self.write_translated(frame_index, offset, value.clone(), &command);
        self.last_value = Some(value);
    }

    fn write_translated(
        &mut self,
        frame_index: usize,
        offset: usize,
        value: Translated,
        source: &dyn std::fmt::Display,
    ) {
        let frame = &mut self.output[frame_index];
        let address = frame.address_of(offset);
        match value {
            Translated::Tagged(value) => {
                if self.trace {
                    tracing::debug!(
                        target: "bailout::deopt",
                        "    {:#x}: [top + {}] <- {} ; {}",
                        address,
                        offset,
                        value,
                        source
                    );
                }
                frame.set_tagged(offset, value);
            }
            Translated::Number(number) => {
                if self.trace {
                    tracing::debug!(
                        target: "bailout::deopt",
                        "    {:#x}: [top + {}] <- {} ; {} (heap number)",
                        address,
                        offset,
                        number,
                        source
                    );
                }
                frame.set_tagged(offset, Value::Smi(0));
                self.deferred_heap_numbers.push(DeferredHeapNumber {
                    frame_index,
                    offset,
                    value: number,
                });
            }
            Translated::Arguments(values) => {
                if self.trace {
                    tracing::debug!(
                        target: "bailout::deopt",
                        "    {:#x}: [top + {}] <- arguments marker ; {} ({} values)",
                        address,
                        offset,
                        source,
                        values.len()
                    );
                }
                frame.set_tagged(offset, Value::ArgumentsMarker);
                self.deferred_arguments_objects.push(DeferredArgumentsObject {
                    frame_index,
                    offset,
                    values,
                });
            }
        }
    }

    /// Index into the output frames of the `jsframe_index`th JS frame
    pub(super) fn convert_jsframe_index_to_frame_index(&self, jsframe_index: usize) -> usize {
        let mut remaining = jsframe_index as isize;
        let mut frame_index = 0;
        while remaining >= 0 {
            if self.output[frame_index].frame_type() == FrameType::JavaScript {
                remaining -= 1;
            }
            frame_index += 1;
        }
        frame_index - 1
    }
}

fn tagged_input(word: Word, command: &TranslationCommand) -> Value {
    match word {
        Word::Tagged(value) => value,
        other => fatal(format!("{} reads {}, expected a tagged value", command, other)),
    }
}

fn int_input(word: Word, command: &TranslationCommand) -> i64 {
    match word {
        Word::Int(value) => value,
        other => fatal(format!("{} reads {}, expected an untagged integer", command, other)),
    }
}

fn count_deoptimization(isolate: &mut Isolate, function: Value) {
    let Some(data) = isolate.heap.function_data(function) else {
        return;
    };
    let shared = data.shared;
    let max = isolate.config.max_deopt_count;
    let info = isolate.heap.shared_mut(shared);
    info.deopt_count += 1;
    if info.deopt_count >= max && !info.optimization_disabled {
        info.optimization_disabled = true;
        tracing::info!(
            target: "bailout::deopt",
            function = %info.name,
            deopts = info.deopt_count,
            "optimization disabled after repeated deoptimization"
        );
    }
}

fn find_optimized_code(isolate: &Isolate, request: &BailoutRequest, function: Option<Value>) -> CodeId {
    if let Some(code) = request.code {
        return code;
    }
    let current = || {
        function
            .and_then(|f| isolate.heap.function_data(f))
            .and_then(|data| data.code)
    };
    let code = match request.bailout_type {
        BailoutType::Eager | BailoutType::Osr => current(),
        BailoutType::Lazy => isolate
            .deoptimizing_code
            .find(&isolate.code_space, request.from)
            .or_else(|| isolate.code_space.find_code_for_pc(request.from)),
        BailoutType::Debugger => None,
    };
    match code {
        Some(code) => code,
        None => fatal(format!(
            "no optimized code for {} bailout of {}",
            request.bailout_type,
            function_name(&isolate.heap, function)
        )),
    }
}

pub(super) fn function_name(heap: &Heap, function: Option<Value>) -> String {
    function
        .and_then(|f| heap.function_shared(f))
        .map_or_else(|| "<stub>".to_string(), |shared| shared.name.clone())
}
