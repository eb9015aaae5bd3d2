//! Materialization of deferred heap values and debugger views of optimized frames

use rustc_hash::FxHashMap as HashMap;

use super::deoptimizer::{BailoutRequest, Deoptimizer};
use super::frame::{FrameDescription, FrameType, Word};
use super::BailoutType;
use crate::error::fatal;
use crate::heap::{Heap, Value};
use crate::isolate::Isolate;

/// An unoptimized view of one JS frame inside an optimized frame
#[derive(Debug, Clone, PartialEq)]
pub struct DeoptimizedFrameInfo {
    pub function: Value,
    /// Actual arguments when the call went through an arguments adaptor
    pub parameters: Vec<Value>,
    pub expressions: Vec<Value>,
    pub has_arguments_adaptor: bool,
    pub has_construct_stub: bool,
    /// Resume point in the unoptimized code
    pub pc: usize,
}

impl DeoptimizedFrameInfo {
    fn new(
        deoptimizer: &Deoptimizer,
        frame_index: usize,
        has_arguments_adaptor: bool,
        has_construct_stub: bool,
    ) -> Self {
        let frame = &deoptimizer.output[frame_index];
        let expressions = (0..frame.expression_count())
            .map(|i| frame_value(frame.expression(i)))
            .collect();
        let parameters_frame = if has_arguments_adaptor {
            &deoptimizer.output[frame_index - 1]
        } else {
            frame
        };
        let parameters = (0..parameters_frame.parameters_count())
            .map(|i| frame_value(parameters_frame.parameter(i)))
            .collect();
        Self {
            function: frame.function().unwrap_or_default(),
            parameters,
            expressions,
            has_arguments_adaptor,
            has_construct_stub,
            pc: frame.pc(),
        }
    }

    pub fn parameters_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn expression_count(&self) -> usize {
        self.expressions.len()
    }
}

fn frame_value(word: Word) -> Value {
    match word {
        Word::Tagged(value) => value,
        other => fatal(format!("untagged word {} in a translated JS frame", other)),
    }
}

/// Stack address range `[top, top + size)`
#[derive(Debug, Clone, Copy)]
struct SlotRange {
    top: usize,
    size: usize,
}

impl SlotRange {
    fn index_of(&self, address: usize) -> Option<usize> {
        (self.top..self.top + self.size)
            .contains(&address)
            .then(|| self.size - 1 - (address - self.top))
    }
}

impl Deoptimizer {
    /// Box deferred numbers, then build arguments objects, writing both into the
    /// output frames.
    ///
    /// Numbers go first so that arguments built from an adaptor frame see boxed
    /// values. Every frame gets at most one arguments object, shared by all of its
    /// marker slots.
    pub fn materialize_heap_objects(&mut self, heap: &mut Heap) {
        if self.bailout_type == BailoutType::Debugger {
            fatal("debugger frames materialize through debugger_inspectable_frame");
        }
        for deferred in &self.deferred_heap_numbers {
            let number = heap.new_number(deferred.value);
            let frame = &mut self.output[deferred.frame_index];
            if self.trace {
                tracing::debug!(
                    target: "bailout::deopt",
                    "Materializing a new heap number {} [{}] in slot {:#x}",
                    number,
                    deferred.value,
                    frame.address_of(deferred.offset)
                );
            }
            frame.set_tagged(deferred.offset, number);
        }

        let mut per_frame: HashMap<usize, Value> = HashMap::default();
        for deferred in &self.deferred_arguments_objects {
            let arguments = match per_frame.get(&deferred.frame_index) {
                Some(arguments) => *arguments,
                None => {
                    let frame = &self.output[deferred.frame_index];
                    let callee = frame.function().unwrap_or_default();
                    let adaptor = deferred
                        .frame_index
                        .checked_sub(1)
                        .map(|index| &self.output[index])
                        .filter(|f| f.frame_type() == FrameType::ArgumentsAdaptor);
                    let values: Vec<Value> = match adaptor {
                        Some(adaptor) => (0..adaptor.parameters_count())
                            .map(|i| frame_value(adaptor.parameter(i)))
                            .collect(),
                        None => deferred.values.clone(),
                    };
                    let arguments = Value::Object(heap.new_arguments_object(callee, &values, false));
                    if self.trace {
                        tracing::debug!(
                            target: "bailout::deopt",
                            "Materializing {}arguments object of length {} for {:#x}",
                            if adaptor.is_some() { "(adapted) " } else { "" },
                            values.len(),
                            frame.address_of(deferred.offset)
                        );
                    }
                    per_frame.insert(deferred.frame_index, arguments);
                    arguments
                }
            };
            self.output[deferred.frame_index].set_tagged(deferred.offset, arguments);
        }
    }

    /// Compute the unoptimized view of the `jsframe_index`th JS frame inlined into the
    /// optimized `frame`, without replacing it.
    ///
    /// Deferred numbers are boxed only when they land in that frame's parameters or
    /// expressions; arguments objects are left as markers.
    pub fn debugger_inspectable_frame(
        isolate: &mut Isolate,
        frame: &FrameDescription,
        jsframe_index: usize,
    ) -> DeoptimizedFrameInfo {
        let Some(function) = frame.function() else {
            fatal("debugger frames must belong to a function");
        };
        let Some(code) = isolate.code_space.find_code_for_pc(frame.pc()) else {
            fatal(format!("no code object contains pc {:#x}", frame.pc()));
        };
        let start = isolate.code_space.get(code).instruction_start;
        let data = isolate.code_space.get(code).input_data();
        let Some(bailout_id) = data.entry_for_pc(frame.pc() - start) else {
            fatal(format!("pc {:#x} is not a deoptimization point", frame.pc()));
        };
        let request = BailoutRequest {
            bailout_type: BailoutType::Debugger,
            function: Some(function),
            bailout_id,
            from: frame.pc(),
            code: Some(code),
        };
        let mut deoptimizer = Deoptimizer::new(isolate, request, frame.clone());
        deoptimizer.do_compute_output_frames(isolate);
        if jsframe_index >= deoptimizer.jsframe_count {
            fatal(format!(
                "JS frame {} requested from {} inlined frames",
                jsframe_index, deoptimizer.jsframe_count
            ));
        }

        let frame_index = deoptimizer.convert_jsframe_index_to_frame_index(jsframe_index);
        let output = &deoptimizer.output;
        let has_arguments_adaptor =
            frame_index > 0 && output[frame_index - 1].frame_type() == FrameType::ArgumentsAdaptor;
        let construct_offset = if has_arguments_adaptor { 2 } else { 1 };
        let has_construct_stub = frame_index >= construct_offset
            && output[frame_index - construct_offset].frame_type() == FrameType::Construct;
        let mut info = DeoptimizedFrameInfo::new(&deoptimizer, frame_index, has_arguments_adaptor, has_construct_stub);

        let parameters_frame = &output[if has_arguments_adaptor { frame_index - 1 } else { frame_index }];
        let parameters_size = info.parameters_count() + 1;
        let parameters = SlotRange {
            top: parameters_frame.top() + parameters_frame.size() - parameters_size,
            size: parameters_size,
        };
        let expressions = SlotRange {
            top: output[frame_index].top(),
            size: info.expression_count(),
        };
        deoptimizer.materialize_heap_numbers_for_debugger_inspectable_frame(
            &mut isolate.heap,
            parameters,
            expressions,
            &mut info,
        );
        info
    }

    fn materialize_heap_numbers_for_debugger_inspectable_frame(
        &self,
        heap: &mut Heap,
        parameters: SlotRange,
        expressions: SlotRange,
        info: &mut DeoptimizedFrameInfo,
    ) {
        for deferred in &self.deferred_heap_numbers {
            let slot = self.output[deferred.frame_index].address_of(deferred.offset);
            if let Some(index) = parameters.index_of(slot) {
                // the range includes the receiver, which maps one below parameter 0
                let Some(index) = index.checked_sub(1) else {
                    continue;
                };
                let number = heap.new_number(deferred.value);
                if self.trace {
                    tracing::debug!(
                        target: "bailout::deopt",
                        "Materializing a new heap number {} [{}] in slot {:#x} for parameter slot #{}",
                        number,
                        deferred.value,
                        slot,
                        index
                    );
                }
                info.parameters[index] = number;
            } else if let Some(index) = expressions.index_of(slot) {
                let number = heap.new_number(deferred.value);
                if self.trace {
                    tracing::debug!(
                        target: "bailout::deopt",
                        "Materializing a new heap number {} [{}] in slot {:#x} for expression slot #{}",
                        number,
                        deferred.value,
                        slot,
                        index
                    );
                }
                info.expressions[index] = number;
            }
        }
    }
}
