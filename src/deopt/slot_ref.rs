//! Reading the arguments of inlined functions out of an optimized frame
//!
//! An inlined callee has no frame of its own, but `arguments` inside it still has to
//! work. The translation of the current deoptimization point says where each of its
//! arguments lives; a [`SlotRef`] records that location without reading it, so the
//! values can be collected after the walk, when allocation is allowed again.

use super::code::DeoptimizationInputData;
use super::frame::{FrameDescription, Word};
use super::translation::{Opcode, TranslationCommand, TranslationIterator};
use crate::error::fatal;
use crate::heap::{Heap, Value, SMI_MAX};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotRef {
    Tagged(usize),
    Int32(usize),
    Uint32(usize),
    Double(usize),
    Literal(Value),
}

impl SlotRef {
    /// Read the referenced value, boxing untagged numbers
    pub fn value(&self, heap: &mut Heap, frame: &FrameDescription) -> Value {
        match *self {
            SlotRef::Tagged(offset) => match frame.slot(offset) {
                Word::Tagged(value) => value,
                other => fatal(format!("tagged slot {} holds {}", offset, other)),
            },
            SlotRef::Int32(offset) => {
                let value = untagged_int(frame, offset) as i32;
                heap.new_number(f64::from(value))
            }
            SlotRef::Uint32(offset) => {
                let value = untagged_int(frame, offset) as u32;
                if value <= SMI_MAX as u32 {
                    Value::Smi(value as i32)
                } else {
                    heap.new_number(f64::from(value))
                }
            }
            SlotRef::Double(offset) => match frame.slot(offset) {
                Word::Double(value) => heap.new_number(value),
                other => fatal(format!("double slot {} holds {}", offset, other)),
            },
            SlotRef::Literal(value) => value,
        }
    }

    fn for_next_argument(
        iterator: &mut TranslationIterator<'_>,
        data: &DeoptimizationInputData,
        frame: &FrameDescription,
    ) -> SlotRef {
        let command = iterator.next_command();
        match command {
            TranslationCommand::StackSlot(index) => SlotRef::Tagged(frame.offset_from_slot_index(index)),
            TranslationCommand::Int32StackSlot(index) => SlotRef::Int32(frame.offset_from_slot_index(index)),
            TranslationCommand::Uint32StackSlot(index) => SlotRef::Uint32(frame.offset_from_slot_index(index)),
            TranslationCommand::DoubleStackSlot(index) => SlotRef::Double(frame.offset_from_slot_index(index)),
            TranslationCommand::Literal(index) => SlotRef::Literal(data.literal(index)),
            // at a call every register is saved by the caller, so registers and
            // duplicates never describe arguments here
            other => fatal(format!("{} cannot describe an argument of an inlined frame", other)),
        }
    }

    fn for_arguments(
        count: usize,
        iterator: &mut TranslationIterator<'_>,
        data: &DeoptimizationInputData,
        frame: &FrameDescription,
    ) -> Vec<SlotRef> {
        // receiver
        let opcode = iterator.next_opcode();
        iterator.skip(opcode.operand_count());
        (0..count)
            .map(|_| Self::for_next_argument(iterator, data, frame))
            .collect()
    }

    /// Locations of the arguments of the `inlined_jsframe_index`th JS frame described
    /// at deoptimization entry `bailout_id` of the optimized `frame`.
    ///
    /// When the inlined call went through an arguments adaptor, the actual arguments
    /// are returned, otherwise `formal_parameter_count` of them.
    pub fn compute_slot_mapping_for_arguments(
        data: &DeoptimizationInputData,
        bailout_id: usize,
        frame: &FrameDescription,
        inlined_jsframe_index: usize,
        formal_parameter_count: usize,
    ) -> Vec<SlotRef> {
        let entry = data.entry(bailout_id);
        let mut iterator = TranslationIterator::new(&data.translations, entry.translation_index);
        let js_frame_count = match iterator.next_command() {
            TranslationCommand::Begin { js_frame_count, .. } => js_frame_count as usize,
            other => fatal(format!("translation starts with {} instead of BEGIN", other)),
        };
        if inlined_jsframe_index >= js_frame_count {
            fatal(format!(
                "inlined frame {} requested from {} JS frames",
                inlined_jsframe_index, js_frame_count
            ));
        }

        let mut jsframes_to_skip = inlined_jsframe_index;
        while iterator.has_next() {
            let opcode = iterator.next_opcode();
            match opcode {
                Opcode::ArgumentsAdaptorFrame if jsframes_to_skip == 0 => {
                    let count = match iterator.operands_of(opcode) {
                        TranslationCommand::ArgumentsAdaptorFrame { height, .. } => (height as usize).saturating_sub(1),
                        other => fatal(format!("{} decoded as an arguments adaptor", other)),
                    };
                    return Self::for_arguments(count, &mut iterator, data, frame);
                }
                Opcode::JsFrame if jsframes_to_skip == 0 => {
                    iterator.skip(opcode.operand_count());
                    return Self::for_arguments(formal_parameter_count, &mut iterator, data, frame);
                }
                Opcode::JsFrame => {
                    jsframes_to_skip -= 1;
                    iterator.skip(opcode.operand_count());
                }
                _ => iterator.skip(opcode.operand_count()),
            }
        }
        fatal(format!("translation ends before inlined frame {}", inlined_jsframe_index))
    }
}

fn untagged_int(frame: &FrameDescription, offset: usize) -> i64 {
    match frame.slot(offset) {
        Word::Int(value) => value,
        other => fatal(format!("integer slot {} holds {}", offset, other)),
    }
}
