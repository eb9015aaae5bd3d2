//! On-stack replacement
//!
//! The reverse of a bailout: the interpreted frame of a function spinning in a loop is
//! rewritten into the optimized frame layout so execution can continue in optimized
//! code. Every interpreted slot is tagged, so integer and double locations need a
//! checked conversion. A value that does not convert exactly abandons the attempt and
//! the interpreted frame keeps running.

use num_traits::cast;

use super::code::DeoptEntry;
use super::deoptimizer::Deoptimizer;
use super::frame::{FixedSlot, FrameDescription, FrameType, Word, FIXED_FRAME_SLOTS};
use super::translation::{Opcode, TranslationCommand, TranslationIterator};
use crate::error::{fatal, Error, OsrAbort, OsrAbortReason, Result};
use crate::heap::{Heap, Value};
use crate::isolate::Isolate;

/// The int32 `value` stands for, if it is a number that round-trips exactly
pub fn object_to_int32(heap: &Heap, value: Value) -> Option<i32> {
    if let Value::Smi(smi) = value {
        return Some(smi);
    }
    if !heap.is_heap_number(value) {
        return None;
    }
    let number = heap.number_value(value)?;
    let truncated: i32 = cast(number)?;
    (f64::from(truncated) == number).then_some(truncated)
}

/// The uint32 `value` stands for, if it is a non-negative number that round-trips
/// exactly
pub fn object_to_uint32(heap: &Heap, value: Value) -> Option<u32> {
    if let Value::Smi(smi) = value {
        return u32::try_from(smi).ok();
    }
    if !heap.is_heap_number(value) {
        return None;
    }
    let number = heap.number_value(value)?;
    if number < 0.0 {
        return None;
    }
    let truncated: u32 = cast(number)?;
    (f64::from(truncated) == number).then_some(truncated)
}

impl Deoptimizer {
    /// Translate the interpreted input frame into the single optimized output frame.
    ///
    /// On failure no output frame exists and the input is untouched.
    pub(super) fn compute_osr_output_frame(&mut self, isolate: &Isolate) -> Result<()> {
        let heap = &isolate.heap;
        let Some(function) = self.function else {
            fatal("on-stack replacement needs a function");
        };
        let code = isolate.code_space.get(self.compiled_code);
        let data = code.input_data();
        let Some(ast_id) = data.osr_ast_id else {
            fatal(format!(
                "optimized code of {} has no OSR entry",
                super::deoptimizer::function_name(heap, Some(function))
            ));
        };
        let Some(bailout_id) = data.entry_for_ast_id(ast_id) else {
            fatal(format!("no deoptimization entry for OSR ast id {}", ast_id));
        };
        self.bailout_id = bailout_id;
        let entry: DeoptEntry = *data.entry(bailout_id);

        let mut iterator = TranslationIterator::new(&data.translations, entry.translation_index);
        match iterator.next_command() {
            TranslationCommand::Begin { frame_count: 1, .. } => {}
            other => fatal(format!("OSR translation must describe one frame, found {}", other)),
        }
        let height = match iterator.next_command() {
            TranslationCommand::JsFrame {
                bailout_id: node_id,
                height,
                ..
            } if node_id == ast_id => height as usize,
            other => fatal(format!("OSR translation for node {} starts with {}", ast_id, other)),
        };

        let Some(shared) = heap.function_shared(function) else {
            fatal("OSR target is not a function");
        };
        let area = shared.formal_parameter_count + 1;
        let fixed_size = area + FIXED_FRAME_SLOTS;
        let input_size = self.input.size();
        if fixed_size + height != input_size {
            fatal(format!(
                "OSR height mismatch for {}: interpreted frame has {} words, translation expects {}",
                shared.name,
                input_size,
                fixed_size + height
            ));
        }
        let output_size = fixed_size + code.stack_slots + entry.arguments_stack_height;
        let mut output = FrameDescription::new(output_size, FrameType::Optimized, Some(function), area);

        if self.trace {
            tracing::debug!(
                target: "bailout::osr",
                "[on-stack replacement: begin {} => node={}, frame={}->{}]",
                shared.name,
                ast_id,
                input_size,
                output_size
            );
        }

        let mut input_offset = input_size;
        for _ in 0..area {
            self.do_osr_translate_command(heap, &mut iterator, &mut output, &mut input_offset)?;
        }
        // caller pc and fp, context and function are copied as they are
        for slot in FixedSlot::ALL {
            input_offset -= 1;
            let word = self.input.slot(input_offset);
            let output_offset = output.fixed_slot_offset(slot);
            output.set_slot(output_offset, word);
            if slot == FixedSlot::Context {
                if let Some(context) = word.as_tagged() {
                    output.set_context(context);
                }
            }
            if self.trace {
                tracing::debug!(
                    target: "bailout::osr",
                    "    [sp + {}] <- {} ; [sp + {}] (fixed part)",
                    output_offset,
                    word,
                    input_offset
                );
            }
        }
        for _ in 0..height {
            self.do_osr_translate_command(heap, &mut iterator, &mut output, &mut input_offset)?;
        }

        output.set_top(self.input.top() + input_size - output_size);
        let fp = output.address_of(output.fixed_slot_offset(FixedSlot::CallerFp));
        output.set_fp(fp);
        output.set_pc(code.address(entry.pc));
        let notify = isolate.code_space.get(isolate.builtins.notify_osr).continuation();
        output.set_continuation(notify);
        if self.trace {
            tracing::debug!(
                target: "bailout::osr",
                "[on-stack replacement: end {} => pc={:#x}]",
                shared.name,
                output.pc()
            );
        }
        self.output = vec![output];
        self.output_count = 1;
        self.jsframe_count = 1;
        Ok(())
    }

    /// Move one interpreted value into its optimized location.
    ///
    /// A DUPLICATE-marked command moves the same interpreted slot a second time, so
    /// every command still consumes one input slot.
    fn do_osr_translate_command(
        &self,
        heap: &Heap,
        iterator: &mut TranslationIterator<'_>,
        output: &mut FrameDescription,
        input_offset: &mut usize,
    ) -> Result<()> {
        *input_offset -= 1;
        let index = *input_offset;
        let Word::Tagged(value) = self.input.slot(index) else {
            return Err(abort(index, OsrAbortReason::UntaggedInput));
        };

        let mut opcode = iterator.next_opcode();
        while opcode == Opcode::Duplicate {
            opcode = iterator.next_opcode();
        }
        let command = iterator.operands_of(opcode);
        let describe = || heap.describe(value);
        let word = match command {
            TranslationCommand::Register(_) | TranslationCommand::StackSlot(_) => Word::Tagged(value),
            TranslationCommand::Int32Register(_) | TranslationCommand::Int32StackSlot(_) => {
                match object_to_int32(heap, value) {
                    Some(int) => Word::Int(i64::from(int)),
                    None => return Err(abort(index, OsrAbortReason::NotInt32(describe()))),
                }
            }
            TranslationCommand::Uint32Register(_) | TranslationCommand::Uint32StackSlot(_) => {
                match object_to_uint32(heap, value) {
                    Some(int) => Word::Int(i64::from(int)),
                    None => return Err(abort(index, OsrAbortReason::NotUint32(describe()))),
                }
            }
            TranslationCommand::DoubleRegister(_) | TranslationCommand::DoubleStackSlot(_) => {
                match heap.number_value(value) {
                    Some(number) => Word::Double(number),
                    None => return Err(abort(index, OsrAbortReason::NotNumber(describe()))),
                }
            }
            // values the optimized code rematerializes itself
            TranslationCommand::Literal(_) => return Ok(()),
            TranslationCommand::ArgumentsObject { .. } => {
                fatal("optimized code entered by OSR cannot capture an arguments object")
            }
            other => fatal(format!("{} inside the OSR frame", other)),
        };

        match command {
            TranslationCommand::Register(reg)
            | TranslationCommand::Int32Register(reg)
            | TranslationCommand::Uint32Register(reg) => {
                output.registers_mut().set_register(reg, word);
            }
            TranslationCommand::DoubleRegister(reg) => {
                if let Word::Double(number) = word {
                    output.registers_mut().set_double_register(reg, number);
                }
            }
            TranslationCommand::StackSlot(slot)
            | TranslationCommand::Int32StackSlot(slot)
            | TranslationCommand::Uint32StackSlot(slot)
            | TranslationCommand::DoubleStackSlot(slot) => {
                let offset = output.offset_from_slot_index(slot);
                output.set_slot(offset, word);
            }
            _ => {}
        }
        if self.trace {
            tracing::debug!(
                target: "bailout::osr",
                "    {} <- {} ; [sp + {}]",
                command,
                word,
                index
            );
        }
        Ok(())
    }
}

fn abort(input_index: usize, reason: OsrAbortReason) -> Error {
    let abort = OsrAbort { input_index, reason };
    tracing::debug!(target: "bailout::osr", "[on-stack replacement aborted: {}]", abort);
    Error::Osr(abort)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_conversion_requires_exact_round_trip() {
        let mut heap = Heap::new();
        let two = heap.allocate_heap_number(2.0);
        let half = heap.allocate_heap_number(2.5);
        let minus_one = heap.allocate_heap_number(-1.0);
        let big = heap.allocate_heap_number(4_294_967_296.0);
        let nan = heap.allocate_heap_number(f64::NAN);
        assert_eq!(object_to_int32(&heap, two), Some(2));
        assert_eq!(object_to_int32(&heap, half), None);
        assert_eq!(object_to_int32(&heap, minus_one), Some(-1));
        assert_eq!(object_to_int32(&heap, big), None);
        assert_eq!(object_to_int32(&heap, nan), None);
        assert_eq!(object_to_int32(&heap, Value::Smi(-7)), Some(-7));
        assert_eq!(object_to_int32(&heap, Value::Undefined), None);
    }

    #[test]
    fn test_uint32_conversion_rejects_negatives() {
        let mut heap = Heap::new();
        let minus_one = heap.allocate_heap_number(-1.0);
        let large = heap.allocate_heap_number(4_000_000_000.0);
        let half = heap.allocate_heap_number(2.5);
        assert_eq!(object_to_uint32(&heap, minus_one), None);
        assert_eq!(object_to_uint32(&heap, large), Some(4_000_000_000));
        assert_eq!(object_to_uint32(&heap, half), None);
        assert_eq!(object_to_uint32(&heap, Value::Smi(-1)), None);
        assert_eq!(object_to_uint32(&heap, Value::Smi(5)), Some(5));
    }

    #[test]
    fn test_strings_do_not_convert() {
        let mut heap = Heap::new();
        let string = heap.new_string("2");
        assert_eq!(object_to_int32(&heap, string), None);
        assert_eq!(object_to_uint32(&heap, string), None);
    }
}
