//! Integration tests for frame translation, deoptimization and on-stack replacement

mod common;

use bailout::deopt::{decode_commands, encode, FixedSlot, Opcode, FIXED_FRAME_SLOTS};
use bailout::prelude::*;
use common::{
    baseline_function, install_optimized, interpreted_frame, number, optimized_frame, tagged, write_fixed_part,
    FunctionFixture, Point,
};

fn point(ast_id: u32, pc: usize, translation_index: usize) -> Point {
    Point {
        ast_id,
        pc,
        translation_index,
        arguments_stack_height: 0,
    }
}

fn shared_of(isolate: &Isolate, fixture: &FunctionFixture) -> (u32, bool) {
    let shared = isolate.heap().shared(fixture.shared);
    (shared.deopt_count, shared.optimization_disabled)
}

mod translations {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_commands_round_trip() {
        let mut commands: Vec<TranslationCommand> = Opcode::ALL
            .iter()
            .enumerate()
            .map(|(i, &opcode)| {
                let operands: Vec<i32> = (0..opcode.operand_count())
                    .map(|k| i as i32 * 37 + k as i32 * 100)
                    .collect();
                TranslationCommand::from_parts(opcode, &operands).unwrap()
            })
            .collect();
        commands.extend([
            TranslationCommand::StackSlot(-2),
            TranslationCommand::Duplicate,
            TranslationCommand::Duplicate,
            TranslationCommand::ArgumentsObject {
                args_known: true,
                args_index: -3,
                args_length: 3,
            },
            TranslationCommand::Duplicate,
            TranslationCommand::DoubleStackSlot(-70),
        ]);
        for opcode in Opcode::ALL {
            assert!(commands.iter().any(|command| command.opcode() == opcode), "{}", opcode);
        }

        let bytes = encode(&commands);
        assert_eq!(decode_commands(&bytes).unwrap(), commands);
    }

    #[test]
    fn test_builder_matches_encoder() {
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 1, 1);
        translation.begin_js_frame(BailoutId(4), 0, 1);
        translation.store_stack_slot(-1);
        translation.mark_duplicate();
        translation.store_int32_stack_slot(5);
        let expected = encode(&[
            TranslationCommand::Begin {
                frame_count: 1,
                js_frame_count: 1,
            },
            TranslationCommand::JsFrame {
                bailout_id: BailoutId(4),
                literal_id: 0,
                height: 1,
            },
            TranslationCommand::StackSlot(-1),
            TranslationCommand::Duplicate,
            TranslationCommand::Int32StackSlot(5),
        ]);
        assert_eq!(buffer.as_bytes(), expected.as_slice());
    }

    #[test]
    fn test_truncated_stream_is_a_decode_error() {
        let bytes = encode(&[TranslationCommand::JsFrame {
            bailout_id: BailoutId(1),
            literal_id: 0,
            height: 2,
        }]);
        let result = decode_commands(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(Error::DecodeError(_))));
    }
}

mod eager {
    use super::*;
    use pretty_assertions::assert_eq;

    /// `f(a)` optimized with one spill slot, bailing out at node 3 with its expression
    /// stack holding spill slot 0 and double register 1
    fn setup(isolate: &mut Isolate) -> (FunctionFixture, CodeId) {
        let f = baseline_function(isolate, "f", 1, &[(3, 20)]);
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 1, 1);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(3), 0, 2);
        translation.store_stack_slot(-2);
        translation.store_stack_slot(-1);
        translation.store_stack_slot(0);
        translation.store_double_register(1);
        let code = install_optimized(isolate, &f, 1, buffer, &[point(3, 12, index)], vec![f.function], None);
        (f, code)
    }

    fn push_frame(isolate: &mut Isolate, f: &FunctionFixture, code: CodeId) {
        let mut frame = optimized_frame(isolate, f, code, Value::Undefined, &[Value::Smi(1)], 12);
        let spill = frame.offset_from_slot_index(0);
        frame.set_tagged(spill, Value::Smi(41));
        frame.registers_mut().set_double_register(1, 0.5);
        isolate.stack_mut().push(frame);
    }

    #[test]
    fn test_single_frame_resumes_in_baseline_code() {
        let mut isolate = Isolate::new();
        let (f, code) = setup(&mut isolate);
        push_frame(&mut isolate, &f, code);
        let input_top = isolate.stack().top_frame().map(|frame| frame.top() + frame.size());

        let resumption = isolate.deoptimize(BailoutRequest::eager(f.function, 0)).unwrap();
        assert_eq!(resumption.frames.len(), 1);
        let frame = &resumption.frames[0];
        assert_eq!(frame.frame_type(), FrameType::JavaScript);
        assert_eq!(Some(frame.top() + frame.size()), input_top);
        assert_eq!(tagged(frame.receiver()), Value::Undefined);
        assert_eq!(tagged(frame.parameter(0)), Value::Smi(1));
        assert_eq!(tagged(frame.expression(0)), Value::Smi(41));
        assert_eq!(number(&isolate, tagged(frame.expression(1))), 0.5);
        assert_eq!(tagged(frame.slot(frame.fixed_slot_offset(FixedSlot::Function))), f.function);
        assert_eq!(frame.slot(frame.fixed_slot_offset(FixedSlot::CallerPc)), Word::Int(0x42));

        let baseline = isolate.code_space().get(f.baseline);
        assert_eq!(resumption.pc(), baseline.address(20));
        assert_eq!(resumption.state(), FullCodeState::NoRegisters);
        let notify = isolate.code_space().get(isolate.builtins().notify_deoptimized);
        assert_eq!(resumption.continuation(), Some(notify.continuation()));

        assert_eq!(isolate.stack().len(), 1);
        assert_eq!(isolate.stack().top_frame().map(FrameDescription::frame_type), Some(FrameType::JavaScript));
        assert_eq!(shared_of(&isolate, &f), (1, false));
    }

    #[test]
    fn test_repeated_bailouts_disable_optimization() {
        let mut isolate = Isolate::with_config(EngineConfig::default().with_max_deopt_count(2));
        let (f, code) = setup(&mut isolate);
        for expected in 1..=2 {
            push_frame(&mut isolate, &f, code);
            isolate.deoptimize(BailoutRequest::eager(f.function, 0)).unwrap();
            isolate.stack_mut().pop();
            assert_eq!(shared_of(&isolate, &f).0, expected);
        }
        assert_eq!(shared_of(&isolate, &f), (2, true));
        assert!(!isolate.install_optimized_code(f.id, code));
    }

    #[test]
    #[should_panic(expected = "fatal error")]
    fn test_frame_opcode_inside_a_frame_is_fatal() {
        let mut isolate = Isolate::new();
        let f = baseline_function(&mut isolate, "f", 0, &[(1, 0)]);
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 1, 1);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(1), 0, 1);
        translation.store_stack_slot(-1);
        translation.begin_js_frame(BailoutId(1), 0, 0);
        let code = install_optimized(&mut isolate, &f, 0, buffer, &[point(1, 4, index)], vec![f.function], None);
        let frame = optimized_frame(&isolate, &f, code, Value::Undefined, &[], 4);
        isolate.stack_mut().push(frame);
        let _ = isolate.deoptimize(BailoutRequest::eager(f.function, 0));
    }
}

mod inlining {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_duplicate_repeats_the_previous_value() {
        let mut isolate = Isolate::new();
        let f = baseline_function(&mut isolate, "f", 0, &[(1, 8)]);
        let g = baseline_function(&mut isolate, "g", 0, &[(2, 16)]);
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 2, 2);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(1), 0, 2);
        translation.store_stack_slot(-1);
        translation.store_stack_slot(3);
        translation.mark_duplicate();
        translation.store_literal(7);
        translation.begin_js_frame(BailoutId(2), 1, 0);
        translation.store_literal(2);
        let mut literals = vec![f.function, g.function, Value::Undefined];
        literals.extend([Value::Smi(0); 4]);
        literals.push(Value::Smi(700));
        let code = install_optimized(&mut isolate, &f, 4, buffer, &[point(1, 4, index)], literals, None);

        let mut frame = optimized_frame(&isolate, &f, code, Value::Null, &[], 4);
        let slot = frame.offset_from_slot_index(3);
        frame.set_tagged(slot, Value::Smi(33));
        isolate.stack_mut().push(frame);

        let resumption = isolate.deoptimize(BailoutRequest::eager(f.function, 0)).unwrap();
        assert_eq!(resumption.frames.len(), 2);
        let outer = &resumption.frames[0];
        assert_eq!(tagged(outer.receiver()), Value::Null);
        assert_eq!(tagged(outer.expression(0)), Value::Smi(33));
        assert_eq!(tagged(outer.expression(1)), Value::Smi(33));

        let inner = &resumption.frames[1];
        assert_eq!(inner.function(), Some(g.function));
        assert_eq!(inner.top() + inner.size(), outer.top());
        assert_eq!(inner.slot(inner.fixed_slot_offset(FixedSlot::CallerPc)), Word::Int(outer.pc() as i64));
        assert_eq!(resumption.pc(), isolate.code_space().get(g.baseline).address(16));
        assert_eq!(isolate.stack().len(), 2);
    }

    #[test]
    fn test_arguments_adaptor_frame() {
        let mut isolate = Isolate::new();
        let f = baseline_function(&mut isolate, "f", 1, &[(1, 8)]);
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 2, 1);
        let index = translation.index();
        translation.begin_arguments_adaptor_frame(0, 3);
        translation.store_literal(1);
        translation.store_literal(2);
        translation.store_literal(3);
        translation.begin_js_frame(BailoutId(1), 0, 1);
        translation.store_literal(1);
        translation.store_literal(2);
        translation.store_arguments_object(false, 0, 1);
        let literals = vec![f.function, Value::Undefined, Value::Smi(1), Value::Smi(2)];
        let code = install_optimized(&mut isolate, &f, 0, buffer, &[point(1, 4, index)], literals, None);
        let frame = optimized_frame(&isolate, &f, code, Value::Undefined, &[Value::Smi(1)], 4);
        isolate.stack_mut().push(frame);

        let resumption = isolate.deoptimize(BailoutRequest::eager(f.function, 0)).unwrap();
        let adaptor = &resumption.frames[0];
        assert_eq!(adaptor.frame_type(), FrameType::ArgumentsAdaptor);
        assert_eq!(adaptor.size(), 3 + FIXED_FRAME_SLOTS + 1);
        assert_eq!(tagged(adaptor.slot(0)), Value::Smi(2));
        assert_eq!(adaptor.parameters_count(), 2);
        let builtin = isolate.code_space().get(isolate.builtins().arguments_adaptor);
        assert_eq!(adaptor.pc(), builtin.continuation());

        // the arguments object sees the actual arguments, not the formal ones
        let function_frame = &resumption.frames[1];
        let arguments = tagged(function_frame.expression(0));
        assert!(isolate.heap().is_arguments_object(arguments));
        assert_eq!(isolate.heap().array_length(arguments), None);
        assert_eq!(isolate.heap_mut().get_element(arguments, 0).unwrap(), Value::Smi(1));
        assert_eq!(isolate.heap_mut().get_element(arguments, 1).unwrap(), Value::Smi(2));
    }

    #[test]
    fn test_arguments_object_is_shared_within_a_frame() {
        let mut isolate = Isolate::new();
        let f = baseline_function(&mut isolate, "f", 2, &[(1, 8)]);
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 1, 1);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(1), 0, 2);
        translation.store_stack_slot(-3);
        translation.store_stack_slot(-2);
        translation.store_stack_slot(-1);
        translation.store_arguments_object(true, -3, 3);
        translation.mark_duplicate();
        translation.store_arguments_object(true, -3, 3);
        let code = install_optimized(&mut isolate, &f, 0, buffer, &[point(1, 4, index)], vec![f.function], None);
        let frame = optimized_frame(&isolate, &f, code, Value::Undefined, &[Value::Smi(4), Value::Smi(5)], 4);
        isolate.stack_mut().push(frame);

        let before = isolate.heap().object_count();
        let resumption = isolate.deoptimize(BailoutRequest::eager(f.function, 0)).unwrap();
        let frame = &resumption.frames[0];
        let first = tagged(frame.expression(0));
        let second = tagged(frame.expression(1));
        assert_eq!(first, second);
        assert!(isolate.heap().object_count() > before);
        assert_eq!(isolate.heap_mut().get_element(first, 0).unwrap(), Value::Smi(4));
        assert_eq!(isolate.heap_mut().get_element(first, 1).unwrap(), Value::Smi(5));
    }

    #[test]
    fn test_construct_stub_frame_keeps_the_receiver() {
        let mut isolate = Isolate::new();
        let f = baseline_function(&mut isolate, "f", 0, &[(1, 8)]);
        let point_ctor = baseline_function(&mut isolate, "Point", 1, &[(2, 12)]);
        let allocated = Value::Object(isolate.heap_mut().new_object());
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 3, 2);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(1), 0, 0);
        translation.store_stack_slot(-1);
        translation.begin_construct_stub_frame(1, 2);
        translation.store_literal(2);
        translation.store_literal(3);
        translation.begin_js_frame(BailoutId(2), 1, 0);
        translation.store_literal(2);
        translation.store_literal(3);
        let literals = vec![f.function, point_ctor.function, allocated, Value::Smi(6)];
        let code = install_optimized(&mut isolate, &f, 0, buffer, &[point(1, 4, index)], literals, None);
        let frame = optimized_frame(&isolate, &f, code, Value::Undefined, &[], 4);
        isolate.stack_mut().push(frame);

        let resumption = isolate.deoptimize(BailoutRequest::eager(f.function, 0)).unwrap();
        assert_eq!(resumption.frames.len(), 3);
        let construct = &resumption.frames[1];
        assert_eq!(construct.frame_type(), FrameType::Construct);
        assert_eq!(tagged(construct.slot(0)), allocated);
        assert_eq!(tagged(construct.slot(1)), Value::Smi(1));
        assert_eq!(
            tagged(construct.slot(construct.fixed_slot_offset(FixedSlot::Function))),
            FrameType::Construct.marker()
        );
        let stub = isolate.code_space().get(isolate.builtins().construct_stub);
        assert_eq!(construct.pc(), stub.continuation());
        assert_eq!(tagged(resumption.frames[2].receiver()), allocated);
    }

    #[test]
    fn test_setter_stub_frame_keeps_the_value() {
        let mut isolate = Isolate::new();
        let f = baseline_function(&mut isolate, "f", 0, &[(1, 8)]);
        let setter = baseline_function(&mut isolate, "set x", 1, &[]);
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 2, 1);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(1), 0, 0);
        translation.store_stack_slot(-1);
        translation.begin_setter_stub_frame(1);
        translation.store_register(0);
        translation.store_literal(2);
        let literals = vec![f.function, setter.function, Value::Smi(9)];
        let code = install_optimized(&mut isolate, &f, 0, buffer, &[point(1, 4, index)], literals, None);
        let frame = optimized_frame(&isolate, &f, code, Value::Undefined, &[], 4);
        isolate.stack_mut().push(frame);

        let resumption = isolate.deoptimize(BailoutRequest::eager(f.function, 0)).unwrap();
        let builtins = *isolate.builtins();
        let frame = &resumption.frames[1];
        assert_eq!(frame.frame_type(), FrameType::Internal);
        assert_eq!(frame.size(), FIXED_FRAME_SLOTS + 2);
        assert_eq!(frame.slot(1), Word::Code(builtins.setter_stub));
        assert_eq!(tagged(frame.slot(0)), Value::Smi(9));
        assert_eq!(frame.pc(), isolate.code_space().get(builtins.setter_stub).continuation());
        let notify = isolate.code_space().get(builtins.notify_deoptimized).continuation();
        assert_eq!(resumption.continuation(), Some(notify));
    }

    #[test]
    fn test_getter_stub_frame_resumes_in_the_getter() {
        let mut isolate = Isolate::new();
        let f = baseline_function(&mut isolate, "f", 0, &[(1, 8)]);
        let getter = baseline_function(&mut isolate, "get x", 0, &[(2, 12)]);
        let holder = Value::Object(isolate.heap_mut().new_object());
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 3, 2);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(1), 0, 0);
        translation.store_stack_slot(-1);
        translation.begin_getter_stub_frame(1);
        translation.store_register(0);
        translation.begin_js_frame(BailoutId(2), 1, 0);
        translation.store_literal(2);
        let literals = vec![f.function, getter.function, holder];
        let code = install_optimized(&mut isolate, &f, 0, buffer, &[point(1, 4, index)], literals, None);
        let frame = optimized_frame(&isolate, &f, code, Value::Undefined, &[], 4);
        isolate.stack_mut().push(frame);

        let resumption = isolate.deoptimize(BailoutRequest::eager(f.function, 0)).unwrap();
        assert_eq!(resumption.frames.len(), 3);
        let builtins = *isolate.builtins();
        let stub = &resumption.frames[1];
        assert_eq!(stub.frame_type(), FrameType::Internal);
        assert_eq!(stub.size(), FIXED_FRAME_SLOTS + 1);
        assert_eq!(stub.slot(0), Word::Code(builtins.getter_stub));
        assert_eq!(stub.pc(), isolate.code_space().get(builtins.getter_stub).continuation());

        let inner = &resumption.frames[2];
        assert_eq!(inner.frame_type(), FrameType::JavaScript);
        assert_eq!(inner.function(), Some(getter.function));
        assert_eq!(tagged(inner.receiver()), holder);
        assert_eq!(resumption.pc(), isolate.code_space().get(getter.baseline).address(12));
    }

    #[test]
    fn test_inlined_arguments_read_from_the_optimized_frame() {
        let mut isolate = Isolate::new();
        let f = baseline_function(&mut isolate, "f", 0, &[(1, 8)]);
        let g = baseline_function(&mut isolate, "g", 2, &[(2, 8)]);
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 2, 2);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(1), 0, 1);
        translation.store_stack_slot(-1);
        translation.store_stack_slot(0);
        translation.begin_js_frame(BailoutId(2), 1, 0);
        translation.store_literal(2);
        translation.store_stack_slot(1);
        translation.store_int32_stack_slot(2);
        let literals = vec![f.function, g.function, Value::Undefined];
        let code = install_optimized(&mut isolate, &f, 3, buffer, &[point(1, 20, index)], literals, None);
        let mut frame = optimized_frame(&isolate, &f, code, Value::Undefined, &[], 20);
        let (first, second) = (frame.offset_from_slot_index(1), frame.offset_from_slot_index(2));
        frame.set_tagged(first, Value::Smi(10));
        frame.set_slot(second, Word::Int(-5));
        isolate.stack_mut().push(frame);

        let arguments = isolate.inlined_arguments(1, 2).unwrap();
        assert_eq!(arguments, vec![Value::Smi(10), Value::Smi(-5)]);
        // the optimized frame is left alone
        assert_eq!(isolate.stack().top_frame().map(FrameDescription::frame_type), Some(FrameType::Optimized));
    }
}

mod stubs {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compiled_stub_frame_resumes_in_the_trampoline() {
        let mut isolate = Isolate::new();
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 1, 0);
        let index = translation.index();
        translation.begin_compiled_stub_frame();
        translation.store_register(0);
        translation.store_register(1);
        let data = DeoptimizationInputData {
            translations: buffer.into_bytes(),
            entries: vec![point(1, 0, index).entry()],
            literals: vec![],
            osr_ast_id: None,
        };
        let code = isolate.add_code(Code::compiled_stub(32, 2, data));

        let mut frame = FrameDescription::new(FIXED_FRAME_SLOTS, FrameType::Stub, None, 0);
        write_fixed_part(&mut frame, FrameType::Stub.marker());
        frame.registers_mut().set_register(0, Word::Tagged(Value::Smi(8)));
        frame.registers_mut().set_register(1, Word::Tagged(Value::Boolean(true)));
        isolate.stack_mut().push(frame);

        let resumption = isolate.deoptimize(BailoutRequest::stub(code, 0)).unwrap();
        let builtins = *isolate.builtins();
        let frame = &resumption.frames[0];
        assert_eq!(frame.frame_type(), FrameType::StubFailureTrampoline);
        assert_eq!(frame.size(), FIXED_FRAME_SLOTS + 2);
        assert_eq!(tagged(frame.slot(1)), Value::Smi(8));
        assert_eq!(tagged(frame.slot(0)), Value::Boolean(true));
        assert_eq!(frame.pc(), isolate.code_space().get(builtins.stub_failure_trampoline).continuation());
        let notify = isolate.code_space().get(builtins.notify_stub_failure).continuation();
        assert_eq!(resumption.continuation(), Some(notify));
    }
}

mod invalidation {
    use super::*;
    use pretty_assertions::assert_eq;

    fn setup(isolate: &mut Isolate, name: &str) -> (FunctionFixture, CodeId) {
        let f = baseline_function(isolate, name, 0, &[(1, 8)]);
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 1, 1);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(1), 0, 1);
        translation.store_stack_slot(-1);
        translation.store_stack_slot(0);
        let code = install_optimized(isolate, &f, 1, buffer, &[point(1, 24, index)], vec![f.function], None);
        (f, code)
    }

    #[test]
    fn test_lazy_bailout_finds_discarded_code() {
        let mut isolate = Isolate::new();
        let (f, code) = setup(&mut isolate, "f");
        let mut frame = optimized_frame(&isolate, &f, code, Value::Undefined, &[], 24);
        let spill = frame.offset_from_slot_index(0);
        frame.set_tagged(spill, Value::Smi(2));
        let return_address = frame.pc();
        isolate.stack_mut().push(frame);

        let handle = isolate.deoptimize_function(f.function).unwrap();
        assert_eq!(isolate.heap().function_data(f.function).and_then(|d| d.code), Some(f.baseline));
        assert!(isolate.code_space().get(code).marked_for_deoptimization);
        assert!(isolate.deoptimizing_code().contains(code));
        assert!(isolate.optimized_functions().is_empty());

        let resumption = isolate
            .deoptimize(BailoutRequest::lazy(f.function, 0, return_address))
            .unwrap();
        assert_eq!(tagged(resumption.frames[0].expression(0)), Value::Smi(2));
        let notify = isolate.code_space().get(isolate.builtins().notify_lazy_deoptimized);
        assert_eq!(resumption.continuation(), Some(notify.continuation()));

        assert!(isolate.notify_code_unreachable(handle));
        assert!(!isolate.notify_code_unreachable(handle));
        assert!(!isolate.deoptimizing_code().contains(code));
    }

    #[test]
    fn test_deoptimizing_unoptimized_function_is_a_no_op() {
        let mut isolate = Isolate::new();
        let f = baseline_function(&mut isolate, "f", 0, &[]);
        assert!(isolate.deoptimize_function(f.function).is_none());
        assert!(isolate.deoptimizing_code().is_empty());
    }

    #[test]
    fn test_deoptimize_all_with_filter() {
        let mut isolate = Isolate::new();
        let (f, _) = setup(&mut isolate, "f");
        let (g, g_code) = setup(&mut isolate, "g");
        let handles = isolate.deoptimize_all_with(|heap, function| {
            heap.function_shared(function).is_some_and(|shared| shared.name == "f")
        });
        assert_eq!(handles.len(), 1);
        assert_eq!(isolate.optimized_functions(), &[g.id]);
        assert_eq!(isolate.heap().function_data(g.function).and_then(|d| d.code), Some(g_code));
        assert_eq!(isolate.heap().function_data(f.function).and_then(|d| d.code), Some(f.baseline));

        assert_eq!(isolate.deoptimize_all().len(), 1);
        assert!(isolate.optimized_functions().is_empty());
    }

    #[test]
    fn test_shape_change_invalidates_dependents() {
        let mut isolate = Isolate::new();
        let object = common::object_with(&mut isolate, &[("x", Value::Smi(1))]);
        let shape = isolate.heap().map_of(Value::Object(object)).unwrap();
        let x = isolate.heap_mut().intern("x");
        let other = common::object_with(&mut isolate, &[("y", Value::Smi(0)), ("x", Value::Smi(2))]);
        let mut site = isolate.new_site(IcKind::Load, ExtraIcState::default());
        for receiver in [object, object, other] {
            isolate.load(&mut site, Value::Object(receiver), x).unwrap();
        }
        let cached = isolate.stub_cache().len();

        let dependent = baseline_function(&mut isolate, "dependent", 0, &[]);
        let code = isolate.add_code(
            Code::optimized(dependent.shared, 16, 0, DeoptimizationInputData::default()).with_dependent_shape(shape),
        );
        assert!(isolate.install_optimized_code(dependent.id, code));
        let (independent, _) = setup(&mut isolate, "independent");

        let handles = isolate.deoptimize_dependents_of_shape(shape);
        assert_eq!(handles.len(), 1);
        assert!(isolate.stub_cache().len() < cached);
        assert_eq!(isolate.optimized_functions(), &[independent.id]);
        assert_eq!(
            isolate.heap().function_data(dependent.function).and_then(|d| d.code),
            Some(dependent.baseline)
        );
    }
}

mod debugger {
    use super::*;
    use pretty_assertions::assert_eq;

    /// `f(a)` with `g()` inlined; doubles land in f's parameter, f's expression and
    /// g's expression
    fn setup(isolate: &mut Isolate) -> FunctionFixture {
        let f = baseline_function(isolate, "f", 1, &[(1, 8)]);
        let g = baseline_function(isolate, "g", 0, &[(2, 8)]);
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 2, 2);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(1), 0, 1);
        translation.store_stack_slot(-2);
        translation.store_double_stack_slot(0);
        translation.store_double_register(0);
        translation.begin_js_frame(BailoutId(2), 1, 1);
        translation.store_literal(2);
        translation.store_double_register(1);
        let literals = vec![f.function, g.function, Value::Undefined];
        let code = install_optimized(isolate, &f, 2, buffer, &[point(1, 16, index)], literals, None);

        let mut frame = optimized_frame(isolate, &f, code, Value::Undefined, &[Value::Smi(0)], 16);
        let spill = frame.offset_from_slot_index(0);
        frame.set_slot(spill, Word::Double(1.5));
        frame.registers_mut().set_double_register(0, 2.5);
        frame.registers_mut().set_double_register(1, 3.5);
        isolate.stack_mut().push(frame);
        f
    }

    #[test]
    fn test_numbers_land_in_parameters_and_expressions() {
        let mut isolate = Isolate::new();
        let f = setup(&mut isolate);
        let before = isolate.heap().object_count();

        let info = isolate.debugger_inspectable_frame(0).unwrap();
        assert_eq!(info.function, f.function);
        assert_eq!(info.parameters_count(), 1);
        assert_eq!(info.expression_count(), 1);
        assert_eq!(number(&isolate, info.parameters[0]), 1.5);
        assert_eq!(number(&isolate, info.expressions[0]), 2.5);
        assert!(!info.has_arguments_adaptor);
        assert!(!info.has_construct_stub);
        // the number destined for g's frame is not boxed
        assert_eq!(isolate.heap().object_count(), before + 2);
    }

    #[test]
    fn test_inspection_leaves_the_frame_and_counters_alone() {
        let mut isolate = Isolate::new();
        let f = setup(&mut isolate);
        let words = isolate.stack().top_frame().map(|frame| frame.words().to_vec());

        let info = isolate.debugger_inspectable_frame(1).unwrap();
        assert_eq!(info.parameters_count(), 0);
        assert_eq!(number(&isolate, info.expressions[0]), 3.5);

        assert_eq!(isolate.stack().len(), 1);
        assert_eq!(isolate.stack().top_frame().map(|frame| frame.words().to_vec()), words);
        assert_eq!(shared_of(&isolate, &f), (0, false));
    }
}

mod osr {
    use super::*;
    use pretty_assertions::assert_eq;

    fn setup(isolate: &mut Isolate) -> (FunctionFixture, CodeId) {
        let f = baseline_function(isolate, "loop", 1, &[(5, 30)]);
        let mut buffer = TranslationBuffer::new();
        let mut translation = Translation::new(&mut buffer, 1, 1);
        let index = translation.index();
        translation.begin_js_frame(BailoutId(5), 0, 2);
        translation.store_stack_slot(-2);
        translation.store_stack_slot(-1);
        translation.store_int32_stack_slot(0);
        translation.store_double_register(0);
        let code = install_optimized(isolate, &f, 1, buffer, &[point(5, 8, index)], vec![f.function], Some(5));
        (f, code)
    }

    #[test]
    fn test_interpreted_frame_enters_optimized_code() {
        let mut isolate = Isolate::new();
        let (f, code) = setup(&mut isolate);
        let sum = isolate.heap_mut().new_number(1.25);
        let frame = interpreted_frame(&f, Value::Undefined, &[Value::Smi(10)], &[Value::Smi(3), sum]);
        isolate.stack_mut().push(frame);

        let resumption = isolate.on_stack_replace(f.function).unwrap();
        assert_eq!(resumption.frames.len(), 1);
        let frame = &resumption.frames[0];
        assert_eq!(frame.frame_type(), FrameType::Optimized);
        assert_eq!(frame.slot(frame.offset_from_slot_index(0)), Word::Int(3));
        assert_eq!(frame.registers().double_register(0), 1.25);
        assert_eq!(tagged(frame.parameter(0)), Value::Smi(10));
        assert_eq!(tagged(frame.slot(frame.fixed_slot_offset(FixedSlot::Function))), f.function);
        assert_eq!(frame.pc(), isolate.code_space().get(code).address(8));
        let notify = isolate.code_space().get(isolate.builtins().notify_osr);
        assert_eq!(resumption.continuation(), Some(notify.continuation()));
        assert_eq!(isolate.stack().top_frame().map(FrameDescription::frame_type), Some(FrameType::Optimized));
        // entering optimized code is not a bailout
        assert_eq!(shared_of(&isolate, &f), (0, false));
    }

    #[test]
    fn test_inexact_value_aborts_and_keeps_the_frame() {
        let mut isolate = Isolate::new();
        let (f, _) = setup(&mut isolate);
        let counter = isolate.heap_mut().new_number(2.5);
        let frame = interpreted_frame(&f, Value::Undefined, &[Value::Smi(10)], &[counter, Value::Smi(0)]);
        let words = frame.words().to_vec();
        isolate.stack_mut().push(frame);

        let err = isolate.on_stack_replace(f.function).unwrap_err();
        match err {
            Error::Osr(abort) => {
                assert_eq!(abort.input_index, 1);
                assert!(matches!(abort.reason, OsrAbortReason::NotInt32(_)));
            }
            other => panic!("expected an OSR abort, got {}", other),
        }
        let top = isolate.stack().top_frame().unwrap();
        assert_eq!(top.frame_type(), FrameType::JavaScript);
        assert_eq!(top.words(), words.as_slice());
    }

    #[test]
    fn test_non_number_in_double_slot_aborts() {
        let mut isolate = Isolate::new();
        let (f, _) = setup(&mut isolate);
        let text = isolate.heap_mut().new_string("1.5");
        let frame = interpreted_frame(&f, Value::Undefined, &[Value::Smi(10)], &[Value::Smi(1), text]);
        isolate.stack_mut().push(frame);

        let err = isolate.on_stack_replace(f.function).unwrap_err();
        assert!(matches!(
            err,
            Error::Osr(OsrAbort {
                input_index: 0,
                reason: OsrAbortReason::NotNumber(_)
            })
        ));
    }
}
