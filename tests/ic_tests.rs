//! Integration tests for the inline cache state machine

mod common;

use bailout::ic::{CompareState, Handler};
use bailout::prelude::*;
use common::object_with;

fn load_site(isolate: &mut Isolate) -> CallSite {
    isolate.new_site(IcKind::Load, ExtraIcState::default())
}

mod named_loads {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_second_shape_goes_megamorphic() {
        let mut isolate = Isolate::new();
        let s1 = object_with(&mut isolate, &[("x", Value::Smi(1))]);
        let s2 = object_with(&mut isolate, &[("y", Value::Smi(0)), ("x", Value::Smi(2))]);
        let x = isolate.heap_mut().intern("x");
        let mut site = load_site(&mut isolate);
        assert_eq!(site.state(), IcState::Uninitialized);

        assert_eq!(isolate.load(&mut site, Value::Object(s1), x).unwrap(), Value::Smi(1));
        assert_eq!(site.state(), IcState::Premonomorphic);

        assert_eq!(isolate.load(&mut site, Value::Object(s1), x).unwrap(), Value::Smi(1));
        assert_eq!(site.state(), IcState::Monomorphic);
        assert_eq!(site.cached_shape(), isolate.heap().map_of(Value::Object(s1)));

        assert_eq!(isolate.load(&mut site, Value::Object(s2), x).unwrap(), Value::Smi(2));
        assert_eq!(site.state(), IcState::Megamorphic);
    }

    #[test]
    fn test_megamorphic_site_probes_the_stub_cache() {
        let mut isolate = Isolate::new();
        let s1 = object_with(&mut isolate, &[("x", Value::Smi(1))]);
        let s2 = object_with(&mut isolate, &[("y", Value::Smi(0)), ("x", Value::Smi(2))]);
        let x = isolate.heap_mut().intern("x");
        let mut site = load_site(&mut isolate);
        for receiver in [s1, s1, s2] {
            isolate.load(&mut site, Value::Object(receiver), x).unwrap();
        }
        assert_eq!(site.state(), IcState::Megamorphic);
        assert!(isolate.stub_cache().len() >= 2);

        let hits = isolate.stub_cache().stats().hits;
        assert_eq!(isolate.load(&mut site, Value::Object(s1), x).unwrap(), Value::Smi(1));
        assert_eq!(isolate.load(&mut site, Value::Object(s2), x).unwrap(), Value::Smi(2));
        assert_eq!(isolate.stub_cache().stats().hits, hits + 2);
        assert_eq!(site.state(), IcState::Megamorphic);
    }

    #[test]
    fn test_prototype_change_respecializes_in_place() {
        let mut isolate = Isolate::new();
        let proto = object_with(&mut isolate, &[("x", Value::Smi(1))]);
        let object = isolate
            .heap_mut()
            .new_object_with_prototype(Value::Object(proto));
        let x = isolate.heap_mut().intern("x");
        let mut site = load_site(&mut isolate);
        isolate.load(&mut site, Value::Object(object), x).unwrap();
        isolate.load(&mut site, Value::Object(object), x).unwrap();
        assert_eq!(site.state(), IcState::Monomorphic);

        let y = isolate.heap_mut().intern("y");
        isolate
            .heap_mut()
            .add_property(proto, y, Value::Smi(5), PropertyAttributes::empty());
        assert_eq!(isolate.load(&mut site, Value::Object(object), x).unwrap(), Value::Smi(1));
        assert_eq!(site.state(), IcState::Monomorphic);
    }

    #[test]
    fn test_nullish_receiver_throws_type_error() {
        let mut isolate = Isolate::new();
        let x = isolate.heap_mut().intern("x");
        let mut site = load_site(&mut isolate);
        let err = isolate.load(&mut site, Value::Undefined, x).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
        let err = isolate.load(&mut site, Value::Null, x).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
        assert_eq!(site.state(), IcState::Uninitialized);
    }

    #[test]
    fn test_disabled_ic_never_patches() {
        let mut isolate = Isolate::with_config(EngineConfig::default().with_use_ic(false));
        let object = object_with(&mut isolate, &[("x", Value::Smi(3))]);
        let x = isolate.heap_mut().intern("x");
        let mut site = load_site(&mut isolate);
        for _ in 0..4 {
            assert_eq!(isolate.load(&mut site, Value::Object(object), x).unwrap(), Value::Smi(3));
        }
        assert_eq!(site.state(), IcState::Uninitialized);
        assert_eq!(site.patch_count(), 0);
    }

    #[test]
    fn test_array_length_gets_a_dedicated_stub() {
        let mut isolate = Isolate::new();
        let array = isolate
            .heap_mut()
            .new_array(vec![Value::Smi(1), Value::Smi(2)]);
        let length = isolate.heap().roots().length;
        let mut site = load_site(&mut isolate);
        for _ in 0..3 {
            assert_eq!(isolate.load(&mut site, Value::Object(array), length).unwrap(), Value::Smi(2));
        }
        assert_eq!(site.state(), IcState::Monomorphic);
        assert!(matches!(site.target().handler(), Handler::LoadArrayLength));
    }
}

mod sites {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clear_returns_to_uninitialized() {
        let mut isolate = Isolate::new();
        let object = object_with(&mut isolate, &[("x", Value::Smi(1))]);
        let x = isolate.heap_mut().intern("x");
        let mut site = load_site(&mut isolate);
        isolate.load(&mut site, Value::Object(object), x).unwrap();
        isolate.load(&mut site, Value::Object(object), x).unwrap();
        assert_eq!(site.state(), IcState::Monomorphic);
        isolate.clear_site(&mut site);
        assert_eq!(site.state(), IcState::Uninitialized);
        assert_eq!(site.cached_shape(), None);
    }

    #[test]
    fn test_debug_overlay_hides_the_state() {
        let mut isolate = Isolate::new();
        let object = object_with(&mut isolate, &[("x", Value::Smi(1))]);
        let x = isolate.heap_mut().intern("x");
        let mut site = load_site(&mut isolate);
        site.set_debug_break(true);
        assert_eq!(site.state(), IcState::DebugStub);
        assert_eq!(isolate.load(&mut site, Value::Object(object), x).unwrap(), Value::Smi(1));
        assert_eq!(site.state(), IcState::DebugStub);
        site.set_debug_break(false);
        assert_ne!(site.state(), IcState::DebugStub);
    }
}

mod keyed {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keyed_store_site(isolate: &mut Isolate) -> CallSite {
        isolate.new_site(IcKind::KeyedStore, ExtraIcState::default())
    }

    #[test]
    fn test_boxed_value_widens_to_generic_elements() {
        let mut isolate = Isolate::new();
        let array = Value::Object(
            isolate
                .heap_mut()
                .new_array(vec![Value::Smi(1), Value::Smi(2), Value::Smi(3)]),
        );
        assert_eq!(isolate.heap().elements_kind_of(array), Some(ElementsKind::PackedSmi));
        let mut site = keyed_store_site(&mut isolate);
        let text = isolate.heap_mut().new_string("x");
        isolate.keyed_store(&mut site, array, Value::Smi(1), text).unwrap();

        assert_eq!(isolate.heap().elements_kind_of(array), Some(ElementsKind::Packed));
        assert_eq!(site.state(), IcState::Monomorphic);
        assert_eq!(site.cached_shape(), isolate.heap().map_of(array));
    }

    #[test]
    fn test_elements_kind_never_narrows() {
        let mut isolate = Isolate::new();
        let array = Value::Object(isolate.heap_mut().new_array(vec![Value::Smi(1), Value::Smi(2)]));
        let mut site = keyed_store_site(&mut isolate);
        let half = isolate.heap_mut().new_number(0.5);
        isolate.keyed_store(&mut site, array, Value::Smi(0), half).unwrap();
        assert_eq!(isolate.heap().elements_kind_of(array), Some(ElementsKind::PackedDouble));

        let text = isolate.heap_mut().new_string("s");
        isolate.keyed_store(&mut site, array, Value::Smi(1), text).unwrap();
        assert_eq!(isolate.heap().elements_kind_of(array), Some(ElementsKind::Packed));
        // the receiver's own kind is no wider than the cached one
        assert_eq!(site.state(), IcState::Polymorphic);

        isolate.keyed_store(&mut site, array, Value::Smi(0), Value::Smi(4)).unwrap();
        assert_eq!(isolate.heap().elements_kind_of(array), Some(ElementsKind::Packed));
        assert_eq!(site.state(), IcState::Polymorphic);
    }

    #[test]
    fn test_already_widened_receiver_stays_monomorphic() {
        let mut isolate = Isolate::new();
        let narrow = Value::Object(isolate.heap_mut().new_array(vec![Value::Smi(1), Value::Smi(2)]));
        let widened = Value::Object(isolate.heap_mut().new_array(vec![Value::Smi(1), Value::Smi(2)]));
        let half = isolate.heap_mut().new_number(0.5);
        let mut other = keyed_store_site(&mut isolate);
        isolate.keyed_store(&mut other, widened, Value::Smi(0), half).unwrap();
        assert_eq!(isolate.heap().elements_kind_of(widened), Some(ElementsKind::PackedDouble));

        let mut site = keyed_store_site(&mut isolate);
        isolate.keyed_store(&mut site, narrow, Value::Smi(0), Value::Smi(5)).unwrap();
        assert_eq!(site.state(), IcState::Monomorphic);
        assert_eq!(site.cached_shape(), isolate.heap().map_of(narrow));

        let text = isolate.heap_mut().new_string("s");
        isolate.keyed_store(&mut site, widened, Value::Smi(1), text).unwrap();
        assert_eq!(isolate.heap().elements_kind_of(widened), Some(ElementsKind::Packed));
        assert_eq!(site.state(), IcState::Monomorphic);
        assert_eq!(site.cached_shape(), isolate.heap().map_of(widened));
    }

    #[test]
    fn test_polymorphism_is_bounded() {
        let mut isolate = Isolate::with_config(EngineConfig::default().with_max_keyed_polymorphism(3));
        let receivers: Vec<Value> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| Value::Object(object_with(&mut isolate, &[(name, Value::Smi(0))])))
            .collect();
        let mut site = isolate.new_site(IcKind::KeyedLoad, ExtraIcState::default());

        isolate.keyed_load(&mut site, receivers[0], Value::Smi(0)).unwrap();
        assert_eq!(site.state(), IcState::Monomorphic);
        isolate.keyed_load(&mut site, receivers[1], Value::Smi(0)).unwrap();
        assert_eq!(site.state(), IcState::Polymorphic);
        isolate.keyed_load(&mut site, receivers[2], Value::Smi(0)).unwrap();
        assert_eq!(site.state(), IcState::Polymorphic);
        assert_eq!(site.target().receiver_shapes().len(), 3);

        isolate.keyed_load(&mut site, receivers[3], Value::Smi(0)).unwrap();
        assert_eq!(site.state(), IcState::Generic);
    }

    #[test]
    fn test_generic_is_terminal() {
        let mut isolate = Isolate::with_config(EngineConfig::default().with_max_keyed_polymorphism(1));
        let a = Value::Object(object_with(&mut isolate, &[("a", Value::Smi(0))]));
        let b = Value::Object(object_with(&mut isolate, &[("b", Value::Smi(0))]));
        let array = Value::Object(isolate.heap_mut().new_array(vec![Value::Smi(7)]));
        let mut site = isolate.new_site(IcKind::KeyedLoad, ExtraIcState::default());
        isolate.keyed_load(&mut site, a, Value::Smi(0)).unwrap();
        isolate.keyed_load(&mut site, b, Value::Smi(0)).unwrap();
        assert_eq!(site.state(), IcState::Generic);

        for receiver in [a, b, array, a] {
            isolate.keyed_load(&mut site, receiver, Value::Smi(0)).unwrap();
            assert_eq!(site.state(), IcState::Generic);
        }
        assert_eq!(isolate.keyed_load(&mut site, array, Value::Smi(0)).unwrap(), Value::Smi(7));
    }

    #[test]
    fn test_name_key_takes_the_named_path() {
        let mut isolate = Isolate::new();
        let object = Value::Object(object_with(&mut isolate, &[("x", Value::Smi(9))]));
        let key = isolate.heap_mut().internalize("x");
        let mut site = isolate.new_site(IcKind::KeyedLoad, ExtraIcState::default());
        assert_eq!(isolate.keyed_load(&mut site, object, key).unwrap(), Value::Smi(9));
        assert_eq!(isolate.keyed_load(&mut site, object, key).unwrap(), Value::Smi(9));
        assert_eq!(site.state(), IcState::Monomorphic);
    }
}

mod calls {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_call_runs_the_resolved_function() {
        let mut isolate = Isolate::new();
        let text = isolate.heap_mut().new_string("abc");
        let char_at = isolate.heap().roots().char_at;
        let mut site = isolate.new_site(IcKind::Call, ExtraIcState::default());
        let result = isolate.call(&mut site, text, char_at, &[Value::Smi(1)]).unwrap();
        assert_eq!(isolate.heap().string_value(result), Some("b"));
        assert_eq!(site.state(), IcState::Premonomorphic);
    }

    #[test]
    fn test_missing_method_errors() {
        let mut isolate = Isolate::new();
        let object = Value::Object(object_with(&mut isolate, &[("x", Value::Smi(1))]));
        let missing = isolate.heap_mut().intern("missing");
        let mut site = isolate.new_site(IcKind::Call, ExtraIcState::default());

        let err = isolate.call(&mut site, object, missing, &[]).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));

        let global = Value::Object(isolate.heap().roots().global_object);
        let err = isolate.call(&mut site, global, missing, &[]).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ReferenceError));

        let err = isolate.call(&mut site, Value::Null, missing, &[]).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
    }

    #[test]
    fn test_non_callable_property_errors() {
        let mut isolate = Isolate::new();
        let object = Value::Object(object_with(&mut isolate, &[("x", Value::Smi(1))]));
        let x = isolate.heap_mut().intern("x");
        let mut site = isolate.new_site(IcKind::Call, ExtraIcState::default());
        let err = isolate.call(&mut site, object, x, &[]).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
    }
}

mod type_feedback {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compare_state(site: &CallSite) -> CompareState {
        match site.target().handler() {
            Handler::Compare(stub) => stub.state,
            other => panic!("not a compare stub: {:?}", other),
        }
    }

    #[test]
    fn test_compare_widens_from_smi_to_number() {
        let mut isolate = Isolate::new();
        let mut site = isolate.compare_site(CompareOp::Lt);
        assert_eq!(site.state(), IcState::Uninitialized);

        let result = isolate.compare(&mut site, Value::Smi(1), Value::Smi(2));
        assert_eq!(result, Value::Boolean(true));
        assert_eq!(compare_state(&site), CompareState::Smi);

        let half = isolate.heap_mut().new_number(0.5);
        let result = isolate.compare(&mut site, half, Value::Smi(0));
        assert_eq!(result, Value::Boolean(false));
        assert_eq!(compare_state(&site), CompareState::Number);
        assert_eq!(site.state(), IcState::Monomorphic);
    }

    #[test]
    fn test_binary_op_computes_and_records() {
        let mut isolate = Isolate::new();
        let mut site = isolate.binary_op_site(BinaryOperation::Add);
        assert_eq!(isolate.binary_op(&mut site, Value::Smi(1), Value::Smi(2)), Value::Smi(3));
        assert_eq!(site.state(), IcState::Monomorphic);

        let text = isolate.heap_mut().new_string("a");
        let joined = isolate.binary_op(&mut site, text, Value::Smi(1));
        assert_eq!(isolate.heap().string_value(joined), Some("a1"));
    }

    #[test]
    fn test_unary_minus_of_zero_is_a_number() {
        let mut isolate = Isolate::new();
        let mut site = isolate.unary_op_site(UnaryOperation::Sub);
        assert_eq!(isolate.unary_op(&mut site, Value::Smi(4)), Value::Smi(-4));
        let negative_zero = isolate.unary_op(&mut site, Value::Smi(0));
        assert!(isolate.heap().is_heap_number(negative_zero));
        assert_eq!(site.state(), IcState::Monomorphic);
    }

    #[test]
    fn test_to_boolean_feedback_only_grows() {
        let mut isolate = Isolate::new();
        let mut site = isolate.to_boolean_site();
        assert_eq!(site.state(), IcState::Uninitialized);
        assert!(!isolate.to_boolean(&mut site, Value::Smi(0)));
        let first = site.patch_count();
        assert!(isolate.to_boolean(&mut site, Value::Smi(3)));
        assert_eq!(site.patch_count(), first);
        assert!(!isolate.to_boolean(&mut site, Value::Undefined));
        assert_eq!(site.patch_count(), first + 1);
        assert_eq!(site.state(), IcState::Monomorphic);
    }
}
