//! Host builtins installed on the root prototypes

use super::{BuiltinFunctionId, Heap, PropertyAttributes, Value};
use crate::error::{messages, Error, Result};

impl Heap {
    pub(super) fn install_string_builtins(&mut self) {
        let prototype = self.roots().string_prototype;
        let char_at = self.roots().char_at;
        let char_code_at = self.roots().char_code_at;
        let builtins: [(super::Name, &str, super::NativeFn, BuiltinFunctionId); 2] = [
            (char_at, "charAt", string_char_at, BuiltinFunctionId::StringCharAt),
            (
                char_code_at,
                "charCodeAt",
                string_char_code_at,
                BuiltinFunctionId::StringCharCodeAt,
            ),
        ];
        for (name, label, native, id) in builtins {
            let function = self.new_native_function(label, 1, native);
            if let Some(data) = self.function_data(Value::Object(function)) {
                let shared = data.shared;
                self.shared_mut(shared).builtin = Some(id);
            }
            self.add_constant(prototype, name, Value::Object(function), PropertyAttributes::DONT_ENUM);
        }
    }

    /// The string a string builtin operates on
    fn this_string(&self, receiver: Value, builtin: &str) -> Result<Vec<u16>> {
        let string = match self.string_value(receiver) {
            Some(s) => s,
            None => match self.as_js_object(receiver).map(|(_, o)| &o.class) {
                Some(super::ObjectClass::StringWrapper(inner)) => {
                    self.string_value(*inner).unwrap_or_default()
                }
                _ => {
                    return Err(Error::type_error(
                        messages::CALLED_NON_CALLABLE,
                        format!("String.prototype.{} called on {}", builtin, self.describe(receiver)),
                    ))
                }
            },
        };
        Ok(string.encode_utf16().collect())
    }

    /// Integer position argument; `None` means out of bounds
    fn position_argument(&self, args: &[Value], length: usize) -> Option<usize> {
        let position = args.first().map_or(0.0, |&v| self.to_number(v));
        let position = if position.is_nan() { 0.0 } else { position.trunc() };
        if position < 0.0 || position >= length as f64 {
            None
        } else {
            Some(position as usize)
        }
    }
}

fn string_char_at(heap: &mut Heap, receiver: Value, args: &[Value]) -> Result<Value> {
    let units = heap.this_string(receiver, "charAt")?;
    match heap.position_argument(args, units.len()) {
        Some(index) => Ok(heap.new_string(String::from_utf16_lossy(&units[index..index + 1]))),
        None => Ok(heap.new_string("")),
    }
}

fn string_char_code_at(heap: &mut Heap, receiver: Value, args: &[Value]) -> Result<Value> {
    let units = heap.this_string(receiver, "charCodeAt")?;
    match heap.position_argument(args, units.len()) {
        Some(index) => Ok(Value::Smi(units[index] as i32)),
        None => Ok(heap.allocate_heap_number(f64::NAN)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_at_builtin() {
        let mut heap = Heap::new();
        let s = heap.new_string("abc");
        let c = string_char_at(&mut heap, s, &[Value::Smi(1)]).unwrap();
        assert_eq!(heap.string_value(c), Some("b"));
        let oob = string_char_at(&mut heap, s, &[Value::Smi(9)]).unwrap();
        assert_eq!(heap.string_value(oob), Some(""));
    }

    #[test]
    fn test_char_code_at_builtin() {
        let mut heap = Heap::new();
        let s = heap.new_string("abc");
        assert_eq!(string_char_code_at(&mut heap, s, &[Value::Smi(0)]).unwrap(), Value::Smi(97));
        let oob = string_char_code_at(&mut heap, s, &[Value::Smi(-1)]).unwrap();
        assert!(heap.to_number(oob).is_nan());
        assert!(string_char_code_at(&mut heap, Value::Null, &[]).is_err());
    }

    #[test]
    fn test_builtins_are_tagged() {
        let heap = Heap::new();
        let prototype = Value::Object(heap.roots().string_prototype);
        let name = heap.roots().char_at;
        let shape = heap.map_of(prototype).unwrap();
        let descriptor = heap.shape(shape).lookup_descriptor(name).unwrap();
        let super::super::PropertyKind::Constant(function) = descriptor.kind else {
            panic!("charAt should be a constant");
        };
        assert_eq!(
            heap.function_shared(function).and_then(|s| s.builtin),
            Some(BuiltinFunctionId::StringCharAt)
        );
    }
}
