//! Number and string conversions used by the slow paths

use num_traits::ToPrimitive;

use super::{Heap, HeapObject, Value};

/// Largest valid array index
const MAX_ARRAY_INDEX: u32 = u32::MAX - 1;

/// Parse a canonical array index ("0", "17", but not "017" or "-1")
pub(crate) fn as_array_index(text: &str) -> Option<u32> {
    if text.is_empty() || text.len() > 10 {
        return None;
    }
    if text.len() > 1 && text.starts_with('0') {
        return None;
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = text.parse().ok()?;
    if value > MAX_ARRAY_INDEX as u64 {
        return None;
    }
    Some(value as u32)
}

/// Format a number the way `String(n)` does for the common cases
pub fn number_to_string(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// ECMAScript ToInt32
pub fn to_int32(value: f64) -> i32 {
    to_uint32(value) as i32
}

/// ECMAScript ToUint32
pub fn to_uint32(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    let truncated = value.trunc();
    let modulo = truncated.rem_euclid(4_294_967_296.0);
    modulo.to_u32().unwrap_or(0)
}

fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .ok()
            .and_then(|v| v.to_f64())
            .unwrap_or(f64::NAN);
    }
    lexical_core::parse::<f64>(trimmed.as_bytes()).unwrap_or(f64::NAN)
}

impl Heap {
    /// ECMAScript ToNumber (objects convert to NaN)
    pub fn to_number(&self, value: Value) -> f64 {
        match value {
            Value::Smi(v) => v as f64,
            Value::Undefined | Value::Hole | Value::ArgumentsMarker => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Object(id) => match self.object(id) {
                HeapObject::Number(n) => *n,
                HeapObject::String(s) => string_to_number(&s.value),
                HeapObject::Object(_) => f64::NAN,
            },
        }
    }

    /// ECMAScript ToBoolean
    pub fn to_boolean(&self, value: Value) -> bool {
        match value {
            Value::Smi(v) => v != 0,
            Value::Undefined | Value::Null | Value::Hole => false,
            Value::Boolean(b) => b,
            Value::ArgumentsMarker => true,
            Value::Object(id) => match self.object(id) {
                HeapObject::Number(n) => *n != 0.0 && !n.is_nan(),
                HeapObject::String(s) => !s.value.is_empty(),
                HeapObject::Object(_) => true,
            },
        }
    }

    /// ECMAScript ToString for primitives; objects print their description
    pub fn to_display_string(&self, value: Value) -> String {
        match value {
            Value::Smi(v) => v.to_string(),
            other => match self.get(other) {
                Some(HeapObject::Number(n)) => number_to_string(*n),
                Some(HeapObject::String(s)) => s.value.clone(),
                Some(HeapObject::Object(_)) => "[object Object]".to_string(),
                None => other.to_string(),
            },
        }
    }

    /// Array index denoted by a key value, if any
    pub fn key_as_array_index(&self, key: Value) -> Option<u32> {
        match key {
            Value::Smi(v) if v >= 0 => Some(v as u32),
            Value::Smi(_) => None,
            _ => match self.get(key)? {
                HeapObject::Number(n) => {
                    let index = n.to_u32()?;
                    (index as f64 == *n && index <= MAX_ARRAY_INDEX).then_some(index)
                }
                HeapObject::String(s) => as_array_index(&s.value),
                HeapObject::Object(_) => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_index_parsing() {
        assert_eq!(as_array_index("0"), Some(0));
        assert_eq!(as_array_index("42"), Some(42));
        assert_eq!(as_array_index("042"), None);
        assert_eq!(as_array_index("-1"), None);
        assert_eq!(as_array_index("length"), None);
        assert_eq!(as_array_index("4294967295"), None);
    }

    #[test]
    fn test_int32_conversions() {
        assert_eq!(to_int32(1.9), 1);
        assert_eq!(to_int32(-1.9), -1);
        assert_eq!(to_int32(4_294_967_296.0 + 5.0), 5);
        assert_eq!(to_int32(2_147_483_648.0), i32::MIN);
        assert_eq!(to_uint32(-1.0), u32::MAX);
        assert_eq!(to_int32(f64::NAN), 0);
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_to_number() {
        let mut heap = Heap::new();
        let s = heap.new_string(" 12.5 ");
        assert_eq!(heap.to_number(s), 12.5);
        let hex = heap.new_string("0x10");
        assert_eq!(heap.to_number(hex), 16.0);
        let empty = heap.new_string("");
        assert_eq!(heap.to_number(empty), 0.0);
        let junk = heap.new_string("abc");
        assert!(heap.to_number(junk).is_nan());
        assert!(heap.to_number(Value::Undefined).is_nan());
        assert_eq!(heap.to_number(Value::Boolean(true)), 1.0);
    }

    #[test]
    fn test_to_boolean() {
        let mut heap = Heap::new();
        let empty = heap.new_string("");
        let nan = heap.allocate_heap_number(f64::NAN);
        let object = Value::Object(heap.new_object());
        assert!(!heap.to_boolean(empty));
        assert!(!heap.to_boolean(nan));
        assert!(!heap.to_boolean(Value::Smi(0)));
        assert!(heap.to_boolean(object));
    }

    #[test]
    fn test_key_as_array_index() {
        let mut heap = Heap::new();
        let two = heap.allocate_heap_number(2.0);
        let half = heap.allocate_heap_number(2.5);
        let text = heap.new_string("7");
        assert_eq!(heap.key_as_array_index(Value::Smi(3)), Some(3));
        assert_eq!(heap.key_as_array_index(Value::Smi(-3)), None);
        assert_eq!(heap.key_as_array_index(two), Some(2));
        assert_eq!(heap.key_as_array_index(half), None);
        assert_eq!(heap.key_as_array_index(text), Some(7));
    }
}
