//! Tagged values
//!
//! A [`Value`] is either an immediate (small integer, oddball) or a reference to an
//! object in the [`Heap`](super::Heap). Heap numbers and strings live in the heap too, so
//! `Value` stays `Copy` and can be written into frame slots verbatim.

use std::fmt;

/// Smallest integer representable as an immediate
pub const SMI_MIN: i32 = -(1 << 30);

/// Largest integer representable as an immediate
pub const SMI_MAX: i32 = (1 << 30) - 1;

/// Index of an object in the heap arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    /// Arena index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A tagged engine value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Value {
    /// Small integer in `SMI_MIN..=SMI_MAX`
    Smi(i32),
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    /// Marker for absent elements
    Hole,
    /// Placeholder written where an arguments object will be materialized
    ArgumentsMarker,
    /// Heap-allocated number, string or object
    Object(ObjectId),
}

impl Value {
    /// Whether the integer fits the immediate range
    #[inline]
    pub fn is_valid_smi(value: i64) -> bool {
        value >= SMI_MIN as i64 && value <= SMI_MAX as i64
    }

    /// Make an immediate integer if it fits
    #[inline]
    pub fn smi(value: i64) -> Option<Value> {
        if Self::is_valid_smi(value) {
            Some(Value::Smi(value as i32))
        } else {
            None
        }
    }

    #[inline]
    pub fn as_smi(self) -> Option<i32> {
        match self {
            Value::Smi(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn is_smi(self) -> bool {
        matches!(self, Value::Smi(_))
    }

    #[inline]
    pub fn is_undefined(self) -> bool {
        matches!(self, Value::Undefined)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        matches!(self, Value::Null)
    }

    /// `undefined` or `null`; property access on these throws
    #[inline]
    pub fn is_nullish(self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    #[inline]
    pub fn is_heap_object(self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline]
    pub fn is_hole(self) -> bool {
        matches!(self, Value::Hole)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Smi(v) => write!(f, "{}", v),
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Hole => write!(f, "<the hole>"),
            Value::ArgumentsMarker => write!(f, "<arguments marker>"),
            Value::Object(id) => write!(f, "<object {}>", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smi_range() {
        assert_eq!(Value::smi(0), Some(Value::Smi(0)));
        assert_eq!(Value::smi(SMI_MAX as i64), Some(Value::Smi(SMI_MAX)));
        assert_eq!(Value::smi(SMI_MAX as i64 + 1), None);
        assert_eq!(Value::smi(SMI_MIN as i64), Some(Value::Smi(SMI_MIN)));
        assert_eq!(Value::smi(SMI_MIN as i64 - 1), None);
    }

    #[test]
    fn test_predicates() {
        assert!(Value::Undefined.is_nullish());
        assert!(Value::Null.is_nullish());
        assert!(!Value::Smi(0).is_nullish());
        assert!(Value::Object(ObjectId(3)).is_heap_object());
        assert_eq!(Value::default(), Value::Undefined);
    }
}
