//! Property lookup results
//!
//! The result of searching a receiver and its prototype chain for a named property.
//! Miss handlers turn these into stubs; the runtime turns them into values.

use super::shape::{PropertyAttributes, PropertyDescriptor, PropertyKind, ShapeId};
use super::ObjectId;

/// Outcome of a named property lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LookupResult {
    /// No object on the chain has the property
    NotFound,
    /// A real property found on `holder`
    Property {
        holder: ObjectId,
        kind: PropertyKind,
        attributes: PropertyAttributes,
    },
    /// `holder` has a named interceptor that must be consulted
    Interceptor { holder: ObjectId },
    /// Adding the property to `holder` follows an existing shape transition
    Transition {
        holder: ObjectId,
        target: ShapeId,
        descriptor: PropertyDescriptor,
    },
}

impl LookupResult {
    pub fn is_found(&self) -> bool {
        !matches!(self, LookupResult::NotFound)
    }

    /// A real property (not an interceptor or transition)
    pub fn is_property(&self) -> bool {
        matches!(self, LookupResult::Property { .. })
    }

    pub fn is_interceptor(&self) -> bool {
        matches!(self, LookupResult::Interceptor { .. })
    }

    pub fn holder(&self) -> Option<ObjectId> {
        match self {
            LookupResult::NotFound => None,
            LookupResult::Property { holder, .. }
            | LookupResult::Interceptor { holder }
            | LookupResult::Transition { holder, .. } => Some(*holder),
        }
    }

    pub fn kind(&self) -> Option<PropertyKind> {
        match self {
            LookupResult::Property { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_read_only(&self) -> bool {
        match self {
            LookupResult::Property { attributes, .. } => {
                attributes.contains(PropertyAttributes::READ_ONLY)
            }
            LookupResult::Transition { descriptor, .. } => {
                descriptor.attributes.contains(PropertyAttributes::READ_ONLY)
            }
            _ => false,
        }
    }

    /// Property type name as printed in traces
    pub fn type_name(&self) -> &'static str {
        match self {
            LookupResult::NotFound => "NONEXISTENT",
            LookupResult::Property { kind, .. } => kind.name(),
            LookupResult::Interceptor { .. } => "INTERCEPTOR",
            LookupResult::Transition { .. } => "TRANSITION",
        }
    }
}
