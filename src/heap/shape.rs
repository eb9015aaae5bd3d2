//! Shapes (hidden classes)
//!
//! Every object points at a [`Shape`] describing its instance type, prototype, elements
//! kind and property layout. Shapes are immutable in everything an inline cache checks;
//! adding a property or changing the elements kind moves the object to another shape via
//! a transition. Each shape also carries a per-name code cache of the monomorphic stubs
//! that were compiled for receivers of that shape.

use std::rc::Rc;

use bitflags::bitflags;
use rustc_hash::FxHashMap as HashMap;

use super::{ElementsKind, Name, Value};
use crate::ic::Stub;

/// Index of a shape in the heap's shape table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub(crate) u32);

impl ShapeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

bitflags! {
    /// Property attributes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyAttributes: u8 {
        const READ_ONLY = 1 << 0;
        const DONT_ENUM = 1 << 1;
        const DONT_DELETE = 1 << 2;
    }
}

/// Instance types an inline cache distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceType {
    /// Primitive string (not a JS object)
    String,
    /// Boxed number (not a JS object)
    HeapNumber,
    Object,
    Array,
    Function,
    StringWrapper,
    GlobalObject,
    GlobalProxy,
    Arguments,
}

/// Where and how a named property is stored
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyKind {
    /// In-object field at the given index
    Field(usize),
    /// Value fixed in the descriptor
    Constant(Value),
    /// Stored in the object's property dictionary
    Normal,
    /// Accessor pair; either side may be `undefined`
    Accessor { getter: Value, setter: Value },
}

impl PropertyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::Field(_) => "FIELD",
            PropertyKind::Constant(_) => "CONSTANT",
            PropertyKind::Normal => "NORMAL",
            PropertyKind::Accessor { .. } => "CALLBACKS",
        }
    }
}

/// A named property in a shape's descriptor array
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyDescriptor {
    pub name: Name,
    pub kind: PropertyKind,
    pub attributes: PropertyAttributes,
}

/// Hidden class of a heap object
#[derive(Debug, Clone)]
pub struct Shape {
    pub(crate) id: ShapeId,
    pub instance_type: InstanceType,
    pub prototype: Value,
    pub elements_kind: ElementsKind,
    /// Properties live in a per-object dictionary instead of the descriptors
    pub is_dictionary: bool,
    /// Named property reads consult the object's interceptor first
    pub has_named_interceptor: bool,
    pub(crate) descriptors: Vec<PropertyDescriptor>,
    pub(crate) transitions: HashMap<Name, ShapeId>,
    pub(crate) elements_transitions: HashMap<ElementsKind, ShapeId>,
    pub(crate) code_cache: HashMap<Name, Vec<Rc<Stub>>>,
}

impl Shape {
    pub(crate) fn new(
        id: ShapeId,
        instance_type: InstanceType,
        prototype: Value,
        elements_kind: ElementsKind,
    ) -> Self {
        Self {
            id,
            instance_type,
            prototype,
            elements_kind,
            is_dictionary: matches!(instance_type, InstanceType::GlobalObject),
            has_named_interceptor: false,
            descriptors: Vec::new(),
            transitions: HashMap::default(),
            elements_transitions: HashMap::default(),
            code_cache: HashMap::default(),
        }
    }

    /// Copy of this shape under a new id, without transitions or cached code
    pub(crate) fn derive(&self, id: ShapeId) -> Self {
        Self {
            id,
            instance_type: self.instance_type,
            prototype: self.prototype,
            elements_kind: self.elements_kind,
            is_dictionary: self.is_dictionary,
            has_named_interceptor: self.has_named_interceptor,
            descriptors: self.descriptors.clone(),
            transitions: HashMap::default(),
            elements_transitions: HashMap::default(),
            code_cache: HashMap::default(),
        }
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn descriptors(&self) -> &[PropertyDescriptor] {
        &self.descriptors
    }

    pub fn lookup_descriptor(&self, name: Name) -> Option<&PropertyDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Number of in-object fields objects of this shape carry
    pub fn field_count(&self) -> usize {
        self.descriptors
            .iter()
            .filter(|d| matches!(d.kind, PropertyKind::Field(_)))
            .count()
    }

    /// Descriptor added by the transition that produced this shape
    pub fn last_added(&self) -> Option<&PropertyDescriptor> {
        self.descriptors.last()
    }

    pub fn transition_for(&self, name: Name) -> Option<ShapeId> {
        self.transitions.get(&name).copied()
    }

    pub fn elements_transition_for(&self, kind: ElementsKind) -> Option<ShapeId> {
        self.elements_transitions.get(&kind).copied()
    }

    /// Find a cached stub for `name` satisfying `matches`
    pub fn find_in_code_cache(&self, name: Name, matches: impl Fn(&Stub) -> bool) -> Option<Rc<Stub>> {
        self.code_cache
            .get(&name)?
            .iter()
            .find(|stub| matches(stub))
            .cloned()
    }

    /// Position of the stub with the given id in the cache for `name`
    pub fn index_in_code_cache(&self, name: Name, stub: &Stub) -> Option<usize> {
        self.code_cache
            .get(&name)?
            .iter()
            .position(|s| s.id() == stub.id())
    }

    pub(crate) fn update_code_cache(&mut self, name: Name, stub: Rc<Stub>) {
        self.code_cache.entry(name).or_default().push(stub);
    }

    pub(crate) fn remove_from_code_cache(&mut self, name: Name, index: usize) {
        if let Some(entries) = self.code_cache.get_mut(&name) {
            if index < entries.len() {
                entries.remove(index);
            }
        }
    }

    /// Total number of stubs cached on this shape
    pub fn code_cache_len(&self) -> usize {
        self.code_cache.values().map(Vec::len).sum()
    }
}
