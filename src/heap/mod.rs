//! Heap and object model
//!
//! The slice of the object model that inline caches and the deoptimizer need to see:
//! an arena of heap objects addressed by [`ObjectId`], a table of [`Shape`]s addressed
//! by [`ShapeId`], interned property [`Name`]s, and the root objects every isolate starts
//! with (prototypes, the global object and its proxy).
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`value`] | Tagged [`Value`]s and the small-integer range |
//! | [`shape`] | Shapes, descriptors, transitions and per-shape code caches |
//! | [`elements`] | The elements-kind lattice |
//! | [`lookup`] | Property lookup results |
//! | `property` | Named and indexed property access on the slow path |
//! | `conversions` | Number and string conversions |

pub mod elements;
pub mod lookup;
pub mod object;
pub mod shape;
pub mod value;

mod builtins;
mod conversions;
mod property;

use std::cell::Cell;
use std::rc::Rc;

use rustc_hash::FxHashMap as HashMap;
use string_interner::{DefaultSymbol, StringInterner};

pub use conversions::{number_to_string, to_int32, to_uint32};
pub use elements::{ElementsKind, ElementsStorage};
pub use lookup::LookupResult;
pub use object::{
    BuiltinFunctionId, DictionaryEntry, FunctionData, HeapObject, JsObject, JsString, NativeFn,
    ObjectClass, SharedFunctionInfo, SharedId,
};
pub use shape::{InstanceType, PropertyAttributes, PropertyDescriptor, PropertyKind, Shape, ShapeId};
pub use value::{ObjectId, Value, SMI_MAX, SMI_MIN};

use crate::deopt::CodeId;

/// Interned property name
pub type Name = DefaultSymbol;

/// Objects and shapes every heap is created with
#[derive(Debug, Clone)]
pub struct Roots {
    pub object_prototype: ObjectId,
    pub array_prototype: ObjectId,
    pub function_prototype: ObjectId,
    pub string_prototype: ObjectId,
    pub global_object: ObjectId,
    pub global_proxy: ObjectId,
    /// Initial shape of plain objects
    pub object_shape: ShapeId,
    /// Initial shape of arrays (packed small integers)
    pub array_shape: ShapeId,
    pub function_shape: ShapeId,
    pub arguments_shape: ShapeId,
    pub string_wrapper_shape: ShapeId,
    /// Shape of primitive strings
    pub string_shape: ShapeId,
    pub heap_number_shape: ShapeId,
    pub length: Name,
    pub prototype: Name,
    pub nan: Name,
    pub undefined: Name,
    pub char_at: Name,
    pub char_code_at: Name,
}

/// Guard that forbids heap allocation while alive.
///
/// Frame translation runs under this guard; any allocation attempt is a bug and aborts.
#[derive(Debug)]
pub struct NoAllocationScope {
    depth: Rc<Cell<u32>>,
}

impl Drop for NoAllocationScope {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

/// The object heap
#[derive(Debug)]
pub struct Heap {
    objects: Vec<HeapObject>,
    shapes: Vec<Shape>,
    shared: Vec<SharedFunctionInfo>,
    names: StringInterner<string_interner::DefaultBackend>,
    internalized: HashMap<String, ObjectId>,
    initial_shapes: HashMap<Option<ObjectId>, ShapeId>,
    no_allocation_depth: Rc<Cell<u32>>,
    roots: Roots,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Create a heap with its root objects
    pub fn new() -> Self {
        let mut names = StringInterner::default();
        let placeholder_object = ObjectId(0);
        let placeholder_shape = ShapeId(0);
        let roots = Roots {
            object_prototype: placeholder_object,
            array_prototype: placeholder_object,
            function_prototype: placeholder_object,
            string_prototype: placeholder_object,
            global_object: placeholder_object,
            global_proxy: placeholder_object,
            object_shape: placeholder_shape,
            array_shape: placeholder_shape,
            function_shape: placeholder_shape,
            arguments_shape: placeholder_shape,
            string_wrapper_shape: placeholder_shape,
            string_shape: placeholder_shape,
            heap_number_shape: placeholder_shape,
            length: names.get_or_intern("length"),
            prototype: names.get_or_intern("prototype"),
            nan: names.get_or_intern("NaN"),
            undefined: names.get_or_intern("undefined"),
            char_at: names.get_or_intern("charAt"),
            char_code_at: names.get_or_intern("charCodeAt"),
        };
        let mut heap = Self {
            objects: Vec::new(),
            shapes: Vec::new(),
            shared: Vec::new(),
            names,
            internalized: HashMap::default(),
            initial_shapes: HashMap::default(),
            no_allocation_depth: Rc::new(Cell::new(0)),
            roots,
        };
        heap.bootstrap();
        heap
    }

    fn bootstrap(&mut self) {
        let root_shape = self.new_shape(InstanceType::Object, Value::Null, ElementsKind::PackedSmi);
        let object_prototype = self.allocate_js_object(root_shape, ObjectClass::Plain);
        let object_shape = self.new_shape(
            InstanceType::Object,
            Value::Object(object_prototype),
            ElementsKind::PackedSmi,
        );
        self.initial_shapes.insert(Some(object_prototype), object_shape);
        self.initial_shapes.insert(None, root_shape);

        let array_prototype = self.allocate_js_object(object_shape, ObjectClass::Plain);
        let function_prototype = self.allocate_js_object(object_shape, ObjectClass::Plain);
        let string_proto_shape = self.new_shape(
            InstanceType::Object,
            Value::Object(object_prototype),
            ElementsKind::PackedSmi,
        );
        let string_prototype = self.allocate_js_object(string_proto_shape, ObjectClass::Plain);

        let array_shape = self.new_shape(
            InstanceType::Array,
            Value::Object(array_prototype),
            ElementsKind::PackedSmi,
        );
        let function_shape = self.new_shape(
            InstanceType::Function,
            Value::Object(function_prototype),
            ElementsKind::PackedSmi,
        );
        let arguments_shape = self.new_shape(
            InstanceType::Arguments,
            Value::Object(object_prototype),
            ElementsKind::Packed,
        );
        let string_wrapper_shape = self.new_shape(
            InstanceType::StringWrapper,
            Value::Object(string_prototype),
            ElementsKind::PackedSmi,
        );
        let string_shape = self.new_shape(
            InstanceType::String,
            Value::Object(string_prototype),
            ElementsKind::PackedSmi,
        );
        let heap_number_shape = self.new_shape(
            InstanceType::HeapNumber,
            Value::Object(object_prototype),
            ElementsKind::PackedSmi,
        );

        let global_shape = self.new_shape(
            InstanceType::GlobalObject,
            Value::Object(object_prototype),
            ElementsKind::PackedSmi,
        );
        let global_object = self.allocate_js_object(global_shape, ObjectClass::Global);
        let proxy_shape = self.new_shape(
            InstanceType::GlobalProxy,
            Value::Object(global_object),
            ElementsKind::PackedSmi,
        );
        let global_proxy = self.allocate_js_object(proxy_shape, ObjectClass::GlobalProxy(global_object));

        self.roots.object_prototype = object_prototype;
        self.roots.array_prototype = array_prototype;
        self.roots.function_prototype = function_prototype;
        self.roots.string_prototype = string_prototype;
        self.roots.global_object = global_object;
        self.roots.global_proxy = global_proxy;
        self.roots.object_shape = object_shape;
        self.roots.array_shape = array_shape;
        self.roots.function_shape = function_shape;
        self.roots.arguments_shape = arguments_shape;
        self.roots.string_wrapper_shape = string_wrapper_shape;
        self.roots.string_shape = string_shape;
        self.roots.heap_number_shape = heap_number_shape;

        self.install_string_builtins();
    }

    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    // ==================== Names ====================

    /// Intern a property name
    pub fn intern(&mut self, name: &str) -> Name {
        self.names.get_or_intern(name)
    }

    /// Name for a string if it was interned before
    pub fn lookup_name(&self, name: &str) -> Option<Name> {
        self.names.get(name)
    }

    pub fn name_str(&self, name: Name) -> &str {
        self.names.resolve(name).unwrap_or("<unknown>")
    }

    /// If `name` spells a canonical array index, return it
    pub fn name_as_array_index(&self, name: Name) -> Option<u32> {
        conversions::as_array_index(self.name_str(name))
    }

    // ==================== Allocation ====================

    /// Forbid allocation until the returned guard is dropped
    pub fn no_allocation_scope(&self) -> NoAllocationScope {
        self.no_allocation_depth.set(self.no_allocation_depth.get() + 1);
        NoAllocationScope {
            depth: Rc::clone(&self.no_allocation_depth),
        }
    }

    pub fn allocation_allowed(&self) -> bool {
        self.no_allocation_depth.get() == 0
    }

    fn allocate(&mut self, object: HeapObject) -> ObjectId {
        assert!(
            self.allocation_allowed(),
            "heap allocation inside a no-allocation scope"
        );
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    pub(crate) fn allocate_js_object(&mut self, shape: ShapeId, class: ObjectClass) -> ObjectId {
        let fields = self.shape(shape).field_count();
        let mut object = JsObject::new(shape, class);
        object.fields = vec![Value::Undefined; fields];
        self.allocate(HeapObject::Object(object))
    }

    /// Box a number, always allocating
    pub fn allocate_heap_number(&mut self, value: f64) -> Value {
        Value::Object(self.allocate(HeapObject::Number(value)))
    }

    /// A number value: an immediate when the value is a small integer, boxed otherwise
    pub fn new_number(&mut self, value: f64) -> Value {
        if value.fract() == 0.0
            && !(value == 0.0 && value.is_sign_negative())
            && value >= SMI_MIN as f64
            && value <= SMI_MAX as f64
        {
            Value::Smi(value as i32)
        } else {
            self.allocate_heap_number(value)
        }
    }

    /// Allocate a (non-internalized) string
    pub fn new_string(&mut self, value: impl Into<String>) -> Value {
        Value::Object(self.allocate(HeapObject::String(JsString {
            value: value.into(),
            internalized: false,
        })))
    }

    /// The canonical internalized string with the given contents
    pub fn internalize(&mut self, value: &str) -> Value {
        if let Some(&id) = self.internalized.get(value) {
            return Value::Object(id);
        }
        let id = self.allocate(HeapObject::String(JsString {
            value: value.to_string(),
            internalized: true,
        }));
        self.internalized.insert(value.to_string(), id);
        Value::Object(id)
    }

    /// Internalized string for a property name
    pub fn name_value(&mut self, name: Name) -> Value {
        let text = self.name_str(name).to_string();
        self.internalize(&text)
    }

    /// Allocate a plain object inheriting from `Object.prototype`
    pub fn new_object(&mut self) -> ObjectId {
        let shape = self.roots.object_shape;
        self.allocate_js_object(shape, ObjectClass::Plain)
    }

    /// Allocate a plain object with the given prototype
    pub fn new_object_with_prototype(&mut self, prototype: Value) -> ObjectId {
        let shape = self.initial_shape_for(prototype);
        self.allocate_js_object(shape, ObjectClass::Plain)
    }

    /// Allocate an array whose elements kind fits its contents
    pub fn new_array(&mut self, elements: Vec<Value>) -> ObjectId {
        let kind = elements
            .iter()
            .fold(ElementsKind::PackedSmi, |kind, &v| kind.union(self.elements_kind_for(v)));
        let base = self.roots.array_shape;
        let shape = self.elements_transition_shape(base, kind);
        let id = self.allocate_js_object(shape, ObjectClass::Array);
        if let Some(object) = self.js_object_mut(id) {
            object.elements = elements;
        }
        id
    }

    /// Allocate an arguments object
    pub fn new_arguments_object(&mut self, callee: Value, values: &[Value], strict: bool) -> ObjectId {
        let shape = self.roots.arguments_shape;
        let id = self.allocate_js_object(shape, ObjectClass::Arguments { callee, strict });
        if let Some(object) = self.js_object_mut(id) {
            object.elements = values.to_vec();
        }
        let length = self.roots.length;
        self.add_property(id, length, Value::Smi(values.len() as i32), PropertyAttributes::DONT_ENUM);
        id
    }

    /// Wrap a primitive string in an object
    pub fn new_string_wrapper(&mut self, string: Value) -> ObjectId {
        let shape = self.roots.string_wrapper_shape;
        self.allocate_js_object(shape, ObjectClass::StringWrapper(string))
    }

    pub fn new_shared_function_info(
        &mut self,
        name: impl Into<String>,
        formal_parameter_count: usize,
        code: Option<CodeId>,
    ) -> SharedId {
        let id = SharedId(self.shared.len() as u32);
        self.shared.push(SharedFunctionInfo {
            name: name.into(),
            formal_parameter_count,
            code,
            deopt_count: 0,
            optimization_disabled: false,
            builtin: None,
        });
        id
    }

    /// Allocate a closure for `shared`, starting out on the shared baseline code
    pub fn new_function(&mut self, shared: SharedId) -> ObjectId {
        let code = self.shared(shared).code;
        self.new_function_with(shared, code, None)
    }

    /// Allocate a function backed by a host function
    pub fn new_native_function(
        &mut self,
        name: impl Into<String>,
        formal_parameter_count: usize,
        native: NativeFn,
    ) -> ObjectId {
        let shared = self.new_shared_function_info(name, formal_parameter_count, None);
        self.new_function_with(shared, None, Some(native))
    }

    fn new_function_with(&mut self, shared: SharedId, code: Option<CodeId>, native: Option<NativeFn>) -> ObjectId {
        let prototype = Value::Object(self.new_object());
        let shape = self.roots.function_shape;
        self.allocate_js_object(
            shape,
            ObjectClass::Function(FunctionData {
                shared,
                code,
                context: Value::Undefined,
                prototype,
                native,
            }),
        )
    }

    // ==================== Shapes ====================

    pub fn new_shape(
        &mut self,
        instance_type: InstanceType,
        prototype: Value,
        elements_kind: ElementsKind,
    ) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(Shape::new(id, instance_type, prototype, elements_kind));
        id
    }

    fn derive_shape(&mut self, from: ShapeId) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        let shape = self.shape(from).derive(id);
        self.shapes.push(shape);
        id
    }

    fn initial_shape_for(&mut self, prototype: Value) -> ShapeId {
        let key = prototype.as_object();
        if let Some(&shape) = self.initial_shapes.get(&key) {
            return shape;
        }
        let shape = self.new_shape(InstanceType::Object, prototype, ElementsKind::PackedSmi);
        self.initial_shapes.insert(key, shape);
        shape
    }

    pub fn shape(&self, id: ShapeId) -> &Shape {
        &self.shapes[id.index()]
    }

    pub fn shape_mut(&mut self, id: ShapeId) -> &mut Shape {
        &mut self.shapes[id.index()]
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Shape (map) of any heap value; `None` for immediates
    pub fn map_of(&self, value: Value) -> Option<ShapeId> {
        match self.get(value)? {
            HeapObject::Number(_) => Some(self.roots.heap_number_shape),
            HeapObject::String(_) => Some(self.roots.string_shape),
            HeapObject::Object(object) => Some(object.shape),
        }
    }

    /// The shape reached from `shape` by changing its elements kind to `kind`
    pub fn elements_transition_shape(&mut self, shape: ShapeId, kind: ElementsKind) -> ShapeId {
        if self.shape(shape).elements_kind == kind {
            return shape;
        }
        if let Some(target) = self.shape(shape).elements_transition_for(kind) {
            return target;
        }
        let target = self.derive_shape(shape);
        self.shape_mut(target).elements_kind = kind;
        self.shape_mut(shape).elements_transitions.insert(kind, target);
        target
    }

    // ==================== Object access ====================

    pub fn object(&self, id: ObjectId) -> &HeapObject {
        &self.objects[id.index()]
    }

    pub fn get(&self, value: Value) -> Option<&HeapObject> {
        value.as_object().map(|id| self.object(id))
    }

    pub fn js_object(&self, id: ObjectId) -> Option<&JsObject> {
        match &self.objects[id.index()] {
            HeapObject::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn js_object_mut(&mut self, id: ObjectId) -> Option<&mut JsObject> {
        match &mut self.objects[id.index()] {
            HeapObject::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The JS object a value refers to, if it is one
    pub fn as_js_object(&self, value: Value) -> Option<(ObjectId, &JsObject)> {
        let id = value.as_object()?;
        self.js_object(id).map(|object| (id, object))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn shared(&self, id: SharedId) -> &SharedFunctionInfo {
        &self.shared[id.0 as usize]
    }

    pub fn shared_mut(&mut self, id: SharedId) -> &mut SharedFunctionInfo {
        &mut self.shared[id.0 as usize]
    }

    pub fn function_data(&self, value: Value) -> Option<&FunctionData> {
        self.as_js_object(value)?.1.function()
    }

    pub fn function_data_mut(&mut self, id: ObjectId) -> Option<&mut FunctionData> {
        match &mut self.js_object_mut(id)?.class {
            ObjectClass::Function(data) => Some(data),
            _ => None,
        }
    }

    /// Shared info of a function value
    pub fn function_shared(&self, value: Value) -> Option<&SharedFunctionInfo> {
        self.function_data(value).map(|data| self.shared(data.shared))
    }

    pub fn set_function_code(&mut self, function: ObjectId, code: Option<CodeId>) {
        if let Some(data) = self.function_data_mut(function) {
            data.code = code;
        }
    }

    /// Make a non-function object callable through `handler`
    pub fn set_call_handler(&mut self, object: ObjectId, handler: ObjectId) {
        if let Some(object) = self.js_object_mut(object) {
            object.call_handler = Some(handler);
        }
    }

    /// Install a named interceptor serving `values` on `object`
    pub fn set_named_interceptor(&mut self, object: ObjectId, values: Vec<(Name, Value)>) {
        let Some(current) = self.js_object(object).map(|o| o.shape) else {
            return;
        };
        let shape = self.derive_shape(current);
        self.shape_mut(shape).has_named_interceptor = true;
        if let Some(object) = self.js_object_mut(object) {
            object.shape = shape;
            object.interceptor = values.into_iter().collect();
        }
    }

    // ==================== Type predicates ====================

    pub fn is_heap_number(&self, value: Value) -> bool {
        matches!(self.get(value), Some(HeapObject::Number(_)))
    }

    /// Small integer or heap number
    pub fn is_number(&self, value: Value) -> bool {
        value.is_smi() || self.is_heap_number(value)
    }

    pub fn number_value(&self, value: Value) -> Option<f64> {
        match value {
            Value::Smi(v) => Some(v as f64),
            _ => match self.get(value)? {
                HeapObject::Number(n) => Some(*n),
                _ => None,
            },
        }
    }

    pub fn is_string(&self, value: Value) -> bool {
        matches!(self.get(value), Some(HeapObject::String(_)))
    }

    pub fn is_internalized_string(&self, value: Value) -> bool {
        matches!(self.get(value), Some(HeapObject::String(s)) if s.internalized)
    }

    pub fn string(&self, value: Value) -> Option<&JsString> {
        match self.get(value)? {
            HeapObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn string_value(&self, value: Value) -> Option<&str> {
        self.string(value).map(|s| s.value.as_str())
    }

    pub fn is_js_object(&self, value: Value) -> bool {
        self.as_js_object(value).is_some()
    }

    fn class_of(&self, value: Value) -> Option<&ObjectClass> {
        self.as_js_object(value).map(|(_, object)| &object.class)
    }

    pub fn is_array(&self, value: Value) -> bool {
        matches!(self.class_of(value), Some(ObjectClass::Array))
    }

    pub fn is_function(&self, value: Value) -> bool {
        matches!(self.class_of(value), Some(ObjectClass::Function(_)))
    }

    pub fn is_string_wrapper(&self, value: Value) -> bool {
        matches!(self.class_of(value), Some(ObjectClass::StringWrapper(_)))
    }

    pub fn is_global_object(&self, value: Value) -> bool {
        matches!(self.class_of(value), Some(ObjectClass::Global))
    }

    pub fn is_global_proxy(&self, value: Value) -> bool {
        matches!(self.class_of(value), Some(ObjectClass::GlobalProxy(_)))
    }

    pub fn is_arguments_object(&self, value: Value) -> bool {
        matches!(self.class_of(value), Some(ObjectClass::Arguments { .. }))
    }

    /// Arguments object whose elements alias the parameters
    pub fn is_non_strict_arguments(&self, value: Value) -> bool {
        matches!(
            self.class_of(value),
            Some(ObjectClass::Arguments { strict: false, .. })
        )
    }

    pub fn elements_kind_of(&self, value: Value) -> Option<ElementsKind> {
        self.as_js_object(value)
            .map(|(_, object)| self.shape(object.shape).elements_kind)
    }

    /// Narrowest elements kind that can hold `value`
    pub fn elements_kind_for(&self, value: Value) -> ElementsKind {
        match value {
            Value::Smi(_) => ElementsKind::PackedSmi,
            Value::Hole => ElementsKind::HoleySmi,
            _ if self.is_heap_number(value) => ElementsKind::PackedDouble,
            _ => ElementsKind::Packed,
        }
    }

    /// Short description of a value for error messages
    pub fn describe(&self, value: Value) -> String {
        match value {
            Value::Object(id) => match self.object(id) {
                HeapObject::Number(n) => number_to_string(*n),
                HeapObject::String(s) => s.value.clone(),
                HeapObject::Object(object) => match &object.class {
                    ObjectClass::Array => "#<Array>".to_string(),
                    ObjectClass::Function(data) => {
                        format!("function {}", self.shared(data.shared).name)
                    }
                    ObjectClass::Arguments { .. } => "#<Arguments>".to_string(),
                    ObjectClass::Global | ObjectClass::GlobalProxy(_) => "#<Global>".to_string(),
                    ObjectClass::StringWrapper(_) => "#<String>".to_string(),
                    ObjectClass::Plain => "#<Object>".to_string(),
                },
            },
            other => other.to_string(),
        }
    }
}
