//! Slow-path property access
//!
//! The generic runtime semantics of named and indexed loads and stores. Stubs are
//! specializations of these operations; generic stubs and miss handlers fall back here.

use super::{
    DictionaryEntry, ElementsKind, Heap, HeapObject, LookupResult, Name, ObjectClass, ObjectId,
    PropertyAttributes, PropertyDescriptor, PropertyKind, ShapeId, Value,
};
use crate::error::{messages, Error, Result};

/// Largest gap a single indexed store may open in an elements backing store
const MAX_ELEMENTS_GAP: usize = 1 << 20;

impl Heap {
    /// Prototype of any value; primitives use their wrapper prototype
    pub fn get_prototype(&self, value: Value) -> Value {
        match value {
            Value::Undefined | Value::Null | Value::Hole | Value::ArgumentsMarker => Value::Null,
            Value::Smi(_) | Value::Boolean(_) => Value::Object(self.roots().object_prototype),
            Value::Object(id) => match self.object(id) {
                HeapObject::Number(_) => Value::Object(self.roots().object_prototype),
                HeapObject::String(_) => Value::Object(self.roots().string_prototype),
                HeapObject::Object(object) => self.shape(object.shape).prototype,
            },
        }
    }

    /// Global proxies forward every access to the global object
    pub fn resolve_global_proxy(&self, object: ObjectId) -> ObjectId {
        match self.js_object(object).map(|o| &o.class) {
            Some(ObjectClass::GlobalProxy(global)) => *global,
            _ => object,
        }
    }

    // ==================== Lookup ====================

    /// Own-property lookup, consulting the named interceptor first
    pub fn local_lookup(&self, object: ObjectId, name: Name) -> LookupResult {
        let object = self.resolve_global_proxy(object);
        match self.js_object(object) {
            Some(o) if self.shape(o.shape).has_named_interceptor => {
                LookupResult::Interceptor { holder: object }
            }
            Some(_) => self.local_lookup_real_named_property(object, name),
            None => LookupResult::NotFound,
        }
    }

    /// Own-property lookup ignoring interceptors
    pub fn local_lookup_real_named_property(&self, object: ObjectId, name: Name) -> LookupResult {
        let object = self.resolve_global_proxy(object);
        let Some(o) = self.js_object(object) else {
            return LookupResult::NotFound;
        };
        let shape = self.shape(o.shape);
        if shape.is_dictionary {
            if let Some(entry) = o.dictionary.get(&name) {
                return LookupResult::Property {
                    holder: object,
                    kind: PropertyKind::Normal,
                    attributes: entry.attributes,
                };
            }
        }
        match shape.lookup_descriptor(name) {
            Some(descriptor) => LookupResult::Property {
                holder: object,
                kind: descriptor.kind,
                attributes: descriptor.attributes,
            },
            None => LookupResult::NotFound,
        }
    }

    /// Lookup along the whole prototype chain of `receiver`
    pub fn lookup(&self, receiver: Value, name: Name) -> LookupResult {
        let mut current = if self.is_js_object(receiver) {
            receiver
        } else {
            self.get_prototype(receiver)
        };
        while let Some(object) = current.as_object() {
            let result = self.local_lookup(object, name);
            if result.is_found() {
                return result;
            }
            current = self.get_prototype(current);
        }
        LookupResult::NotFound
    }

    /// Real (non-interceptor) property lookup in the prototypes of `object`
    pub fn lookup_real_named_property_in_prototypes(&self, object: ObjectId, name: Name) -> LookupResult {
        let mut current = self.get_prototype(Value::Object(object));
        while let Some(holder) = current.as_object() {
            let result = self.local_lookup_real_named_property(holder, name);
            if result.is_found() {
                return result;
            }
            current = self.get_prototype(current);
        }
        LookupResult::NotFound
    }

    /// Existing shape transition that adds `name` to `object`
    pub fn lookup_transition(&self, object: ObjectId, name: Name) -> LookupResult {
        let Some(o) = self.js_object(object) else {
            return LookupResult::NotFound;
        };
        let Some(target) = self.shape(o.shape).transition_for(name) else {
            return LookupResult::NotFound;
        };
        match self.shape(target).last_added() {
            Some(descriptor) if descriptor.name == name => LookupResult::Transition {
                holder: object,
                target,
                descriptor: *descriptor,
            },
            _ => LookupResult::NotFound,
        }
    }

    // ==================== Named loads ====================

    /// Built-in properties that are not described by shapes
    pub fn get_intrinsic(&self, receiver: Value, name: Name) -> Option<Value> {
        if name == self.roots().length {
            if let Some(length) = self.string_length(receiver) {
                return Some(Value::Smi(length as i32));
            }
            if let Some(length) = self.array_length(receiver) {
                return Some(Value::Smi(length as i32));
            }
        }
        if name == self.roots().prototype {
            if let Some(data) = self.function_data(receiver) {
                return Some(data.prototype);
            }
        }
        None
    }

    /// `receiver[name]` with full lookup semantics
    pub fn get_property(&mut self, receiver: Value, name: Name) -> Result<Value> {
        if let Some(value) = self.get_intrinsic(receiver, name) {
            return Ok(value);
        }
        let result = self.lookup(receiver, name);
        self.get_property_with_lookup(receiver, &result, name)
    }

    /// Read the property a lookup found
    pub fn get_property_with_lookup(&mut self, receiver: Value, result: &LookupResult, name: Name) -> Result<Value> {
        match *result {
            LookupResult::NotFound | LookupResult::Transition { .. } => Ok(Value::Undefined),
            LookupResult::Property { holder, kind, .. } => match kind {
                PropertyKind::Field(index) => Ok(self.field_value(holder, index)),
                PropertyKind::Constant(value) => Ok(value),
                PropertyKind::Normal => Ok(self.dictionary_value(holder, name).unwrap_or_default()),
                PropertyKind::Accessor { getter, .. } => {
                    if self.is_callable(getter) {
                        self.call_function(getter, receiver, &[])
                    } else {
                        Ok(Value::Undefined)
                    }
                }
            },
            LookupResult::Interceptor { holder } => {
                if let Some(value) = self.interceptor_value(holder, name) {
                    return Ok(value);
                }
                let mut real = self.local_lookup_real_named_property(holder, name);
                if !real.is_found() {
                    real = self.lookup_real_named_property_in_prototypes(holder, name);
                }
                self.get_property_with_lookup(receiver, &real, name)
            }
        }
    }

    pub fn field_value(&self, holder: ObjectId, index: usize) -> Value {
        self.js_object(holder)
            .and_then(|o| o.fields.get(index).copied())
            .unwrap_or_default()
    }

    pub fn dictionary_value(&self, holder: ObjectId, name: Name) -> Option<Value> {
        self.js_object(holder)
            .and_then(|o| o.dictionary.get(&name))
            .map(|entry| entry.value)
    }

    pub fn dictionary_entry(&self, holder: ObjectId, name: Name) -> Option<DictionaryEntry> {
        self.js_object(holder).and_then(|o| o.dictionary.get(&name).copied())
    }

    pub fn interceptor_value(&self, holder: ObjectId, name: Name) -> Option<Value> {
        self.js_object(holder)
            .and_then(|o| o.interceptor.get(&name).copied())
    }

    // ==================== Named stores ====================

    /// `receiver[name] = value` with full store semantics; returns `value`
    pub fn set_property(&mut self, receiver: Value, name: Name, value: Value, strict: bool) -> Result<Value> {
        let Some(object) = receiver.as_object().filter(|_| self.is_js_object(receiver)) else {
            return Ok(value);
        };
        let object = self.resolve_global_proxy(object);
        if name == self.roots().length && self.is_array(Value::Object(object)) {
            self.set_array_length(object, value)?;
            return Ok(value);
        }

        let mut result = self.local_lookup_real_named_property(object, name);
        if !result.is_found() {
            result = self.lookup_real_named_property_in_prototypes(object, name);
        }
        if let LookupResult::Property { holder, kind, attributes } = result {
            if let PropertyKind::Accessor { setter, .. } = kind {
                if self.is_callable(setter) {
                    self.call_function(setter, Value::Object(object), &[value])?;
                    return Ok(value);
                }
                return self.read_only_store(receiver, name, value, strict);
            }
            if attributes.contains(PropertyAttributes::READ_ONLY) {
                return self.read_only_store(receiver, name, value, strict);
            }
            if holder == object {
                match kind {
                    PropertyKind::Field(index) => self.set_field(object, index, value),
                    PropertyKind::Normal => self.set_dictionary_value(object, name, value),
                    PropertyKind::Constant(_) => self.convert_constant_to_field(object, name, value),
                    PropertyKind::Accessor { .. } => {}
                }
                return Ok(value);
            }
        }
        self.add_property(object, name, value, PropertyAttributes::empty());
        Ok(value)
    }

    fn read_only_store(&self, receiver: Value, name: Name, value: Value, strict: bool) -> Result<Value> {
        if strict {
            Err(Error::type_error(
                messages::STRICT_READ_ONLY_PROPERTY,
                messages::strict_read_only_property(self.name_str(name), &self.describe(receiver)),
            ))
        } else {
            Ok(value)
        }
    }

    pub fn set_field(&mut self, object: ObjectId, index: usize, value: Value) {
        if let Some(slot) = self.js_object_mut(object).and_then(|o| o.fields.get_mut(index)) {
            *slot = value;
        }
    }

    pub fn set_dictionary_value(&mut self, object: ObjectId, name: Name, value: Value) {
        if let Some(entry) = self.js_object_mut(object).and_then(|o| o.dictionary.get_mut(&name)) {
            entry.value = value;
        }
    }

    /// Follow or create the transition that appends `descriptor`
    fn transition_target(&mut self, from: ShapeId, descriptor: PropertyDescriptor) -> ShapeId {
        if let Some(target) = self.shape(from).transition_for(descriptor.name) {
            if self.shape(target).last_added() == Some(&descriptor) {
                return target;
            }
        }
        let target = self.derive_shape(from);
        self.shape_mut(target).descriptors.push(descriptor);
        if self.shape(from).transition_for(descriptor.name).is_none() {
            self.shape_mut(from).transitions.insert(descriptor.name, target);
        }
        target
    }

    /// Add a data property as an in-object field (or dictionary entry)
    pub fn add_property(&mut self, object: ObjectId, name: Name, value: Value, attributes: PropertyAttributes) {
        let Some(current) = self.js_object(object).map(|o| o.shape) else {
            return;
        };
        if self.shape(current).is_dictionary {
            if let Some(o) = self.js_object_mut(object) {
                o.dictionary.insert(name, DictionaryEntry { value, attributes });
            }
            return;
        }
        let index = self.shape(current).field_count();
        let target = self.transition_target(
            current,
            PropertyDescriptor {
                name,
                kind: PropertyKind::Field(index),
                attributes,
            },
        );
        if let Some(o) = self.js_object_mut(object) {
            o.shape = target;
            o.fields.push(value);
        }
    }

    /// Add a constant-function style property fixed in the shape
    pub fn add_constant(&mut self, object: ObjectId, name: Name, value: Value, attributes: PropertyAttributes) {
        let Some(current) = self.js_object(object).map(|o| o.shape) else {
            return;
        };
        if self.shape(current).is_dictionary {
            self.add_property(object, name, value, attributes);
            return;
        }
        let target = self.transition_target(
            current,
            PropertyDescriptor {
                name,
                kind: PropertyKind::Constant(value),
                attributes,
            },
        );
        if let Some(o) = self.js_object_mut(object) {
            o.shape = target;
        }
    }

    /// Add an accessor pair; either side may be `undefined`
    pub fn add_accessor(&mut self, object: ObjectId, name: Name, getter: Value, setter: Value) {
        let Some(current) = self.js_object(object).map(|o| o.shape) else {
            return;
        };
        let target = self.transition_target(
            current,
            PropertyDescriptor {
                name,
                kind: PropertyKind::Accessor { getter, setter },
                attributes: PropertyAttributes::DONT_ENUM,
            },
        );
        if let Some(o) = self.js_object_mut(object) {
            o.shape = target;
        }
    }

    fn convert_constant_to_field(&mut self, object: ObjectId, name: Name, value: Value) {
        let Some(current) = self.js_object(object).map(|o| o.shape) else {
            return;
        };
        let index = self.shape(current).field_count();
        let target = self.derive_shape(current);
        for descriptor in &mut self.shape_mut(target).descriptors {
            if descriptor.name == name {
                descriptor.kind = PropertyKind::Field(index);
            }
        }
        if let Some(o) = self.js_object_mut(object) {
            o.shape = target;
            o.fields.push(value);
        }
    }

    /// Move `object` to dictionary mode; accessor descriptors stay in the shape
    pub fn normalize_properties(&mut self, object: ObjectId) {
        let Some(current) = self.js_object(object).map(|o| o.shape) else {
            return;
        };
        if self.shape(current).is_dictionary {
            return;
        }
        let descriptors = self.shape(current).descriptors.clone();
        let target = self.derive_shape(current);
        {
            let shape = self.shape_mut(target);
            shape.is_dictionary = true;
            shape
                .descriptors
                .retain(|d| matches!(d.kind, PropertyKind::Accessor { .. }));
        }
        let Some(o) = self.js_object_mut(object) else {
            return;
        };
        for descriptor in descriptors {
            let value = match descriptor.kind {
                PropertyKind::Field(index) => o.fields.get(index).copied().unwrap_or_default(),
                PropertyKind::Constant(value) => value,
                PropertyKind::Normal | PropertyKind::Accessor { .. } => continue,
            };
            o.dictionary.insert(
                descriptor.name,
                DictionaryEntry {
                    value,
                    attributes: descriptor.attributes,
                },
            );
        }
        o.fields.clear();
        o.shape = target;
    }

    /// Delete an own data property; returns false for non-deletable properties
    pub fn delete_property(&mut self, object: ObjectId, name: Name) -> bool {
        let object = self.resolve_global_proxy(object);
        if !self.local_lookup_real_named_property(object, name).is_found() {
            return true;
        }
        self.normalize_properties(object);
        let Some(o) = self.js_object_mut(object) else {
            return false;
        };
        match o.dictionary.get(&name) {
            Some(entry) if entry.attributes.contains(PropertyAttributes::DONT_DELETE) => false,
            _ => {
                o.dictionary.remove(&name);
                true
            }
        }
    }

    // ==================== Globals ====================

    /// Define (or overwrite) a property of the global object
    pub fn set_global(&mut self, name: Name, value: Value, attributes: PropertyAttributes) {
        let global = self.roots().global_object;
        if let Some(o) = self.js_object_mut(global) {
            o.dictionary.insert(name, DictionaryEntry { value, attributes });
        }
    }

    // ==================== Elements ====================

    /// Length of a string or string wrapper
    pub fn string_length(&self, value: Value) -> Option<usize> {
        if let Some(s) = self.string(value) {
            return Some(s.length());
        }
        match self.as_js_object(value)?.1.class {
            ObjectClass::StringWrapper(inner) => self.string(inner).map(|s| s.length()),
            _ => None,
        }
    }

    pub fn array_length(&self, value: Value) -> Option<usize> {
        let (_, object) = self.as_js_object(value)?;
        matches!(object.class, ObjectClass::Array).then_some(object.elements.len())
    }

    /// `receiver[index]`
    pub fn get_element(&mut self, receiver: Value, index: u32) -> Result<Value> {
        let string = match self.as_js_object(receiver).map(|(_, o)| &o.class) {
            Some(ObjectClass::StringWrapper(inner)) => Some(*inner),
            _ if self.is_string(receiver) => Some(receiver),
            _ => None,
        };
        if let Some(string) = string {
            let unit = self
                .string_value(string)
                .and_then(|s| s.encode_utf16().nth(index as usize));
            if let Some(unit) = unit {
                return Ok(self.new_string(String::from_utf16_lossy(&[unit])));
            }
        }

        let mut current = if self.is_js_object(receiver) {
            receiver
        } else {
            self.get_prototype(receiver)
        };
        while let Some((_, object)) = self.as_js_object(current) {
            if let Some(&value) = object.elements.get(index as usize) {
                if !value.is_hole() {
                    return Ok(value);
                }
            }
            current = self.get_prototype(current);
        }
        Ok(Value::Undefined)
    }

    /// `receiver[index] = value`, transitioning the elements kind as needed
    pub fn set_element(&mut self, receiver: Value, index: u32, value: Value, _strict: bool) -> Result<Value> {
        let Some(object) = receiver.as_object().filter(|_| self.is_js_object(receiver)) else {
            return Ok(value);
        };
        let object = self.resolve_global_proxy(object);
        let Some((length, kind)) = self
            .js_object(object)
            .map(|o| (o.elements.len(), self.shape(o.shape).elements_kind))
        else {
            return Ok(value);
        };
        let index = index as usize;
        if index > length + MAX_ELEMENTS_GAP {
            return Err(Error::range_error(
                "invalid_array_length",
                format!("element index {} is too far past the end ({})", index, length),
            ));
        }
        let mut required = kind.union(self.elements_kind_for(value));
        if index > length {
            required = required.to_holey();
        }
        self.transition_elements_kind(object, required);
        if let Some(o) = self.js_object_mut(object) {
            if index < length {
                o.elements[index] = value;
            } else {
                o.elements.resize(index, Value::Hole);
                o.elements.push(value);
            }
        }
        Ok(value)
    }

    /// Move `object` to a more general elements kind; narrowing requests are ignored
    pub fn transition_elements_kind(&mut self, object: ObjectId, kind: ElementsKind) {
        let Some(current) = self.js_object(object).map(|o| o.shape) else {
            return;
        };
        let from = self.shape(current).elements_kind;
        if !from.is_more_general_transition(kind) {
            return;
        }
        let target = self.elements_transition_shape(current, kind);
        if let Some(o) = self.js_object_mut(object) {
            o.shape = target;
        }
    }

    /// Assign an array's `length`
    pub fn set_array_length(&mut self, object: ObjectId, value: Value) -> Result<()> {
        let Some(length) = self.key_as_array_index(value).map(|v| v as usize) else {
            return Err(Error::range_error(
                "invalid_array_length",
                format!("Invalid array length: {}", self.describe(value)),
            ));
        };
        let Some(current) = self.js_object(object).map(|o| o.elements.len()) else {
            return Ok(());
        };
        if length > current + MAX_ELEMENTS_GAP {
            return Err(Error::range_error(
                "invalid_array_length",
                format!("Invalid array length: {}", length),
            ));
        }
        if length > current {
            let holey = self
                .elements_kind_of(Value::Object(object))
                .map(ElementsKind::to_holey)
                .unwrap_or(ElementsKind::Holey);
            self.transition_elements_kind(object, holey);
        }
        if let Some(o) = self.js_object_mut(object) {
            o.elements.resize(length, Value::Hole);
        }
        Ok(())
    }

    // ==================== Calls ====================

    pub fn is_callable(&self, value: Value) -> bool {
        self.is_function(value) || self.function_delegate(value).is_some()
    }

    /// Function to invoke when a non-function object is called
    pub fn function_delegate(&self, value: Value) -> Option<Value> {
        let (_, object) = self.as_js_object(value)?;
        if object.function().is_some() {
            return None;
        }
        object.call_handler.map(Value::Object)
    }

    /// Invoke `callee` with `receiver` and `args`
    pub fn call_function(&mut self, callee: Value, receiver: Value, args: &[Value]) -> Result<Value> {
        if let Some(delegate) = self.function_delegate(callee) {
            return self.call_function(delegate, callee, args);
        }
        let Some(data) = self.function_data(callee) else {
            return Err(Error::type_error(
                messages::CALLED_NON_CALLABLE,
                messages::called_non_callable(&self.describe(callee)),
            ));
        };
        match data.native {
            Some(native) => native(self, receiver, args),
            None => Err(Error::internal(format!(
                "cannot execute interpreted function '{}' in the engine core",
                self.shared(data.shared).name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn getter_returns_seven(_: &mut Heap, _: Value, _: &[Value]) -> Result<Value> {
        Ok(Value::Smi(7))
    }

    fn setter_records_seen(heap: &mut Heap, receiver: Value, args: &[Value]) -> Result<Value> {
        let name = heap.intern("seen");
        heap.set_property(receiver, name, args[0], false)?;
        Ok(Value::Undefined)
    }

    #[test]
    fn test_fields_share_transitions() {
        let mut heap = Heap::new();
        let x = heap.intern("x");
        let a = heap.new_object();
        let b = heap.new_object();
        heap.set_property(Value::Object(a), x, Value::Smi(1), false).unwrap();
        heap.set_property(Value::Object(b), x, Value::Smi(2), false).unwrap();
        assert_eq!(heap.map_of(Value::Object(a)), heap.map_of(Value::Object(b)));
        assert_eq!(heap.get_property(Value::Object(b), x).unwrap(), Value::Smi(2));
    }

    #[test]
    fn test_prototype_chain_lookup() {
        let mut heap = Heap::new();
        let y = heap.intern("y");
        let proto = heap.new_object();
        heap.add_property(proto, y, Value::Smi(9), PropertyAttributes::empty());
        let child = heap.new_object_with_prototype(Value::Object(proto));
        match heap.lookup(Value::Object(child), y) {
            LookupResult::Property { holder, kind, .. } => {
                assert_eq!(holder, proto);
                assert_eq!(kind, PropertyKind::Field(0));
            }
            other => panic!("unexpected lookup result {:?}", other),
        }
        assert_eq!(heap.get_property(Value::Object(child), y).unwrap(), Value::Smi(9));
    }

    #[test]
    fn test_read_only_store() {
        let mut heap = Heap::new();
        let x = heap.intern("x");
        let o = heap.new_object();
        heap.add_property(o, x, Value::Smi(1), PropertyAttributes::READ_ONLY);
        assert!(heap.set_property(Value::Object(o), x, Value::Smi(2), false).is_ok());
        assert_eq!(heap.get_property(Value::Object(o), x).unwrap(), Value::Smi(1));
        let err = heap.set_property(Value::Object(o), x, Value::Smi(2), true).unwrap_err();
        assert_eq!(err.template(), Some(messages::STRICT_READ_ONLY_PROPERTY));
    }

    #[test]
    fn test_accessors() {
        let mut heap = Heap::new();
        let p = heap.intern("p");
        let seen = heap.intern("seen");
        let getter = Value::Object(heap.new_native_function("get p", 0, getter_returns_seven));
        let setter = Value::Object(heap.new_native_function("set p", 1, setter_records_seen));
        let o = heap.new_object();
        heap.add_accessor(o, p, getter, setter);
        assert_eq!(heap.get_property(Value::Object(o), p).unwrap(), Value::Smi(7));
        heap.set_property(Value::Object(o), p, Value::Smi(3), false).unwrap();
        assert_eq!(heap.get_property(Value::Object(o), seen).unwrap(), Value::Smi(3));
    }

    #[test]
    fn test_interceptor_falls_back_to_real_properties() {
        let mut heap = Heap::new();
        let a = heap.intern("a");
        let b = heap.intern("b");
        let o = heap.new_object();
        heap.add_property(o, b, Value::Smi(2), PropertyAttributes::empty());
        heap.set_named_interceptor(o, vec![(a, Value::Smi(1))]);
        assert!(heap.local_lookup(o, b).is_interceptor());
        assert_eq!(heap.get_property(Value::Object(o), a).unwrap(), Value::Smi(1));
        assert_eq!(heap.get_property(Value::Object(o), b).unwrap(), Value::Smi(2));
    }

    #[test]
    fn test_normalize_and_delete() {
        let mut heap = Heap::new();
        let x = heap.intern("x");
        let o = heap.new_object();
        heap.add_property(o, x, Value::Smi(5), PropertyAttributes::empty());
        heap.normalize_properties(o);
        assert!(heap.shape(heap.map_of(Value::Object(o)).unwrap()).is_dictionary);
        assert_eq!(heap.get_property(Value::Object(o), x).unwrap(), Value::Smi(5));
        assert!(heap.delete_property(o, x));
        assert_eq!(heap.get_property(Value::Object(o), x).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_constant_store_converts_to_field() {
        let mut heap = Heap::new();
        let k = heap.intern("k");
        let o = heap.new_object();
        heap.add_constant(o, k, Value::Smi(1), PropertyAttributes::empty());
        heap.set_property(Value::Object(o), k, Value::Smi(2), false).unwrap();
        assert_eq!(heap.get_property(Value::Object(o), k).unwrap(), Value::Smi(2));
        assert!(matches!(
            heap.local_lookup(o, k).kind(),
            Some(PropertyKind::Field(_))
        ));
    }

    #[test]
    fn test_element_store_transitions_kind() {
        let mut heap = Heap::new();
        let array = heap.new_array(vec![Value::Smi(1), Value::Smi(2)]);
        let half = heap.allocate_heap_number(0.5);
        heap.set_element(Value::Object(array), 0, half, false).unwrap();
        assert_eq!(heap.elements_kind_of(Value::Object(array)), Some(ElementsKind::PackedDouble));
        heap.set_element(Value::Object(array), 5, Value::Smi(1), false).unwrap();
        assert_eq!(heap.elements_kind_of(Value::Object(array)), Some(ElementsKind::HoleyDouble));
        assert_eq!(heap.array_length(Value::Object(array)), Some(6));
        assert_eq!(heap.get_element(Value::Object(array), 3).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_string_elements_and_length() {
        let mut heap = Heap::new();
        let s = heap.new_string("hey");
        let e = heap.get_element(s, 1).unwrap();
        assert_eq!(heap.string_value(e), Some("e"));
        let length = heap.roots().length;
        assert_eq!(heap.get_property(s, length).unwrap(), Value::Smi(3));
        let wrapper = heap.new_string_wrapper(s);
        assert_eq!(heap.get_property(Value::Object(wrapper), length).unwrap(), Value::Smi(3));
    }

    #[test]
    fn test_global_proxy_forwards() {
        let mut heap = Heap::new();
        let g = heap.intern("g");
        heap.set_global(g, Value::Smi(4), PropertyAttributes::empty());
        let proxy = Value::Object(heap.roots().global_proxy);
        assert_eq!(heap.get_property(proxy, g).unwrap(), Value::Smi(4));
        heap.set_property(proxy, g, Value::Smi(5), false).unwrap();
        let global = heap.roots().global_object;
        assert_eq!(heap.dictionary_value(global, g), Some(Value::Smi(5)));
    }

    #[test]
    fn test_call_through_delegate() {
        let mut heap = Heap::new();
        let f = heap.new_native_function("seven", 0, getter_returns_seven);
        let callable = heap.new_object();
        heap.set_call_handler(callable, f);
        assert!(heap.is_callable(Value::Object(callable)));
        assert_eq!(
            heap.call_function(Value::Object(callable), Value::Undefined, &[]).unwrap(),
            Value::Smi(7)
        );
        assert!(heap.call_function(Value::Smi(1), Value::Undefined, &[]).is_err());
    }
}
