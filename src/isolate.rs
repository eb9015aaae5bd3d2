//! Execution context
//!
//! An [`Isolate`] owns everything one thread of execution mutates: the heap, the
//! stub compiler and megamorphic stub cache, the code space with its builtins, the
//! registry of code being deoptimized and the simulated stack. Every inline cache and
//! every bailout is entered through it.

use crate::config::EngineConfig;
use crate::deopt::{
    BailoutRequest, Builtins, Code, CodeId, CodeSpace, DeoptimizedFrameInfo, Deoptimizer,
    DeoptimizingCodeHandle, DeoptimizingCodeRegistry, FrameDescription, Resumption, SlotRef, Stack,
};
use crate::error::{Error, Result};
use crate::heap::{Heap, Name, ObjectId, ShapeId, Value};
use crate::ic::dispatch::{self, Dispatch, Key};
use crate::ic::{
    self, BinaryOpStub, BinaryOperation, CallSite, CompareOp, CompareStub, ExtraIcState, IcKind, StubCache,
    StubCompiler, ToBooleanTypes, UnaryOpStub, UnaryOperation,
};

/// One isolated execution context
#[derive(Debug)]
pub struct Isolate {
    pub(crate) heap: Heap,
    pub(crate) stubs: StubCompiler,
    pub(crate) stub_cache: StubCache,
    pub(crate) config: EngineConfig,
    pub(crate) code_space: CodeSpace,
    pub(crate) deoptimizing_code: DeoptimizingCodeRegistry,
    pub(crate) builtins: Builtins,
    pub(crate) stack: Stack,
    /// Functions currently running optimized code
    optimized_functions: Vec<ObjectId>,
}

impl Default for Isolate {
    fn default() -> Self {
        Self::new()
    }
}

impl Isolate {
    /// Create an isolate with the default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut code_space = CodeSpace::new();
        let builtins = Builtins::install(&mut code_space);
        Self {
            heap: Heap::new(),
            stubs: StubCompiler::new(),
            stub_cache: StubCache::new(config.stub_cache_capacity),
            config,
            code_space,
            deoptimizing_code: DeoptimizingCodeRegistry::new(),
            builtins,
            stack: Stack::new(),
            optimized_functions: Vec::new(),
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stub_cache(&self) -> &StubCache {
        &self.stub_cache
    }

    pub fn stubs(&self) -> &StubCompiler {
        &self.stubs
    }

    pub fn code_space(&self) -> &CodeSpace {
        &self.code_space
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn deoptimizing_code(&self) -> &DeoptimizingCodeRegistry {
        &self.deoptimizing_code
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    // ==================== Call sites ====================

    /// A fresh property access or call site of `kind`
    pub fn new_site(&mut self, kind: IcKind, extra: ExtraIcState) -> CallSite {
        CallSite::new(self.stubs.initialize_stub(kind, extra))
    }

    pub fn compare_site(&mut self, op: CompareOp) -> CallSite {
        CallSite::new(self.stubs.shared(CompareStub::uninitialized(op).spec()))
    }

    pub fn unary_op_site(&mut self, op: UnaryOperation) -> CallSite {
        CallSite::new(self.stubs.shared(UnaryOpStub::uninitialized(op).spec()))
    }

    pub fn binary_op_site(&mut self, op: BinaryOperation) -> CallSite {
        CallSite::new(self.stubs.shared(BinaryOpStub::uninitialized(op).spec()))
    }

    pub fn to_boolean_site(&mut self) -> CallSite {
        CallSite::new(self.stubs.shared(ToBooleanTypes::empty().spec()))
    }

    /// Reset `site` to its kind's initial stub
    pub fn clear_site(&mut self, site: &mut CallSite) {
        ic::clear(self, site);
    }

    // ==================== Property access ====================

    /// `receiver.name`
    pub fn load(&mut self, site: &mut CallSite, receiver: Value, name: Name) -> Result<Value> {
        let stub = site.target().clone();
        match dispatch::load(self, &stub, receiver, Key::Named(name))? {
            Dispatch::Hit(value) => Ok(value),
            Dispatch::Miss | Dispatch::MissForceGeneric => ic::resolve_load(self, site, receiver, name),
        }
    }

    /// `receiver.name = value`, evaluating to `value`
    pub fn store(&mut self, site: &mut CallSite, receiver: Value, name: Name, value: Value) -> Result<Value> {
        let stub = site.target().clone();
        match dispatch::store(self, &stub, receiver, Key::Named(name), value)? {
            Dispatch::Hit(result) => Ok(result),
            Dispatch::Miss | Dispatch::MissForceGeneric => ic::resolve_store(self, site, receiver, name, value),
        }
    }

    /// `receiver[key]`
    pub fn keyed_load(&mut self, site: &mut CallSite, receiver: Value, key: Value) -> Result<Value> {
        let stub = site.target().clone();
        match dispatch::load(self, &stub, receiver, Key::Keyed(key))? {
            Dispatch::Hit(value) => Ok(value),
            Dispatch::Miss => ic::resolve_keyed_load(self, site, receiver, key, false),
            Dispatch::MissForceGeneric => ic::resolve_keyed_load(self, site, receiver, key, true),
        }
    }

    /// `receiver[key] = value`, evaluating to `value`
    pub fn keyed_store(&mut self, site: &mut CallSite, receiver: Value, key: Value, value: Value) -> Result<Value> {
        let stub = site.target().clone();
        match dispatch::store(self, &stub, receiver, Key::Keyed(key), value)? {
            Dispatch::Hit(result) => Ok(result),
            Dispatch::Miss => ic::resolve_keyed_store(self, site, receiver, key, value, false),
            Dispatch::MissForceGeneric => ic::resolve_keyed_store(self, site, receiver, key, value, true),
        }
    }

    /// `receiver.name(...args)`
    pub fn call(&mut self, site: &mut CallSite, receiver: Value, name: Name, args: &[Value]) -> Result<Value> {
        let stub = site.target().clone();
        let callee = match dispatch::call(self, &stub, receiver, Key::Named(name), args)? {
            Dispatch::Hit(callee) => callee,
            Dispatch::Miss | Dispatch::MissForceGeneric => ic::resolve_call(self, site, receiver, name, args)?,
        };
        self.heap.call_function(callee, receiver, args)
    }

    /// `receiver[key](...args)`
    pub fn keyed_call(&mut self, site: &mut CallSite, receiver: Value, key: Value, args: &[Value]) -> Result<Value> {
        let stub = site.target().clone();
        let callee = match dispatch::call(self, &stub, receiver, Key::Keyed(key), args)? {
            Dispatch::Hit(callee) => callee,
            Dispatch::Miss | Dispatch::MissForceGeneric => ic::resolve_keyed_call(self, site, receiver, key, args)?,
        };
        self.heap.call_function(callee, receiver, args)
    }

    // ==================== Type feedback ====================

    pub fn compare(&mut self, site: &mut CallSite, x: Value, y: Value) -> Value {
        ic::compare::compare(self, site, x, y)
    }

    pub fn unary_op(&mut self, site: &mut CallSite, operand: Value) -> Value {
        ic::arith::unary_op(self, site, operand)
    }

    pub fn binary_op(&mut self, site: &mut CallSite, x: Value, y: Value) -> Value {
        ic::arith::binary_op(self, site, x, y)
    }

    pub fn to_boolean(&mut self, site: &mut CallSite, value: Value) -> bool {
        ic::arith::to_boolean(self, site, value)
    }

    // ==================== Code ====================

    pub fn add_code(&mut self, code: Code) -> CodeId {
        self.code_space.add(code)
    }

    /// Switch `function` to the optimized `code`.
    ///
    /// Returns false, leaving the function alone, once its optimization has been
    /// disabled.
    pub fn install_optimized_code(&mut self, function: ObjectId, code: CodeId) -> bool {
        let Some(data) = self.heap.function_data(Value::Object(function)) else {
            return false;
        };
        if self.heap.shared(data.shared).optimization_disabled {
            return false;
        }
        self.heap.set_function_code(function, Some(code));
        if !self.optimized_functions.contains(&function) {
            self.optimized_functions.push(function);
        }
        true
    }

    /// Functions currently running optimized code
    pub fn optimized_functions(&self) -> &[ObjectId] {
        &self.optimized_functions
    }

    // ==================== Bailouts ====================

    /// Replace the optimized frame on top of the stack by its unoptimized frames.
    pub fn deoptimize(&mut self, request: BailoutRequest) -> Result<Resumption> {
        let Some(input) = self.stack.top_frame().cloned() else {
            return Err(Error::internal("deoptimization with an empty stack"));
        };
        let mut deoptimizer = Deoptimizer::new(self, request, input);
        deoptimizer.compute_output_frames(self)?;
        deoptimizer.materialize_heap_objects(&mut self.heap);
        let resumption = deoptimizer.into_resumption();
        self.stack.replace_top(resumption.frames.clone());
        Ok(resumption)
    }

    /// Move the interpreted frame of `function` on top of the stack into its optimized
    /// code.
    ///
    /// A value the optimized code cannot take unboxed aborts with [`Error::Osr`] and
    /// leaves the stack as it was.
    pub fn on_stack_replace(&mut self, function: Value) -> Result<Resumption> {
        let Some(input) = self.stack.top_frame().cloned() else {
            return Err(Error::internal("on-stack replacement with an empty stack"));
        };
        let request = BailoutRequest::osr(function, input.pc());
        let mut deoptimizer = Deoptimizer::new(self, request, input);
        deoptimizer.compute_output_frames(self)?;
        let resumption = deoptimizer.into_resumption();
        self.stack.replace_top(resumption.frames.clone());
        Ok(resumption)
    }

    /// Unoptimized view of the `jsframe_index`th JS frame of the optimized frame on
    /// top of the stack
    pub fn debugger_inspectable_frame(&mut self, jsframe_index: usize) -> Result<DeoptimizedFrameInfo> {
        let Some(frame) = self.stack.top_frame().cloned() else {
            return Err(Error::internal("no frame to inspect"));
        };
        Ok(Deoptimizer::debugger_inspectable_frame(self, &frame, jsframe_index))
    }

    /// Arguments of the `inlined_jsframe_index`th function inlined into the optimized
    /// frame on top of the stack
    pub fn inlined_arguments(&mut self, inlined_jsframe_index: usize, formal_parameter_count: usize) -> Result<Vec<Value>> {
        let Some(frame) = self.stack.top_frame() else {
            return Err(Error::internal("no frame to read arguments from"));
        };
        let Some(code) = self.code_space.find_code_for_pc(frame.pc()) else {
            return Err(Error::internal(format!("no code object contains pc {:#x}", frame.pc())));
        };
        let code = self.code_space.get(code);
        let data = code.input_data();
        let Some(bailout_id) = data.entry_for_pc(frame.pc() - code.instruction_start) else {
            return Err(Error::internal(format!("pc {:#x} is not a deoptimization point", frame.pc())));
        };
        let slots = SlotRef::compute_slot_mapping_for_arguments(
            data,
            bailout_id,
            frame,
            inlined_jsframe_index,
            formal_parameter_count,
        );
        Ok(slots.iter().map(|slot| slot.value(&mut self.heap, frame)).collect())
    }

    // ==================== Invalidation ====================

    /// Throw away the optimized code of `function`.
    ///
    /// The function goes back to its unoptimized code; frames still running the
    /// discarded code deoptimize lazily when they return into it, found through the
    /// returned handle's registry entry.
    pub fn deoptimize_function(&mut self, function: Value) -> Option<DeoptimizingCodeHandle> {
        let id = function.as_object()?;
        let data = self.heap.function_data(function)?;
        let code = data.code?;
        if !self.code_space.get(code).is_optimized() {
            return None;
        }
        let shared = data.shared;
        let unoptimized = self.heap.shared(shared).code;
        self.heap.set_function_code(id, unoptimized);
        self.optimized_functions.retain(|f| *f != id);
        self.code_space.get_mut(code).marked_for_deoptimization = true;
        if self.config.trace_deopt {
            tracing::debug!(
                target: "bailout::deopt",
                "[deoptimize marked code in {}: {}]",
                self.heap.shared(shared).name,
                code
            );
        }
        Some(self.deoptimizing_code.insert(code))
    }

    /// Throw away every optimized function's code
    pub fn deoptimize_all(&mut self) -> Vec<DeoptimizingCodeHandle> {
        self.deoptimize_all_with(|_, _| true)
    }

    /// Throw away the optimized code of every function `filter` selects
    pub fn deoptimize_all_with(&mut self, mut filter: impl FnMut(&Heap, Value) -> bool) -> Vec<DeoptimizingCodeHandle> {
        let selected: Vec<Value> = self
            .optimized_functions
            .iter()
            .map(|id| Value::Object(*id))
            .filter(|f| filter(&self.heap, *f))
            .collect();
        selected
            .into_iter()
            .filter_map(|f| self.deoptimize_function(f))
            .collect()
    }

    /// Invalidate everything specialized on `shape`: its stub cache entries and the
    /// optimized code that embedded it.
    pub fn deoptimize_dependents_of_shape(&mut self, shape: ShapeId) -> Vec<DeoptimizingCodeHandle> {
        let evicted = self.stub_cache.evict_shape(shape);
        if self.config.trace_deopt {
            tracing::debug!(
                target: "bailout::deopt",
                "[shape {} invalidated: {} stub cache entries evicted]",
                shape,
                evicted
            );
        }
        let dependents: Vec<Value> = self
            .optimized_functions
            .iter()
            .map(|id| Value::Object(*id))
            .filter(|f| {
                self.heap
                    .function_data(*f)
                    .and_then(|data| data.code)
                    .is_some_and(|code| self.code_space.get(code).dependent_shapes.contains(&shape))
            })
            .collect();
        dependents
            .into_iter()
            .filter_map(|f| self.deoptimize_function(f))
            .collect()
    }

    /// The code behind `handle` is no longer on the stack; drop its registry entry.
    pub fn notify_code_unreachable(&mut self, handle: DeoptimizingCodeHandle) -> bool {
        self.deoptimizing_code.notify_unreachable(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::PropertyAttributes;

    #[test]
    fn test_builtins_are_installed() {
        let isolate = Isolate::new();
        let builtins = *isolate.builtins();
        assert_eq!(isolate.code_space().len(), 9);
        let adaptor = isolate.code_space().get(builtins.arguments_adaptor);
        assert_eq!(adaptor.continuation(), adaptor.instruction_start + 24);
    }

    #[test]
    fn test_load_goes_monomorphic() {
        let mut isolate = Isolate::new();
        let x = isolate.heap_mut().intern("x");
        let object = isolate.heap_mut().new_object();
        isolate
            .heap_mut()
            .add_property(object, x, Value::Smi(7), PropertyAttributes::empty());
        let mut site = isolate.new_site(IcKind::Load, ExtraIcState::default());
        for _ in 0..3 {
            let value = isolate.load(&mut site, Value::Object(object), x).unwrap();
            assert_eq!(value, Value::Smi(7));
        }
        assert_eq!(site.state(), crate::ic::IcState::Monomorphic);
    }

    #[test]
    fn test_deoptimize_with_empty_stack_is_an_error() {
        let mut isolate = Isolate::new();
        let shared = isolate.heap_mut().new_shared_function_info("f", 0, None);
        let f = isolate.heap_mut().new_function(shared);
        let result = isolate.deoptimize(BailoutRequest::eager(Value::Object(f), 0));
        assert!(matches!(result, Err(Error::InternalError(_))));
    }
}
