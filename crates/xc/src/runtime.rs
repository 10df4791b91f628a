//! The embedding handle: heap, type registry, exception/call-stack state,
//! and the value-construction facade.
//!
//! Single-threaded by design: `Runtime` holds an `Rc<Heap<_>>` and several
//! `RefCell`s, so it is `!Send`/`!Sync` without any explicit marker. This
//! runtime's cooperative model has no cross-thread sharing requirement,
//! so the cheaper single-threaded primitives are used throughout.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use xc_gc::{CycleReport, GcConfig, Heap, RootSlot};

use crate::exception::FrameStack;
use crate::payload::{FunctionPayload, Payload, StackFrame};
use crate::types::{
    Lifecycle, NativeMethod, TypeCategory, TypeFlags, TypeId, TypeRegistry, TYPE_ARRAY, TYPE_BOOL,
    TYPE_FUNCTION, TYPE_NULL, TYPE_NUMBER, TYPE_OBJECT, TYPE_STRING,
};
use crate::value::{Object, Value};

/// GC tuning, wired straight through to [`xc_gc::GcConfig`]'s default
/// table.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    pub gc: GcConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gc: GcConfig::default(),
        }
    }
}

/// Handle returned by [`Runtime::add_root`]; pass back to
/// [`Runtime::remove_root`] to unregister.
pub struct RootHandle(u64);

fn alloc_raw(heap: &Heap<Object>, type_id: TypeId, payload: Payload) -> Value {
    let ptr = heap
        .allocate(std::mem::size_of::<Object>(), || Object::new(type_id, payload))
        .expect("bootstrap allocation must fit within max_heap_size");
    Value::from_owned(ptr)
}

pub struct Runtime {
    heap: Rc<Heap<Object>>,
    types: RefCell<TypeRegistry>,
    frames: RefCell<FrameStack>,
    current_error: RefCell<Option<Value>>,
    uncaught_handler: RefCell<Option<Value>>,
    call_stack: RefCell<Vec<String>>,
    roots: RefCell<FxHashMap<u64, (Box<RootSlot<Object>>, NonNull<RootSlot<Object>>)>>,
    next_root_id: Cell<u64>,
    null_value: Value,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let heap = Rc::new(Heap::with_config(config.gc));
        crate::value::set_active_heap(heap.clone());

        let null_value = alloc_raw(&heap, TYPE_NULL, Payload::Null);
        null_value.mark_permanent();

        let rt = Self {
            heap,
            types: RefCell::new(TypeRegistry::new()),
            frames: RefCell::new(FrameStack::new()),
            current_error: RefCell::new(None),
            uncaught_handler: RefCell::new(None),
            call_stack: RefCell::new(Vec::new()),
            roots: RefCell::new(FxHashMap::default()),
            next_root_id: Cell::new(0),
            null_value,
        };
        rt.register_core_types();
        rt
    }

    fn register_core_types(&self) {
        let core = [
            ("null", TypeFlags::PRIMITIVE),
            ("boolean", TypeFlags::PRIMITIVE),
            ("number", TypeFlags::PRIMITIVE),
            ("string", TypeFlags::PRIMITIVE),
            ("array", TypeFlags::COMPOSITE),
            ("object", TypeFlags::COMPOSITE),
            ("function", TypeFlags::CALLABLE),
            ("exception", TypeFlags::COMPOSITE),
            ("vm", TypeFlags::INTERNAL),
        ];
        {
            let mut types = self.types.borrow_mut();
            for (name, flags) in core {
                types
                    .register_type(self, name, TypeCategory::Internal, flags, Lifecycle::default())
                    .expect("core type names never exhaust a registration range");
            }
        }
        crate::builtins::register_all(self);
    }

    pub(crate) fn types(&self) -> &RefCell<TypeRegistry> {
        &self.types
    }

    pub(crate) fn exception_frames(&self) -> &RefCell<FrameStack> {
        &self.frames
    }

    /// The "polling" half of exception reporting: the last exception that
    /// escaped a `try_catch_finally` with nothing left to catch it, or
    /// reached the top level uncaught. Independent of the uncaught-handler
    /// callback: both facilities exist simultaneously, serving different
    /// callers (a synchronous poller vs. a global top-level policy).
    pub fn current_error(&self) -> &RefCell<Option<Value>> {
        &self.current_error
    }

    pub(crate) fn uncaught_handler(&self) -> &RefCell<Option<Value>> {
        &self.uncaught_handler
    }

    pub fn set_uncaught_handler(&self, handler: Option<Value>) {
        *self.uncaught_handler.borrow_mut() = handler;
    }

    pub(crate) fn push_frame(&self, label: String) {
        self.call_stack.borrow_mut().push(label);
    }

    pub(crate) fn pop_frame(&self) {
        self.call_stack.borrow_mut().pop();
    }

    /// Snapshot the logical call stack (innermost first) as captured stack
    /// trace frames. File/line are always `<native>`/0: there is no parser
    /// or source-location plumbing in this runtime to populate them with.
    pub fn capture_stack_trace(&self) -> Vec<StackFrame> {
        self.call_stack
            .borrow()
            .iter()
            .rev()
            .map(|label| StackFrame {
                function: label.clone(),
                file: "<native>".to_string(),
                line: 0,
            })
            .collect()
    }

    pub fn alloc_object(&self, type_id: TypeId, payload: Payload) -> Value {
        alloc_raw(&self.heap, type_id, payload)
    }

    pub fn null(&self) -> Value {
        self.null_value.clone()
    }

    pub fn boolean(&self, b: bool) -> Value {
        self.alloc_object(TYPE_BOOL, Payload::Bool(b))
    }

    pub fn number(&self, n: f64) -> Value {
        self.alloc_object(TYPE_NUMBER, Payload::Number(n))
    }

    pub fn string(&self, s: impl Into<String>) -> Value {
        self.alloc_object(TYPE_STRING, Payload::Str(s.into()))
    }

    pub fn array(&self, items: Vec<Value>) -> Value {
        self.alloc_object(TYPE_ARRAY, Payload::Array(items))
    }

    pub fn object(&self) -> Value {
        self.alloc_object(TYPE_OBJECT, Payload::Object(FxHashMap::default()))
    }

    /// Wrap a registered type method as a bound, first-class function
    /// value (what `dot(obj, method_name)` without a call returns).
    pub(crate) fn bound_function(&self, name: &str, this: Value, method: NativeMethod) -> Value {
        let payload = FunctionPayload {
            name: name.to_string(),
            handler: Rc::new(move |rt: &Runtime, receiver: &Value, args: &[Value]| {
                method(rt, receiver, args)
            }),
            bound_this: Some(this),
            arity: -1,
            closure: None,
        };
        self.alloc_object(TYPE_FUNCTION, Payload::Function(payload))
    }

    /// Construct a function value backed by a Rust closure, for host code
    /// that wants to install callbacks (e.g. an uncaught-exception
    /// handler) without registering a whole type.
    pub fn native_function(
        &self,
        name: &str,
        f: impl Fn(&Runtime, &Value, &[Value]) -> Value + 'static,
    ) -> Value {
        let payload = FunctionPayload {
            name: name.to_string(),
            handler: Rc::new(f),
            bound_this: None,
            arity: -1,
            closure: None,
        };
        self.alloc_object(TYPE_FUNCTION, Payload::Function(payload))
    }

    pub fn call(&self, receiver: &Value, method: &str, args: &[Value]) -> Value {
        crate::dispatch::call(self, receiver, method, args)
    }

    pub fn invoke(&self, function: &Value, args: &[Value]) -> Value {
        crate::dispatch::invoke(self, function, args)
    }

    pub fn dot(&self, obj: &Value, key: &str, value: Option<&Value>) -> Value {
        crate::dispatch::dot(self, obj, key, value)
    }

    /// Force an immediate collection cycle.
    pub fn gc(&self) -> CycleReport {
        xc_gc::collect(&self.heap, &[])
    }

    pub fn gc_stats(&self) -> xc_gc::GcStats {
        self.heap.stats()
    }

    /// Register a slot-style root: unlike a cloned `Value` (whose
    /// ref_count already keeps it alive), this is for host storage that
    /// isn't itself ref-counted. Mirrors `xc_gc`'s `add_root`/`remove_root`
    /// directly.
    pub fn add_root(&self, value: &Value) -> RootHandle {
        let slot: Box<RootSlot<Object>> = Box::new(Cell::new(Some(value.raw())));
        let ptr = NonNull::from(slot.as_ref());
        unsafe { self.heap.add_root(ptr) };
        let id = self.next_root_id.get();
        self.next_root_id.set(id + 1);
        self.roots.borrow_mut().insert(id, (slot, ptr));
        RootHandle(id)
    }

    pub fn remove_root(&self, handle: RootHandle) {
        if let Some((_, ptr)) = self.roots.borrow_mut().remove(&handle.0) {
            self.heap.remove_root(ptr);
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
