//! The heap-allocated `Object` and the `Value` handle host code holds.

use std::cell::{Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;

use xc_gc::{GcHeader, GcObject, Heap};

use crate::payload::{payload_compare, payload_equal, Payload};
use crate::types::TypeId;

thread_local! {
    /// The heap backing the single `Runtime` live on this thread. Needed
    /// because `Value::clone`/`drop` can't take an explicit `&Runtime`
    /// parameter (their signatures are fixed by `Clone`/`Drop`) — this is
    /// the Rust-native stand-in for the source's implicit thread-local
    /// `xc_runtime_t*` used by every `XC_*` macro.
    static ACTIVE_HEAP: RefCell<Option<Rc<Heap<Object>>>> = const { RefCell::new(None) };
}

/// Install `heap` as this thread's active heap. Called once by
/// `Runtime::new`/`Runtime::with_config`.
pub(crate) fn set_active_heap(heap: Rc<Heap<Object>>) {
    ACTIVE_HEAP.with(|cell| *cell.borrow_mut() = Some(heap));
}

fn with_active_heap<R>(f: impl FnOnce(&Heap<Object>) -> R) -> R {
    ACTIVE_HEAP.with(|cell| {
        let heap = cell.borrow();
        let heap = heap
            .as_ref()
            .expect("a Value was used without a live Runtime on this thread");
        f(heap)
    })
}

/// Heap object: fixed header plus the tagged payload. `T` in
/// `xc_gc::Heap<T>` for this crate.
pub struct Object {
    header: GcHeader,
    payload: RefCell<Payload>,
}

impl Object {
    pub(crate) fn new(type_id: TypeId, payload: Payload) -> Self {
        Self {
            header: GcHeader::new(type_id, std::mem::size_of::<Object>()),
            payload: RefCell::new(payload),
        }
    }
}

impl GcObject for Object {
    fn header(&self) -> &GcHeader {
        &self.header
    }

    fn trace(&self, mark: &mut dyn FnMut(NonNull<Object>)) {
        self.payload.borrow().trace_children(mark);
    }
}

/// An opaque handle to a heap-allocated `Object`. Cloning increments the
/// header's `ref_count`; dropping the last clone releases it (immediately,
/// if nothing else keeps it alive through the tracing collector).
pub struct Value(NonNull<Object>);

impl Value {
    /// Wrap a pointer just returned by `Heap::allocate`, taking ownership
    /// of its initial `ref_count == 1`.
    pub(crate) fn from_owned(ptr: NonNull<Object>) -> Self {
        Self(ptr)
    }

    pub(crate) fn raw(&self) -> NonNull<Object> {
        self.0
    }

    pub(crate) fn object(&self) -> &Object {
        // SAFETY: a live Value keeps its Object alive via ref_count/roots;
        // the heap never moves an allocated Object.
        unsafe { self.0.as_ref() }
    }

    pub fn type_id(&self) -> TypeId {
        self.object().header.type_id()
    }

    pub(crate) fn payload(&self) -> Ref<'_, Payload> {
        self.object().payload.borrow()
    }

    pub(crate) fn payload_mut(&self) -> RefMut<'_, Payload> {
        self.object().payload.borrow_mut()
    }

    /// Pin this value so the collector never reclaims it.
    pub fn mark_permanent(&self) {
        with_active_heap(|heap| heap.mark_permanent(self.0));
    }

    /// Pointer identity, independent of the type's `equal` hook.
    pub fn is_same(&self, other: &Value) -> bool {
        self.0 == other.0
    }

    /// The boolean payload, if this value is type `boolean`.
    pub fn as_bool(&self) -> Option<bool> {
        self.payload().as_bool()
    }

    /// The numeric payload, if this value is type `number`.
    pub fn as_number(&self) -> Option<f64> {
        self.payload().as_number()
    }

    /// A copy of the string payload, if this value is type `string`.
    pub fn as_string(&self) -> Option<String> {
        self.payload().as_str().map(str::to_owned)
    }
}

/// Reflexive, symmetric structural equality for the primitive payload
/// kinds; composite kinds (array/object/function/exception) fall back to
/// pointer identity, the default for types that never registered one.
pub fn value_equal(a: &Value, b: &Value) -> bool {
    if a.is_same(b) {
        return true;
    }
    if a.type_id() != b.type_id() {
        return false;
    }
    payload_equal(&a.payload(), &b.payload())
}

/// `compare(a,b) == -compare(b,a)` for types that define an order; `None`
/// if the pair (or type) has none.
pub fn value_compare(a: &Value, b: &Value) -> Option<Ordering> {
    if a.type_id() != b.type_id() {
        return None;
    }
    payload_compare(&a.payload(), &b.payload())
}

impl Clone for Value {
    fn clone(&self) -> Self {
        with_active_heap(|heap| heap.add_ref(self.0));
        Self(self.0)
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        with_active_heap(|heap| unsafe { heap.release(self.0) });
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value(type={}, ptr={:p})", self.type_id(), self.0.as_ptr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn clone_increments_and_drop_decrements_ref_count() {
        let rt = Runtime::new();
        let v = rt.number(1.0);
        assert_eq!(v.object().header.ref_count(), 1);
        let v2 = v.clone();
        assert_eq!(v.object().header.ref_count(), 2);
        drop(v2);
        assert_eq!(v.object().header.ref_count(), 1);
    }

    #[test]
    fn numbers_compare_reflexively_even_for_nan() {
        let rt = Runtime::new();
        let nan = rt.number(f64::NAN);
        assert!(value_equal(&nan, &nan));
    }

    #[test]
    fn compare_is_antisymmetric() {
        let rt = Runtime::new();
        let a = rt.number(1.0);
        let b = rt.number(2.0);
        let ab = value_compare(&a, &b).unwrap();
        let ba = value_compare(&b, &a).unwrap();
        assert_eq!(ab, ba.reverse());
    }
}
