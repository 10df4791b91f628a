//! Object allocator and heap-list bookkeeping.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use crate::header::{Color, GcObject};
use crate::heap::{GcConfig, GcStats};

/// A pointer-to-slot root: an indirection so the slot can be updated by
/// a future moving collector without changing the API. Non-moving here,
/// but the indirection is kept for API stability.
pub type RootSlot<T> = Cell<Option<NonNull<T>>>;

/// The heap for a single concrete object type `T`.
///
/// Objects live on exactly one of two intrusive singly-linked lists at any
/// time outside of an active collection cycle: `white` (sweep candidates)
/// and `black` (known-reachable from the last cycle, or never collected).
/// During a cycle, a transient mark stack stands in for the "gray list":
/// gray is a transit state, not a resting one.
pub struct Heap<T: GcObject> {
    white: Cell<Option<NonNull<T>>>,
    black: Cell<Option<NonNull<T>>>,
    roots: RefCell<Vec<NonNull<RootSlot<T>>>>,
    config: GcConfig,
    stats: RefCell<GcStats>,
    allocation_count: Cell<usize>,
    enabled: Cell<bool>,
    /// Adaptive trigger threshold, seeded from `config.gc_threshold` and
    /// then pushed up or down by the back-off/push-harder policy.
    dynamic_threshold: Cell<f64>,
}

impl<T: GcObject> Heap<T> {
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    pub fn with_config(config: GcConfig) -> Self {
        let mut stats = GcStats::default();
        stats.heap_size = config.initial_heap_size;
        let dynamic_threshold = Cell::new(config.gc_threshold);
        Self {
            white: Cell::new(None),
            black: Cell::new(None),
            roots: RefCell::new(Vec::new()),
            config,
            stats: RefCell::new(stats),
            allocation_count: Cell::new(0),
            enabled: Cell::new(true),
            dynamic_threshold,
        }
    }

    pub fn dynamic_threshold(&self) -> f64 {
        self.dynamic_threshold.get()
    }

    pub fn set_dynamic_threshold(&self, threshold: f64) {
        self.dynamic_threshold.set(threshold);
    }

    pub fn set_heap_size(&self, size: usize) {
        self.stats.borrow_mut().heap_size = size;
    }

    pub fn grow_heap_size(&self, factor: f64, cap: usize) {
        let mut stats = self.stats.borrow_mut();
        let grown = ((stats.heap_size as f64) * factor) as usize;
        stats.heap_size = grown.min(cap).max(stats.heap_size);
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn stats(&self) -> GcStats {
        *self.stats.borrow()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Allocations since the last collection cycle.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.get()
    }

    /// Hand out zero-initialized storage for a new object and splice it
    /// into the white list. `build` receives a header already populated per
    /// the allocator contract (size, type, ref_count=1, color=White,
    /// gc_next linked) and must return the fully-constructed `T` embedding
    /// that header — this stands in for the C allocator handing back
    /// zeroed payload bytes for the caller's `create` to fill in.
    ///
    /// Returns `None` ("a null handle") if, after a forced collection, the
    /// heap is still at `max_heap_size`.
    pub fn allocate(&self, size: usize, build: impl FnOnce() -> T) -> Option<NonNull<T>> {
        if !self.would_fit(size) {
            crate::collector::collect(self, &[]);
            if !self.would_fit(size) {
                return None;
            }
        }

        let object = Box::new(build());
        object.header().set_color(Color::White);
        let ptr = NonNull::new(Box::into_raw(object)).expect("Box::into_raw is never null");

        // Prepend to the white list.
        let prev_head = self.white.get();
        unsafe {
            ptr.as_ref()
                .header()
                .set_gc_next_raw(prev_head.map(NonNull::cast));
        }
        self.white.set(Some(ptr));

        let mut stats = self.stats.borrow_mut();
        stats.used_memory += size;
        stats.total_allocated += 1;
        drop(stats);
        self.allocation_count.set(self.allocation_count.get() + 1);

        // Policy-driven trigger: distinct from the hard would-not-fit
        // collect above, this is what actually fires GC during ordinary
        // operation (allocation-count threshold, adaptive usage ratio).
        crate::collector::maybe_collect(self);

        Some(ptr)
    }

    fn would_fit(&self, size: usize) -> bool {
        self.stats.borrow().used_memory + size <= self.config.max_heap_size
    }

    pub fn white_head(&self) -> Option<NonNull<T>> {
        self.white.get()
    }

    pub fn black_head(&self) -> Option<NonNull<T>> {
        self.black.get()
    }

    pub(crate) fn set_white_head(&self, head: Option<NonNull<T>>) {
        self.white.set(head);
    }

    pub(crate) fn set_black_head(&self, head: Option<NonNull<T>>) {
        self.black.set(head);
    }

    pub(crate) fn stats_mut(&self) -> std::cell::RefMut<'_, GcStats> {
        self.stats.borrow_mut()
    }

    pub(crate) fn reset_allocation_count(&self) {
        self.allocation_count.set(0);
    }

    /// Register a root slot: the GC will mark through it on every cycle
    /// until [`Heap::remove_root`] is called with the same pointer.
    ///
    /// # Safety
    /// `slot` must remain valid (the memory it points to must not be freed
    /// or moved) for as long as it stays registered.
    pub unsafe fn add_root(&self, slot: NonNull<RootSlot<T>>) {
        self.roots.borrow_mut().push(slot);
    }

    /// Unregister a previously-added root slot. A no-op if not found.
    pub fn remove_root(&self, slot: NonNull<RootSlot<T>>) {
        self.roots.borrow_mut().retain(|s| *s != slot);
    }

    pub(crate) fn roots(&self) -> std::cell::Ref<'_, Vec<NonNull<RootSlot<T>>>> {
        self.roots.borrow()
    }

    /// Increment an object's reference count (`add_ref`/`retain`).
    pub fn add_ref(&self, obj: NonNull<T>) -> u32 {
        unsafe { obj.as_ref().header().add_ref() }
    }

    /// Decrement an object's reference count; if it reaches zero, destroy
    /// the object immediately and unlink it, out-of-band of a full cycle.
    /// Objects that are `Permanent` are never released this way.
    ///
    /// # Safety
    /// `obj` must be a live pointer previously returned by `allocate`, not
    /// already destroyed.
    pub unsafe fn release(&self, obj: NonNull<T>) {
        let header = obj.as_ref().header();
        if header.color() == Color::Permanent {
            return;
        }
        let remaining = header.dec_ref();
        if remaining == 0 && header.color() != Color::Black {
            self.unlink_and_destroy(obj, header.size());
        } else if remaining == 0 {
            // Reachable from a prior cycle's sweep recoloring (still
            // pointed to by something even though its external ref_count
            // hit zero) — leave it for the tracing collector to decide.
        }
    }

    /// Mark an object permanent: never collected, never recolored again.
    pub fn mark_permanent(&self, obj: NonNull<T>) {
        unsafe { obj.as_ref().header().set_color(Color::Permanent) };
    }

    unsafe fn unlink_and_destroy(&self, target: NonNull<T>, size: usize) {
        // The white/black lists are singly linked; unlinking an arbitrary
        // node requires a linear scan from the owning head. Cheap enough
        // for ref-count releases, which are typically of recently
        // allocated (near-head) acyclic objects.
        if Self::try_unlink(&self.white, target) || Self::try_unlink(&self.black, target) {
            drop(Box::from_raw(target.as_ptr()));
            let mut stats = self.stats.borrow_mut();
            stats.used_memory = stats.used_memory.saturating_sub(size);
            stats.total_freed += 1;
        }
    }

    fn try_unlink(head_cell: &Cell<Option<NonNull<T>>>, target: NonNull<T>) -> bool {
        let mut cursor = head_cell.get();
        let mut prev: Option<NonNull<T>> = None;
        while let Some(node) = cursor {
            let next = unsafe { node.as_ref().header().gc_next_raw() }.map(NonNull::cast);
            if node == target {
                match prev {
                    None => head_cell.set(next),
                    Some(p) => unsafe {
                        p.as_ref().header().set_gc_next_raw(next.map(NonNull::cast))
                    },
                }
                return true;
            }
            prev = Some(node);
            cursor = next;
        }
        false
    }
}

impl<T: GcObject> Default for Heap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::GcHeader;

    struct Leaf {
        header: GcHeader,
    }

    impl Leaf {
        fn new() -> Self {
            Self {
                header: GcHeader::new(1, std::mem::size_of::<Self>()),
            }
        }
    }

    impl GcObject for Leaf {
        fn header(&self) -> &GcHeader {
            &self.header
        }

        fn trace(&self, _mark: &mut dyn FnMut(NonNull<Self>)) {}
    }

    #[test]
    fn allocate_places_object_at_the_white_head() {
        let heap: Heap<Leaf> = Heap::new();
        let size = std::mem::size_of::<Leaf>();
        let a = heap.allocate(size, Leaf::new).unwrap();
        assert_eq!(heap.white_head(), Some(a));
        assert_eq!(heap.stats().used_memory, size);
        assert_eq!(heap.stats().total_allocated, 1);
    }

    #[test]
    fn add_ref_increments_and_release_decrements_to_destruction() {
        let heap: Heap<Leaf> = Heap::new();
        let size = std::mem::size_of::<Leaf>();
        let a = heap.allocate(size, Leaf::new).unwrap();
        assert_eq!(heap.add_ref(a), 2);
        unsafe { heap.release(a) };
        assert_eq!(heap.stats().used_memory, size, "one ref remains");
        unsafe { heap.release(a) };
        assert_eq!(heap.stats().used_memory, 0, "last ref freed it");
    }

    #[test]
    fn permanent_objects_ignore_release() {
        let heap: Heap<Leaf> = Heap::new();
        let size = std::mem::size_of::<Leaf>();
        let a = heap.allocate(size, Leaf::new).unwrap();
        heap.mark_permanent(a);
        unsafe { heap.release(a) };
        assert_eq!(heap.stats().used_memory, size, "permanent objects never free");
    }

    #[test]
    fn root_registration_is_idempotent_to_remove() {
        let heap: Heap<Leaf> = Heap::new();
        let size = std::mem::size_of::<Leaf>();
        let a = heap.allocate(size, Leaf::new).unwrap();
        let slot: RootSlot<Leaf> = Cell::new(Some(a));
        let root_ptr = NonNull::from(&slot);
        unsafe { heap.add_root(root_ptr) };
        assert_eq!(heap.roots().len(), 1);
        heap.remove_root(root_ptr);
        assert_eq!(heap.roots().len(), 0);
        heap.remove_root(root_ptr);
        assert_eq!(heap.roots().len(), 0);
    }

    #[test]
    fn allocate_beyond_max_heap_size_returns_none() {
        let config = GcConfig {
            max_heap_size: 4,
            ..GcConfig::default()
        };
        let heap: Heap<Leaf> = Heap::with_config(config);
        let size = std::mem::size_of::<Leaf>();
        assert!(size > 4);
        assert!(heap.allocate(size, Leaf::new).is_none());
    }
}
