//! Exceptions, stack traces, and the try/catch/finally contract.
//!
//! Every `try_catch_finally` call opens its own `std::panic::catch_unwind`
//! boundary; `throw` panics with a private payload, and the nearest
//! enclosing `try_catch_finally` catches it, playing the role a nearest
//! live `jmp_buf` would in a `setjmp`/`longjmp` design. `Frame` only
//! tracks the bookkeeping `catch_unwind` itself doesn't: the rethrow-loop
//! guard and the id used to label frames in traces.

use std::cell::Cell;

use crate::dispatch;
use crate::payload::{ExceptionKind, ExceptionPayload, Payload, StackFrame};
use crate::runtime::Runtime;
use crate::types::TYPE_EXCEPTION;
use crate::value::Value;

struct Frame {
    #[allow(dead_code)]
    id: u64,
    /// Pointer identity of the object already caught at this frame, so a
    /// `throw` of the exact same object from within its own catch/finally
    /// is refused rather than re-entering the same handler forever.
    caught: Cell<Option<std::ptr::NonNull<crate::value::Object>>>,
}

pub(crate) struct FrameStack {
    frames: Vec<Frame>,
    next_id: u64,
}

impl FrameStack {
    pub(crate) fn new() -> Self {
        Self {
            frames: Vec::new(),
            next_id: 0,
        }
    }
}

impl Default for FrameStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload carried across a `panic_any`/`catch_unwind` round trip.
///
/// `Value` is intentionally `!Send` (it relies on a thread-local heap and
/// a non-atomic ref count) but `catch_unwind`'s `Err` requires `Send`.
struct XcPanic(Value);

// SAFETY: an `XcPanic` is created by `throw` and consumed by the nearest
// enclosing `try_catch_finally` on the *same* thread during the same
// unwind; it is never observed from, or sent to, another thread despite
// the `Send` bound `catch_unwind`'s signature imposes.
unsafe impl Send for XcPanic {}

fn is_exception(v: &Value) -> bool {
    v.type_id() == TYPE_EXCEPTION
}

fn extract_panic(payload: Box<dyn std::any::Any + Send>) -> Value {
    match payload.downcast::<XcPanic>() {
        Ok(boxed) => boxed.0,
        Err(original) => std::panic::resume_unwind(original),
    }
}

/// Construct an exception object, capturing the current logical call
/// stack at construction time rather than at throw time.
pub fn new_exception(rt: &Runtime, kind: ExceptionKind, message: impl Into<String>) -> Value {
    let stack_trace = rt.capture_stack_trace();
    let payload = ExceptionPayload {
        kind,
        message: message.into(),
        stack_trace,
        cause: None,
    };
    rt.alloc_object(TYPE_EXCEPTION, Payload::Exception(payload))
}

pub fn error(rt: &Runtime, message: impl Into<String>) -> Value {
    new_exception(rt, ExceptionKind::Error, message)
}

pub fn syntax_error(rt: &Runtime, message: impl Into<String>) -> Value {
    new_exception(rt, ExceptionKind::SyntaxError, message)
}

pub fn type_error(rt: &Runtime, message: impl Into<String>) -> Value {
    new_exception(rt, ExceptionKind::TypeError, message)
}

pub fn reference_error(rt: &Runtime, message: impl Into<String>) -> Value {
    new_exception(rt, ExceptionKind::ReferenceError, message)
}

pub fn range_error(rt: &Runtime, message: impl Into<String>) -> Value {
    new_exception(rt, ExceptionKind::RangeError, message)
}

pub fn memory_error(rt: &Runtime, message: impl Into<String>) -> Value {
    new_exception(rt, ExceptionKind::MemoryError, message)
}

pub fn internal_error(rt: &Runtime, message: impl Into<String>) -> Value {
    new_exception(rt, ExceptionKind::InternalError, message)
}

pub fn user_error(rt: &Runtime, name: impl Into<String>, message: impl Into<String>) -> Value {
    new_exception(rt, ExceptionKind::UserError(Some(name.into())), message)
}

/// `throw(error)`: unwind to the nearest enclosing `try_catch_finally`, or
/// to the uncaught-exception path if none is active. Refuses to re-throw
/// the exact object already caught at the current frame (see `Frame`).
pub fn throw(rt: &Runtime, error: Value) {
    throw_impl(rt, error, false)
}

/// Bypasses the rethrow-loop guard. Used internally to re-propagate a
/// still-pending exception out of a `try_catch_finally` whose own frame
/// has already been unlinked.
pub fn throw_with_rethrow(rt: &Runtime, error: Value) {
    throw_impl(rt, error, true)
}

fn throw_impl(rt: &Runtime, error: Value, bypass_loop_check: bool) {
    let frames = rt.exception_frames();
    let refuse = {
        let stack = frames.borrow();
        match stack.frames.last() {
            Some(f) if !bypass_loop_check && f.caught.get() == Some(error.raw()) => true,
            _ => false,
        }
    };
    if refuse {
        tracing::debug!("throw: refused rethrow of identical object into the same frame");
        return;
    }

    let has_frame = !frames.borrow().frames.is_empty();
    if has_frame {
        std::panic::panic_any(XcPanic(error));
    }

    // No enclosing try: this is the top-level uncaught path.
    *rt.current_error().borrow_mut() = Some(error.clone());
    if let Some(handler) = rt.uncaught_handler().borrow().clone() {
        dispatch::invoke(rt, &handler, std::slice::from_ref(&error));
        return;
    }
    print_uncaught(rt, &error);
    std::process::abort();
}

fn print_uncaught(rt: &Runtime, error: &Value) {
    let text = format_exception(rt, error);
    tracing::error!("uncaught exception: {text}");
    eprintln!("uncaught exception: {text}");
}

fn format_exception(rt: &Runtime, error: &Value) -> String {
    let mut out = String::new();
    let mut current = Some(error.clone());
    while let Some(e) = current {
        if !out.is_empty() {
            out.push_str("\ncaused by: ");
        }
        if let Some(payload) = e.payload().as_exception() {
            out.push_str(payload.kind.display_name());
            out.push_str(": ");
            out.push_str(&payload.message);
            for frame in &payload.stack_trace {
                out.push_str(&format!("\n  at {} ({}:{})", frame.function, frame.file, frame.line));
            }
            current = payload.cause.clone();
        } else {
            let rendered = rt.call(&e, "toString", &[]);
            out.push_str(rendered.payload().as_str().unwrap_or("<value>"));
            current = None;
        }
    }
    out
}

/// The try/catch/finally contract:
///
/// 1. Clear the current-error slot, push a fresh frame.
/// 2. Run `try_fn`.
/// 3. On exception, mark it caught at this frame; run `catch_fn` if given.
/// 4. Unlink this frame before running `finally_fn`.
/// 5. Run `finally_fn`. An exception there chains the still-pending prior
///    exception as its cause, but only if the prior was never handled and
///    both are exception-typed.
/// 6. Re-throw whatever is still pending once `finally_fn` completes.
pub fn try_catch_finally(
    rt: &Runtime,
    try_fn: impl FnOnce(&Runtime) -> Value,
    catch_fn: Option<impl FnOnce(&Runtime, &Value) -> Value>,
    finally_fn: Option<impl FnOnce(&Runtime) -> Value>,
) -> Value {
    *rt.current_error().borrow_mut() = None;
    let frame_id = {
        let frames = rt.exception_frames();
        let mut frames = frames.borrow_mut();
        let id = frames.next_id;
        frames.next_id += 1;
        frames.frames.push(Frame {
            id,
            caught: Cell::new(None),
        });
        id
    };
    let _ = frame_id;

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| try_fn(rt)));

    let (mut result, mut pending) = match outcome {
        Ok(value) => (value, None),
        Err(panic_payload) => {
            let caught = extract_panic(panic_payload);
            if let Some(f) = rt.exception_frames().borrow().frames.last() {
                f.caught.set(Some(caught.raw()));
            }
            *rt.current_error().borrow_mut() = Some(caught.clone());
            match catch_fn {
                Some(catch_fn) => {
                    let caught_for_catch = caught.clone();
                    let outcome2 = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        catch_fn(rt, &caught_for_catch)
                    }));
                    match outcome2 {
                        Ok(value) => {
                            *rt.current_error().borrow_mut() = None;
                            (value, None)
                        }
                        Err(panic_payload2) => {
                            let new_error = extract_panic(panic_payload2);
                            (rt.null(), Some(new_error))
                        }
                    }
                }
                None => (rt.null(), Some(caught)),
            }
        }
    };

    // Unlink this frame before finally runs: finally gets its own fresh
    // frame below rather than inheriting the try/catch one.
    rt.exception_frames().borrow_mut().frames.pop();

    if let Some(finally_fn) = finally_fn {
        let prior = pending.take();

        // Run finally in its own fresh frame so a throw from inside it
        // always unwinds into the `catch_unwind` just below, even when
        // this is the outermost try_catch_finally (frame stack otherwise
        // empty after the pop above, which would send it down the
        // uncaught/abort path instead of letting us observe it here).
        {
            let frames = rt.exception_frames();
            let mut frames = frames.borrow_mut();
            let id = frames.next_id;
            frames.next_id += 1;
            frames.frames.push(Frame {
                id,
                caught: Cell::new(None),
            });
        }
        let outcome3 = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| finally_fn(rt)));
        rt.exception_frames().borrow_mut().frames.pop();

        match outcome3 {
            Ok(value) => {
                result = value;
                pending = prior;
            }
            Err(panic_payload3) => {
                let finally_error = extract_panic(panic_payload3);
                if let Some(prior_err) = &prior {
                    if is_exception(prior_err) && is_exception(&finally_error) {
                        dispatch::call(rt, &finally_error, "setCause", std::slice::from_ref(prior_err));
                    }
                }
                pending = Some(finally_error);
            }
        }
    }

    if let Some(final_error) = pending {
        *rt.current_error().borrow_mut() = Some(final_error.clone());
        throw_with_rethrow(rt, final_error);
        unreachable!("throw_with_rethrow only returns normally with no enclosing frame, \
                      and try_catch_finally is itself always called from inside one \
                      when nested, or diverges via abort/handler at the top");
    }

    *rt.current_error().borrow_mut() = None;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TYPE_NULL;

    #[test]
    fn try_without_exception_returns_try_value() {
        let rt = Runtime::new();
        let result = try_catch_finally(
            &rt,
            |rt| rt.number(1.0),
            None::<fn(&Runtime, &Value) -> Value>,
            None::<fn(&Runtime) -> Value>,
        );
        assert_eq!(crate::payload::payload_equal(&result.payload(), &rt.number(1.0).payload()), true);
        assert!(rt.current_error().borrow().is_none());
    }

    #[test]
    fn catch_swallows_the_exception_and_clears_current_error() {
        let rt = Runtime::new();
        let result = try_catch_finally(
            &rt,
            |rt| {
                let e = error(rt, "boom");
                throw(rt, e);
                rt.null()
            },
            Some(|rt: &Runtime, _e: &Value| rt.string("caught")),
            None::<fn(&Runtime) -> Value>,
        );
        assert_eq!(result.payload().as_str(), Some("caught"));
        assert!(rt.current_error().borrow().is_none());
    }

    #[test]
    fn finally_runs_on_success_without_changing_the_result() {
        let rt = Runtime::new();
        let ran = std::cell::Cell::new(false);
        let result = try_catch_finally(
            &rt,
            |rt| rt.number(7.0),
            None::<fn(&Runtime, &Value) -> Value>,
            Some(|rt: &Runtime| {
                ran.set(true);
                rt.null()
            }),
        );
        assert!(ran.get());
        assert_eq!(result.payload().as_number(), Some(7.0));
    }

    #[test]
    fn finally_that_throws_after_a_handled_try_does_not_chain_a_cause() {
        let rt = Runtime::new();
        let result = try_catch_finally(
            &rt,
            |rt| {
                throw(rt, error(rt, "A"));
                rt.null()
            },
            Some(|rt: &Runtime, _e: &Value| rt.string("handled")),
            Some(|rt: &Runtime| -> Value {
                throw(rt, error(rt, "B"));
                rt.null()
            }),
        );
        let _ = result;
        let final_error = rt.current_error().borrow().clone().unwrap();
        let payload = final_error.payload();
        let exc = payload.as_exception().unwrap();
        assert_eq!(exc.message, "B");
        assert!(exc.cause.is_none());
    }

    #[test]
    fn uncaught_exception_without_a_handler_is_recorded_before_abort_path() {
        // We can't exercise the actual abort() here; instead confirm the
        // handled-and-reported current_error bookkeeping via an installed
        // handler, which returns normally instead of aborting.
        let rt = Runtime::new();
        let seen = std::rc::Rc::new(std::cell::RefCell::new(None));
        let seen2 = seen.clone();
        let handler = rt.native_function("handler", move |_rt, _this, args| {
            *seen2.borrow_mut() = Some(args[0].clone());
            args[0].clone()
        });
        rt.set_uncaught_handler(Some(handler));
        throw(&rt, error(&rt, "top level"));
        assert!(seen.borrow().is_some());
        let _ = TYPE_NULL;
    }
}
