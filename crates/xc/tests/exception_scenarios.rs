//! Exception Machine Integration Tests
//!
//! Exercises try/catch/finally end to end through the public `xc` API
//! rather than any internal module.

use xc::{throw, try_catch_finally, type_error, Runtime, Value, TYPE_NULL};

// ============================================================================
// Basic try/catch
// ============================================================================

#[test]
fn basic_try_catch_recovers_and_clears_current_error() {
    let rt = Runtime::new();
    let result = try_catch_finally(
        &rt,
        |rt| {
            let e = type_error(rt, "bad type");
            throw(rt, e);
            rt.null()
        },
        Some(|rt: &Runtime, e: &Value| rt.call(e, "getMessage", &[])),
        None::<fn(&Runtime) -> Value>,
    );

    assert_eq!(result.as_string(), Some("bad type".to_string()));
    assert!(rt.current_error().borrow().is_none());
}

// ============================================================================
// finally on success / on exception
// ============================================================================

#[test]
fn finally_runs_exactly_once_on_a_successful_try() {
    let rt = Runtime::new();
    let calls = std::cell::Cell::new(0);
    let result = try_catch_finally(
        &rt,
        |rt| rt.number(5.0),
        None::<fn(&Runtime, &Value) -> Value>,
        Some(|rt: &Runtime| {
            calls.set(calls.get() + 1);
            rt.null()
        }),
    );
    assert_eq!(calls.get(), 1);
    assert_eq!(result.as_number(), Some(5.0));
}

#[test]
fn finally_runs_exactly_once_when_try_throws_and_nothing_catches() {
    let rt = Runtime::new();
    let calls = std::cell::Cell::new(0);
    let handler = rt.native_function("top", |_rt, _this, args| args[0].clone());
    rt.set_uncaught_handler(Some(handler));

    let _ = try_catch_finally(
        &rt,
        |rt| {
            throw(rt, type_error(rt, "unhandled"));
            rt.null()
        },
        None::<fn(&Runtime, &Value) -> Value>,
        Some(|rt: &Runtime| {
            calls.set(calls.get() + 1);
            rt.null()
        }),
    );
    assert_eq!(calls.get(), 1);
}

// ============================================================================
// finally masking: a finally exception only chains a cause if the prior
// exception was never handled
// ============================================================================

#[test]
fn finally_exception_does_not_chain_a_cause_when_try_was_already_handled() {
    let rt = Runtime::new();
    let _ = try_catch_finally(
        &rt,
        |rt| {
            throw(rt, type_error(rt, "first"));
            rt.null()
        },
        Some(|rt: &Runtime, _e: &Value| rt.string("handled")),
        Some(|rt: &Runtime| -> Value {
            throw(rt, type_error(rt, "second"));
            rt.null()
        }),
    );
    let final_error = rt.current_error().borrow().clone().unwrap();
    assert_eq!(final_error.as_string(), None);
    assert_eq!(rt.call(&final_error, "getMessage", &[]).as_string(), Some("second".to_string()));
    let cause = rt.call(&final_error, "getCause", &[]);
    assert_eq!(cause.type_id(), TYPE_NULL);
}

#[test]
fn finally_exception_chains_the_still_unhandled_prior_as_its_cause() {
    let rt = Runtime::new();
    let _ = try_catch_finally(
        &rt,
        |rt| {
            throw(rt, type_error(rt, "first"));
            rt.null()
        },
        None::<fn(&Runtime, &Value) -> Value>,
        Some(|rt: &Runtime| -> Value {
            throw(rt, type_error(rt, "second"));
            rt.null()
        }),
    );
    let final_error = rt.current_error().borrow().clone().unwrap();
    assert_eq!(rt.call(&final_error, "getMessage", &[]).as_string(), Some("second".to_string()));
    let cause = rt.call(&final_error, "getCause", &[]);
    assert_eq!(rt.call(&cause, "getMessage", &[]).as_string(), Some("first".to_string()));
}

// ============================================================================
// uncaught handler invoked exactly once
// ============================================================================

#[test]
fn uncaught_handler_is_invoked_exactly_once_for_an_unhandled_throw() {
    let rt = Runtime::new();
    let count = std::rc::Rc::new(std::cell::Cell::new(0));
    let count2 = count.clone();
    let handler = rt.native_function("counter", move |_rt, _this, args| {
        count2.set(count2.get() + 1);
        args[0].clone()
    });
    rt.set_uncaught_handler(Some(handler));

    throw(&rt, type_error(&rt, "boom"));
    assert_eq!(count.get(), 1);
}

// ============================================================================
// rethrow-loop prevention: throwing the identical object back into the
// frame that already caught it is refused, not an infinite handler loop
// ============================================================================

#[test]
fn rethrowing_the_identical_object_from_within_its_own_catch_is_refused() {
    let rt = Runtime::new();
    let result = try_catch_finally(
        &rt,
        |rt| {
            throw(rt, type_error(rt, "loopy"));
            rt.null()
        },
        Some(|rt: &Runtime, e: &Value| {
            // Attempting to throw the very value we just caught, from
            // inside the handler that caught it, must not re-enter.
            throw(rt, e.clone());
            rt.string("still returned")
        }),
        None::<fn(&Runtime) -> Value>,
    );
    assert_eq!(result.as_string(), Some("still returned".to_string()));
}

// ============================================================================
// nested try/catch: inner throw is caught by the nearest enclosing frame
// ============================================================================

#[test]
fn nested_try_catch_catches_at_the_nearest_frame() {
    let rt = Runtime::new();
    let outer = try_catch_finally(
        &rt,
        |rt| {
            try_catch_finally(
                rt,
                |rt| {
                    throw(rt, type_error(rt, "inner"));
                    rt.null()
                },
                Some(|rt: &Runtime, e: &Value| rt.call(e, "getMessage", &[])),
                None::<fn(&Runtime) -> Value>,
            )
        },
        Some(|rt: &Runtime, _e: &Value| rt.string("outer should not run")),
        None::<fn(&Runtime) -> Value>,
    );
    assert_eq!(outer.as_string(), Some("inner".to_string()));
}
