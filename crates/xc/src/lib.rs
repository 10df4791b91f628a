//! # xc
//!
//! Embeddable dynamic-value runtime: a JS-shaped `Value` (null, bool,
//! number, string, array, object, function, exception) backed by a
//! tri-color mark-and-sweep collector with a reference-count hybrid
//! (see [`xc_gc`]), method dispatch/property access, and a panic-based
//! try/catch/finally machine.
//!
//! Single-threaded: a [`Runtime`] and the [`Value`]s it produces must stay
//! on the thread that created them and must not outlive it (see
//! `value::ACTIVE_HEAP`).

mod builtins;
mod dispatch;
mod error;
mod exception;
mod payload;
mod runtime;
mod types;
mod value;

pub use dispatch::{call, dot, invoke};
pub use error::RuntimeError;
pub use exception::{
    error as new_error, internal_error, memory_error, new_exception, range_error,
    reference_error, syntax_error, throw, throw_with_rethrow, try_catch_finally, type_error,
    user_error,
};
pub use payload::{ExceptionKind, ExceptionPayload, FunctionPayload, StackFrame};
pub use runtime::{RootHandle, Runtime, RuntimeConfig};
pub use types::{
    CompareFn, CreateFn, EqualFn, Lifecycle, NativeMethod, TypeCategory, TypeFlags, TypeId,
    TypeRegistry, TYPE_ARRAY, TYPE_BOOL, TYPE_EXCEPTION, TYPE_FUNCTION, TYPE_NULL, TYPE_NUMBER,
    TYPE_OBJECT, TYPE_STRING, TYPE_VM,
};
pub use value::{value_compare, value_equal, Value};
