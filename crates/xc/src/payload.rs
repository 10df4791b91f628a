//! The tagged payload every heap object carries alongside its `GcHeader`.

use std::any::Any;
use std::cmp::Ordering;
use std::ptr::NonNull;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::runtime::Runtime;
use crate::value::{Object, Value};

/// One entry in a captured stack trace: `{function, file, line}`.
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// Exception type tag, plus a stable display-name table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionKind {
    Error,
    SyntaxError,
    TypeError,
    ReferenceError,
    RangeError,
    MemoryError,
    InternalError,
    /// Host-defined error kind. `None` displays as plain `"Error"`;
    /// `Some(name)` lets host code register a custom display name.
    UserError(Option<String>),
}

impl ExceptionKind {
    pub fn display_name(&self) -> &str {
        match self {
            Self::Error => "Error",
            Self::SyntaxError => "SyntaxError",
            Self::TypeError => "TypeError",
            Self::ReferenceError => "ReferenceError",
            Self::RangeError => "RangeError",
            Self::MemoryError => "MemoryError",
            Self::InternalError => "InternalError",
            Self::UserError(Some(name)) => name.as_str(),
            Self::UserError(None) => "Error",
        }
    }
}

/// Exception object payload: type tag, message, captured stack trace,
/// optional cause chain.
#[derive(Debug, Clone)]
pub struct ExceptionPayload {
    pub kind: ExceptionKind,
    pub message: String,
    pub stack_trace: Vec<StackFrame>,
    pub cause: Option<Value>,
}

/// Native handler backing a first-class function value. An `Rc<dyn Fn>`
/// rather than a bare function pointer so host code can close over state
/// (e.g. an installed uncaught-exception handler) the same way the type
/// registry's per-type methods (plain `fn` pointers, which coerce to this
/// automatically) can't.
pub type FunctionHandler = Rc<dyn Fn(&Runtime, &Value, &[Value]) -> Value>;

/// Function object payload: native handler, bound `this`, expected arg
/// count (-1 for variadic), opaque closure.
#[derive(Clone)]
pub struct FunctionPayload {
    pub name: String,
    pub handler: FunctionHandler,
    pub bound_this: Option<Value>,
    pub arity: i32,
    pub closure: Option<Value>,
}

/// Mark hook for a host extension payload, supplied at construction time
/// rather than looked up from the type registry at trace time (avoids
/// needing ambient registry access inside `GcObject::trace`).
pub type ExtensionMarkFn = fn(&dyn Any, &mut dyn FnMut(NonNull<Object>));

/// A host extension payload: opaque data plus an optional tracer.
pub struct ExtensionPayload {
    pub data: Box<dyn Any>,
    pub mark: Option<ExtensionMarkFn>,
}

/// The single sum type every `Object` carries. Discriminated at the type
/// level by `GcHeader::type_id`, not by this enum's own tag, so a host
/// extension type can reuse `Extension` for many distinct registered ids.
pub enum Payload {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Value>),
    Object(FxHashMap<String, Value>),
    Function(FunctionPayload),
    Exception(ExceptionPayload),
    Extension(ExtensionPayload),
}

impl Payload {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object_map(&self) -> Option<&FxHashMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_map_mut(&mut self) -> Option<&mut FxHashMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionPayload> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_exception(&self) -> Option<&ExceptionPayload> {
        match self {
            Self::Exception(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_exception_mut(&mut self) -> Option<&mut ExceptionPayload> {
        match self {
            Self::Exception(e) => Some(e),
            _ => None,
        }
    }

    /// Visit every outgoing `Value` reference this payload holds. Used by
    /// `Object::trace`; kept as a free function on `Payload` rather than
    /// folded into `trace` itself so the dispatch stays readable.
    pub(crate) fn trace_children(&self, mark: &mut dyn FnMut(NonNull<Object>)) {
        match self {
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::Str(_) => {}
            Self::Array(items) => {
                for v in items {
                    mark(v.raw());
                }
            }
            Self::Object(map) => {
                for v in map.values() {
                    mark(v.raw());
                }
            }
            Self::Function(f) => {
                if let Some(this) = &f.bound_this {
                    mark(this.raw());
                }
                if let Some(closure) = &f.closure {
                    mark(closure.raw());
                }
            }
            Self::Exception(e) => {
                if let Some(cause) = &e.cause {
                    mark(cause.raw());
                }
            }
            Self::Extension(ext) => {
                if let Some(tracer) = ext.mark {
                    tracer(ext.data.as_ref(), mark);
                }
            }
        }
    }
}

/// Numeric equality here is bit-exact (`to_bits`) rather than IEEE-754
/// comparison: `equal` must be reflexive, which plain `==` breaks for NaN.
pub fn payload_equal(a: &Payload, b: &Payload) -> bool {
    match (a, b) {
        (Payload::Null, Payload::Null) => true,
        (Payload::Bool(x), Payload::Bool(y)) => x == y,
        (Payload::Number(x), Payload::Number(y)) => x.to_bits() == y.to_bits(),
        (Payload::Str(x), Payload::Str(y)) => x == y,
        _ => false,
    }
}

/// Total order for the primitive payloads that have one. `f64::total_cmp`
/// gives numbers a defined order (including NaN) so that
/// `compare(a,b) == -compare(b,a)` holds unconditionally.
pub fn payload_compare(a: &Payload, b: &Payload) -> Option<Ordering> {
    match (a, b) {
        (Payload::Number(x), Payload::Number(y)) => Some(x.total_cmp(y)),
        (Payload::Str(x), Payload::Str(y)) => Some(x.cmp(y)),
        (Payload::Bool(x), Payload::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
