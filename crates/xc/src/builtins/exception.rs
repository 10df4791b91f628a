use crate::runtime::Runtime;
use crate::types::TYPE_EXCEPTION;
use crate::value::Value;

fn get_message(rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    match receiver.payload().as_exception() {
        Some(e) => rt.string(e.message.clone()),
        None => rt.null(),
    }
}

fn get_cause(rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    match receiver.payload().as_exception().and_then(|e| e.cause.clone()) {
        Some(cause) => cause,
        None => rt.null(),
    }
}

fn set_cause(rt: &Runtime, receiver: &Value, args: &[Value]) -> Value {
    let Some(cause) = args.first() else {
        return rt.null();
    };
    let cause = cause.clone();
    if let Some(e) = receiver.payload_mut().as_exception_mut() {
        e.cause = Some(cause);
    }
    receiver.clone()
}

fn get_stack_trace(rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    let frames = match receiver.payload().as_exception() {
        Some(e) => e.stack_trace.clone(),
        None => return rt.array(Vec::new()),
    };
    let items = frames
        .into_iter()
        .map(|f| rt.string(format!("{} ({}:{})", f.function, f.file, f.line)))
        .collect();
    rt.array(items)
}

fn to_string(rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    match receiver.payload().as_exception() {
        Some(e) => rt.string(format!("{}: {}", e.kind.display_name(), e.message)),
        None => rt.string("Exception"),
    }
}

pub(super) fn register(rt: &Runtime) {
    let mut types = rt.types().borrow_mut();
    types.register_method(TYPE_EXCEPTION, "getMessage", get_message);
    types.register_method(TYPE_EXCEPTION, "getCause", get_cause);
    types.register_method(TYPE_EXCEPTION, "setCause", set_cause);
    types.register_method(TYPE_EXCEPTION, "getStackTrace", get_stack_trace);
    types.register_method(TYPE_EXCEPTION, "toString", to_string);
}
