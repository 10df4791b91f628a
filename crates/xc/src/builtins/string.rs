use crate::runtime::Runtime;
use crate::types::TYPE_STRING;
use crate::value::Value;

fn to_string(_rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    receiver.clone()
}

fn get_length(rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    let len = receiver.payload().as_str().map(|s| s.chars().count()).unwrap_or(0);
    rt.number(len as f64)
}

pub(super) fn register(rt: &Runtime) {
    let mut types = rt.types().borrow_mut();
    types.register_method(TYPE_STRING, "toString", to_string);
    types.register_method(TYPE_STRING, "valueOf", to_string);
    types.register_method(TYPE_STRING, "get_length", get_length);
}
