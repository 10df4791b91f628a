use crate::runtime::Runtime;
use crate::types::TYPE_BOOL;
use crate::value::Value;

fn to_string(rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    let b = receiver.payload().as_bool().unwrap_or(false);
    rt.string(if b { "true" } else { "false" })
}

fn value_of(_rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    receiver.clone()
}

pub(super) fn register(rt: &Runtime) {
    let mut types = rt.types().borrow_mut();
    types.register_method(TYPE_BOOL, "toString", to_string);
    types.register_method(TYPE_BOOL, "valueOf", value_of);
}
