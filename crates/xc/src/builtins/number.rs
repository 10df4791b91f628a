use crate::runtime::Runtime;
use crate::types::TYPE_NUMBER;
use crate::value::Value;

fn to_string(rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    let n = receiver.payload().as_number().unwrap_or(0.0);
    rt.string(format!("{n}"))
}

fn value_of(_rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    receiver.clone()
}

pub(super) fn register(rt: &Runtime) {
    let mut types = rt.types().borrow_mut();
    types.register_method(TYPE_NUMBER, "toString", to_string);
    types.register_method(TYPE_NUMBER, "valueOf", value_of);
}
