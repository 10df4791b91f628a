use crate::runtime::Runtime;
use crate::types::TYPE_OBJECT;
use crate::value::Value;

fn to_string(rt: &Runtime, _receiver: &Value, _args: &[Value]) -> Value {
    rt.string("[object Object]")
}

pub(super) fn register(rt: &Runtime) {
    rt.types().borrow_mut().register_method(TYPE_OBJECT, "toString", to_string);
}
