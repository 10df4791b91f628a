use crate::runtime::Runtime;
use crate::types::TYPE_NULL;
use crate::value::Value;

fn to_string(rt: &Runtime, _receiver: &Value, _args: &[Value]) -> Value {
    rt.string("null")
}

pub(super) fn register(rt: &Runtime) {
    rt.types().borrow_mut().register_method(TYPE_NULL, "toString", to_string);
}
