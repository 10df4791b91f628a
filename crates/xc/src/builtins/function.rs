use crate::runtime::Runtime;
use crate::types::TYPE_FUNCTION;
use crate::value::Value;

fn to_string(rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    let name = receiver
        .payload()
        .as_function()
        .map(|f| f.name.clone())
        .unwrap_or_default();
    rt.string(format!("[Function: {name}]"))
}

pub(super) fn register(rt: &Runtime) {
    rt.types().borrow_mut().register_method(TYPE_FUNCTION, "toString", to_string);
}
