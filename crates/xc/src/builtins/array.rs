use crate::runtime::Runtime;
use crate::types::TYPE_ARRAY;
use crate::value::Value;

fn get_length(rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    let len = receiver.payload().as_array().map(Vec::len).unwrap_or(0);
    rt.number(len as f64)
}

fn push(rt: &Runtime, receiver: &Value, args: &[Value]) -> Value {
    if let (Some(item), Some(items)) = (args.first(), receiver.payload_mut().as_array_mut()) {
        items.push(item.clone());
    }
    rt.number(receiver.payload().as_array().map(Vec::len).unwrap_or(0) as f64)
}

fn to_string(rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
    let Some(items) = receiver.payload().as_array().cloned() else {
        return rt.string("");
    };
    let parts: Vec<String> = items
        .iter()
        .map(|v| {
            let rendered = rt.call(v, "toString", &[]);
            rendered.payload().as_str().unwrap_or("").to_string()
        })
        .collect();
    rt.string(parts.join(","))
}

pub(super) fn register(rt: &Runtime) {
    let mut types = rt.types().borrow_mut();
    types.register_method(TYPE_ARRAY, "get_length", get_length);
    types.register_method(TYPE_ARRAY, "push", push);
    types.register_method(TYPE_ARRAY, "toString", to_string);
}
