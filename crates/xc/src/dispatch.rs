//! Method dispatch, property access, and function invocation.

use crate::runtime::Runtime;
use crate::types::TYPE_OBJECT;
use crate::value::Value;

/// Pops its runtime's top call-stack frame on drop, including on an
/// unwind from a native method's `throw` — a plain `push`/call/`pop`
/// sequence would leak the frame when the call panics partway through.
struct FramePopGuard<'a>(&'a Runtime);

impl Drop for FramePopGuard<'_> {
    fn drop(&mut self) {
        self.0.pop_frame();
    }
}

/// `call(receiver, method_name, args) -> value`.
///
/// Looks up `(type_of(receiver), method_name)`; pushes a logical
/// `"TypeName.method"` frame for stack-trace capture around the native
/// call. Returns null if no method is registered, the runtime itself
/// never raises a TypeError here, only the caller may choose to.
pub fn call(rt: &Runtime, receiver: &Value, method_name: &str, args: &[Value]) -> Value {
    let type_id = receiver.type_id();
    let method = rt.types().borrow().find_method(type_id, method_name);
    let Some(method) = method else {
        return rt.null();
    };
    let type_name = rt
        .types()
        .borrow()
        .type_name(type_id)
        .unwrap_or("?")
        .to_string();
    rt.push_frame(format!("{type_name}.{method_name}"));
    let _guard = FramePopGuard(rt);
    method(rt, receiver, args)
}

/// `dot(obj, key) -> value` / `dot(obj, key, value) -> value`: the
/// getter/setter precedence chain.
pub fn dot(rt: &Runtime, obj: &Value, key: &str, value: Option<&Value>) -> Value {
    match value {
        Some(new_value) => dot_set(rt, obj, key, new_value),
        None => dot_get(rt, obj, key),
    }
}

fn dot_set(rt: &Runtime, obj: &Value, key: &str, new_value: &Value) -> Value {
    let setter = format!("set_{key}");
    if rt.types().borrow().find_method(obj.type_id(), &setter).is_some() {
        return call(rt, obj, &setter, std::slice::from_ref(new_value));
    }
    if rt.types().borrow().find_method(obj.type_id(), "set").is_some() {
        let key_value = rt.string(key);
        return call(rt, obj, "set", &[key_value, new_value.clone()]);
    }
    if obj.type_id() == TYPE_OBJECT {
        if let Some(map) = obj.payload_mut().as_object_map_mut() {
            map.insert(key.to_string(), new_value.clone());
        }
        return new_value.clone();
    }
    rt.null()
}

fn dot_get(rt: &Runtime, obj: &Value, key: &str) -> Value {
    let getter = format!("get_{key}");
    if rt.types().borrow().find_method(obj.type_id(), &getter).is_some() {
        return call(rt, obj, &getter, &[]);
    }
    if let Some(method) = rt.types().borrow().find_method(obj.type_id(), key) {
        return rt.bound_function(key, obj.clone(), method);
    }
    if rt.types().borrow().find_method(obj.type_id(), "get").is_some() {
        let key_value = rt.string(key);
        return call(rt, obj, "get", &[key_value]);
    }
    if obj.type_id() == TYPE_OBJECT {
        if let Some(map) = obj.payload().as_object_map() {
            if let Some(v) = map.get(key) {
                return v.clone();
            }
        }
    }
    rt.null()
}

/// `invoke(function_value, args) -> value`. Requires a function-typed
/// value; returns null on a type mismatch (the runtime itself never
/// raises, callers may turn this into a TypeError).
pub fn invoke(rt: &Runtime, function: &Value, args: &[Value]) -> Value {
    let Some(handler_info) = function.payload().as_function().map(|f| {
        (
            f.handler.clone(),
            f.bound_this.clone(),
            if f.name.is_empty() {
                "anonymous".to_string()
            } else {
                f.name.clone()
            },
        )
    }) else {
        return rt.null();
    };
    let (handler, bound_this, label) = handler_info;
    let this = bound_this.unwrap_or_else(|| rt.null());
    rt.push_frame(label);
    let _guard = FramePopGuard(rt);
    handler(rt, &this, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Lifecycle, TypeCategory, TypeFlags};

    fn double_it(_rt: &Runtime, receiver: &Value, _args: &[Value]) -> Value {
        receiver.clone()
    }

    #[test]
    fn call_returns_null_when_method_missing() {
        let rt = Runtime::new();
        let v = rt.number(1.0);
        let result = call(&rt, &v, "nope", &[]);
        assert_eq!(result.type_id(), crate::types::TYPE_NULL);
    }

    #[test]
    fn call_invokes_registered_method() {
        let rt = Runtime::new();
        rt.types()
            .borrow_mut()
            .register_type(
                &rt,
                "widget",
                TypeCategory::User,
                TypeFlags::empty(),
                Lifecycle::default(),
            )
            .unwrap();
        let id = rt.types().borrow().get_type_id("widget").unwrap();
        rt.types().borrow_mut().register_method(id, "echo", double_it);
        let v = rt.alloc_object(id, crate::payload::Payload::Null);
        let result = call(&rt, &v, "echo", &[]);
        assert!(result.is_same(&v));
    }

    #[test]
    fn dot_get_and_set_on_plain_object() {
        let rt = Runtime::new();
        let obj = rt.object();
        let n = rt.number(42.0);
        dot(&rt, &obj, "answer", Some(&n));
        let got = dot(&rt, &obj, "answer", None);
        assert!(value_equal_helper(&got, &n));
    }

    fn value_equal_helper(a: &Value, b: &Value) -> bool {
        crate::value::value_equal(a, b)
    }
}
