//! Type registry: name <-> id mapping, lifecycle records, and the
//! per-type method table.

use rustc_hash::FxHashMap;

use crate::error::RuntimeError;
use crate::value::{Object, Value};
use crate::runtime::Runtime;

/// Numeric type identity, stable within a runtime instance.
pub type TypeId = u16;

/// Core type ids, fixed across every runtime instance.
pub const TYPE_NULL: TypeId = 2;
pub const TYPE_BOOL: TypeId = 3;
pub const TYPE_NUMBER: TypeId = 4;
pub const TYPE_STRING: TypeId = 5;
pub const TYPE_EXCEPTION: TypeId = 6;
pub const TYPE_FUNCTION: TypeId = 7;
pub const TYPE_ARRAY: TypeId = 8;
pub const TYPE_OBJECT: TypeId = 9;
pub const TYPE_VM: TypeId = 10;

const INTERNAL_RANGE: std::ops::RangeInclusive<TypeId> = 32..=63;
const USER_RANGE: std::ops::RangeInclusive<TypeId> = 64..=127;
const EXTENSION_RANGE: std::ops::RangeInclusive<TypeId> = 128..=255;

/// Which fixed range a newly registered (non-core) type draws its id from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// 32-63: engine-internal types not meant for host construction.
    Internal,
    /// 64-127: ordinary host-registered types.
    User,
    /// 128-255: host extension/plugin types.
    Extension,
}

bitflags::bitflags! {
    /// Type classification flags attached to a type record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeFlags: u8 {
        const PRIMITIVE = 0b0001;
        const COMPOSITE = 0b0010;
        const CALLABLE  = 0b0100;
        const INTERNAL  = 0b1000;
    }
}

/// `create(args) -> value` hook. Builtins call `Runtime::alloc_object`
/// directly rather than going through this for the zero-arg core cases;
/// this exists for host-registered types that need custom construction
/// logic invoked by the generic `new(type_id, args)` facade op.
pub type CreateFn = fn(&Runtime, &[Value]) -> Value;
/// `equal(a, b)` hook, used by `dispatch`/builtins needing value equality
/// beyond pointer identity.
pub type EqualFn = fn(&Object, &Object) -> bool;
/// `compare(a, b)` hook; `None` means the type has no total order.
pub type CompareFn = fn(&Object, &Object) -> Option<std::cmp::Ordering>;

/// Function pointer stored in the method table.
pub type NativeMethod = fn(&Runtime, &Value, &[Value]) -> Value;

/// Bundle of per-type behavior hooks. Built-in kinds (`Payload`'s own
/// variants) are marked directly by `Object::trace`'s enum match rather
/// than through `mark` here; only extension types need to supply one
/// through `Value::new_extension`.
#[derive(Clone, Default)]
pub struct Lifecycle {
    pub create: Option<CreateFn>,
    pub equal: Option<EqualFn>,
    pub compare: Option<CompareFn>,
    /// Run exactly once, the first time this type is registered.
    pub initializer: Option<fn(&Runtime)>,
}

struct TypeRecord {
    #[allow(dead_code)]
    id: TypeId,
    name: String,
    flags: TypeFlags,
    lifecycle: Lifecycle,
}

/// Name/id bookkeeping plus the method dispatch table.
///
/// Built as a hash map rather than a linear chain: lookup order across
/// registrations was never a contract worth preserving here.
pub struct TypeRegistry {
    by_name: FxHashMap<String, TypeId>,
    records: FxHashMap<TypeId, TypeRecord>,
    methods: FxHashMap<(TypeId, String), NativeMethod>,
    next_internal: TypeId,
    next_user: TypeId,
    next_extension: TypeId,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            by_name: FxHashMap::default(),
            records: FxHashMap::default(),
            methods: FxHashMap::default(),
            next_internal: *INTERNAL_RANGE.start(),
            next_user: *USER_RANGE.start(),
            next_extension: *EXTENSION_RANGE.start(),
        }
    }

    fn core_id_for(name: &str) -> Option<TypeId> {
        Some(match name {
            "null" => TYPE_NULL,
            "boolean" => TYPE_BOOL,
            "number" => TYPE_NUMBER,
            "string" => TYPE_STRING,
            "exception" => TYPE_EXCEPTION,
            "function" => TYPE_FUNCTION,
            "array" => TYPE_ARRAY,
            "object" => TYPE_OBJECT,
            "vm" => TYPE_VM,
            _ => return None,
        })
    }

    /// Register a type, assigning an id from the fixed ranges. Idempotent:
    /// re-registering a known name returns the existing id without
    /// touching its stored lifecycle (first registration wins).
    pub fn register_type(
        &mut self,
        rt: &Runtime,
        name: &str,
        category: TypeCategory,
        flags: TypeFlags,
        lifecycle: Lifecycle,
    ) -> Result<TypeId, RuntimeError> {
        if let Some(&id) = self.by_name.get(name) {
            tracing::debug!(name, id, "register_type: already registered, first wins");
            return Ok(id);
        }

        let id = if let Some(core_id) = Self::core_id_for(name) {
            core_id
        } else {
            self.next_id(category)?
        };

        self.by_name.insert(name.to_string(), id);
        if let Some(init) = lifecycle.initializer {
            init(rt);
        }
        self.records.insert(
            id,
            TypeRecord {
                id,
                name: name.to_string(),
                flags,
                lifecycle,
            },
        );
        tracing::debug!(name, id, ?category, "register_type");
        Ok(id)
    }

    fn next_id(&mut self, category: TypeCategory) -> Result<TypeId, RuntimeError> {
        let (cursor, range) = match category {
            TypeCategory::Internal => (&mut self.next_internal, INTERNAL_RANGE),
            TypeCategory::User => (&mut self.next_user, USER_RANGE),
            TypeCategory::Extension => (&mut self.next_extension, EXTENSION_RANGE),
        };
        if !range.contains(cursor) {
            return Err(RuntimeError::TypeRangeExhausted { category });
        }
        let id = *cursor;
        *cursor += 1;
        Ok(id)
    }

    pub fn get_type_id(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn type_name(&self, id: TypeId) -> Option<&str> {
        self.records.get(&id).map(|r| r.name.as_str())
    }

    pub fn flags(&self, id: TypeId) -> Option<TypeFlags> {
        self.records.get(&id).map(|r| r.flags)
    }

    pub fn lifecycle(&self, id: TypeId) -> Option<&Lifecycle> {
        self.records.get(&id).map(|r| &r.lifecycle)
    }

    /// A flat map is observably identical to a prepend chain for lookup
    /// purposes ("last registration wins"); logs when a registration
    /// shadows an existing one, since shadowing should be intentional.
    pub fn register_method(&mut self, type_id: TypeId, name: &str, method: NativeMethod) {
        let key = (type_id, name.to_string());
        if self.methods.contains_key(&key) {
            tracing::debug!(type_id, name, "register_method: shadowing prior registration");
        }
        self.methods.insert(key, method);
    }

    pub fn find_method(&self, type_id: TypeId, name: &str) -> Option<NativeMethod> {
        self.methods.get(&(type_id, name.to_string())).copied()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
