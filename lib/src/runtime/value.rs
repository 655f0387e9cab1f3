use crate::jvm::{BaseType, BinaryName, FieldType};
use crate::shadow::ShadowRef;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Value passing through the dispatcher (an argument, a field, or a return value)
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Result of a `void` method
    Void,
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Arc<str>),
    Object(ObjectRef),
}

impl Value {
    /// Zero value returned by methods that do nothing
    ///
    /// `None` is the `void` return type.
    pub fn default_for(return_type: Option<&FieldType<BinaryName>>) -> Value {
        match return_type {
            None => Value::Void,
            Some(FieldType::Ref(_)) => Value::Null,
            Some(FieldType::Base(base_type)) => match base_type {
                BaseType::Boolean => Value::Boolean(false),
                BaseType::Byte => Value::Byte(0),
                BaseType::Char => Value::Char(0),
                BaseType::Short => Value::Short(0),
                BaseType::Int => Value::Int(0),
                BaseType::Long => Value::Long(0),
                BaseType::Float => Value::Float(0.0),
                BaseType::Double => Value::Double(0.0),
            },
        }
    }

    pub fn string(value: &str) -> Value {
        Value::Str(Arc::from(value))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Value {
        Value::Object(object)
    }
}

/// What the per-instance initializer stored in `__shadow_data__`
#[derive(Clone, Debug)]
pub enum ShadowData {
    /// The class has no shadow at the current version
    NoShadow,
    Shadow(ShadowRef),
}

impl ShadowData {
    pub fn shadow(&self) -> Option<&ShadowRef> {
        match self {
            ShadowData::NoShadow => None,
            ShadowData::Shadow(shadow) => Some(shadow),
        }
    }
}

/// Instance of an instrumented class
///
/// Equality is identity, like references on the JVM.
pub struct Instance {
    class_name: BinaryName,

    /// Set once, by the per-instance initializer
    shadow_data: OnceLock<ShadowData>,
    fields: Mutex<HashMap<String, Value>>,
}

pub type ObjectRef = Arc<Instance>;

impl Instance {
    pub fn new(class_name: BinaryName) -> ObjectRef {
        Arc::new(Instance {
            class_name,
            shadow_data: OnceLock::new(),
            fields: Mutex::new(HashMap::new()),
        })
    }

    pub fn class_name(&self) -> &BinaryName {
        &self.class_name
    }

    /// Shadow data, if the per-instance initializer has run
    pub fn shadow_data(&self) -> Option<&ShadowData> {
        self.shadow_data.get()
    }

    pub fn shadow(&self) -> Option<&ShadowRef> {
        self.shadow_data().and_then(ShadowData::shadow)
    }

    /// Store the shadow data, unless some was already stored (the first value wins)
    pub(crate) fn init_shadow_data(&self, init: impl FnOnce() -> ShadowData) -> &ShadowData {
        self.shadow_data.get_or_init(init)
    }

    pub fn get_field(&self, name: &str) -> Value {
        self.fields.lock().get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.lock().insert(String::from(name), value);
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Instance) -> bool {
        std::ptr::eq(self, other)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.class_name, self)
    }
}
