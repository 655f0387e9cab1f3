use super::info::{sdk_in_range, ShadowInfo, UNBOUNDED_SDK};
use crate::jvm::{
    BinaryName, Error, FieldType, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor,
    RenderDescriptor, UnqualifiedName,
};
use crate::runtime::{Failure, Instance, ObjectRef, Value};
use log::warn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::sync::{Arc, Weak};

/// Code of a shadow method
pub type ShadowFn = Arc<dyn Fn(&Invocation<'_>) -> Result<Value, Failure> + Send + Sync>;

/// Everything a shadow method gets to see when it runs
pub struct Invocation<'a> {
    /// Real object the method was called on (`None` for static methods)
    pub this: Option<&'a ObjectRef>,

    /// Shadow of `this`, if it has one
    pub shadow: Option<&'a ShadowRef>,
    pub arguments: &'a [Value],
}

impl Invocation<'_> {
    /// Argument at `idx` (or `null` if there are not that many arguments)
    pub fn argument(&self, idx: usize) -> Value {
        self.arguments.get(idx).cloned().unwrap_or(Value::Null)
    }
}

/// Method declared on a shadow class
#[derive(Clone)]
pub struct ShadowMethod {
    pub name: UnqualifiedName,
    pub parameters: Vec<FieldType<BinaryName>>,
    pub access_flags: MethodAccessFlags,

    /// Version range declared on the method (`None` if the method carries no version metadata)
    pub sdk_range: Option<(i32, i32)>,
    pub body: ShadowFn,
}

impl ShadowMethod {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn matches(&self, name: &UnqualifiedName, parameters: &[FieldType<BinaryName>]) -> bool {
        self.name == *name && self.parameters == parameters
    }

    /// Only public or protected methods whose version range includes `api_level` substitute
    /// real methods
    fn is_eligible(&self, api_level: i32, owner: &BinaryName) -> bool {
        if !self
            .access_flags
            .intersects(MethodAccessFlags::PUBLIC | MethodAccessFlags::PROTECTED)
        {
            return false;
        }
        match self.sdk_range {
            Some((min_sdk, max_sdk)) => sdk_in_range(api_level, min_sdk, max_sdk),
            None => {
                warn!("No version metadata on {}.{}", owner, self.signature());
                true
            }
        }
    }

    pub fn invoke(&self, invocation: &Invocation<'_>) -> Result<Value, Failure> {
        (self.body)(invocation)
    }

    /// Name and parameter types (eg. `setTime(J)`)
    pub fn signature(&self) -> String {
        let mut signature = String::from(self.name.as_str());
        signature.push('(');
        for parameter in &self.parameters {
            parameter.render_to(&mut signature);
        }
        signature.push(')');
        signature
    }
}

impl fmt::Debug for ShadowMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowMethod")
            .field("signature", &self.signature())
            .field("access_flags", &self.access_flags)
            .field("sdk_range", &self.sdk_range)
            .finish()
    }
}

/// Field of a shadow into which the real object is injected
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealObjectField {
    pub name: String,
    pub is_static: bool,
}

/// Externally authored replacement logic for some methods of a real class
#[derive(Debug)]
pub struct ShadowClass {
    name: BinaryName,

    /// Which real class this shadows (`None` for plain base classes of shadows)
    implements: Option<ShadowInfo>,
    super_class: Option<Arc<ShadowClass>>,
    has_default_constructor: bool,
    real_object_fields: Vec<RealObjectField>,
    methods: Vec<ShadowMethod>,
}

impl ShadowClass {
    /// Start describing a shadow class (names are dotted, like `org.example.ShadowClock`)
    pub fn builder(name: impl Into<String>) -> ShadowClassBuilder {
        ShadowClassBuilder {
            name: name.into(),
            implements: None,
            call_through_by_default: true,
            loose_signatures: false,
            sdk_range: (UNBOUNDED_SDK, UNBOUNDED_SDK),
            super_class: None,
            has_default_constructor: true,
            real_object_fields: vec![],
            methods: vec![],
        }
    }

    pub fn name(&self) -> &BinaryName {
        &self.name
    }

    pub fn info(&self) -> Option<&ShadowInfo> {
        self.implements.as_ref()
    }

    pub fn super_class(&self) -> Option<&Arc<ShadowClass>> {
        self.super_class.as_ref()
    }

    pub fn has_default_constructor(&self) -> bool {
        self.has_default_constructor
    }

    /// This class, followed by its super classes
    pub fn chain(&self) -> impl Iterator<Item = &ShadowClass> {
        iter::successors(Some(self), |class| class.super_class.as_deref())
    }

    pub fn is_subclass_of(&self, other: &BinaryName) -> bool {
        self.chain().any(|class| class.name == *other)
    }

    /// Real object fields declared on this class and its super classes
    pub fn real_object_fields(&self) -> impl Iterator<Item = (&BinaryName, &RealObjectField)> {
        self.chain().flat_map(|class| {
            class
                .real_object_fields
                .iter()
                .map(move |field| (&class.name, field))
        })
    }

    pub fn declared_methods(&self) -> &[ShadowMethod] {
        &self.methods
    }

    /// Method declared directly on this class which may substitute a real method at `api_level`
    pub fn declared_method(
        &self,
        name: &UnqualifiedName,
        parameters: &[FieldType<BinaryName>],
        api_level: i32,
    ) -> Option<&ShadowMethod> {
        self.methods
            .iter()
            .find(|method| method.matches(name, parameters))
            .filter(|method| method.is_eligible(api_level, &self.name))
    }
}

/// Builder for [`ShadowClass`]
pub struct ShadowClassBuilder {
    name: String,
    implements: Option<String>,
    call_through_by_default: bool,
    loose_signatures: bool,
    sdk_range: (i32, i32),
    super_class: Option<Arc<ShadowClass>>,
    has_default_constructor: bool,
    real_object_fields: Vec<RealObjectField>,
    methods: Vec<PendingMethod>,
}

struct PendingMethod {
    signature: String,
    access_flags: MethodAccessFlags,
    sdk_range: Option<(i32, i32)>,
    body: ShadowFn,
}

impl ShadowClassBuilder {
    /// Real class (dotted name) that this shadows
    pub fn implements(mut self, real_class: impl Into<String>) -> Self {
        self.implements = Some(real_class.into());
        self
    }

    pub fn call_through_by_default(mut self, call_through: bool) -> Self {
        self.call_through_by_default = call_through;
        self
    }

    pub fn loose_signatures(mut self, loose_signatures: bool) -> Self {
        self.loose_signatures = loose_signatures;
        self
    }

    pub fn sdk_range(mut self, min_sdk: i32, max_sdk: i32) -> Self {
        self.sdk_range = (min_sdk, max_sdk);
        self
    }

    pub fn extends(mut self, super_class: Arc<ShadowClass>) -> Self {
        self.super_class = Some(super_class);
        self
    }

    /// Shadow has no zero-argument constructor, so it can't be instantiated
    pub fn without_default_constructor(mut self) -> Self {
        self.has_default_constructor = false;
        self
    }

    pub fn real_object(mut self, field: impl Into<String>) -> Self {
        self.real_object_fields.push(RealObjectField {
            name: field.into(),
            is_static: false,
        });
        self
    }

    pub fn static_real_object(mut self, field: impl Into<String>) -> Self {
        self.real_object_fields.push(RealObjectField {
            name: field.into(),
            is_static: true,
        });
        self
    }

    /// Public instance method for every version, given as name and descriptor (eg. `now()J`)
    pub fn implementation<F>(self, signature: &str, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        self.method(
            signature,
            MethodAccessFlags::PUBLIC,
            Some((UNBOUNDED_SDK, UNBOUNDED_SDK)),
            body,
        )
    }

    /// Public static method for every version
    pub fn static_implementation<F>(self, signature: &str, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        self.method(
            signature,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            Some((UNBOUNDED_SDK, UNBOUNDED_SDK)),
            body,
        )
    }

    pub fn method<F>(
        mut self,
        signature: &str,
        access_flags: MethodAccessFlags,
        sdk_range: Option<(i32, i32)>,
        body: F,
    ) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        self.methods.push(PendingMethod {
            signature: String::from(signature),
            access_flags,
            sdk_range,
            body: Arc::new(body),
        });
        self
    }

    pub fn build(self) -> Result<Arc<ShadowClass>, Error> {
        let name = BinaryName::from_dotted(&self.name).map_err(Error::BadName)?;
        let implements = match self.implements {
            Some(real_class) => {
                let real_class = BinaryName::from_dotted(&real_class).map_err(Error::BadName)?;
                let mut info = ShadowInfo::new(real_class, name.clone());
                info.call_through_by_default = self.call_through_by_default;
                info.loose_signatures = self.loose_signatures;
                info.min_sdk = self.sdk_range.0;
                info.max_sdk = self.sdk_range.1;
                Some(info)
            }
            None => None,
        };

        let methods = self
            .methods
            .into_iter()
            .map(|method| -> Result<ShadowMethod, Error> {
                let (name, parameters) = parse_signature(&method.signature)?;
                Ok(ShadowMethod {
                    name,
                    parameters,
                    access_flags: method.access_flags,
                    sdk_range: method.sdk_range,
                    body: method.body,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Arc::new(ShadowClass {
            name,
            implements,
            super_class: self.super_class,
            has_default_constructor: self.has_default_constructor,
            real_object_fields: self.real_object_fields,
            methods,
        }))
    }
}

/// Split `name(descriptor)` into the name and the parameter types
fn parse_signature(
    signature: &str,
) -> Result<(UnqualifiedName, Vec<FieldType<BinaryName>>), Error> {
    let bad_signature = || Error::BadDescriptor(String::from(signature));
    let paren = signature.find('(').ok_or_else(bad_signature)?;
    let name = UnqualifiedName::from_string(String::from(&signature[..paren]))
        .map_err(Error::BadName)?;
    let descriptor: MethodDescriptor<BinaryName> =
        MethodDescriptor::parse(&signature[paren..]).map_err(|_| bad_signature())?;
    Ok((name, descriptor.parameters))
}

/// Instance of a shadow class, paired with one real object
pub struct ShadowInstance {
    class: Arc<ShadowClass>,
    fields: Mutex<HashMap<String, Value>>,

    /// Weak, since the real object owns its shadow
    real_objects: Mutex<HashMap<String, Weak<Instance>>>,
}

pub type ShadowRef = Arc<ShadowInstance>;

impl ShadowInstance {
    pub fn new(class: Arc<ShadowClass>) -> ShadowRef {
        Arc::new(ShadowInstance {
            class,
            fields: Mutex::new(HashMap::new()),
            real_objects: Mutex::new(HashMap::new()),
        })
    }

    pub fn class(&self) -> &Arc<ShadowClass> {
        &self.class
    }

    /// Value of a field (`null` if it was never set)
    pub fn get(&self, field: &str) -> Value {
        self.fields.lock().get(field).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&self, field: &str, value: Value) {
        self.fields.lock().insert(String::from(field), value);
    }

    /// Real object injected into a real object field
    pub fn real_object(&self, field: &str) -> Option<ObjectRef> {
        self.real_objects.lock().get(field).and_then(Weak::upgrade)
    }

    pub(crate) fn inject_real_object(&self, field: &str, object: &ObjectRef) {
        self.real_objects
            .lock()
            .insert(String::from(field), Arc::downgrade(object));
    }
}

impl fmt::Debug for ShadowInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowInstance")
            .field("class", &self.class.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn nothing(_: &Invocation<'_>) -> Result<Value, Failure> {
        Ok(Value::Void)
    }

    #[test]
    fn finds_eligible_methods() {
        let class = ShadowClass::builder("org.example.ShadowClock")
            .implements("org.example.Clock")
            .implementation("now()J", |_| Ok(Value::Long(42)))
            .method("reset()V", MethodAccessFlags::PRIVATE, None, nothing)
            .method("tick(I)V", MethodAccessFlags::PUBLIC, Some((21, 28)), nothing)
            .build()
            .unwrap();

        let now = UnqualifiedName::from_string(String::from("now")).unwrap();
        let reset = UnqualifiedName::from_string(String::from("reset")).unwrap();
        let tick = UnqualifiedName::from_string(String::from("tick")).unwrap();

        assert!(class.declared_method(&now, &[], 30).is_some());
        assert!(class.declared_method(&now, &[FieldType::int()], 30).is_none());
        assert!(class.declared_method(&reset, &[], 30).is_none());
        assert!(class.declared_method(&tick, &[FieldType::int()], 19).is_none());
        assert!(class.declared_method(&tick, &[FieldType::int()], 23).is_some());

        let info = class.info().unwrap();
        assert_eq!(info.real_class.as_str(), "org/example/Clock");
        assert_eq!(info.shadow_class.as_str(), "org/example/ShadowClock");
    }

    #[test]
    fn chains_and_fields() {
        let base = ShadowClass::builder("org.example.ShadowView")
            .implements("org.example.View")
            .real_object("realView")
            .build()
            .unwrap();
        let button = ShadowClass::builder("org.example.ShadowButton")
            .implements("org.example.Button")
            .extends(base)
            .real_object("realButton")
            .build()
            .unwrap();

        let names: Vec<&str> = button.chain().map(|class| class.name().as_str()).collect();
        assert_eq!(names, vec!["org/example/ShadowButton", "org/example/ShadowView"]);

        let fields: Vec<&str> = button
            .real_object_fields()
            .map(|(_, field)| field.name.as_str())
            .collect();
        assert_eq!(fields, vec!["realButton", "realView"]);

        let view = BinaryName::from_dotted("org.example.ShadowView").unwrap();
        assert!(button.is_subclass_of(&view));
    }

    #[test]
    fn bad_signatures() {
        assert!(ShadowClass::builder("org.example.ShadowClock")
            .implementation("now", nothing)
            .build()
            .is_err());
        assert!(ShadowClass::builder("org.example.ShadowClock")
            .implementation("now(Q)V", nothing)
            .build()
            .is_err());
    }
}
