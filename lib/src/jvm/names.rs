use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, in internal form (`java/lang/Object`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data:
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    /// Prefix the name with a string (eg. when producing reserved names)
    pub fn prefixed(&self, prefix: &str) -> UnqualifiedName {
        UnqualifiedName(Cow::Owned(format!("{}{}", prefix, self.as_str())))
    }

    /// Is this one of the two names allowed to contain angle brackets?
    pub fn is_special(&self) -> bool {
        *self == Self::INIT || *self == Self::CLINIT
    }

    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    // JDK names
    pub const EQUALS: Self = Self::name("equals");
    pub const HASHCODE: Self = Self::name("hashCode");
    pub const TOSTRING: Self = Self::name("toString");
    pub const VALUEOF: Self = Self::name("valueOf");
    pub const BOOLEANVALUE: Self = Self::name("booleanValue");
    pub const BYTEVALUE: Self = Self::name("byteValue");
    pub const CHARVALUE: Self = Self::name("charValue");
    pub const SHORTVALUE: Self = Self::name("shortValue");
    pub const INTVALUE: Self = Self::name("intValue");
    pub const LONGVALUE: Self = Self::name("longValue");
    pub const FLOATVALUE: Self = Self::name("floatValue");
    pub const DOUBLEVALUE: Self = Self::name("doubleValue");

    // Names we generate
    pub const CONSTRUCTOR: Self = Self::name("__constructor__");
    pub const STATIC_INITIALIZER: Self = Self::name("__staticInitializer__");
    pub const SHADOW_INIT: Self = Self::name("$$shadow$init");
    pub const SHADOW_DATA: Self = Self::name("__shadow_data__");
    pub const GET_SHADOW_DATA: Self = Self::name("$$shadow$getData");

    // Runtime hooks called from generated code
    pub const CLASS_INITIALIZING: Self = Self::name("classInitializing");
    pub const INITIALIZING: Self = Self::name("initializing");
    pub const METHOD_INVOKED: Self = Self::name("methodInvoked");
    pub const CLEAN_STACK_TRACE: Self = Self::name("cleanStackTrace");
    pub const INTERCEPT: Self = Self::name("intercept");
    pub const RUN: Self = Self::name("run");
}

impl BinaryName {
    /// Last segment of the name (`Clock` for `org/example/Clock`)
    pub fn simple_name(&self) -> &str {
        let name = self.as_str();
        match name.rfind('/') {
            Some(idx) => &name[idx + 1..],
            None => name,
        }
    }

    /// Package segments of the name, in internal form (`org/example` for `org/example/Clock`)
    pub fn package(&self) -> &str {
        let name = self.as_str();
        match name.rfind('/') {
            Some(idx) => &name[..idx],
            None => "",
        }
    }

    /// Name in the dotted form used by reflection and stack traces
    pub fn to_dotted(&self) -> String {
        self.as_str().replace('/', ".")
    }

    /// Parse a dotted name (`org.example.Clock`) into internal form
    pub fn from_dotted(name: &str) -> Result<BinaryName, String> {
        BinaryName::from_string(name.replace('.', "/"))
    }

    /// Resource path of the class file (`org/example/Clock.class`)
    pub fn resource_name(&self) -> String {
        format!("{}.class", self.as_str())
    }

    /// Class name mangled into something that can be embedded in a method name
    pub fn mangled(&self) -> String {
        self.as_str().replace(['/', '$'], "_")
    }

    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // JDK names
    pub const BOOLEAN: Self = Self::name("java/lang/Boolean");
    pub const BYTE: Self = Self::name("java/lang/Byte");
    pub const CHARACTER: Self = Self::name("java/lang/Character");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const DOUBLE: Self = Self::name("java/lang/Double");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const METHODHANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::name("java/lang/invoke/MethodType");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const SHORT: Self = Self::name("java/lang/Short");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");

    // Support classes that generated code links against
    pub const SHADOW_RUNTIME: Self = Self::name("org/shadowbox/internal/ShadowRuntime");
    pub const PLAN: Self = Self::name("org/shadowbox/internal/Plan");
    pub const SHADOWED_OBJECT: Self = Self::name("org/shadowbox/internal/ShadowedObject");
    pub const DO_NOT_MOCK: Self = Self::name("org/shadowbox/annotation/internal/DoNotMock");
    pub const DO_NOT_INSTRUMENT: Self =
        Self::name("org/shadowbox/annotation/internal/DoNotInstrument");
    pub const INSTRUMENT: Self = Self::name("org/shadowbox/annotation/internal/Instrument");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn name_validity() {
        assert!(BinaryName::from_string(String::from("org/example/Clock")).is_ok());
        assert!(BinaryName::from_string(String::from("org/example/")).is_err());
        assert!(BinaryName::from_string(String::from("org.example.Clock")).is_err());
        assert!(UnqualifiedName::from_string(String::from("now")).is_ok());
        assert!(UnqualifiedName::from_string(String::from("a/b")).is_err());
    }

    #[test]
    fn name_segments() {
        let name = BinaryName::from_string(String::from("org/example/Clock$Tick")).unwrap();
        assert_eq!(name.simple_name(), "Clock$Tick");
        assert_eq!(name.package(), "org/example");
        assert_eq!(name.to_dotted(), "org.example.Clock$Tick");
        assert_eq!(name.mangled(), "org_example_Clock_Tick");
        assert_eq!(name.resource_name(), "org/example/Clock$Tick.class");
        assert_eq!(BinaryName::from_dotted("org.example.Clock$Tick").unwrap(), name);
    }
}
