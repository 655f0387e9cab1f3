//! Which classes get rewritten, which get loaded from the host, and which calls get intercepted
//!
//! Names in a [`Configuration`] are given in the dotted form used by Java source code and
//! reflection (`org.example.Clock`, `org.example.Clock$Tick`). Package rules are plain prefix
//! matches on those names.

use crate::jvm::class_file::{ClassFile, ConstantsPool};
use crate::jvm::model::annotation_types;
use crate::jvm::{remap_descriptor, BinaryName, ClassAccessFlags, Error, Name, UnqualifiedName};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error as ThisError;

/// Wildcard method name matching any method of a class
pub const ANY_METHOD: &str = "*";

/// Resources which are always loaded from local class sources
const RESOURCES_TO_ALWAYS_ACQUIRE: [&str; 1] = ["build.prop"];

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid class name exclusion pattern: {0}")]
    BadRegex(#[from] regex::Error),

    #[error("invalid class name '{0}'")]
    BadClassName(String),
}

/// Method whose call sites get intercepted
///
/// The method name may be [`ANY_METHOD`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodRef {
    /// Dotted class name
    pub class_name: String,
    pub method_name: String,
}

impl MethodRef {
    pub fn new(class_name: impl Into<String>, method_name: impl Into<String>) -> MethodRef {
        MethodRef {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }

    /// Every method of a class
    pub fn any_method(class_name: impl Into<String>) -> MethodRef {
        MethodRef::new(class_name, ANY_METHOD)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.method_name)
    }
}

/// What the configuration needs to know about a class to decide whether to rewrite it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassDetails {
    pub name: BinaryName,
    pub access_flags: ClassAccessFlags,

    /// Types of the annotations on the class
    pub annotations: Vec<BinaryName>,
}

impl ClassDetails {
    /// Read the details from a class file, without decoding any method bodies
    pub fn parse(bytes: &[u8]) -> Result<ClassDetails, Error> {
        let class_file = ClassFile::parse(bytes)?;
        let constants = ConstantsPool::from_constants(class_file.constants);
        Ok(ClassDetails {
            name: constants.binary_name(class_file.this_class)?,
            access_flags: class_file.access_flags,
            annotations: annotation_types(&class_file.attributes, &constants)?,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_annotation(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ANNOTATION)
    }

    pub fn has_annotation(&self, annotation: &BinaryName) -> bool {
        self.annotations.contains(annotation)
    }
}

/// Renames classes according to the class name translations
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeMapper {
    translations: BTreeMap<BinaryName, BinaryName>,
}

impl TypeMapper {
    pub fn new(translations: BTreeMap<BinaryName, BinaryName>) -> TypeMapper {
        TypeMapper { translations }
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }

    /// Replacement name of a class (the class itself when it isn't translated)
    pub fn mapped_type_name(&self, class: &BinaryName) -> BinaryName {
        self.translations
            .get(class)
            .cloned()
            .unwrap_or_else(|| class.clone())
    }

    /// Rename every class mentioned in a field or method descriptor
    pub fn remap_descriptor(&self, descriptor: &str) -> String {
        if self.is_empty() {
            return String::from(descriptor);
        }
        remap_descriptor(descriptor, &|class| self.mapped_type_name(class))
    }
}

/// Immutable set of rules controlling a loading namespace
///
/// Use [`Configuration::builder`] to make one.
#[derive(Clone, Debug)]
pub struct Configuration {
    instrumented_packages: BTreeSet<String>,
    instrumented_classes: BTreeSet<String>,
    classes_to_not_instrument: BTreeSet<String>,
    packages_to_not_instrument: BTreeSet<String>,
    classes_to_not_instrument_regex: Option<Regex>,
    classes_to_not_acquire: BTreeSet<String>,
    packages_to_not_acquire: BTreeSet<String>,
    class_name_translations: BTreeMap<String, String>,
    intercepted_methods: BTreeSet<MethodRef>,

    /// Intercepted methods, with class names in internal form
    methods_to_intercept: BTreeSet<(BinaryName, String)>,
    type_mapper: TypeMapper,
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.instrumented_packages == other.instrumented_packages
            && self.instrumented_classes == other.instrumented_classes
            && self.classes_to_not_instrument == other.classes_to_not_instrument
            && self.packages_to_not_instrument == other.packages_to_not_instrument
            && self.classes_to_not_instrument_regex.as_ref().map(Regex::as_str)
                == other.classes_to_not_instrument_regex.as_ref().map(Regex::as_str)
            && self.classes_to_not_acquire == other.classes_to_not_acquire
            && self.packages_to_not_acquire == other.packages_to_not_acquire
            && self.class_name_translations == other.class_name_translations
            && self.intercepted_methods == other.intercepted_methods
    }
}

impl Eq for Configuration {}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Should the class be rewritten when it is loaded into a namespace?
    pub fn should_transform(&self, class: &ClassDetails) -> bool {
        let name = class.name.to_dotted();
        let excluded_by_kind = class.is_interface()
            || class.is_annotation()
            || class.has_annotation(&BinaryName::DO_NOT_INSTRUMENT);
        let included = starts_with_any(&name, &self.instrumented_packages)
            || self.instrumented_classes.contains(&name)
            || class.has_annotation(&BinaryName::INSTRUMENT);
        let excluded = self.classes_to_not_instrument.contains(&name)
            || starts_with_any(&name, &self.packages_to_not_instrument)
            || self.matches_exclusion_regex(&name);
        !excluded_by_kind && included && !excluded
    }

    fn matches_exclusion_regex(&self, dotted_name: &str) -> bool {
        self.classes_to_not_instrument_regex
            .as_ref()
            .map_or(false, |regex| regex.is_match(dotted_name))
    }

    /// Should the class be loaded (and possibly rewritten) by the namespace itself?
    pub fn should_acquire(&self, class: &BinaryName) -> bool {
        if is_support_class(class) {
            return false;
        }
        let name = class.to_dotted();
        if starts_with_any(&name, &self.packages_to_not_acquire) {
            return false;
        }
        !is_resource_table_class(&name) && !self.classes_to_not_acquire.contains(&name)
    }

    /// Should the class be delegated to the host environment?
    pub fn should_load_from_real_environment(&self, class: &BinaryName) -> bool {
        !self.should_acquire(class)
    }

    /// Should the resource be loaded from local class sources (rather than the host)?
    pub fn should_acquire_resource(&self, name: &str) -> bool {
        RESOURCES_TO_ALWAYS_ACQUIRE.contains(&name)
    }

    /// Should calls to this method be rewritten into calls to an interceptor?
    ///
    /// Constructors are never intercepted, since the call to the super constructor can't be
    /// stripped out.
    pub fn should_intercept(&self, owner: &BinaryName, method: &UnqualifiedName) -> bool {
        if *method == UnqualifiedName::INIT {
            return false;
        }
        let exact = (owner.clone(), String::from(method.as_str()));
        let any = (owner.clone(), String::from(ANY_METHOD));
        self.methods_to_intercept.contains(&exact) || self.methods_to_intercept.contains(&any)
    }

    pub fn intercepted_methods(&self) -> impl Iterator<Item = &MethodRef> {
        self.intercepted_methods.iter()
    }

    /// Dotted class name translations (old name to replacement name)
    pub fn class_name_translations(&self) -> &BTreeMap<String, String> {
        &self.class_name_translations
    }

    pub fn type_mapper(&self) -> &TypeMapper {
        &self.type_mapper
    }

    pub fn mapped_type_name(&self, class: &BinaryName) -> BinaryName {
        self.type_mapper.mapped_type_name(class)
    }

    pub fn remap_descriptor(&self, descriptor: &str) -> String {
        self.type_mapper.remap_descriptor(descriptor)
    }
}

/// Classes that generated code links against, which must be shared with the host
fn is_support_class(class: &BinaryName) -> bool {
    [
        BinaryName::SHADOW_RUNTIME,
        BinaryName::PLAN,
        BinaryName::SHADOWED_OBJECT,
        BinaryName::DO_NOT_MOCK,
        BinaryName::DO_NOT_INSTRUMENT,
        BinaryName::INSTRUMENT,
    ]
    .contains(class)
}

/// Generated `R` classes (and their nested `R$string`, `R$id`, etc.)
fn is_resource_table_class(dotted_name: &str) -> bool {
    let simple = match dotted_name.rfind('.') {
        Some(idx) => &dotted_name[idx + 1..],
        None => return false,
    };
    match simple.strip_prefix('R') {
        Some("") => true,
        Some(nested) => match nested.strip_prefix('$') {
            Some(kind) => !kind.is_empty() && kind.chars().all(|c| c.is_ascii_lowercase()),
            None => false,
        },
        None => false,
    }
}

fn starts_with_any(name: &str, prefixes: &BTreeSet<String>) -> bool {
    prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
}

fn internal_name(dotted: &str) -> Result<BinaryName, ConfigError> {
    BinaryName::from_dotted(dotted).map_err(|_| ConfigError::BadClassName(String::from(dotted)))
}

/// Builder for [`Configuration`]
#[derive(Clone, Debug, Default)]
pub struct ConfigurationBuilder {
    instrumented_packages: BTreeSet<String>,
    instrumented_classes: BTreeSet<String>,
    classes_to_not_instrument: BTreeSet<String>,
    packages_to_not_instrument: BTreeSet<String>,
    classes_to_not_instrument_regex: Option<String>,
    classes_to_not_acquire: BTreeSet<String>,
    packages_to_not_acquire: BTreeSet<String>,
    class_name_translations: BTreeMap<String, String>,
    intercepted_methods: BTreeSet<MethodRef>,
}

impl From<&Configuration> for ConfigurationBuilder {
    fn from(config: &Configuration) -> ConfigurationBuilder {
        ConfigurationBuilder {
            instrumented_packages: config.instrumented_packages.clone(),
            instrumented_classes: config.instrumented_classes.clone(),
            classes_to_not_instrument: config.classes_to_not_instrument.clone(),
            packages_to_not_instrument: config.packages_to_not_instrument.clone(),
            classes_to_not_instrument_regex: config
                .classes_to_not_instrument_regex
                .as_ref()
                .map(|regex| regex_source(regex.as_str())),
            classes_to_not_acquire: config.classes_to_not_acquire.clone(),
            packages_to_not_acquire: config.packages_to_not_acquire.clone(),
            class_name_translations: config.class_name_translations.clone(),
            intercepted_methods: config.intercepted_methods.clone(),
        }
    }
}

/// Exclusion patterns must match the whole class name
fn anchored(pattern: &str) -> String {
    format!("^(?:{})$", pattern)
}

fn regex_source(anchored: &str) -> String {
    let inner = anchored
        .strip_prefix("^(?:")
        .and_then(|rest| rest.strip_suffix(")$"));
    String::from(inner.unwrap_or(anchored))
}

impl ConfigurationBuilder {
    pub fn do_not_acquire_class(mut self, class_name: impl Into<String>) -> Self {
        self.classes_to_not_acquire.insert(class_name.into());
        self
    }

    pub fn do_not_acquire_package(mut self, package_name: impl Into<String>) -> Self {
        self.packages_to_not_acquire.insert(package_name.into());
        self
    }

    pub fn add_class_name_translation(
        mut self,
        from_name: impl Into<String>,
        to_name: impl Into<String>,
    ) -> Self {
        self.class_name_translations.insert(from_name.into(), to_name.into());
        self
    }

    pub fn add_intercepted_method(mut self, method: MethodRef) -> Self {
        self.intercepted_methods.insert(method);
        self
    }

    pub fn add_instrumented_class(mut self, class_name: impl Into<String>) -> Self {
        self.instrumented_classes.insert(class_name.into());
        self
    }

    pub fn add_instrumented_package(mut self, package_name: impl Into<String>) -> Self {
        self.instrumented_packages.insert(package_name.into());
        self
    }

    pub fn do_not_instrument_class(mut self, class_name: impl Into<String>) -> Self {
        self.classes_to_not_instrument.insert(class_name.into());
        self
    }

    pub fn do_not_instrument_package(mut self, package_name: impl Into<String>) -> Self {
        self.packages_to_not_instrument.insert(package_name.into());
        self
    }

    /// Classes whose whole (dotted) name matches the pattern are not rewritten
    pub fn set_do_not_instrument_class_regex(mut self, pattern: impl Into<String>) -> Self {
        self.classes_to_not_instrument_regex = Some(pattern.into());
        self
    }

    pub fn build(self) -> Result<Configuration, ConfigError> {
        let classes_to_not_instrument_regex = match &self.classes_to_not_instrument_regex {
            Some(pattern) => Some(Regex::new(&anchored(pattern))?),
            None => None,
        };

        let mut translations = BTreeMap::new();
        for (from_name, to_name) in &self.class_name_translations {
            translations.insert(internal_name(from_name)?, internal_name(to_name)?);
        }

        let mut methods_to_intercept = BTreeSet::new();
        for method in &self.intercepted_methods {
            let owner = internal_name(&method.class_name)?;
            methods_to_intercept.insert((owner, method.method_name.clone()));
        }

        Ok(Configuration {
            instrumented_packages: self.instrumented_packages,
            instrumented_classes: self.instrumented_classes,
            classes_to_not_instrument: self.classes_to_not_instrument,
            packages_to_not_instrument: self.packages_to_not_instrument,
            classes_to_not_instrument_regex,
            classes_to_not_acquire: self.classes_to_not_acquire,
            packages_to_not_acquire: self.packages_to_not_acquire,
            class_name_translations: self.class_name_translations,
            intercepted_methods: self.intercepted_methods,
            methods_to_intercept,
            type_mapper: TypeMapper::new(translations),
        })
    }
}
