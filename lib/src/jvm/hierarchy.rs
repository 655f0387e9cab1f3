use super::{
    ArrayType, BinaryName, ClassAccessFlags, Error, FieldType, MethodAccessFlags, Name, RefType,
    UnqualifiedName,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What the rewriter needs to know about a class without having to rewrite it
///
/// Computing stack map frames requires finding common super classes, and the instrumenter needs
/// to know which `Object` methods are already overridden (or made `final`) in a super class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassSummary {
    pub name: BinaryName,

    /// Only `java/lang/Object` has no super class
    pub super_class: Option<BinaryName>,
    pub interfaces: Vec<BinaryName>,
    pub access_flags: ClassAccessFlags,
    pub methods: Vec<MethodSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSummary {
    pub name: UnqualifiedName,
    pub descriptor: String,
    pub access_flags: MethodAccessFlags,
}

impl ClassSummary {
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn find_method(&self, name: &UnqualifiedName, descriptor: &str) -> Option<&MethodSummary> {
        self.methods
            .iter()
            .find(|method| &method.name == name && method.descriptor == descriptor)
    }
}

/// Source of class summaries
///
/// Implementations must be usable from multiple threads, since classes are rewritten
/// concurrently.
pub trait ClassLookup: Send + Sync {
    /// Find the summary of a class, if the class exists
    fn lookup(&self, name: &BinaryName) -> Option<Arc<ClassSummary>>;
}

/// Lookup which knows nothing
///
/// Only methods whose control flow never merges two different classes can have their frames
/// computed with it.
pub struct NoClasses;

impl ClassLookup for NoClasses {
    fn lookup(&self, _name: &BinaryName) -> Option<Arc<ClassSummary>> {
        None
    }
}

impl ClassLookup for HashMap<BinaryName, Arc<ClassSummary>> {
    fn lookup(&self, name: &BinaryName) -> Option<Arc<ClassSummary>> {
        self.get(name).cloned()
    }
}

fn find(lookup: &dyn ClassLookup, class: &BinaryName) -> Result<Arc<ClassSummary>, Error> {
    lookup
        .lookup(class)
        .ok_or_else(|| Error::UnknownClass(String::from(class.as_str())))
}

/// Super classes of a class, starting with the class itself
///
/// The chain stops early at the first class which can't be found.
pub fn superclass_chain(lookup: &dyn ClassLookup, class: &BinaryName) -> Vec<BinaryName> {
    let mut chain = vec![class.clone()];
    let mut current = lookup.lookup(class);
    while let Some(summary) = current {
        match &summary.super_class {
            Some(super_class) if !chain.contains(super_class) => {
                chain.push(super_class.clone());
                current = lookup.lookup(super_class);
            }
            _ => break,
        }
    }
    chain
}

/// Super classes of a class up to `java/lang/Object`, failing if any of them can't be found
fn complete_superclass_chain(
    lookup: &dyn ClassLookup,
    class: &BinaryName,
) -> Result<Vec<BinaryName>, Error> {
    let mut chain = vec![class.clone()];
    let mut current = class.clone();
    while current != BinaryName::OBJECT {
        match &find(lookup, &current)?.super_class {
            Some(super_class) if !chain.contains(super_class) => {
                chain.push(super_class.clone());
                current = super_class.clone();
            }
            _ => break,
        }
    }
    Ok(chain)
}

/// Query if one class is assignable to another
///
/// Every class visited on the way up from `sub_type` must be in the lookup.
pub fn is_assignable(
    lookup: &dyn ClassLookup,
    sub_type: &BinaryName,
    super_type: &BinaryName,
) -> Result<bool, Error> {
    if sub_type == super_type || super_type == &BinaryName::OBJECT {
        return Ok(true);
    }

    let mut to_visit: Vec<BinaryName> = vec![sub_type.clone()];
    let mut dont_revisit: HashSet<BinaryName> = to_visit.iter().cloned().collect();
    while let Some(next) = to_visit.pop() {
        if &next == super_type {
            return Ok(true);
        }
        if next == BinaryName::OBJECT {
            continue;
        }
        let summary = find(lookup, &next)?;
        let parents = summary.super_class.iter().chain(summary.interfaces.iter());
        for parent in parents {
            if dont_revisit.insert(parent.clone()) {
                to_visit.push(parent.clone());
            }
        }
    }
    Ok(false)
}

/// Most specific class which both types are assignable to
///
/// Interfaces are treated as `java/lang/Object`, the way the verifier does. Classes missing from
/// the lookup are an error: guessing `java/lang/Object` would produce frames the JVM rejects.
pub fn common_super_class(
    lookup: &dyn ClassLookup,
    type1: &RefType<BinaryName>,
    type2: &RefType<BinaryName>,
) -> Result<RefType<BinaryName>, Error> {
    if type1 == type2 {
        return Ok(type1.clone());
    }

    let object = RefType::Object(BinaryName::OBJECT);
    let merged = match (type1, type2) {
        (RefType::Object(class1), RefType::Object(class2)) => {
            RefType::Object(common_super_object(lookup, class1, class2)?)
        }

        (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2))
            if arr1.additional_dimensions == arr2.additional_dimensions =>
        {
            let element = common_super_object(lookup, &arr1.element_type, &arr2.element_type)?;
            RefType::ObjectArray(ArrayType {
                additional_dimensions: arr1.additional_dimensions,
                element_type: element,
            })
        }

        (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2)) => {
            RefType::ObjectArray(ArrayType {
                additional_dimensions: arr1.additional_dimensions.min(arr2.additional_dimensions),
                element_type: BinaryName::OBJECT,
            })
        }

        // `String[][]` and `int[][]` still share `Object[]`
        (RefType::ObjectArray(arr), RefType::PrimitiveArray(prim))
        | (RefType::PrimitiveArray(prim), RefType::ObjectArray(arr)) => {
            let dims = arr.additional_dimensions.min(prim.additional_dimensions);
            if dims == 0 {
                object
            } else {
                RefType::array(FieldType::Ref(nested_object_array(dims - 1)))
            }
        }

        _ => object,
    };
    Ok(merged)
}

fn nested_object_array(additional_dimensions: usize) -> RefType<BinaryName> {
    match additional_dimensions {
        0 => RefType::Object(BinaryName::OBJECT),
        n => RefType::ObjectArray(ArrayType {
            additional_dimensions: n - 1,
            element_type: BinaryName::OBJECT,
        }),
    }
}

fn common_super_object(
    lookup: &dyn ClassLookup,
    class1: &BinaryName,
    class2: &BinaryName,
) -> Result<BinaryName, Error> {
    if class1 == class2 {
        return Ok(class1.clone());
    }
    if *class1 == BinaryName::OBJECT || *class2 == BinaryName::OBJECT {
        return Ok(BinaryName::OBJECT);
    }
    if find(lookup, class1)?.is_interface() || find(lookup, class2)?.is_interface() {
        return Ok(BinaryName::OBJECT);
    }

    let chain1 = complete_superclass_chain(lookup, class1)?;
    let chain2 = complete_superclass_chain(lookup, class2)?;
    let common = chain1
        .into_iter()
        .find(|class| chain2.contains(class))
        .unwrap_or(BinaryName::OBJECT);
    Ok(common)
}

/// Summaries of a few JDK classes, for code whose control flow merges them
#[cfg(test)]
pub(crate) fn jdk_classes() -> HashMap<BinaryName, Arc<ClassSummary>> {
    let class = |name: &str| BinaryName::from_string(String::from(name)).unwrap();
    let public = ClassAccessFlags::PUBLIC;
    let abstract_class = ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT;
    let interface = abstract_class | ClassAccessFlags::INTERFACE;
    let entries: [(&str, &str, &[&str], ClassAccessFlags); 14] = [
        ("java/util/Collection", "java/lang/Object", &[], interface),
        ("java/util/List", "java/lang/Object", &["java/util/Collection"], interface),
        ("java/util/Deque", "java/lang/Object", &["java/util/Collection"], interface),
        (
            "java/util/AbstractCollection",
            "java/lang/Object",
            &["java/util/Collection"],
            abstract_class,
        ),
        (
            "java/util/AbstractList",
            "java/util/AbstractCollection",
            &["java/util/List"],
            abstract_class,
        ),
        (
            "java/util/AbstractSequentialList",
            "java/util/AbstractList",
            &[],
            abstract_class,
        ),
        ("java/util/ArrayList", "java/util/AbstractList", &["java/util/List"], public),
        (
            "java/util/LinkedList",
            "java/util/AbstractSequentialList",
            &["java/util/List", "java/util/Deque"],
            public,
        ),
        ("java/lang/Throwable", "java/lang/Object", &[], public),
        ("java/lang/Exception", "java/lang/Throwable", &[], public),
        ("java/lang/RuntimeException", "java/lang/Exception", &[], public),
        ("java/lang/IllegalStateException", "java/lang/RuntimeException", &[], public),
        ("java/io/IOException", "java/lang/Exception", &[], public),
        ("java/lang/String", "java/lang/Object", &[], public | ClassAccessFlags::FINAL),
    ];
    entries
        .iter()
        .map(|(name, super_class, interfaces, access_flags)| {
            let summary = ClassSummary {
                name: class(*name),
                super_class: Some(class(*super_class)),
                interfaces: interfaces.iter().map(|iface| class(*iface)).collect(),
                access_flags: *access_flags,
                methods: vec![],
            };
            (summary.name.clone(), Arc::new(summary))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::BaseType;

    fn class(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    fn summary(name: &str, super_class: &str, interfaces: &[&str]) -> Arc<ClassSummary> {
        Arc::new(ClassSummary {
            name: class(name),
            super_class: Some(class(super_class)),
            interfaces: interfaces.iter().map(|iface| class(iface)).collect(),
            access_flags: ClassAccessFlags::PUBLIC,
            methods: vec![],
        })
    }

    fn classes() -> HashMap<BinaryName, Arc<ClassSummary>> {
        let mut classes = HashMap::new();
        for entry in [
            summary("org/example/View", "java/lang/Object", &[]),
            summary("org/example/TextView", "org/example/View", &["org/example/Tintable"]),
            summary("org/example/Button", "org/example/TextView", &[]),
            summary("org/example/ImageView", "org/example/View", &[]),
        ] {
            classes.insert(entry.name.clone(), entry);
        }
        classes
    }

    #[test]
    fn common_super_classes() {
        let lookup = classes();
        let button = RefType::Object(class("org/example/Button"));
        let image = RefType::Object(class("org/example/ImageView"));
        let text = RefType::Object(class("org/example/TextView"));

        assert_eq!(
            common_super_class(&lookup, &button, &image).unwrap(),
            RefType::Object(class("org/example/View"))
        );
        assert_eq!(common_super_class(&lookup, &button, &text).unwrap(), text);
        assert_eq!(
            common_super_class(&lookup, &button, &RefType::Object(BinaryName::OBJECT)).unwrap(),
            RefType::Object(BinaryName::OBJECT)
        );
        assert_eq!(
            common_super_class(
                &lookup,
                &RefType::array(FieldType::object(class("org/example/Button"))),
                &RefType::array(FieldType::object(class("org/example/ImageView")))
            )
            .unwrap(),
            RefType::array(FieldType::object(class("org/example/View")))
        );
        assert_eq!(
            common_super_class(
                &lookup,
                &RefType::array(FieldType::int()),
                &RefType::array(FieldType::Base(BaseType::Long))
            )
            .unwrap(),
            RefType::Object(BinaryName::OBJECT)
        );
    }

    #[test]
    fn unknown_classes_cannot_be_merged() {
        let lookup = classes();
        let button = RefType::Object(class("org/example/Button"));
        let unknown = RefType::Object(class("org/other/Unknown"));
        match common_super_class(&lookup, &button, &unknown) {
            Err(Error::UnknownClass(name)) => assert_eq!(name, "org/other/Unknown"),
            other => panic!("expected an unknown class, got {:?}", other),
        }

        // A gap anywhere in the super class chain is just as bad
        let mut partial = classes();
        partial.remove(&class("org/example/View"));
        let image = RefType::Object(class("org/example/ImageView"));
        assert!(matches!(
            common_super_class(&partial, &button, &image),
            Err(Error::UnknownClass(_))
        ));
        assert!(matches!(
            is_assignable(&NoClasses, &class("org/example/Button"), &class("org/example/View")),
            Err(Error::UnknownClass(_))
        ));
    }

    #[test]
    fn jdk_collections() {
        let lookup = jdk_classes();
        let array_list = RefType::Object(class("java/util/ArrayList"));
        let linked_list = RefType::Object(class("java/util/LinkedList"));
        assert_eq!(
            common_super_class(&lookup, &array_list, &linked_list).unwrap(),
            RefType::Object(class("java/util/AbstractList"))
        );
        assert!(matches!(
            common_super_class(&NoClasses, &array_list, &linked_list),
            Err(Error::UnknownClass(name)) if name == "java/util/ArrayList"
        ));
        assert!(is_assignable(
            &lookup,
            &class("java/util/LinkedList"),
            &class("java/util/Collection")
        )
        .unwrap());
    }

    #[test]
    fn assignability() {
        let lookup = classes();
        let assignable = |sub: &str, sup: &str| is_assignable(&lookup, &class(sub), &class(sup));
        assert!(assignable("org/example/Button", "org/example/View").unwrap());
        assert!(assignable("org/example/Button", "org/example/Tintable").unwrap());
        assert!(!assignable("org/example/ImageView", "org/example/TextView").unwrap());
        assert!(assignable("org/other/Unknown", "java/lang/Object").unwrap());
        assert_eq!(
            superclass_chain(&lookup, &class("org/example/Button")),
            vec![
                class("org/example/Button"),
                class("org/example/TextView"),
                class("org/example/View"),
                class("java/lang/Object"),
            ]
        );
    }
}
