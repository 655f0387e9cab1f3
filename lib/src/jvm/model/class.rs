use super::{add_annotation, annotation_types, FieldNode, MethodNode};
use crate::jvm::class_file::{Attribute, ClassFile, ConstantsPool, Version};
use crate::jvm::hierarchy::{ClassLookup, ClassSummary};
use crate::jvm::{BinaryName, ClassAccessFlags, Error, MethodDescriptor, Name, UnqualifiedName};

/// Editable representation of a class
pub struct ClassNode {
    pub version: Version,

    /// Seeded with the constants of the parsed class file, so raw attributes stay valid
    pub constants: ConstantsPool,
    pub access_flags: ClassAccessFlags,
    pub name: BinaryName,

    /// Only `java/lang/Object` has no super class
    pub super_class: Option<BinaryName>,
    pub interfaces: Vec<BinaryName>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,

    /// Raw class attributes (eg. `SourceFile`, `InnerClasses`, `BootstrapMethods`)
    pub attributes: Vec<Attribute>,
}

impl ClassNode {
    /// Make a fresh empty class
    pub fn new(
        version: Version,
        access_flags: ClassAccessFlags,
        name: BinaryName,
        super_class: Option<BinaryName>,
    ) -> ClassNode {
        ClassNode {
            version,
            constants: ConstantsPool::new(),
            access_flags,
            name,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        }
    }

    /// Parse a class from the bytes of its class file
    pub fn parse(bytes: &[u8]) -> Result<ClassNode, Error> {
        let class_file = ClassFile::parse(bytes)?;
        let constants = ConstantsPool::from_constants(class_file.constants);

        let name = constants.binary_name(class_file.this_class)?;
        let super_class = match class_file.super_class {
            Some(super_class) => Some(constants.binary_name(super_class)?),
            None => None,
        };
        let interfaces = class_file
            .interfaces
            .iter()
            .map(|interface| constants.binary_name(*interface))
            .collect::<Result<Vec<_>, _>>()?;
        let fields = class_file
            .fields
            .into_iter()
            .map(|field| FieldNode::parse(field, &constants))
            .collect::<Result<Vec<_>, _>>()?;
        let methods = class_file
            .methods
            .into_iter()
            .map(|method| MethodNode::parse(method, &constants))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ClassNode {
            version: class_file.version,
            constants,
            access_flags: class_file.access_flags,
            name,
            super_class,
            interfaces,
            fields,
            methods,
            attributes: class_file.attributes,
        })
    }

    /// Write the class back out as a class file
    ///
    /// Every method body gets re-encoded, with frames computed using `lookup` to find common
    /// super classes.
    pub fn write(self, lookup: &dyn ClassLookup) -> Result<Vec<u8>, Error> {
        let mut constants = self.constants;
        let this_class = constants.get_class(self.name.as_str())?;
        let super_class = match &self.super_class {
            Some(super_class) => Some(constants.get_class(super_class.as_str())?),
            None => None,
        };
        let interfaces = self
            .interfaces
            .iter()
            .map(|interface| constants.get_class(interface.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let fields = self
            .fields
            .into_iter()
            .map(|field| field.serialize(&mut constants))
            .collect::<Result<Vec<_>, _>>()?;
        let mut methods = Vec::with_capacity(self.methods.len());
        for method in self.methods {
            methods.push(method.serialize(&self.name, self.version, &mut constants, lookup)?);
        }

        let class_file = ClassFile {
            version: self.version,
            constants: constants.into_offset_vec(),
            access_flags: self.access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes: self.attributes,
        };
        class_file.to_bytes()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn find_method(
        &self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|method| &method.name == name && &method.descriptor == descriptor)
    }

    /// Annotations on the class (visible or not)
    pub fn annotations(&self) -> Result<Vec<BinaryName>, Error> {
        annotation_types(&self.attributes, &self.constants)
    }

    /// Add a runtime visible annotation with string valued elements to the class
    pub fn add_annotation(
        &mut self,
        annotation_type: &BinaryName,
        string_elements: &[(&str, &str)],
    ) -> Result<(), Error> {
        add_annotation(
            &mut self.attributes,
            &mut self.constants,
            annotation_type,
            string_elements,
        )
    }

    pub fn summary(&self) -> ClassSummary {
        ClassSummary {
            name: self.name.clone(),
            super_class: self.super_class.clone(),
            interfaces: self.interfaces.clone(),
            access_flags: self.access_flags,
            methods: self.methods.iter().map(MethodNode::summary).collect(),
        }
    }

    /// Rename classes mentioned in the super types, member descriptors, and code
    ///
    /// Raw attributes are left alone. The name of the class itself is only changed if `rename`
    /// changes it.
    pub fn map_classes(&mut self, rename: &impl Fn(&BinaryName) -> BinaryName) {
        self.name = rename(&self.name);
        self.super_class = self.super_class.as_ref().map(rename);
        for interface in &mut self.interfaces {
            *interface = rename(interface);
        }
        for field in &mut self.fields {
            field.descriptor = field.descriptor.map_classes(rename);
        }
        for method in &mut self.methods {
            method.descriptor = method.descriptor.map_classes(rename);
            if let Some(body) = &mut method.body {
                body.map_classes(rename);
            }
        }
    }

    /// Descriptor strings of every method, in declaration order (mostly useful for debugging)
    pub fn method_signatures(&self) -> Vec<String> {
        self.methods.iter().map(MethodNode::signature).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BranchInstruction, Insn, Instruction, MethodBody, OrdComparison};
    use crate::jvm::hierarchy::NoClasses;
    use crate::jvm::{FieldAccessFlags, FieldType, MethodAccessFlags};

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(String::from(name)).unwrap()
    }

    fn unqualified(name: &str) -> UnqualifiedName {
        UnqualifiedName::from_string(String::from(name)).unwrap()
    }

    /// `class Point { int x; Point() { super(); } static int abs(int a) { ... } }`
    fn point_class() -> ClassNode {
        let mut class = ClassNode::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            name("org/example/Point"),
            Some(BinaryName::OBJECT),
        );
        class.fields.push(FieldNode::new(
            FieldAccessFlags::PRIVATE,
            unqualified("x"),
            FieldType::int(),
        ));

        let init_descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        let mut init = MethodNode::new(
            MethodAccessFlags::PUBLIC,
            UnqualifiedName::INIT,
            init_descriptor.clone(),
        );
        let mut body = MethodBody::new();
        body.push(Instruction::ALoad(0));
        body.push(Insn::invoke_special(
            BinaryName::OBJECT,
            UnqualifiedName::INIT,
            init_descriptor,
        ));
        body.push_return(None);
        init.body = Some(body);
        class.methods.push(init);

        let abs_descriptor = MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::int()),
        };
        let mut abs = MethodNode::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            unqualified("abs"),
            abs_descriptor,
        );
        let mut body = MethodBody::new();
        let positive = body.fresh_label();
        body.push(Instruction::ILoad(0));
        body.push_branch(BranchInstruction::If(OrdComparison::GE, positive));
        body.push(Instruction::ILoad(0));
        body.push(Instruction::INeg);
        body.push_return(Some(&FieldType::int()));
        body.place_label(positive);
        body.push(Instruction::ILoad(0));
        body.push_return(Some(&FieldType::int()));
        abs.body = Some(body);
        class.methods.push(abs);

        class
    }

    #[test]
    fn write_then_parse() {
        let bytes = point_class().write(&NoClasses).unwrap();
        let parsed = ClassNode::parse(&bytes).unwrap();

        assert_eq!(parsed.name, name("org/example/Point"));
        assert_eq!(parsed.super_class, Some(BinaryName::OBJECT));
        assert_eq!(parsed.fields.len(), 1);
        assert_eq!(parsed.fields[0].descriptor, FieldType::int());
        assert_eq!(
            parsed.method_signatures(),
            vec![String::from("<init>()V"), String::from("abs(I)I")]
        );
        let abs = &parsed.methods[1];
        assert!(abs.is_static());
        assert_eq!(abs.body.as_ref().unwrap().instruction_count(), 7);

        // Parsing and writing again is stable
        let rewritten = ClassNode::parse(&bytes).unwrap().write(&NoClasses).unwrap();
        assert_eq!(rewritten, bytes);
    }

    #[test]
    fn annotations_survive_writing() {
        let mut class = point_class();
        let marker = name("org/example/Marker");
        class.add_annotation(&marker, &[("value", "because")]).unwrap();

        let parsed = ClassNode::parse(&class.write(&NoClasses).unwrap()).unwrap();
        assert_eq!(parsed.annotations().unwrap(), vec![marker]);
    }

    #[test]
    fn renaming_classes() {
        let mut class = point_class();
        class.map_classes(&|class: &BinaryName| {
            if class == &BinaryName::OBJECT {
                name("org/example/Base")
            } else {
                class.clone()
            }
        });
        assert_eq!(class.name, name("org/example/Point"));
        assert_eq!(class.super_class, Some(name("org/example/Base")));

        let init = class.methods[0].body.as_ref().unwrap();
        let owners: Vec<_> = init
            .instructions()
            .filter_map(|insn| match insn {
                Instruction::Invoke(_, method) => Some(method.class.class_constant_name()),
                _ => None,
            })
            .collect();
        assert_eq!(owners, vec![String::from("org/example/Base")]);
    }

    #[test]
    fn summary_lists_methods() {
        let summary = point_class().summary();
        assert!(!summary.is_interface());
        assert!(summary.find_method(&unqualified("abs"), "(I)I").is_some());
        assert!(summary.find_method(&unqualified("abs"), "(J)J").is_none());
    }
}
