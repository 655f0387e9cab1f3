use crate::jvm::class_file::{self, AttributeLike, Code, ConstantsPool, Version};
use crate::jvm::code::{decode_body, encode_body, MethodBody};
use crate::jvm::hierarchy::{ClassLookup, MethodSummary};
use crate::jvm::verifier::MethodContext;
use crate::jvm::{
    BinaryName, Error, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor,
    RenderDescriptor, UnqualifiedName,
};

/// Method of a [`ClassNode`](super::ClassNode)
#[derive(Clone, Debug)]
pub struct MethodNode {
    pub access_flags: MethodAccessFlags,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Decoded `Code` attribute (absent on `abstract` and `native` methods)
    pub body: Option<MethodBody>,

    /// Raw attributes other than `Code` (eg. `Exceptions`, `Signature`, annotations)
    pub attributes: Vec<class_file::Attribute>,
}

impl MethodNode {
    pub fn new(
        access_flags: MethodAccessFlags,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    ) -> MethodNode {
        MethodNode {
            access_flags,
            name,
            descriptor,
            body: None,
            attributes: vec![],
        }
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }

    /// Name and descriptor, as used in call site signatures (eg. `now()J`)
    pub fn signature(&self) -> String {
        format!("{}{}", self.name.as_str(), self.descriptor.render())
    }

    pub fn summary(&self) -> MethodSummary {
        MethodSummary {
            name: self.name.clone(),
            descriptor: self.descriptor.render(),
            access_flags: self.access_flags,
        }
    }

    pub(super) fn parse(
        method: class_file::Method,
        constants: &ConstantsPool,
    ) -> Result<MethodNode, Error> {
        let name = constants.utf8(method.name_index)?;
        let name = UnqualifiedName::from_string(String::from(name)).map_err(Error::BadName)?;
        let descriptor = constants.utf8(method.descriptor_index)?;
        let descriptor = MethodDescriptor::parse(descriptor)?;

        let mut body = None;
        let mut attributes = vec![];
        for attribute in method.attributes {
            if constants.utf8(attribute.name_index)? == Code::NAME {
                let code: Code = attribute.decode()?;
                body = Some(decode_body(&code, constants)?);
            } else {
                attributes.push(attribute);
            }
        }

        Ok(MethodNode {
            access_flags: method.access_flags,
            name,
            descriptor,
            body,
            attributes,
        })
    }

    pub(super) fn serialize(
        self,
        this_class: &BinaryName,
        version: Version,
        constants: &mut ConstantsPool,
        lookup: &dyn ClassLookup,
    ) -> Result<class_file::Method, Error> {
        let name_index = constants.get_utf8(self.name.as_str())?;
        let descriptor_index = constants.get_utf8(self.descriptor.render())?;

        let mut attributes = Vec::with_capacity(self.attributes.len() + 1);
        if let Some(body) = &self.body {
            let context = MethodContext {
                this_class,
                name: &self.name,
                descriptor: &self.descriptor,
                is_static: self.is_static(),
                lookup,
            };
            let code = encode_body(body, constants, &context, version)?;
            attributes.push(constants.get_attribute(code)?);
        }
        attributes.extend(self.attributes);

        Ok(class_file::Method {
            access_flags: self.access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }
}
