use crate::jvm::class_file::{self, ConstantsPool};
use crate::jvm::{
    BinaryName, Error, FieldAccessFlags, FieldType, Name, ParseDescriptor, RenderDescriptor,
    UnqualifiedName,
};

/// Field of a [`ClassNode`](super::ClassNode)
#[derive(Clone, Debug)]
pub struct FieldNode {
    pub access_flags: FieldAccessFlags,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,

    /// Raw attributes (eg. `ConstantValue`, `Signature`)
    pub attributes: Vec<class_file::Attribute>,
}

impl FieldNode {
    pub fn new(
        access_flags: FieldAccessFlags,
        name: UnqualifiedName,
        descriptor: FieldType<BinaryName>,
    ) -> FieldNode {
        FieldNode {
            access_flags,
            name,
            descriptor,
            attributes: vec![],
        }
    }

    pub(super) fn parse(field: class_file::Field, constants: &ConstantsPool) -> Result<FieldNode, Error> {
        let name = constants.utf8(field.name_index)?;
        let name = UnqualifiedName::from_string(String::from(name)).map_err(Error::BadName)?;
        let descriptor = constants.utf8(field.descriptor_index)?;
        let descriptor = FieldType::parse(descriptor)?;
        Ok(FieldNode {
            access_flags: field.access_flags,
            name,
            descriptor,
            attributes: field.attributes,
        })
    }

    pub(super) fn serialize(self, constants: &mut ConstantsPool) -> Result<class_file::Field, Error> {
        Ok(class_file::Field {
            access_flags: self.access_flags,
            name_index: constants.get_utf8(self.name.as_str())?,
            descriptor_index: constants.get_utf8(self.descriptor.render())?,
            attributes: self.attributes,
        })
    }
}
