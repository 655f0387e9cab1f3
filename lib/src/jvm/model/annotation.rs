use crate::jvm::class_file::{
    Annotation, Attribute, AttributeLike, ConstantsPool, ElementValue, RuntimeInvisibleAnnotations,
    RuntimeVisibleAnnotations,
};
use crate::jvm::{BinaryName, Error, FieldType, ParseDescriptor, RefType, RenderDescriptor};

/// Types of the annotations (visible or not) in a list of attributes
pub fn annotation_types(
    attributes: &[Attribute],
    constants: &ConstantsPool,
) -> Result<Vec<BinaryName>, Error> {
    let mut types = vec![];
    for attribute in attributes {
        let name = constants.utf8(attribute.name_index)?;
        let annotations = if name == RuntimeVisibleAnnotations::NAME {
            attribute.decode::<RuntimeVisibleAnnotations>()?.0
        } else if name == RuntimeInvisibleAnnotations::NAME {
            attribute.decode::<RuntimeInvisibleAnnotations>()?.0
        } else {
            continue;
        };
        for annotation in annotations {
            let descriptor = constants.utf8(annotation.type_index)?;
            if let Ok(FieldType::Ref(RefType::Object(class))) = FieldType::parse(descriptor) {
                types.push(class);
            }
        }
    }
    Ok(types)
}

/// Add a runtime visible annotation whose elements are all strings
///
/// The annotation is appended to the existing `RuntimeVisibleAnnotations` attribute, if there is
/// one.
pub fn add_annotation(
    attributes: &mut Vec<Attribute>,
    constants: &mut ConstantsPool,
    annotation_type: &BinaryName,
    string_elements: &[(&str, &str)],
) -> Result<(), Error> {
    let descriptor = FieldType::object(annotation_type.clone()).render();
    let mut elements = vec![];
    for (name, value) in string_elements {
        let name = constants.get_utf8(*name)?;
        let value = constants.get_utf8(*value)?;
        elements.push((
            name,
            ElementValue::Const {
                tag: b's',
                value: value.0,
            },
        ));
    }
    let annotation = Annotation {
        type_index: constants.get_utf8(descriptor)?,
        elements,
    };

    let mut existing = None;
    for (idx, attribute) in attributes.iter().enumerate() {
        if constants.utf8(attribute.name_index)? == RuntimeVisibleAnnotations::NAME {
            existing = Some(idx);
            break;
        }
    }
    match existing {
        Some(idx) => {
            let mut annotations: RuntimeVisibleAnnotations = attributes[idx].decode()?;
            annotations.0.push(annotation);
            attributes[idx] = constants.get_attribute(annotations)?;
        }
        None => {
            let annotations = RuntimeVisibleAnnotations(vec![annotation]);
            attributes.push(constants.get_attribute(annotations)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Constant;
    use crate::jvm::Name;

    #[test]
    fn added_annotations_are_merged() {
        let mut constants = ConstantsPool::new();
        let mut attributes = vec![];
        let first = BinaryName::from_string(String::from("org/example/First")).unwrap();
        let second = BinaryName::from_string(String::from("org/example/Second")).unwrap();

        add_annotation(&mut attributes, &mut constants, &first, &[]).unwrap();
        add_annotation(&mut attributes, &mut constants, &second, &[("value", "why")]).unwrap();

        assert_eq!(attributes.len(), 1);
        assert_eq!(
            annotation_types(&attributes, &constants).unwrap(),
            vec![first, second]
        );

        let decoded: RuntimeVisibleAnnotations = attributes[0].decode().unwrap();
        let (name, value) = &decoded.0[1].elements[0];
        assert_eq!(constants.utf8(*name).unwrap(), "value");
        match value {
            ElementValue::Const { tag: b's', value } => {
                let value = constants.get(*value).unwrap();
                assert_eq!(value, &Constant::Utf8(String::from("why")));
            }
            other => panic!("unexpected element {:?}", other),
        }
    }
}
