use crate::jvm::{
    BinaryName, Error, MethodDescriptor, Name, ParseDescriptor, RenderDescriptor, UnqualifiedName,
};
use std::fmt;

/// Identity of a call site, as passed by generated code: `owner/name(descriptor)`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub class_name: BinaryName,
    pub method_name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

impl MethodSignature {
    pub fn parse(signature: &str) -> Result<MethodSignature, Error> {
        let bad_signature = || Error::BadDescriptor(String::from(signature));
        let paren = signature.find('(').ok_or_else(bad_signature)?;
        let (owner, name) = signature[..paren].rsplit_once('/').ok_or_else(bad_signature)?;
        let descriptor =
            MethodDescriptor::parse(&signature[paren..]).map_err(|_| bad_signature())?;
        Ok(MethodSignature {
            class_name: BinaryName::from_string(String::from(owner)).map_err(Error::BadName)?,
            method_name: UnqualifiedName::from_string(String::from(name))
                .map_err(Error::BadName)?,
            descriptor,
        })
    }

    pub fn is_constructor(&self) -> bool {
        self.method_name == UnqualifiedName::INIT
            || self.method_name == UnqualifiedName::CONSTRUCTOR
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}{}",
            self.class_name,
            self.method_name,
            self.descriptor.render()
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::FieldType;

    #[test]
    fn parses_call_sites() {
        let signature = MethodSignature::parse("org/example/Clock/setTime(JLjava/lang/String;)V")
            .unwrap();
        assert_eq!(signature.class_name.as_str(), "org/example/Clock");
        assert_eq!(signature.method_name.as_str(), "setTime");
        assert_eq!(
            signature.descriptor.parameters,
            vec![FieldType::long(), FieldType::object(BinaryName::STRING)]
        );
        assert_eq!(signature.descriptor.return_type, None);
        assert_eq!(
            signature.to_string(),
            "org/example/Clock/setTime(JLjava/lang/String;)V"
        );
        assert!(!signature.is_constructor());

        let constructor = MethodSignature::parse("org/example/Clock/__constructor__(I)V").unwrap();
        assert!(constructor.is_constructor());
    }

    #[test]
    fn rejects_bad_call_sites() {
        assert!(MethodSignature::parse("noOwner()V").is_err());
        assert!(MethodSignature::parse("org/example/Clock/now").is_err());
        assert!(MethodSignature::parse("org/example/Clock/now(Q)V").is_err());
    }
}
