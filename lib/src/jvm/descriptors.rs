use super::{BinaryName, Error, Name};
use crate::util::Width;
use std::iter::Peekable;
use std::str::Chars;

/// Types which have a textual descriptor form (eg. `I`, `[Ljava/lang/String;`, `(J)V`)
pub trait RenderDescriptor {
    fn render(&self) -> String {
        let mut rendered = String::new();
        self.render_to(&mut rendered);
        rendered
    }

    fn render_to(&self, out: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a complete descriptor, failing on any leftover input
    fn parse(source: &str) -> Result<Self, Error> {
        let mut chars = source.chars().peekable();
        match Self::parse_from(&mut chars) {
            Some(parsed) if chars.next().is_none() => Ok(parsed),
            _ => Err(Error::BadDescriptor(String::from(source))),
        }
    }

    /// Read a descriptor from the front of `source`, or `None` if it is malformed
    fn parse_from(source: &mut Peekable<Chars>) -> Option<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    pub fn descriptor_char(self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    pub fn from_descriptor_char(c: char) -> Option<BaseType> {
        Some(match c {
            'B' => BaseType::Byte,
            'C' => BaseType::Char,
            'D' => BaseType::Double,
            'F' => BaseType::Float,
            'I' => BaseType::Int,
            'J' => BaseType::Long,
            'S' => BaseType::Short,
            'Z' => BaseType::Boolean,
            _ => return None,
        })
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, out: &mut String) {
        out.push(self.descriptor_char());
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Option<Self> {
        let base_type = BaseType::from_descriptor_char(*source.peek()?)?;
        source.next();
        Some(base_type)
    }
}

/// Reference type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Array type, by element type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Dimensions beyond the first (`A[]` has 0, `A[][][]` has 2)
    pub additional_dimensions: usize,
    pub element_type: T,
}

impl<T> ArrayType<T> {
    pub fn map<T2>(&self, map_element: impl FnOnce(&T) -> T2) -> ArrayType<T2> {
        ArrayType {
            additional_dimensions: self.additional_dimensions,
            element_type: map_element(&self.element_type),
        }
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, out: &mut String) {
        out.extend(std::iter::repeat('[').take(self.additional_dimensions + 1));
        self.element_type.render_to(out);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, out: &mut String) {
        out.push('L');
        out.push_str(self.as_str());
        out.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Option<Self> {
        source.next_if_eq(&'L')?;
        let mut class_name = String::new();
        loop {
            match source.next()? {
                ';' => return BinaryName::from_string(class_name).ok(),
                c => class_name.push(c),
            }
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, out: &mut String) {
        match self {
            RefType::Object(class) => class.render_to(out),
            RefType::PrimitiveArray(array) => array.render_to(out),
            RefType::ObjectArray(array) => array.render_to(out),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Option<Self> {
        if source.next_if_eq(&'[').is_none() {
            return C::parse_from(source).map(RefType::Object);
        }
        let mut additional_dimensions = 0;
        while source.next_if_eq(&'[').is_some() {
            additional_dimensions += 1;
        }
        if source.peek() == Some(&'L') {
            let element_type = C::parse_from(source)?;
            Some(RefType::ObjectArray(ArrayType {
                additional_dimensions,
                element_type,
            }))
        } else {
            let element_type = BaseType::parse_from(source)?;
            Some(RefType::PrimitiveArray(ArrayType {
                additional_dimensions,
                element_type,
            }))
        }
    }
}

impl<C> RefType<C> {
    pub fn map<C2>(&self, map_class: impl FnOnce(&C) -> C2) -> RefType<C2> {
        match self {
            RefType::Object(class) => RefType::Object(map_class(class)),
            RefType::PrimitiveArray(array) => RefType::PrimitiveArray(*array),
            RefType::ObjectArray(array) => RefType::ObjectArray(array.map(map_class)),
        }
    }

    /// Array whose elements have type `element`
    pub fn array(element: FieldType<C>) -> RefType<C> {
        match element {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(array)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: array.additional_dimensions + 1,
                element_type: array.element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(array)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: array.additional_dimensions + 1,
                element_type: array.element_type,
            }),
        }
    }
}

/// Type of a field, local variable, or method parameter
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C> FieldType<C> {
    pub fn array(element: FieldType<C>) -> FieldType<C> {
        FieldType::Ref(RefType::array(element))
    }

    pub const fn object(class_name: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType<C> {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType<C> {
        FieldType::Base(BaseType::Double)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Base(BaseType::Boolean)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, out: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(out),
            FieldType::Ref(ref_type) => ref_type.render_to(out),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Option<Self> {
        match source.peek()? {
            'L' | '[' => RefType::parse_from(source).map(FieldType::Ref),
            _ => BaseType::parse_from(source).map(FieldType::Base),
        }
    }
}

/// Parameter and return types of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,

    /// `None` for `void`
    pub return_type: Option<FieldType<Class>>,
}

impl<C> MethodDescriptor<C> {
    /// Number of local variable slots taken by the parameters (and `this`, if present)
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_slots = usize::from(has_this_param);
        this_slots + self.parameters.iter().map(Width::width).sum::<usize>()
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, out: &mut String) {
        out.push('(');
        for parameter in &self.parameters {
            parameter.render_to(out);
        }
        out.push(')');
        match &self.return_type {
            None => out.push('V'),
            Some(return_type) => return_type.render_to(out),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Option<Self> {
        source.next_if_eq(&'(')?;
        let mut parameters = vec![];
        while source.next_if_eq(&')').is_none() {
            parameters.push(FieldType::parse_from(source)?);
        }
        let return_type = match source.next_if_eq(&'V') {
            Some(_) => None,
            None => Some(FieldType::parse_from(source)?),
        };
        Some(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

impl FieldType<BinaryName> {
    /// Rename every class mentioned in the type
    pub fn map_classes(&self, rename: &impl Fn(&BinaryName) -> BinaryName) -> Self {
        match self {
            FieldType::Base(base) => FieldType::Base(*base),
            FieldType::Ref(ref_type) => FieldType::Ref(ref_type.map(|class| rename(class))),
        }
    }
}

impl MethodDescriptor<BinaryName> {
    /// Rename every class mentioned in the parameters and return type
    pub fn map_classes(&self, rename: &impl Fn(&BinaryName) -> BinaryName) -> Self {
        MethodDescriptor {
            parameters: self
                .parameters
                .iter()
                .map(|parameter| parameter.map_classes(rename))
                .collect(),
            return_type: self
                .return_type
                .as_ref()
                .map(|return_type| return_type.map_classes(rename)),
        }
    }
}

impl RefType<BinaryName> {
    /// Parse the name stored in a `CONSTANT_Class_info`
    ///
    /// Array classes are stored as descriptors (`[Ljava/lang/String;`) while plain classes are
    /// stored in internal form (`java/lang/String`).
    pub fn from_class_constant(name: &str) -> Result<RefType<BinaryName>, Error> {
        let parsed = if name.starts_with('[') {
            RefType::parse(name).ok()
        } else {
            BinaryName::from_string(String::from(name))
                .ok()
                .map(RefType::Object)
        };
        parsed.ok_or_else(|| Error::BadName(String::from(name)))
    }

    /// Inverse of [`RefType::from_class_constant`]
    pub fn class_constant_name(&self) -> String {
        match self {
            RefType::Object(class) => String::from(class.as_str()),
            other => other.render(),
        }
    }
}

/// Rename the classes inside a raw field or method descriptor
///
/// Descriptors which don't parse are returned untouched.
pub fn remap_descriptor(descriptor: &str, rename: &impl Fn(&BinaryName) -> BinaryName) -> String {
    let remapped = if descriptor.starts_with('(') {
        MethodDescriptor::<BinaryName>::parse(descriptor)
            .map(|method| method.map_classes(rename).render())
    } else {
        FieldType::<BinaryName>::parse(descriptor).map(|field| field.map_classes(rename).render())
    };
    remapped.unwrap_or_else(|_| String::from(descriptor))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    type FT = FieldType<BinaryName>;

    const OBJECT: FT = FieldType::object(BinaryName::OBJECT);
    const STRING: FT = FieldType::object(BinaryName::STRING);

    #[test]
    fn parses_and_renders_field_types() {
        for descriptor in ["Z", "J", "Ljava/lang/Object;", "[[[D", "[Ljava/lang/String;"] {
            let parsed = FT::parse(descriptor).unwrap();
            assert_eq!(parsed.render(), descriptor);
        }
        assert_eq!(FT::parse("[Ljava/lang/String;").unwrap(), FieldType::array(STRING));
        assert_eq!(
            FT::parse("[[[D").unwrap(),
            FieldType::array(FieldType::array(FieldType::array(FieldType::double())))
        );
        assert_eq!(BaseType::Long.descriptor_char(), 'J');
    }

    #[test]
    fn method_descriptors() {
        let descriptor = MethodDescriptor::<BinaryName>::parse("(IJLjava/lang/Object;)V").unwrap();
        assert_eq!(
            descriptor,
            MethodDescriptor {
                parameters: vec![FieldType::int(), FieldType::long(), OBJECT],
                return_type: None,
            }
        );
        assert_eq!(descriptor.parameter_length(true), 5);
        assert_eq!(descriptor.render(), "(IJLjava/lang/Object;)V");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for descriptor in ["", "V", "Q", "Ljava/lang/Object", "[", "II"] {
            assert!(
                matches!(FT::parse(descriptor), Err(Error::BadDescriptor(_))),
                "{}",
                descriptor
            );
        }
        for descriptor in ["(I", "(I)", "()VV", "(V)V"] {
            assert!(MethodDescriptor::<BinaryName>::parse(descriptor).is_err(), "{}", descriptor);
        }
    }

    #[test]
    fn class_constants() {
        assert_eq!(
            RefType::from_class_constant("java/lang/String").unwrap(),
            RefType::Object(BinaryName::STRING)
        );
        let array = RefType::from_class_constant("[Ljava/lang/String;").unwrap();
        assert_eq!(array, RefType::array(STRING));
        assert_eq!(array.class_constant_name(), "[Ljava/lang/String;");
        assert!(matches!(RefType::from_class_constant(""), Err(Error::BadName(_))));
    }

    #[test]
    fn remapping() {
        let rename = |name: &BinaryName| {
            if *name == BinaryName::INTEGER {
                BinaryName::from_string(String::from("org/example/Int")).unwrap()
            } else {
                name.clone()
            }
        };
        assert_eq!(
            remap_descriptor("(I[Ljava/lang/Integer;)Ljava/lang/Integer;", &rename),
            "(I[Lorg/example/Int;)Lorg/example/Int;"
        );
        assert_eq!(remap_descriptor("Ljava/lang/String;", &rename), "Ljava/lang/String;");
        assert_eq!(remap_descriptor("not a descriptor", &rename), "not a descriptor");
    }
}
