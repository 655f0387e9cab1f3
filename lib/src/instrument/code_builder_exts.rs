use crate::jvm::code::{BranchInstruction, EqComparison, Insn, Instruction, LdcConstant, MethodBody};
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};
use crate::util::Width;

/// Helpers for generating the code that goes into dispatch stubs
pub trait CodeBuilderExts {
    /// Push a constant string to the stack
    fn const_string(&mut self, string: impl Into<String>);

    /// Push an integer constant onto the stack
    fn const_int(&mut self, integer: i32);

    /// Push a boolean constant onto the stack
    fn const_bool(&mut self, boolean: bool);

    /// Push a value of type `java/lang/Class` onto the stack
    fn const_class(&mut self, class: &BinaryName);

    /// Get a local at a particular offset
    fn get_local(&mut self, offset: u16, field_type: &FieldType<BinaryName>);

    /// Load every parameter of a method onto the stack, starting at local `first_offset`
    fn get_parameters(&mut self, first_offset: u16, parameters: &[FieldType<BinaryName>]);

    /// Return from the function
    fn return_(&mut self, field_type_opt: Option<&FieldType<BinaryName>>);

    /// Return the zero value of the type (or nothing, for `void`)
    fn return_default(&mut self, field_type_opt: Option<&FieldType<BinaryName>>);

    /// Pop the top of the stack, accounting for the different possible type widths
    fn pop(&mut self, field_type: &FieldType<BinaryName>);

    /// Turn the value on top of the stack into an object (primitives get boxed)
    fn box_value(&mut self, field_type: &FieldType<BinaryName>);

    /// Turn the object on top of the stack into a value of the type
    ///
    /// Primitives get unboxed, with `null` turning into the zero value. For `void`, the object
    /// is popped.
    fn unbox_or_default(&mut self, field_type_opt: Option<&FieldType<BinaryName>>);

    /// Collect the parameters of a method into a fresh `Object[]`, boxing primitives
    fn parameters_array(&mut self, first_offset: u16, parameters: &[FieldType<BinaryName>]);

    /// Collect arguments already on the stack into an `Object[]`
    ///
    /// The arguments get replaced on the stack by the array. Since the last argument is on top
    /// of the stack, the array is filled in back to front.
    fn stack_arguments_array(&mut self, parameters: &[FieldType<BinaryName>]);
}

impl CodeBuilderExts for MethodBody {
    fn const_string(&mut self, string: impl Into<String>) {
        self.push(Insn::push_string(string));
    }

    fn const_int(&mut self, integer: i32) {
        self.push(Insn::push_int(integer));
    }

    fn const_bool(&mut self, boolean: bool) {
        self.push(if boolean {
            Instruction::IConst1
        } else {
            Instruction::IConst0
        });
    }

    fn const_class(&mut self, class: &BinaryName) {
        let class = RefType::Object(class.clone());
        self.push(Instruction::Ldc(LdcConstant::Class(class)));
    }

    fn get_local(&mut self, offset: u16, field_type: &FieldType<BinaryName>) {
        self.push(Insn::load(field_type, offset));
    }

    fn get_parameters(&mut self, first_offset: u16, parameters: &[FieldType<BinaryName>]) {
        let mut offset = first_offset;
        for parameter in parameters {
            self.get_local(offset, parameter);
            offset += parameter.width() as u16;
        }
    }

    fn return_(&mut self, field_type_opt: Option<&FieldType<BinaryName>>) {
        self.push_return(field_type_opt);
    }

    fn return_default(&mut self, field_type_opt: Option<&FieldType<BinaryName>>) {
        if let Some(field_type) = field_type_opt {
            self.push(Insn::push_default(field_type));
        }
        self.push_return(field_type_opt);
    }

    fn pop(&mut self, field_type: &FieldType<BinaryName>) {
        self.push(if field_type.width() == 2 {
            Instruction::Pop2
        } else {
            Instruction::Pop
        });
    }

    fn box_value(&mut self, field_type: &FieldType<BinaryName>) {
        if let FieldType::Base(base) = field_type {
            let boxed = boxed_class(*base);
            let descriptor = MethodDescriptor {
                parameters: vec![field_type.clone()],
                return_type: Some(FieldType::object(boxed.clone())),
            };
            self.push(Insn::invoke_static(boxed, UnqualifiedName::VALUEOF, descriptor));
        }
    }

    fn unbox_or_default(&mut self, field_type_opt: Option<&FieldType<BinaryName>>) {
        match field_type_opt {
            None => self.push(Instruction::Pop),
            Some(FieldType::Ref(RefType::Object(class))) if *class == BinaryName::OBJECT => (),
            Some(FieldType::Ref(ref_type)) => self.push(Instruction::CheckCast(ref_type.clone())),
            Some(field_type @ FieldType::Base(base)) => {
                let not_null = self.fresh_label();
                let after = self.fresh_label();
                self.push(Instruction::Dup);
                self.push_branch(BranchInstruction::IfNull(EqComparison::NE, not_null));
                self.push(Instruction::Pop);
                self.push(Insn::push_default(field_type));
                self.push_branch(BranchInstruction::Goto(after));

                self.place_label(not_null);
                let boxed = boxed_class(*base);
                self.push(Instruction::CheckCast(RefType::Object(boxed.clone())));
                let descriptor = MethodDescriptor {
                    parameters: vec![],
                    return_type: Some(field_type.clone()),
                };
                self.push(Insn::invoke_virtual(boxed, unbox_method(*base), descriptor));
                self.place_label(after);
            }
        }
    }

    fn parameters_array(&mut self, first_offset: u16, parameters: &[FieldType<BinaryName>]) {
        self.const_int(parameters.len() as i32);
        self.push(Instruction::ANewArray(RefType::Object(BinaryName::OBJECT)));
        let mut offset = first_offset;
        for (idx, parameter) in parameters.iter().enumerate() {
            self.push(Instruction::Dup);
            self.const_int(idx as i32);
            self.get_local(offset, parameter);
            self.box_value(parameter);
            self.push(Instruction::AAStore);
            offset += parameter.width() as u16;
        }
    }

    fn stack_arguments_array(&mut self, parameters: &[FieldType<BinaryName>]) {
        self.const_int(parameters.len() as i32);
        self.push(Instruction::ANewArray(RefType::Object(BinaryName::OBJECT)));
        for (idx, parameter) in parameters.iter().enumerate().rev() {
            if parameter.width() == 2 {
                // .., arg, arr  =>  .., arr, arr, arg
                self.push(Instruction::DupX2);
                self.push(Instruction::DupX2);
                self.push(Instruction::Pop);
                self.box_value(parameter);
                self.const_int(idx as i32);
                self.push(Instruction::Swap);
            } else {
                // .., arg, arr  =>  .., arr, arr, arg
                self.push(Instruction::DupX1);
                self.push(Instruction::Swap);
                self.const_int(idx as i32);
                self.push(Instruction::Swap);
                self.box_value(parameter);
            }
            self.push(Instruction::AAStore);
        }
    }
}

/// Class used to box a primitive type
pub fn boxed_class(base: BaseType) -> BinaryName {
    match base {
        BaseType::Boolean => BinaryName::BOOLEAN,
        BaseType::Byte => BinaryName::BYTE,
        BaseType::Char => BinaryName::CHARACTER,
        BaseType::Short => BinaryName::SHORT,
        BaseType::Int => BinaryName::INTEGER,
        BaseType::Long => BinaryName::LONG,
        BaseType::Float => BinaryName::FLOAT,
        BaseType::Double => BinaryName::DOUBLE,
    }
}

/// Method on the boxed class which extracts the primitive value
fn unbox_method(base: BaseType) -> UnqualifiedName {
    match base {
        BaseType::Boolean => UnqualifiedName::BOOLEANVALUE,
        BaseType::Byte => UnqualifiedName::BYTEVALUE,
        BaseType::Char => UnqualifiedName::CHARVALUE,
        BaseType::Short => UnqualifiedName::SHORTVALUE,
        BaseType::Int => UnqualifiedName::INTVALUE,
        BaseType::Long => UnqualifiedName::LONGVALUE,
        BaseType::Float => UnqualifiedName::FLOATVALUE,
        BaseType::Double => UnqualifiedName::DOUBLEVALUE,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ConstantsPool, Version};
    use crate::jvm::code::encode_body;
    use crate::jvm::hierarchy::NoClasses;
    use crate::jvm::verifier::MethodContext;
    use crate::jvm::Name;

    fn encodes(body: &MethodBody, descriptor: &MethodDescriptor<BinaryName>) -> bool {
        let this_class = BinaryName::from_string(String::from("org/example/Stub")).unwrap();
        let name = UnqualifiedName::from_string(String::from("stub")).unwrap();
        let context = MethodContext {
            this_class: &this_class,
            name: &name,
            descriptor,
            is_static: true,
            lookup: &NoClasses,
        };
        let mut constants = ConstantsPool::new();
        encode_body(body, &mut constants, &context, Version::JAVA8).is_ok()
    }

    #[test]
    fn boxing_round_trip() {
        // static long stub(long value) { return (long) (Object) value; }
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::long()],
            return_type: Some(FieldType::long()),
        };
        let mut body = MethodBody::new();
        body.get_local(0, &FieldType::long());
        body.box_value(&FieldType::long());
        body.unbox_or_default(Some(&FieldType::long()));
        body.return_(Some(&FieldType::long()));
        assert!(encodes(&body, &descriptor));
    }

    #[test]
    fn arrays_from_stack_and_locals() {
        // static Object stub(int a, double b, String c)
        let parameters = vec![
            FieldType::int(),
            FieldType::double(),
            FieldType::object(BinaryName::STRING),
        ];
        let descriptor = MethodDescriptor {
            parameters: parameters.clone(),
            return_type: Some(FieldType::object(BinaryName::OBJECT)),
        };

        let mut from_locals = MethodBody::new();
        from_locals.parameters_array(0, &parameters);
        from_locals.return_(descriptor.return_type.as_ref());
        assert!(encodes(&from_locals, &descriptor));

        let mut from_stack = MethodBody::new();
        from_stack.get_parameters(0, &parameters);
        from_stack.stack_arguments_array(&parameters);
        from_stack.return_(descriptor.return_type.as_ref());
        assert!(encodes(&from_stack, &descriptor));

        // Stack arguments end up replaced by exactly one array
        let mut popped = MethodBody::new();
        popped.get_parameters(0, &parameters);
        popped.stack_arguments_array(&parameters);
        popped.push(Instruction::Pop);
        popped.return_(descriptor.return_type.as_ref());
        assert!(!encodes(&popped, &descriptor));
    }
}
