//! Descriptors of the runtime entry points that instrumented code calls

use crate::jvm::{BinaryName, FieldType, MethodDescriptor, UnqualifiedName};

fn object(class: BinaryName) -> FieldType<BinaryName> {
    FieldType::object(class)
}

/// `()V`
pub fn void() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![],
        return_type: None,
    }
}

/// `ShadowRuntime.classInitializing(Class)`
pub fn class_initializing() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![object(BinaryName::CLASS)],
        return_type: None,
    }
}

/// `ShadowRuntime.initializing(Object) -> Object`, returning the new shadow
pub fn initializing() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![object(BinaryName::OBJECT)],
        return_type: Some(object(BinaryName::OBJECT)),
    }
}

/// `ShadowRuntime.methodInvoked(String signature, boolean isStatic, Class owner) -> Plan`
pub fn method_invoked() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![
            object(BinaryName::STRING),
            FieldType::boolean(),
            object(BinaryName::CLASS),
        ],
        return_type: Some(object(BinaryName::PLAN)),
    }
}

/// `ShadowRuntime.cleanStackTrace(Throwable) -> Throwable`
pub fn clean_stack_trace() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![object(BinaryName::THROWABLE)],
        return_type: Some(object(BinaryName::THROWABLE)),
    }
}

/// `ShadowRuntime.intercept(String signature, Object receiver, Object[] args, Class caller)`
pub fn intercept() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![
            object(BinaryName::STRING),
            object(BinaryName::OBJECT),
            FieldType::array(object(BinaryName::OBJECT)),
            object(BinaryName::CLASS),
        ],
        return_type: Some(object(BinaryName::OBJECT)),
    }
}

/// `Plan.run(Object instance, Object shadow, Object[] args) -> Object`
pub fn plan_run() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![
            object(BinaryName::OBJECT),
            object(BinaryName::OBJECT),
            FieldType::array(object(BinaryName::OBJECT)),
        ],
        return_type: Some(object(BinaryName::OBJECT)),
    }
}

/// `ShadowedObject.$$shadow$getData() -> Object`
pub fn get_shadow_data() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![],
        return_type: Some(object(BinaryName::OBJECT)),
    }
}

/// Methods of `java/lang/Object` that instrumented classes always override
pub fn object_methods() -> Vec<(UnqualifiedName, MethodDescriptor<BinaryName>)> {
    vec![
        (
            UnqualifiedName::EQUALS,
            MethodDescriptor {
                parameters: vec![object(BinaryName::OBJECT)],
                return_type: Some(FieldType::boolean()),
            },
        ),
        (
            UnqualifiedName::HASHCODE,
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
        ),
        (
            UnqualifiedName::TOSTRING,
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(object(BinaryName::STRING)),
            },
        ),
    ]
}
