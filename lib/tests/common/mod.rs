#![allow(dead_code)]

use shadowbox::jvm::class_file::Version;
use shadowbox::jvm::code::{BranchInstruction, Insn, Instruction, MethodBody, OrdComparison};
use shadowbox::jvm::hierarchy::NoClasses;
use shadowbox::jvm::model::{ClassNode, MethodNode};
use shadowbox::jvm::{
    BinaryName, ClassAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor, Name, RefType,
    UnqualifiedName,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn name(name: &str) -> BinaryName {
    BinaryName::from_string(String::from(name)).unwrap()
}

pub fn unqualified(name: &str) -> UnqualifiedName {
    UnqualifiedName::from_string(String::from(name)).unwrap()
}

pub fn clock() -> BinaryName {
    name("org/example/Clock")
}

fn void() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![],
        return_type: None,
    }
}

fn returning_long() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![],
        return_type: Some(FieldType::long()),
    }
}

/// Zero-argument constructor which only calls the super constructor
fn default_constructor(super_class: &BinaryName) -> MethodNode {
    let mut init = MethodNode::new(MethodAccessFlags::PUBLIC, UnqualifiedName::INIT, void());
    let mut body = MethodBody::new();
    body.push(Instruction::ALoad(0));
    body.push(Insn::invoke_special(
        super_class.clone(),
        UnqualifiedName::INIT,
        void(),
    ));
    body.push_return(None);
    init.body = Some(body);
    init
}

fn empty_method(method_name: &str) -> MethodNode {
    let mut method = MethodNode::new(MethodAccessFlags::PUBLIC, unqualified(method_name), void());
    let mut body = MethodBody::new();
    body.push_return(None);
    method.body = Some(body);
    method
}

/// ```text,ignore,no_run
/// public class <class_name> extends <super_class> {
///     public <init>() { super(); }
///     public void <method>() { }   // for each of `methods`
/// }
/// ```
pub fn plain_class(class_name: &str, super_class: &BinaryName, methods: &[&str]) -> Vec<u8> {
    let mut class = ClassNode::new(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        name(class_name),
        Some(super_class.clone()),
    );
    class.methods.push(default_constructor(super_class));
    for method in methods {
        class.methods.push(empty_method(method));
    }
    class.write(&NoClasses).unwrap()
}

/// ```text,ignore,no_run
/// public class Clock {
///     public Clock() { super(); }
///     public long now() { return System.currentTimeMillis(); }
/// }
/// ```
pub fn clock_class() -> Vec<u8> {
    let mut class = ClassNode::new(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        clock(),
        Some(BinaryName::OBJECT),
    );
    class.methods.push(default_constructor(&BinaryName::OBJECT));

    let mut now = MethodNode::new(MethodAccessFlags::PUBLIC, unqualified("now"), returning_long());
    let mut body = MethodBody::new();
    body.push(Insn::invoke_static(
        name("java/lang/System"),
        unqualified("currentTimeMillis"),
        returning_long(),
    ));
    body.push_return(Some(&FieldType::long()));
    now.body = Some(body);
    class.methods.push(now);

    class.write(&NoClasses).unwrap()
}

/// Class whose constructor never calls a super constructor, which can't be instrumented
pub fn broken_class(class_name: &str) -> Vec<u8> {
    let mut class = ClassNode::new(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        name(class_name),
        Some(BinaryName::OBJECT),
    );
    let mut init = MethodNode::new(MethodAccessFlags::PUBLIC, UnqualifiedName::INIT, void());
    let mut body = MethodBody::new();
    body.push_return(None);
    init.body = Some(body);
    class.methods.push(init);
    class.write(&NoClasses).unwrap()
}

/// ```text,ignore,no_run
/// public class <class_name> {
///     public <init>() { super(); }
///     public static Object pick(boolean flag) { return flag ? new <first>() : new <second>(); }
/// }
/// ```
///
/// Writing it out needs to know the common super class of `first` and `second`.
pub fn picker_class(class_name: &str, first: &BinaryName, second: &BinaryName) -> ClassNode {
    let mut class = ClassNode::new(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        name(class_name),
        Some(BinaryName::OBJECT),
    );
    class.methods.push(default_constructor(&BinaryName::OBJECT));

    let mut pick = MethodNode::new(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        unqualified("pick"),
        MethodDescriptor {
            parameters: vec![FieldType::boolean()],
            return_type: Some(FieldType::object(BinaryName::OBJECT)),
        },
    );
    let mut body = MethodBody::new();
    let other = body.fresh_label();
    let join = body.fresh_label();
    body.push(Instruction::ILoad(0));
    body.push_branch(BranchInstruction::If(OrdComparison::EQ, other));
    body.push(Instruction::New(RefType::Object(first.clone())));
    body.push(Instruction::Dup);
    body.push(Insn::invoke_special(first.clone(), UnqualifiedName::INIT, void()));
    body.push_branch(BranchInstruction::Goto(join));
    body.place_label(other);
    body.push(Instruction::New(RefType::Object(second.clone())));
    body.push(Instruction::Dup);
    body.push(Insn::invoke_special(second.clone(), UnqualifiedName::INIT, void()));
    body.place_label(join);
    body.push_return(Some(&FieldType::object(BinaryName::OBJECT)));
    pick.body = Some(body);
    class.methods.push(pick);
    class
}
