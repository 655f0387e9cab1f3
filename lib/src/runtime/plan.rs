use super::{Failure, ObjectRef, Value};
use crate::shadow::{Invocation, ShadowClass, ShadowMethod, ShadowRef};
use std::fmt;
use std::sync::Arc;

/// What a call site runs, as decided by the dispatcher
///
/// Generated code receives `null` for [`Plan::CallReal`] and then calls the direct method.
#[derive(Clone, Debug)]
pub enum Plan {
    /// Run the original code
    CallReal,

    /// Return the default value of the return type
    DoNothing,

    /// Run a shadow method
    Shadow(Arc<ShadowMethodPlan>),
}

impl Plan {
    pub fn describe(&self) -> String {
        match self {
            Plan::CallReal => String::from("call real code"),
            Plan::DoNothing => String::from("do nothing"),
            Plan::Shadow(plan) => plan.to_string(),
        }
    }
}

/// Shadow method chosen for a call site
pub struct ShadowMethodPlan {
    declaring_class: Arc<ShadowClass>,
    method: ShadowMethod,

    /// Look for an override on the receiver's shadow before running `method`
    virtual_dispatch: bool,
}

impl ShadowMethodPlan {
    pub(crate) fn new(
        declaring_class: Arc<ShadowClass>,
        method: ShadowMethod,
        virtual_dispatch: bool,
    ) -> ShadowMethodPlan {
        ShadowMethodPlan {
            declaring_class,
            method,
            virtual_dispatch,
        }
    }

    pub fn declaring_class(&self) -> &Arc<ShadowClass> {
        &self.declaring_class
    }

    pub fn method(&self) -> &ShadowMethod {
        &self.method
    }

    /// Run the shadow method on behalf of `this`
    pub fn run(
        &self,
        this: Option<&ObjectRef>,
        shadow: Option<&ShadowRef>,
        arguments: &[Value],
    ) -> Result<Value, Failure> {
        let invocation = Invocation {
            this,
            shadow,
            arguments,
        };
        match shadow {
            Some(shadow) if self.virtual_dispatch => self
                .override_on(shadow.class())
                .unwrap_or(&self.method)
                .invoke(&invocation),
            _ => self.method.invoke(&invocation),
        }
    }

    /// Most specific override of the method declared in the receiver's shadow class hierarchy,
    /// below the class which declares the method
    ///
    /// Receivers whose shadow does not extend the declaring class have no overrides.
    fn override_on<'a>(&self, receiver_class: &'a ShadowClass) -> Option<&'a ShadowMethod> {
        if !receiver_class.is_subclass_of(self.declaring_class.name()) {
            return None;
        }
        receiver_class
            .chain()
            .take_while(|class| class.name() != self.declaring_class.name())
            .find_map(|class| {
                class
                    .declared_methods()
                    .iter()
                    .find(|method| method.matches(&self.method.name, &self.method.parameters))
            })
    }
}

impl fmt::Display for ShadowMethodPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.declaring_class.name().to_dotted(),
            self.method.signature()
        )
    }
}

impl fmt::Debug for ShadowMethodPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowMethodPlan")
            .field("method", &self.to_string())
            .field("virtual_dispatch", &self.virtual_dispatch)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{BinaryName, Name, UnqualifiedName};
    use crate::runtime::Instance;
    use crate::shadow::ShadowInstance;

    fn shadows() -> (Arc<ShadowClass>, Arc<ShadowClass>) {
        let view = ShadowClass::builder("org.example.ShadowView")
            .implements("org.example.View")
            .implementation("describe()Ljava/lang/String;", |_| Ok(Value::string("view")))
            .implementation("__constructor__()V", |_| Ok(Value::string("view constructor")))
            .build()
            .unwrap();
        let button = ShadowClass::builder("org.example.ShadowButton")
            .implements("org.example.Button")
            .extends(view.clone())
            .implementation("describe()Ljava/lang/String;", |_| Ok(Value::string("button")))
            .implementation("__constructor__()V", |_| Ok(Value::string("button constructor")))
            .build()
            .unwrap();
        (view, button)
    }

    fn plan(class: &Arc<ShadowClass>, name: &str, virtual_dispatch: bool) -> ShadowMethodPlan {
        let name = UnqualifiedName::from_string(String::from(name)).unwrap();
        let method = class
            .declared_methods()
            .iter()
            .find(|method| method.name == name)
            .unwrap()
            .clone();
        ShadowMethodPlan::new(class.clone(), method, virtual_dispatch)
    }

    #[test]
    fn overrides_in_shadow_subclasses_win() {
        let (view, button) = shadows();
        let receiver = Instance::new(
            BinaryName::from_string(String::from("org/example/Button")).unwrap(),
        );
        let shadow = ShadowInstance::new(button);

        let describe = plan(&view, "describe", true);
        assert_eq!(
            describe.run(Some(&receiver), Some(&shadow), &[]).unwrap(),
            Value::string("button")
        );
        assert_eq!(describe.run(None, None, &[]).unwrap(), Value::string("view"));
    }

    #[test]
    fn unrelated_receiver_shadows_are_ignored() {
        let (view, _) = shadows();
        let button = ShadowClass::builder("org.example.ShadowButton")
            .implements("org.example.Button")
            .implementation("describe()Ljava/lang/String;", |_| Ok(Value::string("button")))
            .build()
            .unwrap();
        let receiver = Instance::new(
            BinaryName::from_string(String::from("org/example/Button")).unwrap(),
        );
        let shadow = ShadowInstance::new(button);

        let describe = plan(&view, "describe", true);
        assert_eq!(
            describe.run(Some(&receiver), Some(&shadow), &[]).unwrap(),
            Value::string("view")
        );
    }

    #[test]
    fn constructors_run_exactly_the_method_found() {
        let (view, button) = shadows();
        let receiver = Instance::new(
            BinaryName::from_string(String::from("org/example/Button")).unwrap(),
        );
        let shadow = ShadowInstance::new(button);

        let constructor = plan(&view, "__constructor__", false);
        assert_eq!(
            constructor.run(Some(&receiver), Some(&shadow), &[]).unwrap(),
            Value::string("view constructor")
        );
        assert_eq!(constructor.to_string(), "org.example.ShadowView.__constructor__()");
    }
}
