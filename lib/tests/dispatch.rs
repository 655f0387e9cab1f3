mod common;

use common::*;
use pretty_assertions::assert_eq;
use shadowbox::config::{Configuration, MethodRef};
use shadowbox::instrument::direct_method_name;
use shadowbox::jvm::model::ClassNode;
use shadowbox::jvm::{BinaryName, Name};
use shadowbox::loader::{ClassSource, MemorySource, Origin, SandboxNamespace, SharedHost};
use shadowbox::runtime::{
    Dispatcher, Failure, Instance, Interceptor, Interceptors, InvokeError, Plan, Settings,
    StackFrame, Value,
};
use shadowbox::shadow::{ShadowClass, ShadowMap, ShadowProvider};
use std::sync::{Arc, Barrier};
use std::thread;

const NOW: &str = "org/example/Clock/now()J";

fn config(interceptors: &Interceptors) -> Configuration {
    interceptors
        .configure(Configuration::builder().add_instrumented_package("org.example"))
        .build()
        .unwrap()
}

fn sandbox(interceptors: &Interceptors) -> Arc<SandboxNamespace> {
    let view = name("org/example/View");
    let local = MemorySource::new()
        .with_class(&clock(), clock_class())
        .with_class(&view, plain_class("org/example/View", &BinaryName::OBJECT, &["draw"]))
        .with_class(
            &name("org/example/Button"),
            plain_class("org/example/Button", &view, &["layout"]),
        );
    let sources: Vec<Box<dyn ClassSource>> = vec![Box::new(local)];
    Arc::new(SandboxNamespace::new(
        config(interceptors),
        sources,
        Arc::new(SharedHost::empty()),
    ))
}

fn dispatcher(namespace: Arc<SandboxNamespace>, registry: ShadowMap) -> Dispatcher {
    Dispatcher::new(Settings::default(), namespace, registry, Interceptors::new(vec![]))
}

fn fixed_clock(millis: i64) -> ShadowMap {
    let shadow = ShadowClass::builder("org.example.ShadowClock")
        .implements("org.example.Clock")
        .implementation("now()J", move |_| Ok(Value::Long(millis)))
        .build()
        .unwrap();
    ShadowMap::from_providers(vec![ShadowProvider::new("clocks", 0).shadow(shadow)]).unwrap()
}

/// Call `Clock.now()` the way its dispatch stub does, with `42` as the original result
fn now(dispatcher: &Dispatcher, instance: &Arc<Instance>) -> Result<Value, InvokeError> {
    dispatcher.invoke(NOW, false, &clock(), Some(instance), &[], |_| Ok(Value::Long(42)))
}

fn new_clock(dispatcher: &Dispatcher) -> Arc<Instance> {
    let instance = Instance::new(clock());
    dispatcher.on_instance_initializing(&instance).unwrap();
    instance
}

#[test]
fn swapping_shadows_of_a_loaded_class() {
    init_logging();
    let namespace = sandbox(&Interceptors::default());

    let loaded = namespace.load_class(&clock()).unwrap();
    assert_eq!(loaded.origin, Origin::Transformed);
    let signatures = ClassNode::parse(&loaded.bytes).unwrap().method_signatures();
    let direct = direct_method_name(&clock(), &unqualified("now"));
    assert!(signatures.contains(&String::from("now()J")));
    assert!(signatures.contains(&format!("{}()J", direct.as_str())));

    let dispatcher = dispatcher(namespace, ShadowMap::empty());
    let instance = new_clock(&dispatcher);
    assert_eq!(now(&dispatcher, &instance).unwrap(), Value::Long(42));

    let changed = dispatcher.install_registry(fixed_clock(1000));
    assert_eq!(changed.into_iter().collect::<Vec<_>>(), vec![clock()]);
    assert_eq!(now(&dispatcher, &instance).unwrap(), Value::Long(1000));

    dispatcher.install_registry(fixed_clock(2000));
    assert_eq!(now(&dispatcher, &instance).unwrap(), Value::Long(2000));

    dispatcher.install_registry(ShadowMap::empty());
    assert_eq!(now(&dispatcher, &instance).unwrap(), Value::Long(42));
}

#[test]
fn calls_in_flight_keep_their_shadow() {
    let entered = Arc::new(Barrier::new(2));
    let released = Arc::new(Barrier::new(2));
    let shadow = {
        let entered = entered.clone();
        let released = released.clone();
        ShadowClass::builder("org.example.ShadowClock")
            .implements("org.example.Clock")
            .implementation("now()J", move |_| {
                entered.wait();
                released.wait();
                Ok(Value::Long(1000))
            })
            .build()
            .unwrap()
    };
    let registry =
        ShadowMap::from_providers(vec![ShadowProvider::new("slow", 0).shadow(shadow)]).unwrap();
    let dispatcher = dispatcher(sandbox(&Interceptors::default()), registry);
    let instance = new_clock(&dispatcher);

    let in_flight = thread::scope(|scope| {
        let call = scope.spawn(|| now(&dispatcher, &instance));
        entered.wait();
        dispatcher.install_registry(fixed_clock(2000));
        released.wait();
        call.join().unwrap()
    });

    assert_eq!(in_flight.unwrap(), Value::Long(1000));
    assert_eq!(now(&dispatcher, &instance).unwrap(), Value::Long(2000));
}

#[test]
fn concurrent_calls_see_one_registry_or_the_other() {
    let dispatcher = dispatcher(sandbox(&Interceptors::default()), fixed_clock(1000));
    let instance = new_clock(&dispatcher);

    let results: Vec<Value> = thread::scope(|scope| {
        let callers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    (0..200)
                        .map(|_| now(&dispatcher, &instance).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for _ in 0..10 {
            dispatcher.install_registry(fixed_clock(2000));
            dispatcher.install_registry(fixed_clock(1000));
        }
        dispatcher.install_registry(fixed_clock(2000));
        callers
            .into_iter()
            .flat_map(|caller| caller.join().unwrap())
            .collect()
    });

    assert!(results
        .iter()
        .all(|result| *result == Value::Long(1000) || *result == Value::Long(2000)));
    assert_eq!(now(&dispatcher, &instance).unwrap(), Value::Long(2000));
}

#[test]
fn shadows_reach_subclasses_through_the_namespace() {
    let shadow = ShadowClass::builder("org.example.ShadowView")
        .implements("org.example.View")
        .call_through_by_default(false)
        .implementation("draw()V", |invocation| {
            let this = invocation.this.expect("instance method");
            this.set_field("drawn", Value::Boolean(true));
            Ok(Value::Void)
        })
        .build()
        .unwrap();
    let registry =
        ShadowMap::from_providers(vec![ShadowProvider::new("views", 0).shadow(shadow)]).unwrap();
    let dispatcher = dispatcher(sandbox(&Interceptors::default()), registry);

    let button_class = name("org/example/Button");
    let button = Instance::new(button_class.clone());
    dispatcher.on_instance_initializing(&button).unwrap();
    assert_eq!(
        button.shadow().map(|shadow| shadow.class().name().to_dotted()),
        Some(String::from("org.example.ShadowView"))
    );

    let draw = dispatcher
        .invoke(
            "org/example/Button/draw()V",
            false,
            &button_class,
            Some(&button),
            &[],
            |_| panic!("draw is shadowed"),
        )
        .unwrap();
    assert_eq!(draw, Value::Void);
    assert_eq!(button.get_field("drawn"), Value::Boolean(true));

    // Not calling through only applies to the shadowed class itself
    let plan = dispatcher
        .on_method_invoked("org/example/Button/layout()V", false, &button_class)
        .unwrap();
    assert!(matches!(plan, Plan::CallReal));
    let plan = dispatcher
        .on_method_invoked("org/example/View/layout()V", false, &name("org/example/View"))
        .unwrap();
    assert!(matches!(plan, Plan::DoNothing));
}

#[test]
fn shadow_failures_surface_cleaned() {
    let direct = direct_method_name(&clock(), &unqualified("now"));
    let shadow = ShadowClass::builder("org.example.ShadowClock")
        .implements("org.example.Clock")
        .implementation("now()J", move |_| {
            let frames = [
                ("org.example.ShadowClock", "now", Some("ShadowClock.java"), 12),
                ("org.shadowbox.internal.ShadowRuntime", "run", None, 40),
                ("org.example.Clock", direct.as_str(), Some("Clock.java"), -1),
                ("org.example.Clock", "now", Some("Clock.java"), -1),
                ("org.example.App", "main", Some("App.java"), 7),
            ];
            let failure = Failure::new("java.lang.IllegalStateException", Some("stopped"));
            Err(frames
                .into_iter()
                .fold(failure, |failure, (class, method, file, line)| {
                    failure.with_frame(StackFrame::new(class, method, file, line))
                }))
        })
        .build()
        .unwrap();
    let registry =
        ShadowMap::from_providers(vec![ShadowProvider::new("broken", 0).shadow(shadow)]).unwrap();
    let dispatcher = dispatcher(sandbox(&Interceptors::default()), registry);
    let instance = new_clock(&dispatcher);

    let failure = match now(&dispatcher, &instance) {
        Err(InvokeError::Thrown(failure)) => failure,
        other => panic!("expected a failure, got {:?}", other),
    };
    assert_eq!(failure.message.as_deref(), Some("stopped"));
    assert_eq!(
        failure.to_string(),
        "java.lang.IllegalStateException: stopped\n\
         \tat org.example.ShadowClock.now(ShadowClock.java:12)\n\
         \tat org.example.Clock.now(Clock.java)\n\
         \tat org.example.App.main(App.java:7)"
    );
}

#[test]
fn intercepted_calls_reach_their_interceptor() {
    let interceptors = Interceptors::new(vec![Interceptor::new(
        vec![MethodRef::new("java.lang.System", "currentTimeMillis")],
        |caller, receiver, _| {
            assert_eq!(caller.to_dotted(), "org.example.Clock");
            assert!(receiver.is_none());
            Ok(Value::Long(7))
        },
    )]);
    let intercepting = sandbox(&interceptors);
    let plain = sandbox(&Interceptors::default());

    let intercepted = intercepting.load_class(&clock()).unwrap();
    let untouched = plain.load_class(&clock()).unwrap();
    let mentions_intercept =
        |bytes: &[u8]| bytes.windows(b"intercept".len()).any(|window| window == b"intercept");
    assert!(mentions_intercept(&intercepted.bytes));
    assert!(!mentions_intercept(&untouched.bytes));

    let dispatcher = Dispatcher::new(
        Settings::default(),
        intercepting,
        ShadowMap::empty(),
        interceptors,
    );
    let result = dispatcher
        .on_intercepted_call("java/lang/System/currentTimeMillis()J", None, &[], &clock())
        .unwrap();
    assert_eq!(result, Value::Long(7));

    let fallback = dispatcher
        .on_intercepted_call("java/lang/System/nanoTime()J", None, &[], &clock())
        .unwrap();
    assert_eq!(fallback, Value::Long(0));
}
