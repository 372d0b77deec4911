//! The call surface against a fake remote runtime.

mod support;

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use exobridge::Arg;
use exobridge::Bridge;
use exobridge::CallTimeout;
use exobridge::Error;
use exobridge::FaultMode;
use exobridge::NodeId;
use exobridge::UsageError;
use exobridge::Value;

use support::Behaviour;
use support::COUNTABLE;
use support::COUNTER;
use support::OBJECT;
use support::STRING;

async fn connected(name: &str) -> anyhow::Result<(Arc<Bridge>, NodeId, Arc<support::Stats>)> {
    let (bridge, stats) = support::bridge(&[Behaviour::Normal]);
    let id = bridge.start(support::config(name)).await?;
    Ok((bridge, id, stats))
}

fn args(values: Vec<Value>) -> Vec<Arg> {
    values.into_iter().map(Arg::from).collect()
}

#[tokio::test]
async fn test_construct_invoke_and_fields() -> anyhow::Result<()> {
    let (bridge, id, _stats) = connected("fields").await?;
    let mut ctx = bridge.context();

    let counter = bridge.construct(&mut ctx, id, COUNTER, &args(vec![Value::Int(5)])).await?;
    assert!(matches!(counter, Value::Ref(exobridge::Reference::Object(_))));

    assert_eq!(bridge.invoke(&mut ctx, &counter, "add", &args(vec![Value::Int(3)])).await?, Value::Int(8));
    assert_eq!(bridge.get_field(&mut ctx, &counter, "count").await?, Value::Int(8));

    bridge.set_field(&mut ctx, &counter, "count", 1i64).await?;
    assert_eq!(bridge.invoke(&mut ctx, &counter, "get", &[]).await?, Value::Int(1));
    assert_eq!(bridge.type_of(&mut ctx, &counter).await?, COUNTER);
    Ok(())
}

#[tokio::test]
async fn test_static_members() -> anyhow::Result<()> {
    let (bridge, id, _stats) = connected("statics").await?;
    let mut ctx = bridge.context();

    let twice = bridge.invoke_static(&mut ctx, id, COUNTER, "twice", &args(vec![Value::Int(21)])).await?;
    assert_eq!(twice, Value::Int(42));

    bridge.construct(&mut ctx, id, COUNTER, &[]).await?;
    bridge.construct(&mut ctx, id, COUNTER, &[]).await?;
    assert_eq!(bridge.get_static_field(&mut ctx, id, COUNTER, "created").await?, Value::Int(2));

    bridge.set_static_field(&mut ctx, id, COUNTER, "created", 10i64).await?;
    assert_eq!(bridge.get_static_field(&mut ctx, id, COUNTER, "created").await?, Value::Int(10));
    Ok(())
}

#[tokio::test]
async fn test_values_survive_a_round_trip() -> anyhow::Result<()> {
    let (bridge, id, _stats) = connected("echo").await?;
    let mut ctx = bridge.context();

    let samples = vec![
        Value::Null,
        Value::Bool(true),
        Value::Int(-7),
        Value::Int(i64::MAX),
        Value::Float(2.5),
        Value::Char('λ'),
        Value::Str("hello, world".into()),
        Value::Array(vec![]),
        Value::Array(vec![Value::Int(1), Value::Array(vec![Value::Str("nested".into()), Value::Null])]),
    ];
    for sample in samples {
        let echoed = bridge
            .invoke_static(&mut ctx, id, COUNTER, "echo", &[Arg::from(sample.clone())])
            .await?;
        assert_eq!(echoed, sample);
    }

    for sample in [f64::INFINITY, f64::NEG_INFINITY] {
        let echoed = bridge
            .invoke_static(&mut ctx, id, COUNTER, "echo", &[Arg::from(Value::Float(sample))])
            .await?;
        assert_eq!(echoed, Value::Float(sample));
    }
    let echoed = bridge
        .invoke_static(&mut ctx, id, COUNTER, "echo", &[Arg::from(Value::Float(f64::NAN))])
        .await?;
    assert!(matches!(echoed, Value::Float(x) if x.is_nan()), "{:?}", echoed);

    let counter = bridge.construct(&mut ctx, id, COUNTER, &[]).await?;
    let echoed = bridge.invoke_static(&mut ctx, id, COUNTER, "echo", &[Arg::from(counter.clone())]).await?;
    assert_eq!(echoed, counter);
    Ok(())
}

#[tokio::test]
async fn test_arrays_and_strings() -> anyhow::Result<()> {
    let (bridge, id, _stats) = connected("convert").await?;
    let mut ctx = bridge.context();

    let values = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
    let array = bridge.new_array(&mut ctx, id, "long", &values).await?;
    assert!(array.reference().is_some());
    assert_eq!(bridge.array_to_list(&mut ctx, &array).await?, Value::Array(values));

    let string = bridge.new_string(&mut ctx, id, "héllo").await?;
    assert_eq!(bridge.string_to_local(&mut ctx, &string).await?, Value::Str("héllo".into()));
    assert_eq!(bridge.invoke(&mut ctx, &string, "length", &[]).await?, Value::Int(5));
    assert!(bridge.instance_of(&mut ctx, &string, "java.lang.CharSequence").await?);
    Ok(())
}

#[tokio::test]
async fn test_instance_of_follows_supertypes() -> anyhow::Result<()> {
    let (bridge, id, _stats) = connected("types").await?;
    let mut ctx = bridge.context();
    let counter = bridge.construct(&mut ctx, id, COUNTER, &[]).await?;

    assert!(bridge.instance_of(&mut ctx, &counter, COUNTER).await?);
    assert!(bridge.instance_of(&mut ctx, &counter, COUNTABLE).await?);
    assert!(bridge.instance_of(&mut ctx, &counter, OBJECT).await?);
    assert!(!bridge.instance_of(&mut ctx, &counter, STRING).await?);
    assert!(!bridge.instance_of(&mut ctx, &Value::Null, OBJECT).await?);

    assert!(bridge.is_subtype(id, COUNTER, COUNTABLE).await?);
    assert!(!bridge.is_subtype(id, OBJECT, COUNTER).await?);
    Ok(())
}

#[tokio::test]
async fn test_faults_as_errors() -> anyhow::Result<()> {
    let (bridge, id, _stats) = connected("strict").await?;
    let mut ctx = bridge.context();
    let counter = bridge.construct(&mut ctx, id, COUNTER, &[]).await?;

    let err = bridge.invoke(&mut ctx, &counter, "boom", &[]).await.unwrap_err();
    let fault = err.remote_fault().expect("remote fault").clone();
    assert_eq!(fault.class, "java.lang.IllegalStateException");
    assert_eq!(fault.message, "boom");

    let exception = Value::Ref(fault.exception.expect("exception object"));
    let trace = bridge.stack_trace(&mut ctx, &exception).await?;
    assert_eq!(trace[0], "demo.Counter.boom(Counter.java:42)");
    assert!(bridge.instance_of(&mut ctx, &exception, "java.lang.RuntimeException").await?);

    assert_eq!(bridge.invoke(&mut ctx, &counter, "get", &[]).await?, Value::Int(0));
    Ok(())
}

#[tokio::test]
async fn test_faults_as_values() -> anyhow::Result<()> {
    let (bridge, _stats) = support::bridge(&[Behaviour::Normal]);
    let config = support::config("lenient").with_fault_mode(FaultMode::AsValue);
    let id = bridge.start(config).await?;
    let mut ctx = bridge.context();
    let counter = bridge.construct(&mut ctx, id, COUNTER, &[]).await?;

    let outcome = bridge.invoke(&mut ctx, &counter, "boom", &[]).await?;
    let Value::Fault(fault) = &outcome else {
        panic!("expected a fault value, got {:?}", outcome);
    };
    assert_eq!(fault.message, "boom");

    let trace = bridge.stack_trace(&mut ctx, &outcome).await?;
    assert_eq!(trace.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_timeout_leaves_node_usable() -> anyhow::Result<()> {
    let (bridge, id, _stats) = connected("slow").await?;
    let mut ctx = bridge.context();
    let counter = bridge.construct(&mut ctx, id, COUNTER, &[]).await?;

    ctx.set_timeout(Some(CallTimeout::millis(50)));
    let started = Instant::now();
    let err = bridge.invoke(&mut ctx, &counter, "stall", &[]).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_millis(500));

    assert_eq!(bridge.invoke(&mut ctx, &counter, "add", &args(vec![Value::Int(2)])).await?, Value::Int(2));
    assert_eq!(bridge.state(id), Some(exobridge::NodeState::Connected));
    Ok(())
}

#[tokio::test]
async fn test_contexts_get_distinct_workers() -> anyhow::Result<()> {
    let (bridge, id, stats) = connected("workers").await?;
    let mut first = bridge.context();
    let mut second = bridge.context();

    bridge.construct(&mut first, id, COUNTER, &[]).await?;
    bridge.construct(&mut second, id, COUNTER, &[]).await?;
    let a = bridge.worker_of(&first, id).expect("first worker");
    let b = bridge.worker_of(&second, id).expect("second worker");
    assert_ne!(a, b);

    bridge.construct(&mut first, id, COUNTER, &[]).await?;
    assert_eq!(bridge.worker_of(&first, id), Some(a));
    assert_eq!(stats.new_threads(), 2);

    bridge.is_subtype(id, COUNTER, OBJECT).await?;
    let mut idle = bridge.context();
    bridge.get_static_field(&mut idle, id, COUNTER, "created").await?;
    assert_eq!(stats.new_threads(), 3);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_resolution_describes_once() -> anyhow::Result<()> {
    let (bridge, id, stats) = connected("crowd").await?;

    let mut tasks = Vec::new();
    for i in 0..16i64 {
        let bridge = bridge.clone();
        tasks.push(tokio::spawn(async move {
            let mut ctx = bridge.context();
            let counter = bridge.construct(&mut ctx, id, COUNTER, &args(vec![Value::Int(i)])).await?;
            bridge.invoke(&mut ctx, &counter, "get", &[]).await
        }));
    }
    let mut seen = Vec::new();
    for task in tasks {
        seen.push(task.await??);
    }

    assert_eq!(stats.describes(COUNTER), 1);
    assert_eq!(stats.new_threads(), 16);
    seen.sort_by_key(|v| match v {
        Value::Int(i) => *i,
        _ => -1,
    });
    assert_eq!(seen, (0..16).map(Value::Int).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_usage_errors_are_local() -> anyhow::Result<()> {
    let (bridge, id, stats) = connected("careless").await?;
    let mut ctx = bridge.context();

    let err = bridge.invoke(&mut ctx, &Value::Null, "get", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::NullReceiver)));

    let err = bridge.get_field(&mut ctx, &Value::Int(3), "count").await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::NotAnObject("int"))));

    let counter = bridge.construct(&mut ctx, id, COUNTER, &[]).await?;
    let err = bridge.invoke(&mut ctx, &counter, "nope", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::NoSuchMember { .. })));
    assert!(err.is_usage());

    let threads = stats.new_threads();
    let err = bridge.construct(&mut ctx, id, COUNTER, &args(vec![Value::Int(1), Value::Int(2)])).await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::NoSuchMember { .. })));
    assert_eq!(stats.new_threads(), threads);
    Ok(())
}

#[tokio::test]
async fn test_references_stay_on_their_node() -> anyhow::Result<()> {
    let (bridge, _stats) = support::bridge(&[Behaviour::Normal]);
    let a = bridge.start(support::config("left")).await?;
    let b = bridge.start(support::config("right")).await?;
    let mut ctx = bridge.context();

    let counter = bridge.construct(&mut ctx, a, COUNTER, &[]).await?;
    let err = bridge
        .invoke_static(&mut ctx, b, COUNTER, "echo", &[Arg::from(counter)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::ForeignReference { node, .. }) if node == b));
    Ok(())
}

#[tokio::test]
async fn test_unknown_type_is_not_cached() -> anyhow::Result<()> {
    let (bridge, id, stats) = connected("missing").await?;
    let mut ctx = bridge.context();

    for _ in 0..2 {
        let err = bridge.construct(&mut ctx, id, "demo.Missing", &[]).await.unwrap_err();
        let fault = err.remote_fault().expect("remote fault");
        assert_eq!(fault.class, "java.lang.ClassNotFoundException");
    }
    assert!(bridge.metadata().get(id, "demo.Missing").is_none());
    assert_eq!(stats.describes("demo.Missing"), 2);
    Ok(())
}

#[tokio::test]
async fn test_free_releases_object() -> anyhow::Result<()> {
    let (bridge, id, _stats) = connected("frugal").await?;
    let mut ctx = bridge.context();
    let counter = bridge.construct(&mut ctx, id, COUNTER, &[]).await?;
    let kept = bridge.construct(&mut ctx, id, COUNTER, &[]).await?;
    bridge.invoke(&mut ctx, &counter, "get", &[]).await?;

    let reference = counter.reference().unwrap();
    bridge.free(&mut ctx, reference).await?;
    assert!(bridge.metadata().class_binding(&reference).is_none());

    let err = bridge.invoke(&mut ctx, &counter, "get", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::InvalidReference(r)) if r == reference));

    let err = bridge
        .invoke_static(&mut ctx, id, COUNTER, "echo", &[Arg::from(Value::Array(vec![counter.clone()]))])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::InvalidReference(_))));

    let err = bridge.free(&mut ctx, reference).await.unwrap_err();
    assert!(err.is_usage());

    assert_eq!(bridge.invoke(&mut ctx, &kept, "get", &[]).await?, Value::Int(0));
    Ok(())
}
