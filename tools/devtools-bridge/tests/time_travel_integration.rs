use devtools_bridge::channel::MemoryChannel;
use devtools_bridge::devtools::{Devtools, DevtoolsOptions};
use devtools_bridge::host::{Execution, ExecutionContext, FunctionDetails, JsonHost};
use devtools_bridge::protocol::{DebuggerSignal, ExecutionId};
use devtools_bridge::state::{MutationOperator, StateContainer};
use serde_json::{json, Value};

fn context(id: &str) -> ExecutionContext {
    ExecutionContext {
        execution: Execution {
            id: ExecutionId::from(id),
            name: format!("sequence{id}"),
            datetime: 0,
            static_tree: None,
        },
    }
}

/// Apply a mutation to the live model and report it, the way an instrumented
/// host does.
fn mutate(
    devtools: &mut Devtools<MemoryChannel>,
    host: &mut JsonHost,
    execution: &str,
    method: &str,
    args: Value,
) {
    let args_list = args.as_array().cloned().unwrap_or_default();
    let operator = MutationOperator::from_call(method, &args_list).expect("operator");
    host.model.apply(&operator).expect("apply");
    let descriptor = json!({"type": "mutation", "method": method, "args": args});
    devtools
        .send(
            Some(&descriptor),
            &context(execution),
            FunctionDetails { function_index: 1 },
            &Value::Null,
        )
        .expect("send");
}

fn connected(initial: Value) -> (Devtools<MemoryChannel>, JsonHost, MemoryChannel) {
    let channel = MemoryChannel::default();
    let mut devtools = Devtools::new(DevtoolsOptions::default(), channel.clone());
    let mut host = JsonHost::new(initial);
    devtools.init(&mut host).expect("init");
    devtools
        .handle_signal(&mut host, DebuggerSignal::Pong)
        .expect("pong");
    (devtools, host, channel)
}

#[test]
fn counter_travels_between_executions() {
    let (mut devtools, mut host, _channel) = connected(json!({"count": 0}));
    mutate(&mut devtools, &mut host, "A", "set", json!([["count"], 1]));
    mutate(&mut devtools, &mut host, "B", "set", json!([["count"], 2]));
    assert_eq!(host.model.get(), json!({"count": 2}));

    devtools
        .handle_signal(&mut host, DebuggerSignal::Remember(ExecutionId::from("A")))
        .expect("remember A");
    assert_eq!(host.model.get(), json!({"count": 1}));

    devtools
        .handle_signal(&mut host, DebuggerSignal::Remember(ExecutionId::from("B")))
        .expect("remember B");
    assert_eq!(host.model.get(), json!({"count": 2}));

    assert_eq!(host.emitted.len(), 2);
    assert!(host
        .emitted
        .iter()
        .all(|event| event.event == "flush" && event.force));
}

#[test]
fn interleaved_executions_replay_through_last_occurrence() {
    let (mut devtools, mut host, _channel) = connected(json!({"list": []}));
    mutate(&mut devtools, &mut host, "A", "push", json!([["list"], "a1"]));
    mutate(&mut devtools, &mut host, "B", "push", json!([["list"], "b1"]));
    mutate(&mut devtools, &mut host, "A", "push", json!([["list"], "a2"]));
    mutate(&mut devtools, &mut host, "C", "push", json!([["list"], "c1"]));

    let report = devtools
        .handle_signal(&mut host, DebuggerSignal::Remember(ExecutionId::from("A")))
        .expect("remember")
        .expect("report");
    assert_eq!(report.cutoff, Some(2));
    assert_eq!(report.replayed, 3);
    assert_eq!(host.model.get(), json!({"list": ["a1", "b1", "a2"]}));
}

#[test]
fn unknown_execution_resets_to_the_initial_model() {
    let (mut devtools, mut host, _channel) = connected(json!({"user": {"name": "ada"}}));
    mutate(
        &mut devtools,
        &mut host,
        "A",
        "merge",
        json!([["user"], {"admin": true}]),
    );
    assert_eq!(host.model.get(), json!({"user": {"name": "ada", "admin": true}}));

    let report = devtools
        .handle_signal(&mut host, DebuggerSignal::Remember(ExecutionId::from("Z")))
        .expect("remember")
        .expect("report");
    assert_eq!(report.cutoff, None);
    assert!(report.reset);
    assert_eq!(host.model.get(), json!({"user": {"name": "ada"}}));
}

#[test]
fn snapshot_is_unaffected_by_live_mutations() {
    let (mut devtools, mut host, _channel) = connected(json!({"count": 0}));
    let fingerprint = devtools.snapshot().expect("snapshot").fingerprint().to_string();
    mutate(&mut devtools, &mut host, "A", "increment", json!([["count"], 5]));
    assert_eq!(host.model.get(), json!({"count": 5}));

    let snapshot = devtools.snapshot().expect("snapshot");
    assert_eq!(snapshot.fingerprint(), fingerprint);
    assert_eq!(snapshot.restore().expect("restore"), json!({"count": 0}));
}
