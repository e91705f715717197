//! DAG manager scheduling and bypass tests.

use std::collections::BTreeMap;

use serde_json::json;

use pflow_config::Node;
use pflow_dag::{DagError, DagManager};
use pflow_types::{NodeState, ParamSpec, Value};

fn node(yaml: &str) -> Node {
    serde_yaml::from_str(yaml).unwrap()
}

fn inputs(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn names(nodes: &[Node]) -> Vec<&str> {
    nodes.iter().map(|n| n.name.as_str()).collect()
}

#[test]
fn ready_set_follows_completions() {
    let mut dag = DagManager::new(
        vec![
            node("name: a\ntool: t\ninputs:\n  x: ${flow.x}"),
            node("name: b\ntool: t\ninputs:\n  a: ${a.output}"),
            node("name: c\ntool: t\ninputs:\n  b: ${b.output}"),
        ],
        inputs(&[("x", json!(1))]),
    );

    assert_eq!(names(&dag.pop_ready_nodes()), ["a"]);
    // Nothing new until `a` completes.
    assert!(dag.pop_ready_nodes().is_empty());

    dag.complete("a", json!(2));
    assert_eq!(names(&dag.pop_ready_nodes()), ["b"]);
    dag.complete("b", json!(4));
    assert_eq!(names(&dag.pop_ready_nodes()), ["c"]);
    dag.complete("c", json!(1));
    assert!(dag.completed());
}

#[test]
fn independent_nodes_pop_together() {
    let mut dag = DagManager::new(
        vec![
            node("name: root\ntool: t"),
            node("name: left\ntool: t\ninputs:\n  x: ${root.output}"),
            node("name: right\ntool: t\ninputs:\n  x: ${root.output}"),
        ],
        BTreeMap::new(),
    );
    assert_eq!(names(&dag.pop_ready_nodes()), ["root"]);
    dag.complete("root", json!(0));
    assert_eq!(names(&dag.pop_ready_nodes()), ["left", "right"]);
}

#[test]
fn skip_and_activate_bindings_gate_readiness() {
    let mut dag = DagManager::new(
        vec![
            node("name: gate\ntool: t"),
            node(
                "name: guarded\ntool: t\nactivate:\n  when: ${gate.output}\n  is: true",
            ),
        ],
        BTreeMap::new(),
    );
    // `guarded` has no inputs, but its activate condition references `gate`.
    assert_eq!(names(&dag.pop_ready_nodes()), ["gate"]);
    assert!(dag.pop_ready_nodes().is_empty());
    dag.complete("gate", json!(true));
    assert_eq!(names(&dag.pop_ready_nodes()), ["guarded"]);
}

#[test]
fn fired_skip_records_bypass_with_return_value() {
    let mut dag = DagManager::new(
        vec![
            node("name: fallback\ntool: t"),
            node(
                "name: guarded\ntool: t\nskip:\n  when: ${flow.force}\n  is: true\n  return: ${fallback.output}\ninputs:\n  text: hello",
            ),
            node("name: consumer\ntool: t\ninputs:\n  text: ${guarded.output}"),
        ],
        inputs(&[("force", json!(true))]),
    );

    assert!(dag.pop_bypassable_nodes().unwrap().is_empty());
    assert_eq!(names(&dag.pop_ready_nodes()), ["fallback"]);
    dag.complete("fallback", json!("fallback"));

    let bypassed = dag.pop_bypassable_nodes().unwrap();
    assert_eq!(names(&bypassed), ["guarded"]);
    // Dual membership: bypassed, yet with an observable output.
    assert_eq!(
        dag.state("guarded"),
        Some(&NodeState::Bypassed { return_value: Some(json!("fallback")) })
    );
    assert_eq!(dag.output_of("guarded"), Some(&json!("fallback")));

    // The consumer runs and reads the recorded return value.
    let ready = dag.pop_ready_nodes();
    assert_eq!(names(&ready), ["consumer"]);
    let params = dag.get_valid_inputs(&ready[0], &[ParamSpec::required("text")]).unwrap();
    assert_eq!(params["text"], json!("fallback"));
}

#[test]
fn unfired_skip_runs_the_node() {
    let mut dag = DagManager::new(
        vec![
            node("name: fallback\ntool: t"),
            node(
                "name: guarded\ntool: t\nskip:\n  when: ${flow.force}\n  is: true\n  return: ${fallback.output}",
            ),
        ],
        inputs(&[("force", json!(false))]),
    );
    assert_eq!(names(&dag.pop_ready_nodes()), ["fallback"]);
    dag.complete("fallback", json!("unused"));
    assert!(dag.pop_bypassable_nodes().unwrap().is_empty());
    assert_eq!(names(&dag.pop_ready_nodes()), ["guarded"]);
}

#[test]
fn skip_return_into_bypassed_node_fails() {
    let mut dag = DagManager::new(
        vec![
            node(
                "name: gated\ntool: t\nactivate:\n  when: ${flow.gate}\n  is: \"on\"",
            ),
            node(
                "name: guarded\ntool: t\nskip:\n  when: ${flow.force}\n  is: true\n  return: ${gated.output}",
            ),
        ],
        inputs(&[("gate", json!("off")), ("force", json!(true))]),
    );

    // `gated` commits its bypass first; `guarded`'s skip return then fails.
    let failure = dag.pop_bypassable_nodes().unwrap_err();
    assert_eq!(failure.node, "guarded");
    assert_eq!(failure.source, DagError::ReferenceNodeBypassed { reference: "gated".into() });
    // The failure does not roll back the sibling's already-decided bypass.
    assert_eq!(dag.state("gated"), Some(&NodeState::Bypassed { return_value: None }));
}

#[test]
fn activate_not_met_bypasses_without_output() {
    let mut dag = DagManager::new(
        vec![node(
            "name: guarded\ntool: t\nactivate:\n  when: ${flow.gate}\n  is: \"on\"",
        )],
        inputs(&[("gate", json!("off"))]),
    );
    assert_eq!(names(&dag.pop_bypassable_nodes().unwrap()), ["guarded"]);
    assert_eq!(dag.state("guarded"), Some(&NodeState::Bypassed { return_value: None }));
    assert_eq!(dag.output_of("guarded"), None);
}

#[test]
fn activate_condition_on_bypassed_node_bypasses() {
    let mut dag = DagManager::new(
        vec![
            node("name: gate\ntool: t\nactivate:\n  when: ${flow.run}\n  is: true"),
            node(
                "name: follower\ntool: t\nactivate:\n  when: ${gate.output}\n  is: true",
            ),
        ],
        inputs(&[("run", json!(false))]),
    );
    // Bypass cascades through the activate chain within one scan: each
    // bypass is committed as decided, so `follower` sees it immediately.
    assert_eq!(names(&dag.pop_bypassable_nodes().unwrap()), ["gate", "follower"]);
    assert!(dag.completed());
}

#[test]
fn activate_compares_values_structurally() {
    let mut dag = DagManager::new(
        vec![node(
            "name: guarded\ntool: t\nactivate:\n  when: ${flow.choice}\n  is:\n    kind: a\n    level: 2",
        )],
        inputs(&[("choice", json!({"kind": "a", "level": 2}))]),
    );
    assert!(dag.pop_bypassable_nodes().unwrap().is_empty());
    assert_eq!(names(&dag.pop_ready_nodes()), ["guarded"]);
}

#[test]
fn all_node_reference_inputs_bypassed_propagates() {
    let mut dag = DagManager::new(
        vec![
            node("name: gated\ntool: t\nactivate:\n  when: ${flow.gate}\n  is: true"),
            node(
                "name: downstream\ntool: t\ninputs:\n  x: ${gated.output}\n  tag: literal",
            ),
        ],
        inputs(&[("gate", json!(false))]),
    );
    // The literal input does not save `downstream`: every node reference is
    // bypassed, and the propagation lands in the same scan.
    assert_eq!(names(&dag.pop_bypassable_nodes().unwrap()), ["gated", "downstream"]);
}

#[test]
fn node_without_references_never_bypassed_by_propagation() {
    let mut dag = DagManager::new(
        vec![node("name: standalone\ntool: t\ninputs:\n  x: 1")],
        BTreeMap::new(),
    );
    assert!(dag.pop_bypassable_nodes().unwrap().is_empty());
    assert_eq!(names(&dag.pop_ready_nodes()), ["standalone"]);
}

#[test]
fn mixed_bypassed_and_completed_references_still_run() {
    let mut dag = DagManager::new(
        vec![
            node("name: gated\ntool: t\nactivate:\n  when: ${flow.gate}\n  is: true"),
            node("name: live\ntool: t"),
            node(
                "name: downstream\ntool: t\ninputs:\n  a: ${gated.output}\n  b: ${live.output}",
            ),
        ],
        inputs(&[("gate", json!(false))]),
    );
    assert_eq!(names(&dag.pop_bypassable_nodes().unwrap()), ["gated"]);
    assert_eq!(names(&dag.pop_ready_nodes()), ["live"]);
    dag.complete("live", json!(7));
    assert!(dag.pop_bypassable_nodes().unwrap().is_empty());
    assert_eq!(names(&dag.pop_ready_nodes()), ["downstream"]);
}

#[test]
fn valid_inputs_elide_defaults_and_null_required() {
    let mut dag = DagManager::new(
        vec![
            node("name: gated\ntool: t\nactivate:\n  when: ${flow.gate}\n  is: true"),
            node("name: live\ntool: t"),
            node(
                "name: downstream\ntool: t\ninputs:\n  a: ${live.output}\n  b: ${gated.output}\n  c: ${gated.output}",
            ),
        ],
        inputs(&[("gate", json!(false))]),
    );
    assert_eq!(names(&dag.pop_bypassable_nodes().unwrap()), ["gated"]);
    assert_eq!(names(&dag.pop_ready_nodes()), ["live"]);
    dag.complete("live", json!(10));
    let ready = dag.pop_ready_nodes();
    assert_eq!(names(&ready), ["downstream"]);

    let signature = [
        ParamSpec::required("a"),
        ParamSpec::with_default("b"),
        ParamSpec::required("c"),
    ];
    let params = dag.get_valid_inputs(&ready[0], &signature).unwrap();
    // `b` is omitted so the callable default wins; `c` is nulled.
    assert_eq!(params.get("a"), Some(&json!(10)));
    assert_eq!(params.get("b"), None);
    assert_eq!(params.get("c"), Some(&Value::Null));
}

#[test]
fn complete_is_idempotent_under_same_value() {
    let mut dag =
        DagManager::new(vec![node("name: a\ntool: t")], BTreeMap::new());
    assert_eq!(names(&dag.pop_ready_nodes()), ["a"]);
    dag.complete("a", json!(5));
    dag.complete("a", json!(5));
    assert_eq!(dag.output_of("a"), Some(&json!(5)));
}

#[test]
fn seeded_outputs_feed_scheduling() {
    let agg = node("name: summarize\ntool: sum\naggregation: true\ninputs:\n  values: ${collect.output}");
    let mut dag = DagManager::with_completed(
        vec![agg],
        BTreeMap::new(),
        BTreeMap::from([("collect".to_string(), json!([10, Value::Null]))]),
    );
    let ready = dag.pop_ready_nodes();
    assert_eq!(names(&ready), ["summarize"]);
    let params = dag.get_valid_inputs(&ready[0], &[ParamSpec::required("values")]).unwrap();
    assert_eq!(params["values"], json!([10, Value::Null]));
}
