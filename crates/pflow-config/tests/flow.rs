//! Flow loading and validation tests.

use pflow_config::{Flow, FlowLoadError, InputBinding};

fn load(yaml: &str) -> Result<Flow, FlowLoadError> {
    Flow::from_yaml(yaml)
}

#[test]
fn loads_a_linear_flow() {
    let flow = load(
        r#"
name: linear
inputs:
  x:
    type: int
outputs:
  result: ${subtract.output}
nodes:
  - name: increment
    tool: add_one
    inputs:
      x: ${flow.x}
  - name: double
    tool: double
    inputs:
      a: ${increment.output}
  - name: subtract
    tool: sub_three
    inputs:
      b: ${double.output}
"#,
    )
    .unwrap();

    assert_eq!(flow.nodes.len(), 3);
    assert_eq!(
        flow.outputs["result"],
        InputBinding::NodeRef { node: "subtract".into(), path: vec![] }
    );
    let refs: Vec<&str> = flow.node("double").unwrap().node_references().collect();
    assert_eq!(refs, ["increment"]);
}

#[test]
fn skip_and_activate_bindings_join_the_dependency_graph() {
    let flow = load(
        r#"
name: conditional
inputs:
  force:
    type: bool
nodes:
  - name: fallback
    tool: echo
    inputs:
      text: fallback
  - name: guarded
    tool: echo
    skip:
      when: ${flow.force}
      is: true
      return: ${fallback.output}
    inputs:
      text: hello
"#,
    )
    .unwrap();

    let refs: Vec<&str> = flow.node("guarded").unwrap().node_references().collect();
    assert_eq!(refs, ["fallback"]);
}

#[test]
fn rejects_duplicate_node_names() {
    let err = load(
        "name: dup\nnodes:\n  - name: a\n    tool: echo\n  - name: a\n    tool: echo\n",
    )
    .unwrap_err();
    assert!(matches!(err, FlowLoadError::Validation(_)));
    assert!(err.to_string().contains("duplicate node name"));
}

#[test]
fn rejects_unknown_node_reference() {
    let err = load(
        "name: bad\nnodes:\n  - name: a\n    tool: echo\n    inputs:\n      x: ${missing.output}\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("unknown node `missing`"));
}

#[test]
fn rejects_undeclared_flow_input() {
    let err = load(
        "name: bad\nnodes:\n  - name: a\n    tool: echo\n    inputs:\n      x: ${flow.ghost}\n",
    )
    .unwrap_err();
    assert!(err.to_string().contains("undeclared flow input `ghost`"));
}

#[test]
fn rejects_skip_and_activate_on_one_node() {
    let err = load(
        r#"
name: bad
inputs:
  gate:
    type: string
nodes:
  - name: a
    tool: echo
    skip:
      when: ${flow.gate}
      is: "on"
      return: fallback
    activate:
      when: ${flow.gate}
      is: "on"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("both skip and activate"));
}

#[test]
fn rejects_aggregation_referenced_from_line_node() {
    let err = load(
        r#"
name: bad
nodes:
  - name: summarize
    tool: sum
    aggregation: true
  - name: consumer
    tool: echo
    inputs:
      x: ${summarize.output}
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("references aggregation node"));
}

#[test]
fn rejects_output_bound_to_aggregation_node() {
    let err = load(
        r#"
name: bad
outputs:
  total: ${summarize.output}
nodes:
  - name: produce
    tool: echo
  - name: summarize
    tool: sum
    aggregation: true
    inputs:
      values: ${produce.output}
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("output `total` references aggregation node"));
}

#[test]
fn rejects_cycles_with_path_in_message() {
    let err = load(
        r#"
name: cyclic
nodes:
  - name: a
    tool: echo
    inputs:
      x: ${c.output}
  - name: b
    tool: echo
    inputs:
      x: ${a.output}
  - name: c
    tool: echo
    inputs:
      x: ${b.output}
"#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowLoadError::Cycle { .. }));
    assert!(err.to_string().contains("->"));
}

#[test]
fn topo_levels_respect_references() {
    let flow = load(
        r#"
name: diamond
nodes:
  - name: root
    tool: echo
  - name: left
    tool: echo
    inputs:
      x: ${root.output}
  - name: right
    tool: echo
    inputs:
      x: ${root.output}
  - name: join
    tool: echo
    inputs:
      l: ${left.output}
      r: ${right.output}
"#,
    )
    .unwrap();

    let levels = flow.topo_levels();
    assert_eq!(levels[0], ["root"]);
    assert_eq!(levels[1], ["left", "right"]);
    assert_eq!(levels[2], ["join"]);
}
