//! Value resolution for input bindings.

use std::collections::BTreeMap;

use pflow_config::InputBinding;
use pflow_types::{NodeName, NodeState, Value};

use super::DagError;

/// Resolve a binding against the line's flow inputs and node states.
///
/// Fails with [`DagError::ReferenceNodeBypassed`] when the binding points at
/// a node that was bypassed without an observable output, and with
/// [`DagError::InvalidReference`] for unknown names or dead paths.
pub fn resolve_binding(
    binding: &InputBinding,
    flow_inputs: &BTreeMap<String, Value>,
    states: &BTreeMap<NodeName, NodeState>,
) -> Result<Value, DagError> {
    match binding {
        InputBinding::Literal(value) => Ok(value.clone()),
        InputBinding::FlowInput { name } => flow_inputs
            .get(name)
            .cloned()
            .ok_or_else(|| DagError::invalid(format!("${{flow.{name}}}"), "no such flow input")),
        InputBinding::NodeRef { node, path } => {
            let state = states.get(node).ok_or_else(|| {
                DagError::invalid(format!("${{{node}.output}}"), "no such node")
            })?;
            let output = match state.output() {
                Some(output) => output,
                None => return Err(DagError::ReferenceNodeBypassed { reference: node.clone() }),
            };
            descend(output, path, node)
        }
    }
}

/// Walk a dotted path through an output value. Object keys and numeric list
/// indices are supported; anything else is a dead path.
fn descend(output: &Value, path: &[String], node: &str) -> Result<Value, DagError> {
    let mut current = output;
    for (i, segment) in path.iter().enumerate() {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
            _ => None,
        };
        current = next.ok_or_else(|| {
            let walked = path[..=i].join(".");
            DagError::invalid(
                format!("${{{node}.output.{}}}", path.join(".")),
                format!("path `{walked}` not found in output"),
            )
        })?;
    }
    Ok(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn states_with(node: &str, state: NodeState) -> BTreeMap<NodeName, NodeState> {
        BTreeMap::from([(node.to_string(), state)])
    }

    #[test]
    fn literal_passes_through() {
        let v = resolve_binding(
            &InputBinding::literal(json!({"k": 1})),
            &BTreeMap::new(),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(v, json!({"k": 1}));
    }

    #[test]
    fn path_descends_objects_and_arrays() {
        let states = states_with(
            "search",
            NodeState::Completed { output: json!({"hits": [{"title": "first"}]}) },
        );
        let binding = InputBinding::NodeRef {
            node: "search".into(),
            path: vec!["hits".into(), "0".into(), "title".into()],
        };
        assert_eq!(resolve_binding(&binding, &BTreeMap::new(), &states).unwrap(), json!("first"));
    }

    #[test]
    fn dead_path_is_invalid_reference() {
        let states = states_with("search", NodeState::Completed { output: json!({"hits": []}) });
        let binding =
            InputBinding::NodeRef { node: "search".into(), path: vec!["misses".into()] };
        let err = resolve_binding(&binding, &BTreeMap::new(), &states).unwrap_err();
        assert!(matches!(err, DagError::InvalidReference { .. }));
    }

    #[test]
    fn bypassed_without_output_fails() {
        let states = states_with("gate", NodeState::Bypassed { return_value: None });
        let binding = InputBinding::NodeRef { node: "gate".into(), path: vec![] };
        let err = resolve_binding(&binding, &BTreeMap::new(), &states).unwrap_err();
        assert_eq!(err, DagError::ReferenceNodeBypassed { reference: "gate".into() });
    }

    #[test]
    fn bypassed_with_return_value_resolves() {
        let states =
            states_with("gate", NodeState::Bypassed { return_value: Some(json!("fallback")) });
        let binding = InputBinding::NodeRef { node: "gate".into(), path: vec![] };
        assert_eq!(
            resolve_binding(&binding, &BTreeMap::new(), &states).unwrap(),
            json!("fallback")
        );
    }
}
