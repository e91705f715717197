//! Flow definitions: top-level structure and load-time validation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use pflow_types::Value;

use super::{FlowLoadError, InputBinding, Node};

/// Type descriptor for a declared flow input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Int,
    Double,
    Bool,
    List,
    Object,
}

/// Declaration of one flow input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowInputSpec {
    #[serde(rename = "type")]
    pub kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A complete flow definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flow {
    pub name: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, FlowInputSpec>,
    #[serde(default)]
    pub outputs: BTreeMap<String, InputBinding>,
    pub nodes: Vec<Node>,
}

impl Flow {
    /// Parse and validate a flow from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, FlowLoadError> {
        let flow: Self = serde_yaml::from_str(yaml)?;
        flow.validate()?;
        Ok(flow)
    }

    /// Parse and validate a flow from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowLoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| FlowLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Nodes that participate in per-line execution.
    pub fn execution_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.aggregation)
    }

    /// Nodes scheduled only by the aggregation pass.
    pub fn aggregation_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.aggregation)
    }

    /// Validate the flow. Runs automatically in the `from_*` constructors.
    pub fn validate(&self) -> Result<(), FlowLoadError> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                return Err(FlowLoadError::Validation("node name cannot be empty".into()));
            }
            if node.name == "flow" {
                return Err(FlowLoadError::Validation("`flow` is a reserved node name".into()));
            }
            if !names.insert(node.name.as_str()) {
                return Err(FlowLoadError::Validation(format!(
                    "duplicate node name: `{}`",
                    node.name
                )));
            }
            if node.skip.is_some() && node.activate.is_some() {
                return Err(FlowLoadError::Validation(format!(
                    "node `{}` has both skip and activate; at most one is allowed",
                    node.name
                )));
            }
        }

        self.check_references(&names)?;
        self.check_aggregation_edges()?;
        self.check_cycles()?;
        Ok(())
    }

    /// Every reference must point at a known node or a declared flow input.
    fn check_references(&self, names: &HashSet<&str>) -> Result<(), FlowLoadError> {
        let check = |binding: &InputBinding, owner: &str| match binding {
            InputBinding::NodeRef { node, .. } if !names.contains(node.as_str()) => {
                Err(FlowLoadError::Validation(format!(
                    "`{owner}` references unknown node `{node}`"
                )))
            }
            InputBinding::FlowInput { name } if !self.inputs.contains_key(name) => {
                Err(FlowLoadError::Validation(format!(
                    "`{owner}` references undeclared flow input `{name}`"
                )))
            }
            _ => Ok(()),
        };

        for node in &self.nodes {
            for dep in node.dependencies() {
                check(dep, &node.name)?;
            }
        }
        for (output, binding) in &self.outputs {
            check(binding, &format!("output:{output}"))?;
        }
        Ok(())
    }

    /// Aggregation nodes may only be referenced from other aggregation
    /// nodes. Declared outputs materialize per line, so they may not point
    /// at aggregation nodes either.
    fn check_aggregation_edges(&self) -> Result<(), FlowLoadError> {
        let aggregation: HashSet<&str> =
            self.aggregation_nodes().map(|n| n.name.as_str()).collect();
        for node in self.execution_nodes() {
            for target in node.node_references() {
                if aggregation.contains(target) {
                    return Err(FlowLoadError::Validation(format!(
                        "node `{}` references aggregation node `{target}`",
                        node.name
                    )));
                }
            }
        }
        for (output, binding) in &self.outputs {
            if let Some(target) = binding.node_ref()
                && aggregation.contains(target)
            {
                return Err(FlowLoadError::Validation(format!(
                    "output `{output}` references aggregation node `{target}`"
                )));
            }
        }
        Ok(())
    }

    /// DFS cycle detection over the reference graph.
    fn check_cycles(&self) -> Result<(), FlowLoadError> {
        // Adjacency list: node -> nodes that reference it
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in &self.nodes {
            for target in node.node_references() {
                dependents.entry(target).or_default().push(&node.name);
            }
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        for node in &self.nodes {
            if !visited.contains(node.name.as_str())
                && let Some(path) =
                    detect_cycle(&node.name, &dependents, &mut visited, &mut rec_stack)
            {
                return Err(FlowLoadError::Cycle { path });
            }
        }
        Ok(())
    }

    /// Group nodes into dependency levels; every node's references live in an
    /// earlier level. Used for flow inspection.
    pub fn topo_levels(&self) -> Vec<Vec<&str>> {
        let mut placed: HashSet<&str> = HashSet::new();
        let mut levels = Vec::new();
        while placed.len() < self.nodes.len() {
            let level: Vec<&str> = self
                .nodes
                .iter()
                .filter(|n| !placed.contains(n.name.as_str()))
                .filter(|n| n.node_references().all(|t| placed.contains(t)))
                .map(|n| n.name.as_str())
                .collect();
            if level.is_empty() {
                break; // unreachable after validation; avoid spinning on a cycle
            }
            placed.extend(level.iter().copied());
            levels.push(level);
        }
        levels
    }
}

/// DFS-based cycle detection. Returns the cycle path if found.
fn detect_cycle<'a>(
    node: &'a str,
    dependents: &HashMap<&str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);

    if let Some(neighbors) = dependents.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if let Some(mut cycle) = detect_cycle(neighbor, dependents, visited, rec_stack) {
                    cycle.insert(0, node.to_string());
                    return Some(cycle);
                }
            } else if rec_stack.contains(neighbor) {
                return Some(vec![node.to_string(), neighbor.to_string()]);
            }
        }
    }

    rec_stack.remove(node);
    None
}
