//! Per-line DAG state and scheduling decisions.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use pflow_config::{InputBinding, Node};
use pflow_types::{NodeName, NodeState, ParamSpec, Value};

use super::{DagError, NodeFailure, resolve_binding};

/// What to do with a ready node.
enum Decision {
    Run,
    Bypass(Option<Value>),
}

/// Owns one line's pending/terminal node sets and makes every scheduling
/// decision: readiness, bypass, parameter assembly, and output recording.
///
/// The manager is owned by exactly one line execution and performs no
/// blocking work.
pub struct DagManager {
    nodes: Vec<Node>,
    flow_inputs: BTreeMap<String, Value>,
    pending: BTreeSet<NodeName>,
    states: BTreeMap<NodeName, NodeState>,
}

impl DagManager {
    pub fn new(nodes: Vec<Node>, flow_inputs: BTreeMap<String, Value>) -> Self {
        Self::with_completed(nodes, flow_inputs, BTreeMap::new())
    }

    /// Create a manager with pre-recorded outputs for nodes outside the
    /// scheduled set. The aggregation pass seeds per-line vectors this way.
    pub fn with_completed(
        nodes: Vec<Node>,
        flow_inputs: BTreeMap<String, Value>,
        completed: BTreeMap<NodeName, Value>,
    ) -> Self {
        let pending: BTreeSet<NodeName> = nodes.iter().map(|n| n.name.clone()).collect();
        let mut states: BTreeMap<NodeName, NodeState> =
            nodes.iter().map(|n| (n.name.clone(), NodeState::Pending)).collect();
        for (name, output) in completed {
            states.insert(name, NodeState::Completed { output });
        }
        Self { nodes, flow_inputs, pending, states }
    }

    /// The state of every node the manager knows about.
    pub fn states(&self) -> &BTreeMap<NodeName, NodeState> {
        &self.states
    }

    pub fn state(&self, name: &str) -> Option<&NodeState> {
        self.states.get(name)
    }

    /// The node's observable output: completed, or bypassed with a return.
    pub fn output_of(&self, name: &str) -> Option<&Value> {
        self.states.get(name).and_then(NodeState::output)
    }

    /// Names of nodes still pending. A line abort reports these as not started.
    pub fn pending_nodes(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    /// True when every node has been handed out for execution or bypass.
    pub fn completed(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending nodes whose entire dependency closure is terminal, removed
    /// from the pending set and marked running. The returned batch shares no
    /// unresolved dependency; callers may execute it concurrently.
    pub fn pop_ready_nodes(&mut self) -> Vec<Node> {
        let ready: Vec<Node> = self
            .nodes
            .iter()
            .filter(|n| self.pending.contains(&n.name) && self.is_ready(n))
            .cloned()
            .collect();
        for node in &ready {
            self.pending.remove(&node.name);
            self.states.insert(node.name.clone(), NodeState::Running);
        }
        ready
    }

    /// Ready nodes that must be bypassed instead of dispatched, removed from
    /// the pending set and recorded as bypassed. Call until empty before
    /// popping ready nodes: a bypass can make further nodes bypassable.
    pub fn pop_bypassable_nodes(&mut self) -> Result<Vec<Node>, NodeFailure> {
        let mut bypassed = Vec::new();
        // Each bypass is committed as soon as it is decided: later nodes in
        // the same scan observe it, and an error on one node never rolls
        // back an already-decided sibling.
        for i in 0..self.nodes.len() {
            let node = &self.nodes[i];
            if !self.pending.contains(&node.name) || !self.is_ready(node) {
                continue;
            }
            let decision = self
                .decide(node)
                .map_err(|source| NodeFailure { node: node.name.clone(), source })?;
            if let Decision::Bypass(return_value) = decision {
                let node = self.nodes[i].clone();
                debug!(node = %node.name, has_return = return_value.is_some(), "bypassing node");
                self.pending.remove(&node.name);
                self.states.insert(node.name.clone(), NodeState::Bypassed { return_value });
                bypassed.push(node);
            }
        }
        Ok(bypassed)
    }

    /// The parameter map to dispatch the node's callable with.
    ///
    /// A parameter bound to a bypassed-without-output node is omitted when
    /// the signature gives it a default (so the default wins) and bound to
    /// null otherwise. This partial evaluation is what lets execution
    /// continue past a bypassed branch.
    pub fn get_valid_inputs(
        &self,
        node: &Node,
        signature: &[ParamSpec],
    ) -> Result<BTreeMap<String, Value>, DagError> {
        let mut params = BTreeMap::new();
        for (name, binding) in node.inputs.iter() {
            if self.dependency_bypassed(binding) {
                let has_default = signature.iter().any(|p| p.name == name && p.has_default);
                if !has_default {
                    params.insert(name.to_string(), Value::Null);
                }
            } else {
                params.insert(name.to_string(), self.resolve(binding)?);
            }
        }
        Ok(params)
    }

    /// Record a node's output. Idempotent under the same value; a differing
    /// value indicates an engine bug.
    pub fn complete(&mut self, name: &str, output: Value) {
        if let Some(NodeState::Completed { output: existing }) = self.states.get(name) {
            debug_assert_eq!(existing, &output, "conflicting output recorded for `{name}`");
            return;
        }
        self.states.insert(name.to_string(), NodeState::Completed { output });
    }

    /// Resolve any binding against this line's state.
    pub fn resolve(&self, binding: &InputBinding) -> Result<Value, DagError> {
        resolve_binding(binding, &self.flow_inputs, &self.states)
    }

    /// A node is ready once every node reference in its dependency closure
    /// (inputs, skip condition and return, activate condition) is terminal.
    fn is_ready(&self, node: &Node) -> bool {
        node.node_references().all(|target| {
            self.states.get(target).is_some_and(NodeState::is_terminal)
        })
    }

    /// Bypass precedence: a fired skip wins, then the activate gate, then
    /// the all-dependencies-bypassed rule. Evaluated only on ready nodes.
    fn decide(&self, node: &Node) -> Result<Decision, DagError> {
        if let Some(skip) = &node.skip
            && !self.dependency_bypassed(&skip.condition)
            && self.condition_met(&skip.condition, &skip.condition_value)?
        {
            if let Some(reference) = skip.return_value.node_ref()
                && self.dependency_bypassed(&skip.return_value)
            {
                return Err(DagError::ReferenceNodeBypassed { reference: reference.to_string() });
            }
            let resolved = self.resolve(&skip.return_value)?;
            let return_value = cfg!(feature = "skip-return-output").then_some(resolved);
            return Ok(Decision::Bypass(return_value));
        }

        if let Some(activate) = &node.activate {
            // A bypassed condition node bypasses this node outright; otherwise
            // the activate clause alone decides.
            if self.dependency_bypassed(&activate.condition) {
                return Ok(Decision::Bypass(None));
            }
            return if self.condition_met(&activate.condition, &activate.condition_value)? {
                Ok(Decision::Run)
            } else {
                Ok(Decision::Bypass(None))
            };
        }

        // A node whose node-reference inputs are all bypassed-without-output
        // has nothing to consume. Nodes with no node references never match.
        let mut node_refs = node
            .inputs
            .values()
            .filter(|b| matches!(b, InputBinding::NodeRef { .. }))
            .peekable();
        if node_refs.peek().is_some() && node_refs.all(|b| self.dependency_bypassed(b)) {
            return Ok(Decision::Bypass(None));
        }
        Ok(Decision::Run)
    }

    fn condition_met(&self, condition: &InputBinding, expected: &Value) -> Result<bool, DagError> {
        Ok(self.resolve(condition)? == *expected)
    }

    /// True when the binding references a node that was bypassed and has no
    /// observable output. A skip-with-return node does not count: consumers
    /// can still read its value.
    fn dependency_bypassed(&self, binding: &InputBinding) -> bool {
        binding.node_ref().is_some_and(|target| {
            self.states.get(target).is_some_and(NodeState::is_bypassed_without_output)
        })
    }
}
