//! Input bindings: declarative references from node inputs to value sources.

use std::fmt;

use regex::Regex;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use pflow_types::{NodeName, Value};

/// Where a node input gets its value from.
///
/// Reference strings are parsed exactly once, at load time. A string that is
/// not a `${...}` reference (and any non-string value) is a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum InputBinding {
    /// A concrete value, used as-is.
    Literal(Value),
    /// `${flow.<name>}`: resolves against the current line's inputs.
    FlowInput { name: String },
    /// `${<node>.output[.<path>]}`: resolves against a completed node's
    /// output, optionally descending a dotted path.
    NodeRef { node: NodeName, path: Vec<String> },
}

impl InputBinding {
    /// Shorthand for a literal binding.
    pub fn literal(value: impl Into<Value>) -> Self {
        InputBinding::Literal(value.into())
    }

    /// The referenced node name, if this binding is a node reference.
    pub fn node_ref(&self) -> Option<&str> {
        match self {
            InputBinding::NodeRef { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Parse a `${...}` reference string.
    ///
    /// Returns `None` for strings that are not references at all; those are
    /// literals. Malformed references (e.g. `${a.b}` without the `output`
    /// segment) are an error rather than a silent literal.
    pub fn parse_reference(s: &str) -> Option<Result<Self, String>> {
        let re = Regex::new(r"^\$\{([A-Za-z_][A-Za-z0-9_]*)((?:\.[A-Za-z0-9_]+)*)\}$").unwrap();
        if !s.starts_with("${") || !s.ends_with('}') {
            return None;
        }
        let Some(cap) = re.captures(s) else {
            return Some(Err(format!("malformed reference: `{s}`")));
        };
        let head = cap.get(1).unwrap().as_str();
        let rest: Vec<&str> = cap.get(2).unwrap().as_str().split('.').skip(1).collect();

        if head == "flow" {
            return match rest.as_slice() {
                [name] => Some(Ok(InputBinding::FlowInput { name: (*name).into() })),
                _ => Some(Err(format!(
                    "flow input reference must be `${{flow.<name>}}`: `{s}`"
                ))),
            };
        }
        match rest.split_first() {
            Some((&"output", path)) => Some(Ok(InputBinding::NodeRef {
                node: head.into(),
                path: path.iter().map(|p| (*p).to_string()).collect(),
            })),
            _ => Some(Err(format!(
                "node reference must be `${{<node>.output[.<path>]}}`: `{s}`"
            ))),
        }
    }

    /// Render the binding back to its flow-definition form.
    fn to_value(&self) -> Value {
        match self {
            InputBinding::Literal(v) => v.clone(),
            InputBinding::FlowInput { name } => Value::String(format!("${{flow.{name}}}")),
            InputBinding::NodeRef { node, path } => {
                let mut s = format!("${{{node}.output");
                for seg in path {
                    s.push('.');
                    s.push_str(seg);
                }
                s.push('}');
                Value::String(s)
            }
        }
    }
}

impl Serialize for InputBinding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InputBinding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if let Value::String(s) = &value {
            if let Some(parsed) = InputBinding::parse_reference(s) {
                return parsed.map_err(de::Error::custom);
            }
        }
        Ok(InputBinding::Literal(value))
    }
}

/// Node input map, preserving parameter declaration order.
///
/// Order never affects scheduling, but it is kept for invocation and for
/// round-tripping flow definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(Vec<(String, InputBinding)>);

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&InputBinding> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, b)| b)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputBinding)> {
        self.0.iter().map(|(n, b)| (n.as_str(), b))
    }

    pub fn values(&self) -> impl Iterator<Item = &InputBinding> {
        self.0.iter().map(|(_, b)| b)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, InputBinding)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, InputBinding)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Bindings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, binding) in &self.0 {
            map.serialize_entry(name, binding)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Bindings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BindingsVisitor;

        impl<'de> Visitor<'de> for BindingsVisitor {
            type Value = Bindings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of parameter names to input bindings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Bindings, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, binding)) = access.next_entry::<String, InputBinding>()? {
                    if entries.iter().any(|(n, _)| *n == name) {
                        return Err(de::Error::custom(format!("duplicate input: `{name}`")));
                    }
                    entries.push((name, binding));
                }
                Ok(Bindings(entries))
            }
        }

        deserializer.deserialize_map(BindingsVisitor)
    }
}
