//! Built-in demo callables.
//!
//! Enough to exercise flows end to end without external tool adapters: an
//! echo, a `{{var}}` template renderer, and a list concatenation.

use anyhow::{Result, anyhow};
use regex::Regex;
use serde_json::Value;

use pflow_core::CallableRegistry;
use pflow_types::ParamSpec;

pub fn builtin_registry() -> CallableRegistry {
    let mut registry = CallableRegistry::new();

    registry.register_fn("echo", vec![ParamSpec::required("text")], |p| {
        Ok(p.get("text").cloned().unwrap_or(Value::Null))
    });

    registry.register_fn(
        "template",
        vec![ParamSpec::required("template"), ParamSpec::with_default("vars")],
        |p| {
            let template = p
                .get("template")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("`template` must be a string"))?;
            let vars = p.get("vars").cloned().unwrap_or(Value::Object(Default::default()));
            render_template(template, &vars).map(Value::String)
        },
    );

    registry.register_fn("concat", vec![ParamSpec::required("items")], |p| {
        let items = p
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("`items` must be a list"))?;
        let joined: String = items.iter().map(render_value).collect();
        Ok(Value::String(joined))
    });

    registry
}

/// Replace `{{var}}` with values from a vars object.
fn render_template(input: &str, vars: &Value) -> Result<String> {
    let re = Regex::new(r"\{\{\s*([a-zA-Z0-9_\-\.]+)\s*\}\}").unwrap();
    let mut out = String::with_capacity(input.len());
    let mut last = 0usize;

    for cap in re.captures_iter(input) {
        let m = cap.get(0).unwrap();
        let key = cap.get(1).unwrap().as_str();
        out.push_str(&input[last..m.start()]);
        match vars.get(key) {
            Some(v) => out.push_str(&render_value(v)),
            None => return Err(anyhow!("missing template var: `{key}`")),
        }
        last = m.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
