//! Input mapping: `${data.<col>}` templates over row columns.

use std::collections::BTreeMap;

use regex::Regex;

use pflow_types::Value;

use super::rows::Row;

/// Build one line's flow inputs from a row.
///
/// A mapping value that is exactly one `${data.<col>}` template binds the
/// column's raw value, preserving its type. Templates embedded in a longer
/// string substitute their string form. A missing referenced column is an
/// error for this line only.
pub fn apply_inputs_mapping(
    row: &Row,
    mapping: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Value>, String> {
    let re = Regex::new(r"\$\{data\.([A-Za-z0-9_]+)\}").unwrap();
    let mut inputs = BTreeMap::new();
    for (input, template) in mapping {
        // Whole-string template: bind the column value as-is.
        if let Some(cap) = re.captures(template)
            && cap.get(0).unwrap().as_str() == template
        {
            let column = cap.get(1).unwrap().as_str();
            let value = row
                .get(column)
                .cloned()
                .ok_or_else(|| missing_column(column, input))?;
            inputs.insert(input.clone(), value);
            continue;
        }

        let mut rendered = String::with_capacity(template.len());
        let mut last = 0usize;
        for cap in re.captures_iter(template) {
            let m = cap.get(0).unwrap();
            let column = cap.get(1).unwrap().as_str();
            let value = row.get(column).ok_or_else(|| missing_column(column, input))?;
            rendered.push_str(&template[last..m.start()]);
            match value {
                Value::String(s) => rendered.push_str(s),
                other => rendered.push_str(&other.to_string()),
            }
            last = m.end();
        }
        rendered.push_str(&template[last..]);
        inputs.insert(input.clone(), Value::String(rendered));
    }
    Ok(inputs)
}

fn missing_column(column: &str, input: &str) -> String {
    format!("row is missing column `{column}` referenced by input `{input}`")
}
