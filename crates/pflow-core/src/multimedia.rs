//! Multimedia values: discriminated `{"data:<mime>;<kind>": <value>}` objects.

use std::io;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use pflow_types::Value;

/// Storage kind of a multimedia payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Path,
    Base64,
    Url,
}

/// A parsed multimedia descriptor.
#[derive(Debug, Clone)]
pub struct Media {
    pub mime: String,
    pub kind: MediaKind,
    pub payload: String,
}

/// Parse a value as a multimedia descriptor: a single-key object whose key
/// is `data:<mime>;<kind>` with a string payload.
pub fn parse_media(value: &Value) -> Option<Media> {
    let Value::Object(map) = value else { return None };
    if map.len() != 1 {
        return None;
    }
    let (key, payload) = map.iter().next()?;
    let Value::String(payload) = payload else { return None };
    let rest = key.strip_prefix("data:")?;
    let (mime, kind) = rest.rsplit_once(';')?;
    let kind = match kind {
        "path" => MediaKind::Path,
        "base64" => MediaKind::Base64,
        "url" => MediaKind::Url,
        _ => return None,
    };
    Some(Media { mime: mime.to_string(), kind, payload: payload.clone() })
}

pub fn is_media_dict(value: &Value) -> bool {
    parse_media(value).is_some()
}

/// Rewrite multimedia values in `value` for persistence: inline base64
/// payloads are written as side-car files under `dir` and replaced with
/// `data:<mime>;path` descriptors referencing them by relative path.
/// Path and url descriptors pass through untouched.
pub fn persist_media(
    value: &Value,
    dir: &Path,
    stem: &str,
    counter: &mut usize,
) -> io::Result<Value> {
    if let Some(media) = parse_media(value) {
        if media.kind != MediaKind::Base64 {
            return Ok(value.clone());
        }
        let bytes = STANDARD
            .decode(media.payload.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let ext = media.mime.rsplit('/').next().unwrap_or("bin");
        let filename = if *counter == 0 {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}_{counter}.{ext}")
        };
        *counter += 1;
        std::fs::write(dir.join(&filename), bytes)?;
        let mut descriptor = serde_json::Map::new();
        descriptor.insert(format!("data:{};path", media.mime), Value::String(filename));
        return Ok(Value::Object(descriptor));
    }
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| persist_media(item, dir, stem, counter))
            .collect::<io::Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), persist_media(v, dir, stem, counter)?)))
            .collect::<io::Result<serde_json::Map<_, _>>>()
            .map(Value::Object),
        _ => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_descriptors() {
        let media = parse_media(&json!({"data:image/png;base64": "aGk="})).unwrap();
        assert_eq!(media.mime, "image/png");
        assert_eq!(media.kind, MediaKind::Base64);
        assert!(!is_media_dict(&json!({"data": "x"})));
        assert!(!is_media_dict(&json!({"data:image/png;base64": "a", "extra": 1})));
    }

    #[test]
    fn persists_base64_as_side_car() {
        let tmp = tempfile::TempDir::new().unwrap();
        let value = json!({"nested": [{"data:image/png;base64": "aGk="}, "plain"]});
        let mut counter = 0;
        let rewritten = persist_media(&value, tmp.path(), "0_image", &mut counter).unwrap();
        assert_eq!(
            rewritten,
            json!({"nested": [{"data:image/png;path": "0_image.png"}, "plain"]})
        );
        assert_eq!(std::fs::read(tmp.path().join("0_image.png")).unwrap(), b"hi");
    }

    #[test]
    fn path_and_url_descriptors_pass_through() {
        let tmp = tempfile::TempDir::new().unwrap();
        let value = json!({"data:image/jpg;url": "https://example.invalid/a.jpg"});
        let mut counter = 0;
        assert_eq!(persist_media(&value, tmp.path(), "s", &mut counter).unwrap(), value);
        assert_eq!(counter, 0);
    }
}
