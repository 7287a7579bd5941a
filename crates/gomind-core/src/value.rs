//! Parameter value representation and dot-path resolution.
//!
//! Agent/tool parameter schemas are user-defined, so the bound parameter set
//! is necessarily a tagged union of primitives, arrays and objects. We reuse
//! [`serde_json::Value`] for that union, the common choice whenever a schema
//! is not known ahead of time, and layer a small untagged enum on top to
//! carry the literal-vs-template distinction through plan parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A step parameter as declared in a plan: either a literal JSON value or a
/// `{{step_id.response.path}}` template string to be resolved at bind time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Template(String),
    Literal(Json),
}

impl ParamValue {
    /// Returns the template step/path reference if this value is a
    /// well-formed `{{step_id.response.path}}` template; `None` otherwise.
    ///
    /// A single-brace occurrence such as `{step_id.response.path}` is *not*
    /// a template and must be passed through literally (§8 invariant 6).
    pub fn as_template(&self) -> Option<&str> {
        match self {
            ParamValue::Template(s) => {
                let trimmed = s.trim();
                if trimmed.starts_with("{{") && trimmed.ends_with("}}") && trimmed.len() > 4 {
                    Some(&trimmed[2..trimmed.len() - 2])
                } else {
                    None
                }
            }
            ParamValue::Literal(_) => None,
        }
    }

    pub fn into_json(self) -> Json {
        match self {
            ParamValue::Template(s) => Json::String(s),
            ParamValue::Literal(v) => v,
        }
    }
}

/// Parsed form of a `step_id.response.path` template reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub step_id: String,
    pub path: String,
}

/// Parses the inside of a `{{...}}` template. Expects `<step_id>.response.<dot.path>`.
/// Returns `None` if the reference does not start with `.response.` after the step id,
/// since that is the only cross-step reference shape §3 RoutingStep defines.
pub fn parse_template_ref(inner: &str) -> Option<TemplateRef> {
    let (step_id, rest) = inner.split_once('.')?;
    let path = rest.strip_prefix("response.")?;
    if step_id.is_empty() {
        return None;
    }
    Some(TemplateRef {
        step_id: step_id.to_string(),
        path: path.to_string(),
    })
}

/// Resolves a dot-path against a JSON value. Numeric segments index into
/// arrays (open question in §8, resolved in SPEC_FULL.md: array indices are
/// supported). Returns `None` if any segment fails to resolve.
pub fn resolve_dot_path<'a>(root: &'a Json, path: &str) -> Option<&'a Json> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Json::Object(map) => map.get(segment)?,
            Json::Array(arr) => {
                let idx: usize = segment.parse().ok()?;
                arr.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Best-effort lossless coercion between string/number/bool, used by Layer 1
/// auto-wire when an exact-name match is found but the JSON type differs from
/// what the capability schema declares.
pub fn coerce(value: &Json, target_type: &str) -> Option<Json> {
    match (value, target_type) {
        (Json::String(_), _) | (Json::Number(_), _) | (Json::Bool(_), _) => {}
        _ => return Some(value.clone()),
    }
    match target_type {
        "string" => match value {
            Json::String(_) => Some(value.clone()),
            Json::Number(n) => Some(Json::String(n.to_string())),
            Json::Bool(b) => Some(Json::String(b.to_string())),
            _ => None,
        },
        "number" | "integer" | "float" => match value {
            Json::Number(_) => Some(value.clone()),
            Json::String(s) => s.parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Json::Number),
            _ => None,
        },
        "bool" | "boolean" => match value {
            Json::Bool(_) => Some(value.clone()),
            Json::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(Json::Bool(true)),
                "false" => Some(Json::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        _ => Some(value.clone()),
    }
}

/// If `value` is a single-key JSON object, returns the inner value (Layer 1
/// "single-field wrapper" extraction, §4.5).
pub fn unwrap_single_field(value: &Json) -> Option<&Json> {
    match value {
        Json::Object(map) if map.len() == 1 => map.values().next(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_ref_requires_response_segment() {
        assert_eq!(
            parse_template_ref("step-1.response.lat"),
            Some(TemplateRef {
                step_id: "step-1".into(),
                path: "lat".into()
            })
        );
        assert_eq!(parse_template_ref("step-1.output.lat"), None);
    }

    #[test]
    fn single_brace_is_not_a_template() {
        let v = ParamValue::Template("{step-1.response.lat}".to_string());
        assert_eq!(v.as_template(), None);
    }

    #[test]
    fn double_brace_resolves() {
        let v = ParamValue::Template("{{step-1.response.lat}}".to_string());
        assert_eq!(v.as_template(), Some("step-1.response.lat"));
    }

    #[test]
    fn dot_path_through_array_index() {
        let json: Json = serde_json::json!({"items": [{"id": 1}, {"id": 2}]});
        assert_eq!(resolve_dot_path(&json, "items.1.id"), Some(&Json::from(2)));
    }

    #[test]
    fn unwrap_single_field_extracts_inner() {
        let json: Json = serde_json::json!({"lat": 48.85});
        assert_eq!(unwrap_single_field(&json), Some(&Json::from(48.85)));
        let multi: Json = serde_json::json!({"lat": 48.85, "lon": 2.35});
        assert_eq!(unwrap_single_field(&multi), None);
    }
}
