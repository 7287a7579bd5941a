//! Layer 1 — Auto-wire (§4.5): free, no-LLM parameter resolution.

use gomind_core::value::{coerce, parse_template_ref, resolve_dot_path, unwrap_single_field};
use gomind_core::{Capability, CapabilityParameter, ParamValue, StepResult};
use serde_json::Value as Json;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct AutoWireOutcome {
    pub resolved: HashMap<String, Json>,
    pub missing: Vec<CapabilityParameter>,
}

/// Resolves as many of `capability`'s parameters as possible from `declared`
/// (the step's own template/literal parameters) and `source_data` (parsed
/// outputs of completed dependency steps), without consulting an LLM.
///
/// Deliberately does not perform semantic aliasing (e.g. "latitude" -> "lat")
/// — that is Layer 2's job; this layer only does exact/case-insensitive name
/// matching, single-field unwrapping, and lossless type coercion.
pub fn auto_wire(
    declared: &HashMap<String, ParamValue>,
    capability: &Capability,
    source_data: &HashMap<String, StepResult>,
) -> AutoWireOutcome {
    let mut resolved = HashMap::new();

    for (name, value) in declared {
        if let Some(template_ref) = value.as_template() {
            if let Some(parsed) = parse_template_ref(template_ref) {
                if let Some(step_result) = source_data.get(&parsed.step_id) {
                    if let Some(root) = &step_result.parsed_output {
                        if let Some(found) = resolve_dot_path(root, &parsed.path) {
                            resolved.insert(name.clone(), found.clone());
                        }
                    }
                }
            }
            // An unresolved or malformed template leaves the parameter
            // unset; it falls through to the dependency-name-match search
            // below, same as any other missing required parameter.
        } else {
            resolved.insert(name.clone(), value.clone().into_json());
        }
    }

    let mut missing = Vec::new();
    for param in capability.required_parameters() {
        if resolved.contains_key(&param.name) {
            continue;
        }
        match find_by_name(&param.name, source_data) {
            Some(value) => {
                let candidate = unwrap_single_field(&value).cloned().unwrap_or(value);
                match coerce(&candidate, &param.type_name) {
                    Some(coerced) => {
                        resolved.insert(param.name.clone(), coerced);
                    }
                    None => missing.push(param.clone()),
                }
            }
            None => missing.push(param.clone()),
        }
    }

    AutoWireOutcome { resolved, missing }
}

/// Exact-name, then case-insensitive-name, match against keys in any
/// completed dependency's parsed JSON object output (§4.5 Layer 1).
fn find_by_name(name: &str, source_data: &HashMap<String, StepResult>) -> Option<Json> {
    for result in source_data.values() {
        let Some(Json::Object(map)) = &result.parsed_output else { continue };
        if let Some(value) = map.get(name) {
            return Some(value.clone());
        }
    }
    for result in source_data.values() {
        let Some(Json::Object(map)) = &result.parsed_output else { continue };
        if let Some((_, value)) = map.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            return Some(value.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gomind_core::CapabilityParameter;
    use std::time::Duration;

    fn capability() -> Capability {
        Capability {
            name: "quote".to_string(),
            description: String::new(),
            endpoint: "/quote".to_string(),
            parameters: vec![
                CapabilityParameter { name: "lat".into(), type_name: "number".into(), required: true, description: String::new() },
                CapabilityParameter { name: "units".into(), type_name: "string".into(), required: true, description: String::new() },
            ],
            agent_name: "geo-agent".to_string(),
        }
    }

    fn dependency_result(parsed: Json) -> StepResult {
        StepResult {
            step_id: "step-1".into(),
            agent_name: "geo-agent".into(),
            success: true,
            response: None,
            parsed_output: Some(parsed),
            error: None,
            http_status: Some(200),
            start_time: Utc::now(),
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn resolves_template_reference() {
        let mut declared = HashMap::new();
        declared.insert("lat".to_string(), ParamValue::Template("{{step-1.response.lat}}".to_string()));
        let mut source = HashMap::new();
        source.insert("step-1".to_string(), dependency_result(serde_json::json!({"lat": 48.85})));

        let outcome = auto_wire(&declared, &capability(), &source);
        assert_eq!(outcome.resolved.get("lat"), Some(&Json::from(48.85)));
        assert_eq!(outcome.missing.len(), 1);
        assert_eq!(outcome.missing[0].name, "units");
    }

    #[test]
    fn single_brace_template_is_treated_as_literal() {
        let mut declared = HashMap::new();
        declared.insert("units".to_string(), ParamValue::Template("{step-1.response.units}".to_string()));
        let outcome = auto_wire(&declared, &capability(), &HashMap::new());
        assert_eq!(outcome.resolved.get("units"), Some(&Json::String("{step-1.response.units}".to_string())));
    }

    #[test]
    fn falls_back_to_case_insensitive_name_match_with_unwrap_and_coercion() {
        let mut source = HashMap::new();
        source.insert("step-1".to_string(), dependency_result(serde_json::json!({"LAT": {"value": "48.85"}})));
        let outcome = auto_wire(&HashMap::new(), &capability(), &source);
        assert_eq!(outcome.resolved.get("lat"), Some(&Json::from(48.85)));
        assert_eq!(outcome.missing.len(), 1);
        assert_eq!(outcome.missing[0].name, "units");
    }
}
