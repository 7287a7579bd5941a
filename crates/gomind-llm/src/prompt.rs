//! Prompt Builder (§4.3): composes the planning prompt from capability text,
//! the user request, domain/type rules, and cross-step reference guidance.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

/// One documented parameter type the LLM may emit in a plan, with a correct
/// example and (unless disabled) a contrasting anti-pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeRule {
    pub type_names: Vec<String>,
    pub json_type: String,
    pub example: String,
    #[serde(default)]
    pub anti_pattern: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub disable_anti_pattern: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub persona: Option<String>,
    pub domain_rules: Vec<String>,
    pub type_rules: Vec<TypeRule>,
    pub capability_text: String,
    pub user_request: String,
    pub custom_instructions: Vec<String>,
}

pub trait PromptBuilder: Send + Sync {
    fn build(&self, ctx: &PromptContext) -> String;
}

const CROSS_STEP_GUIDANCE: &str = r#"Cross-step data references:
Use the exact syntax {{step_id.response.path}} (double curly braces) to
reference a prior step's output, e.g. {{step-1.response.lat}}. A single
curly brace, e.g. {step-1.response.lat}, is NOT a valid reference and will
be treated as a literal string — always use double braces."#;

const JSON_STRUCTURE_EXAMPLE: &str = r#"{
  "plan_id": "plan-001",
  "original_request": "<echo the user request>",
  "mode": "non_streaming",
  "steps": [
    {
      "step_id": "step-1",
      "agent_name": "<agent name from the capability list>",
      "namespace": "default",
      "instruction": "<what this step should do>",
      "depends_on": [],
      "metadata": {
        "capability": "<capability name>",
        "parameters": { "<param>": "<literal or {{step_id.response.path}} template>" }
      }
    }
  ]
}"#;

fn render_type_rule(rule: &TypeRule) -> String {
    let mut out = format!(
        "- Types {:?} map to JSON {}. Example: {}",
        rule.type_names, rule.json_type, rule.example
    );
    if let Some(desc) = &rule.description {
        out.push_str(&format!(" ({desc})"));
    }
    if !rule.disable_anti_pattern {
        if let Some(anti) = &rule.anti_pattern {
            out.push_str(&format!("\n  Do NOT do: {anti}"));
        }
    }
    out
}

/// Assembles the prompt programmatically, section by section.
#[derive(Default)]
pub struct DefaultPromptBuilder;

impl PromptBuilder for DefaultPromptBuilder {
    fn build(&self, ctx: &PromptContext) -> String {
        let mut sections = Vec::new();

        if let Some(persona) = &ctx.persona {
            sections.push(persona.clone());
        }

        if !ctx.domain_rules.is_empty() {
            sections.push(format!("Domain rules:\n{}", ctx.domain_rules.join("\n")));
        }

        if !ctx.type_rules.is_empty() {
            let rules = ctx.type_rules.iter().map(render_type_rule).collect::<Vec<_>>().join("\n");
            sections.push(format!("Parameter type rules:\n{rules}"));
        }

        sections.push(format!("Available capabilities:\n{}", ctx.capability_text));
        sections.push(CROSS_STEP_GUIDANCE.to_string());

        if !ctx.custom_instructions.is_empty() {
            sections.push(ctx.custom_instructions.join("\n"));
        }

        sections.push(format!("User request:\n{}", ctx.user_request));
        sections.push(format!(
            "Respond with raw JSON only — no markdown, no code fences, no commentary. \
             Use exactly this structure:\n{JSON_STRUCTURE_EXAMPLE}"
        ));

        sections.join("\n\n")
    }
}

/// Evaluates a user-supplied `tera` template over a fixed data object. On any
/// template error this degrades to [`DefaultPromptBuilder`] and logs a
/// warning metric-equivalent (§4.3). Templates must come from trusted
/// sources only — this builder does not sandbox template execution.
pub struct TemplatePromptBuilder {
    template_source: String,
    fallback: DefaultPromptBuilder,
}

impl TemplatePromptBuilder {
    pub fn new(template_source: impl Into<String>) -> Self {
        Self {
            template_source: template_source.into(),
            fallback: DefaultPromptBuilder,
        }
    }

    fn render(&self, ctx: &PromptContext) -> tera::Result<String> {
        let mut tera = tera::Tera::default();
        tera.add_raw_template("prompt", &self.template_source)?;
        let mut context = tera::Context::new();
        context.insert("persona", &ctx.persona);
        context.insert("domain_rules", &ctx.domain_rules);
        context.insert("type_rules", &ctx.type_rules);
        context.insert("capability_text", &ctx.capability_text);
        context.insert("user_request", &ctx.user_request);
        context.insert("custom_instructions", &ctx.custom_instructions);
        context.insert("cross_step_guidance", CROSS_STEP_GUIDANCE);
        context.insert("json_structure_example", JSON_STRUCTURE_EXAMPLE);
        tera.render("prompt", &context)
    }
}

impl PromptBuilder for TemplatePromptBuilder {
    fn build(&self, ctx: &PromptContext) -> String {
        match self.render(ctx) {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(error = %err, "prompt template evaluation failed, degrading to default builder");
                self.fallback.build(ctx)
            }
        }
    }
}

/// Small helper for the Layer-2 micro-resolution prompt (§4.5): a focused,
/// schema-constrained request for just the missing parameters.
pub fn build_micro_resolution_prompt(missing: &[(String, String)], source_data: &serde_json::Value) -> String {
    let schema = json!(missing.iter().map(|(name, ty)| json!({"name": name, "type": ty})).collect::<Vec<_>>());
    format!(
        "You are resolving missing step parameters from prior step output.\n\
         Missing parameters (name, type): {schema}\n\
         Source data from completed steps: {source_data}\n\
         Respond with raw JSON only, an object containing exactly these keys, correctly typed."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PromptContext {
        PromptContext {
            persona: Some("You are a routing planner.".to_string()),
            domain_rules: vec!["Never recommend medication dosages.".to_string()],
            type_rules: vec![TypeRule {
                type_names: vec!["latitude".into(), "longitude".into()],
                json_type: "number".into(),
                example: "48.85".into(),
                anti_pattern: Some("\"48.85\" as a string".into()),
                description: None,
                disable_anti_pattern: false,
            }],
            capability_text: "- geo.geocode(place): resolve coordinates".to_string(),
            user_request: "weather in Paris".to_string(),
            custom_instructions: vec![],
        }
    }

    #[test]
    fn default_builder_always_demands_raw_json() {
        let prompt = DefaultPromptBuilder.build(&ctx());
        assert!(prompt.contains("raw JSON only"));
        assert!(prompt.contains("{{step_id.response.path}}"));
        assert!(prompt.contains("Do NOT do"));
    }

    #[test]
    fn anti_pattern_suppressed_when_disabled() {
        let mut context = ctx();
        context.type_rules[0].disable_anti_pattern = true;
        let prompt = DefaultPromptBuilder.build(&context);
        assert!(!prompt.contains("Do NOT do"));
    }

    #[test]
    fn template_builder_degrades_to_default_on_bad_template() {
        let builder = TemplatePromptBuilder::new("{{ unterminated");
        let prompt = builder.build(&ctx());
        assert!(prompt.contains("raw JSON only"));
    }

    #[test]
    fn template_builder_renders_valid_template() {
        let builder = TemplatePromptBuilder::new("Request: {{ user_request }}");
        let prompt = builder.build(&ctx());
        assert_eq!(prompt, "Request: weather in Paris");
    }
}
