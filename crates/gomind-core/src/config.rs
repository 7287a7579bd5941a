//! Environment-driven configuration (§6).
//!
//! Unrecognized or unparsable values fall back to defaults silently, with a
//! `tracing::warn!` emission standing in for "emit a metric" when no metrics
//! backend is wired in.

use std::env;
use std::time::Duration;

fn env_or(primary: &str, fallback: &str, default: &str) -> String {
    env::var(primary)
        .or_else(|_| env::var(fallback))
        .unwrap_or_else(|_| default.to_string())
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "unparsable config value, falling back to default");
            default
        }),
        Err(_) => default,
    }
}

#[derive(Debug, Clone)]
pub struct GoMindConfig {
    pub redis_url: String,
    pub capability_service_url: Option<String>,
    pub capability_top_k: usize,
    pub capability_threshold: f64,
    pub semantic_retry_enabled: bool,
    pub semantic_retry_max_attempts: u32,
    pub prompt_domain: Option<String>,
    pub prompt_template_file: Option<String>,
    pub prompt_type_rules: Option<String>,
    pub hitl_key_prefix: String,
    pub hitl_redis_db: u8,
    pub llm_debug_ttl: Duration,
    pub llm_debug_error_ttl: Duration,
}

impl Default for GoMindConfig {
    fn default() -> Self {
        Self {
            redis_url: "localhost:6379".to_string(),
            capability_service_url: None,
            capability_top_k: 20,
            capability_threshold: 0.7,
            semantic_retry_enabled: true,
            semantic_retry_max_attempts: 2,
            prompt_domain: None,
            prompt_template_file: None,
            prompt_type_rules: None,
            hitl_key_prefix: "gomind:hitl".to_string(),
            hitl_redis_db: 6,
            llm_debug_ttl: Duration::from_secs(24 * 3600),
            llm_debug_error_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl GoMindConfig {
    /// Loads configuration from the environment, per the variable table in §6.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: {
                let v = env_or("REDIS_URL", "GOMIND_REDIS_URL", &defaults.redis_url);
                v
            },
            capability_service_url: env::var("GOMIND_CAPABILITY_SERVICE_URL")
                .or_else(|_| env::var("CAPABILITY_SERVICE_URL"))
                .ok(),
            capability_top_k: parse_or_warn("GOMIND_CAPABILITY_TOP_K", defaults.capability_top_k),
            capability_threshold: parse_or_warn("GOMIND_CAPABILITY_THRESHOLD", defaults.capability_threshold),
            semantic_retry_enabled: parse_or_warn("GOMIND_SEMANTIC_RETRY_ENABLED", defaults.semantic_retry_enabled),
            semantic_retry_max_attempts: parse_or_warn(
                "GOMIND_SEMANTIC_RETRY_MAX_ATTEMPTS",
                defaults.semantic_retry_max_attempts,
            ),
            prompt_domain: env::var("GOMIND_PROMPT_DOMAIN").ok(),
            prompt_template_file: env::var("GOMIND_PROMPT_TEMPLATE_FILE").ok(),
            prompt_type_rules: env::var("GOMIND_PROMPT_TYPE_RULES").ok(),
            hitl_key_prefix: env::var("GOMIND_HITL_KEY_PREFIX").unwrap_or(defaults.hitl_key_prefix),
            hitl_redis_db: parse_or_warn("GOMIND_HITL_REDIS_DB", defaults.hitl_redis_db),
            llm_debug_ttl: env::var("GOMIND_LLM_DEBUG_TTL")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.llm_debug_ttl),
            llm_debug_error_ttl: env::var("GOMIND_LLM_DEBUG_ERROR_TTL")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.llm_debug_error_ttl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = GoMindConfig::default();
        assert_eq!(c.capability_top_k, 20);
        assert!((c.capability_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(c.semantic_retry_max_attempts, 2);
        assert_eq!(c.hitl_redis_db, 6);
    }
}
