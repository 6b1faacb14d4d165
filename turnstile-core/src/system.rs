//! System configuration payload and mapping rules
//!
//! A [`SystemConfig`] is what the system API returns for a service and what
//! the config cache stores. Apart from the mapping rules and the backend
//! settings it is treated as opaque.

use regex::Regex;

use crate::constants::DEFAULT_METRIC;
use crate::error::ConfigError;
use crate::identity::BackendTarget;
use crate::usage::UsageDelta;

/// Configuration of one service as published by the system API.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub service_id: String,
    pub version: u64,
    /// Backend endpoint; falls back to the client's default when absent
    pub backend_url: Option<String>,
    /// Token presented to the backend on behalf of this service
    pub service_token: String,
    pub mapping_rules: Vec<MappingRule>,
    /// Remainder of the document, kept for diagnostics
    pub raw: serde_json::Value,
}

impl SystemConfig {
    /// Resolve the usage charged for a call.
    ///
    /// Returns `None` when the service defines mapping rules and none of
    /// them match. A service without rules charges one hit per call.
    pub fn usage_for(&self, method: &str, path: &str) -> Option<UsageDelta> {
        if self.mapping_rules.is_empty() {
            return Some(UsageDelta::single(DEFAULT_METRIC, 1));
        }

        let mut usage = UsageDelta::new();
        let mut matched = false;
        for rule in &self.mapping_rules {
            if rule.matches(method, path) {
                usage.add(rule.metric.clone(), rule.delta);
                matched = true;
            }
        }

        matched.then_some(usage)
    }

    /// Backend target for this service.
    pub fn backend_target(&self, default_url: &str) -> BackendTarget {
        let url = self
            .backend_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(default_url);
        BackendTarget::new(url, self.service_id.clone(), self.service_token.clone())
    }
}

/// Maps a request method and path pattern to a metric increment.
#[derive(Debug, Clone)]
pub struct MappingRule {
    pub http_method: String,
    pub pattern: String,
    pub metric: String,
    pub delta: u64,
    matcher: Regex,
}

impl PartialEq for MappingRule {
    fn eq(&self, other: &Self) -> bool {
        self.http_method == other.http_method
            && self.pattern == other.pattern
            && self.metric == other.metric
            && self.delta == other.delta
    }
}

impl MappingRule {
    /// Compile a mapping rule.
    ///
    /// `{name}` placeholders match exactly one path segment, a trailing `$`
    /// anchors the match, otherwise the pattern is a prefix. Any query part
    /// of the pattern is ignored.
    pub fn new(
        http_method: impl Into<String>,
        pattern: impl Into<String>,
        metric: impl Into<String>,
        delta: u64,
    ) -> Result<Self, ConfigError> {
        let pattern = pattern.into();
        let matcher = compile_pattern(&pattern)?;
        Ok(Self {
            http_method: http_method.into().to_ascii_uppercase(),
            pattern,
            metric: metric.into(),
            delta,
            matcher,
        })
    }

    pub fn matches(&self, method: &str, path: &str) -> bool {
        if !self.http_method.eq_ignore_ascii_case(method) {
            return false;
        }
        let path = path.split('?').next().unwrap_or(path);
        self.matcher.is_match(path)
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    let path = pattern.split('?').next().unwrap_or(pattern);
    let (path, anchored) = match path.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (path, false),
    };

    let mut expr = String::with_capacity(path.len() + 8);
    expr.push('^');
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        expr.push_str(&regex::escape(&rest[..open]));
        let close = rest[open..]
            .find('}')
            .map(|offset| open + offset)
            .ok_or_else(|| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "unterminated placeholder".to_string(),
            })?;
        expr.push_str("[^/]+");
        rest = &rest[close + 1..];
    }
    expr.push_str(&regex::escape(rest));
    if anchored {
        expr.push('$');
    }

    Regex::new(&expr).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(rules: Vec<MappingRule>) -> SystemConfig {
        SystemConfig {
            service_id: "42".to_string(),
            version: 1,
            backend_url: None,
            service_token: "token".to_string(),
            mapping_rules: rules,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_prefix_and_anchored_patterns() {
        let prefix = MappingRule::new("GET", "/books", "hits", 1).unwrap();
        assert!(prefix.matches("GET", "/books"));
        assert!(prefix.matches("get", "/books/1"));
        assert!(!prefix.matches("POST", "/books"));
        assert!(!prefix.matches("GET", "/authors"));

        let anchored = MappingRule::new("GET", "/books$", "hits", 1).unwrap();
        assert!(anchored.matches("GET", "/books"));
        assert!(anchored.matches("GET", "/books?page=2"));
        assert!(!anchored.matches("GET", "/books/1"));
    }

    #[test]
    fn test_placeholder_matches_one_segment() {
        let rule = MappingRule::new("GET", "/books/{id}/pages$", "pages", 2).unwrap();
        assert!(rule.matches("GET", "/books/17/pages"));
        assert!(!rule.matches("GET", "/books/17/18/pages"));
        assert!(!rule.matches("GET", "/books//pages"));
    }

    #[test]
    fn test_literal_characters_are_escaped() {
        let rule = MappingRule::new("GET", "/v1/word.json$", "hits", 1).unwrap();
        assert!(rule.matches("GET", "/v1/word.json"));
        assert!(!rule.matches("GET", "/v1/wordXjson"));
    }

    #[test]
    fn test_unterminated_placeholder_is_rejected() {
        let err = MappingRule::new("GET", "/books/{id", "hits", 1).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_usage_for_sums_matching_rules() {
        let config = config_with(vec![
            MappingRule::new("GET", "/", "hits", 1).unwrap(),
            MappingRule::new("GET", "/search", "search", 3).unwrap(),
            MappingRule::new("POST", "/", "writes", 1).unwrap(),
        ]);

        let usage = config.usage_for("GET", "/search?q=rust").unwrap();
        assert_eq!(usage.get("hits"), 1);
        assert_eq!(usage.get("search"), 3);
        assert_eq!(usage.get("writes"), 0);
    }

    #[test]
    fn test_usage_for_without_rules_charges_one_hit() {
        let config = config_with(vec![]);
        let usage = config.usage_for("DELETE", "/anything").unwrap();
        assert_eq!(usage.get(DEFAULT_METRIC), 1);
    }

    #[test]
    fn test_usage_for_no_match_is_none() {
        let config = config_with(vec![MappingRule::new("GET", "/books", "hits", 1).unwrap()]);
        assert!(config.usage_for("GET", "/authors").is_none());
    }

    #[test]
    fn test_backend_target_falls_back_to_default() {
        let mut config = config_with(vec![]);
        let target = config.backend_target("https://default-backend");
        assert_eq!(target.url, "https://default-backend");
        assert_eq!(target.service_token, "token");

        config.backend_url = Some("https://own-backend/".to_string());
        assert_eq!(config.backend_target("https://default-backend").url, "https://own-backend");
    }
}
