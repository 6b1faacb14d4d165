//! JSON payloads exchanged with the system and backend APIs.

use serde::{Deserialize, Serialize};
use turnstile_core::constants::SYSTEM_CONFIG_ENVIRONMENT;
use turnstile_core::{AppCredentials, MappingRule, SystemConfig, UsageDelta};

// ============================================================================
// SYSTEM API
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct ProxyConfigEnvelope {
    pub proxy_config: ProxyConfigWire,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProxyConfigWire {
    pub version: u64,
    #[serde(default)]
    pub environment: String,
    pub content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentWire {
    pub id: IdWire,
    pub backend_authentication_value: Option<String>,
    #[serde(default)]
    pub proxy: ProxyWire,
}

/// Service ids are numbers on the wire but may be quoted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum IdWire {
    Number(u64),
    Text(String),
}

impl IdWire {
    fn into_string(self) -> String {
        match self {
            IdWire::Number(n) => n.to_string(),
            IdWire::Text(s) => s,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProxyWire {
    pub backend: Option<BackendWire>,
    #[serde(default)]
    pub proxy_rules: Vec<ProxyRuleWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BackendWire {
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProxyRuleWire {
    pub http_method: String,
    pub pattern: String,
    pub metric_system_name: String,
    #[serde(default = "default_delta")]
    pub delta: u64,
}

fn default_delta() -> u64 {
    1
}

impl ProxyConfigWire {
    /// Convert into the domain config. Returns a reason on failure.
    pub fn into_system_config(self) -> Result<SystemConfig, String> {
        if !self.environment.is_empty() && self.environment != SYSTEM_CONFIG_ENVIRONMENT {
            return Err(format!(
                "expected {} proxy config, got {}",
                SYSTEM_CONFIG_ENVIRONMENT, self.environment
            ));
        }

        let content: ContentWire = serde_json::from_value(self.content.clone())
            .map_err(|e| format!("malformed proxy config content: {}", e))?;

        let service_token = content
            .backend_authentication_value
            .filter(|token| !token.is_empty())
            .ok_or_else(|| "missing backend_authentication_value".to_string())?;

        let mapping_rules = content
            .proxy
            .proxy_rules
            .into_iter()
            .map(|rule| {
                MappingRule::new(rule.http_method, rule.pattern, rule.metric_system_name, rule.delta)
                    .map_err(|e| e.to_string())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SystemConfig {
            service_id: content.id.into_string(),
            version: self.version,
            backend_url: content.proxy.backend.and_then(|backend| backend.endpoint),
            service_token,
            mapping_rules,
            raw: self.content,
        })
    }
}

// ============================================================================
// BACKEND API
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct CredentialsWire<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_key: Option<&'a str>,
}

impl<'a> From<&'a AppCredentials> for CredentialsWire<'a> {
    fn from(credentials: &'a AppCredentials) -> Self {
        match credentials {
            AppCredentials::UserKey(key) => Self {
                user_key: Some(key.as_str()),
                app_id: None,
                app_key: None,
            },
            AppCredentials::AppId { app_id, app_key } => Self {
                user_key: None,
                app_id: Some(app_id.as_str()),
                app_key: app_key.as_deref(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AuthorizeRequestWire<'a> {
    pub service_id: &'a str,
    pub service_token: &'a str,
    #[serde(flatten)]
    pub credentials: CredentialsWire<'a>,
    pub usage: &'a UsageDelta,
}

#[derive(Debug, Serialize)]
pub(crate) struct TransactionWire<'a> {
    #[serde(flatten)]
    pub credentials: CredentialsWire<'a>,
    pub usage: &'a UsageDelta,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReportRequestWire<'a> {
    pub service_id: &'a str,
    pub service_token: &'a str,
    pub transactions: Vec<TransactionWire<'a>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthorizeResponseWire {
    pub authorized: bool,
    #[serde(default)]
    pub reason: Option<String>,
}
