//! Identity types for services, applications and backend targets

use std::fmt;

/// Reference to a service's configuration on the system API.
///
/// This is the config cache key: the same service fetched through two
/// system URLs or with two access tokens is cached twice.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ServiceRef {
    pub system_url: String,
    pub service_id: String,
    pub access_token: String,
}

impl ServiceRef {
    pub fn new(
        system_url: impl Into<String>,
        service_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            system_url: system_url.into().trim_end_matches('/').to_string(),
            service_id: service_id.into(),
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRef")
            .field("system_url", &self.system_url)
            .field("service_id", &self.service_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.service_id, self.system_url)
    }
}

/// Application credentials presented with a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppCredentials {
    /// Single user key authentication
    UserKey(String),
    /// Application id with an optional application key
    AppId {
        app_id: String,
        app_key: Option<String>,
    },
}

impl AppCredentials {
    pub fn user_key(key: impl Into<String>) -> Self {
        AppCredentials::UserKey(key.into())
    }

    pub fn app_id(app_id: impl Into<String>, app_key: Option<String>) -> Self {
        AppCredentials::AppId {
            app_id: app_id.into(),
            app_key,
        }
    }

    /// Identifier safe to put in logs.
    pub fn log_id(&self) -> &str {
        match self {
            AppCredentials::UserKey(_) => "user_key",
            AppCredentials::AppId { app_id, .. } => app_id,
        }
    }
}

/// The service/application identity of an incoming request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub service: ServiceRef,
    pub credentials: AppCredentials,
}

impl Identity {
    pub fn new(service: ServiceRef, credentials: AppCredentials) -> Self {
        Self {
            service,
            credentials,
        }
    }
}

/// Where usage for a service is authorized and reported.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BackendTarget {
    pub url: String,
    pub service_id: String,
    pub service_token: String,
}

impl BackendTarget {
    pub fn new(
        url: impl Into<String>,
        service_id: impl Into<String>,
        service_token: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            service_id: service_id.into(),
            service_token: service_token.into(),
        }
    }
}

impl fmt::Debug for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendTarget")
            .field("url", &self.url)
            .field("service_id", &self.service_id)
            .field("service_token", &"[REDACTED]")
            .finish()
    }
}

/// Key of a pending usage report.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportKey {
    pub target: BackendTarget,
    pub credentials: AppCredentials,
}

impl ReportKey {
    pub fn new(target: BackendTarget, credentials: AppCredentials) -> Self {
        Self {
            target,
            credentials,
        }
    }
}
