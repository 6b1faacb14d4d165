//! Turnstile Core - Shared Types
//!
//! Identity, configuration, usage and error types shared by every other
//! crate in the workspace. This crate performs no I/O.

pub mod config;
pub mod constants;
pub mod decision;
pub mod error;
pub mod identity;
pub mod system;
pub mod usage;

pub use config::{BackendConfig, CacheConfig, ClientConfig};
pub use decision::Decision;
pub use error::{
    AuthzError, ConfigError, FetchError, LifecycleError, TurnstileError, TurnstileResult,
};
pub use identity::{AppCredentials, BackendTarget, Identity, ReportKey, ServiceRef};
pub use system::{MappingRule, SystemConfig};
pub use usage::UsageDelta;
