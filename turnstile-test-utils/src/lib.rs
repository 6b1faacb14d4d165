//! Turnstile Test Utilities
//!
//! Shared test infrastructure for the Turnstile workspace:
//! - Mock system and backend APIs that count calls and inject failures
//! - Fixtures for services, credentials and system configurations
//! - Proptest generators for usage deltas

pub use turnstile_client::{BackendApi, SystemApi, Transaction};
pub use turnstile_core::{
    AppCredentials, BackendTarget, Decision, FetchError, MappingRule, ServiceRef, SystemConfig,
    UsageDelta,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

// ============================================================================
// FIXTURES
// ============================================================================

pub const SYSTEM_URL: &str = "https://admin.example.com";
pub const BACKEND_URL: &str = "https://backend.example.com";
pub const SERVICE_TOKEN: &str = "service-token";

/// Service reference on the fixture system URL.
pub fn service_ref(service_id: &str) -> ServiceRef {
    ServiceRef::new(SYSTEM_URL, service_id, "access-token")
}

pub fn user_key(key: &str) -> AppCredentials {
    AppCredentials::user_key(key)
}

/// System config without mapping rules on the fixture backend.
pub fn system_config(service_id: &str) -> SystemConfig {
    SystemConfig {
        service_id: service_id.to_string(),
        version: 1,
        backend_url: Some(BACKEND_URL.to_string()),
        service_token: SERVICE_TOKEN.to_string(),
        mapping_rules: Vec::new(),
        raw: serde_json::Value::Null,
    }
}

/// System config with `(method, pattern, metric, delta)` mapping rules.
pub fn system_config_with_rules(
    service_id: &str,
    rules: &[(&str, &str, &str, u64)],
) -> SystemConfig {
    SystemConfig {
        mapping_rules: rules
            .iter()
            .map(|(method, pattern, metric, delta)| {
                MappingRule::new(*method, *pattern, *metric, *delta)
                    .expect("fixture mapping rule must compile")
            })
            .collect(),
        ..system_config(service_id)
    }
}

/// Backend target matching [`system_config`].
pub fn backend_target(service_id: &str) -> BackendTarget {
    BackendTarget::new(BACKEND_URL, service_id, SERVICE_TOKEN)
}

fn injected_failure(endpoint: &str) -> FetchError {
    FetchError::Transport {
        endpoint: endpoint.to_string(),
        reason: "injected failure".to_string(),
        timed_out: false,
    }
}

// ============================================================================
// MOCK SYSTEM API
// ============================================================================

/// In-memory [`SystemApi`] keyed by service id.
#[derive(Debug, Default)]
pub struct MockSystemApi {
    configs: Mutex<HashMap<String, SystemConfig>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockSystemApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(self, config: SystemConfig) -> Self {
        self.set_config(config);
        self
    }

    pub fn set_config(&self, config: SystemConfig) {
        self.configs.lock().insert(config.service_id.clone(), config);
    }

    /// Make every subsequent fetch fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent fetch.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SystemApi for MockSystemApi {
    async fn fetch_config(&self, service: &ServiceRef) -> Result<SystemConfig, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(injected_failure(&service.system_url));
        }

        self.configs
            .lock()
            .get(&service.service_id)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                endpoint: service.system_url.clone(),
                status: 404,
                body: format!("service {} not found", service.service_id),
            })
    }
}

// ============================================================================
// MOCK BACKEND API
// ============================================================================

/// A recorded `authorize` or `authrep` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub target: BackendTarget,
    pub credentials: AppCredentials,
    pub usage: UsageDelta,
}

/// A recorded batched report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedReport {
    pub target: BackendTarget,
    pub transactions: Vec<Transaction>,
}

/// In-memory [`BackendApi`] that records every call.
///
/// Allows everything unless a denial reason is set.
#[derive(Debug, Default)]
pub struct MockBackendApi {
    denial: Mutex<Option<String>>,
    failing: AtomicBool,
    reports_failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    authorize_calls: Mutex<Vec<RecordedCall>>,
    authrep_calls: Mutex<Vec<RecordedCall>>,
    reports: Mutex<Vec<RecordedReport>>,
    report_attempts: AtomicUsize,
}

impl MockBackendApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny every subsequent decision with `reason`, or allow again with `None`.
    pub fn set_denial(&self, reason: Option<&str>) {
        *self.denial.lock() = reason.map(str::to_string);
    }

    /// Fail `authorize`/`authrep` calls.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail `report` calls.
    pub fn set_reports_failing(&self, failing: bool) {
        self.reports_failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent call, reports included.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn authorize_calls(&self) -> Vec<RecordedCall> {
        self.authorize_calls.lock().clone()
    }

    pub fn authrep_calls(&self) -> Vec<RecordedCall> {
        self.authrep_calls.lock().clone()
    }

    /// Successfully delivered reports.
    pub fn reports(&self) -> Vec<RecordedReport> {
        self.reports.lock().clone()
    }

    /// Total remote calls of any kind, failed reports included.
    pub fn total_calls(&self) -> usize {
        self.authorize_calls.lock().len()
            + self.authrep_calls.lock().len()
            + self.report_attempts()
    }

    /// Report calls, failed ones included.
    pub fn report_attempts(&self) -> usize {
        self.report_attempts.load(Ordering::SeqCst)
    }

    /// Sum of reported usage for one metric across every delivered report.
    pub fn reported_total(&self, metric: &str) -> u64 {
        self.reports
            .lock()
            .iter()
            .flat_map(|report| report.transactions.iter())
            .map(|tx| tx.usage.get(metric))
            .sum()
    }

    async fn decide(
        &self,
        log: &Mutex<Vec<RecordedCall>>,
        target: &BackendTarget,
        credentials: &AppCredentials,
        usage: &UsageDelta,
    ) -> Result<Decision, FetchError> {
        log.lock().push(RecordedCall {
            target: target.clone(),
            credentials: credentials.clone(),
            usage: usage.clone(),
        });

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(injected_failure(&target.url));
        }

        let denial = self.denial.lock().clone();
        Ok(match denial {
            Some(reason) => Decision::denied(reason),
            None => Decision::allowed(),
        })
    }
}

#[async_trait]
impl BackendApi for MockBackendApi {
    async fn authorize(
        &self,
        target: &BackendTarget,
        credentials: &AppCredentials,
        usage: &UsageDelta,
    ) -> Result<Decision, FetchError> {
        self.decide(&self.authorize_calls, target, credentials, usage)
            .await
    }

    async fn authrep(
        &self,
        target: &BackendTarget,
        credentials: &AppCredentials,
        usage: &UsageDelta,
    ) -> Result<Decision, FetchError> {
        self.decide(&self.authrep_calls, target, credentials, usage)
            .await
    }

    async fn report(
        &self,
        target: &BackendTarget,
        transactions: &[Transaction],
    ) -> Result<(), FetchError> {
        self.report_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.reports_failing.load(Ordering::SeqCst) {
            return Err(injected_failure(&target.url));
        }
        self.reports.lock().push(RecordedReport {
            target: target.clone(),
            transactions: transactions.to_vec(),
        });
        Ok(())
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    use proptest::prelude::*;
    use turnstile_core::UsageDelta;

    /// Usage over a small metric alphabet so merges collide.
    pub fn arb_usage_delta() -> impl Strategy<Value = UsageDelta> {
        proptest::collection::btree_map("(hits|search|upload)", 1u64..100, 1..3)
            .prop_map(|metrics| metrics.into_iter().collect())
    }
}
