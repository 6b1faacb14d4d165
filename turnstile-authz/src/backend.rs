//! Backend client facade.
//!
//! In direct mode every authorization is one synchronous `authrep`. In
//! cached mode the decision comes from `authorize` and the usage of allowed
//! calls is buffered in the [`ReportCache`] for the flush task. Once
//! buffering stops (manager shutdown) cached mode falls back to `authrep`
//! so no usage is recorded after the final flush.
//!
//! A buffered call holds the read side of the `buffering` lock from its
//! decision until its usage is recorded; stopping takes the write side, so
//! every buffered call has recorded by the time [`BackendFacade::stop_buffering`]
//! returns.

use std::sync::Arc;

use tokio::sync::RwLock;
use turnstile_client::BackendApi;
use turnstile_core::{AppCredentials, BackendTarget, Decision, FetchError, ReportKey, UsageDelta};

use crate::report::ReportCache;

pub struct BackendFacade {
    backend: Arc<dyn BackendApi>,
    reports: Option<Arc<ReportCache>>,
    buffering: RwLock<bool>,
}

impl BackendFacade {
    /// Every call goes straight to the backend.
    pub fn direct(backend: Arc<dyn BackendApi>) -> Self {
        Self {
            backend,
            reports: None,
            buffering: RwLock::new(false),
        }
    }

    /// Usage of allowed calls is buffered in `reports`.
    pub fn cached(backend: Arc<dyn BackendApi>, reports: Arc<ReportCache>) -> Self {
        Self {
            backend,
            reports: Some(reports),
            buffering: RwLock::new(true),
        }
    }

    pub fn backend(&self) -> &Arc<dyn BackendApi> {
        &self.backend
    }

    pub fn reports(&self) -> Option<&Arc<ReportCache>> {
        self.reports.as_ref()
    }

    pub fn is_caching(&self) -> bool {
        self.reports.is_some()
    }

    /// Route all further calls through `authrep`.
    ///
    /// Waits for buffered calls in flight to record their usage.
    pub async fn stop_buffering(&self) {
        *self.buffering.write().await = false;
    }

    /// Decide a call and make sure its usage is recorded when allowed.
    pub async fn authorize(
        &self,
        target: &BackendTarget,
        credentials: &AppCredentials,
        usage: &UsageDelta,
    ) -> Result<Decision, FetchError> {
        let reports = match &self.reports {
            Some(reports) => reports,
            None => return self.backend.authrep(target, credentials, usage).await,
        };

        let buffering = self.buffering.read().await;
        if !*buffering {
            drop(buffering);
            return self.backend.authrep(target, credentials, usage).await;
        }

        let decision = self.backend.authorize(target, credentials, usage).await?;
        if decision.is_allowed() {
            reports.record(ReportKey::new(target.clone(), credentials.clone()), usage);
        }
        drop(buffering);
        Ok(decision)
    }
}

impl std::fmt::Debug for BackendFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendFacade")
            .field("caching", &self.is_caching())
            .field("buffering", &self.buffering.try_read().map(|b| *b).ok())
            .finish()
    }
}
