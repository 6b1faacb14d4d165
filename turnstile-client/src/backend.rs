//! Backend API client.
//!
//! `authorize` checks limits without recording usage, `authrep` checks and
//! records in one call, `report` records a batch of already-authorized
//! transactions for one service.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use turnstile_core::{AppCredentials, BackendTarget, Decision, FetchError, UsageDelta};

use crate::transport_error;
use crate::wire::{
    AuthorizeRequestWire, AuthorizeResponseWire, ReportRequestWire, TransactionWire,
};

const DEFAULT_DENIAL_REASON: &str = "denied by backend";

/// One application's merged usage inside a batched report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub credentials: AppCredentials,
    pub usage: UsageDelta,
}

/// Usage/rate-limit API.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Check whether a call is within limits without recording it.
    async fn authorize(
        &self,
        target: &BackendTarget,
        credentials: &AppCredentials,
        usage: &UsageDelta,
    ) -> Result<Decision, FetchError>;

    /// Check a call and record its usage when allowed.
    async fn authrep(
        &self,
        target: &BackendTarget,
        credentials: &AppCredentials,
        usage: &UsageDelta,
    ) -> Result<Decision, FetchError>;

    /// Record usage for several applications of one service.
    async fn report(
        &self,
        target: &BackendTarget,
        transactions: &[Transaction],
    ) -> Result<(), FetchError>;
}

/// [`BackendApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    client: Client,
}

impl HttpBackendClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<(StatusCode, String), FetchError> {
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(endpoint, e))?;
        Ok((status, text))
    }

    async fn decide(
        &self,
        target: &BackendTarget,
        call: &str,
        credentials: &AppCredentials,
        usage: &UsageDelta,
    ) -> Result<Decision, FetchError> {
        let endpoint = format!("{}/transactions/{}.json", target.url, call);
        let body = AuthorizeRequestWire {
            service_id: &target.service_id,
            service_token: &target.service_token,
            credentials: credentials.into(),
            usage,
        };

        let (status, text) = self.post(&endpoint, &body).await?;
        match status {
            StatusCode::OK => {
                let parsed: AuthorizeResponseWire =
                    serde_json::from_str(&text).map_err(|e| FetchError::InvalidResponse {
                        endpoint: endpoint.clone(),
                        reason: e.to_string(),
                    })?;
                if parsed.authorized {
                    Ok(Decision::allowed())
                } else {
                    Ok(Decision::denied(
                        parsed
                            .reason
                            .unwrap_or_else(|| DEFAULT_DENIAL_REASON.to_string()),
                    ))
                }
            }
            StatusCode::CONFLICT => Ok(Decision::denied(denial_reason(&text))),
            _ => Err(FetchError::Status {
                endpoint,
                status: status.as_u16(),
                body: text,
            }),
        }
    }
}

/// Reason from a 409 body, which may or may not be JSON.
fn denial_reason(body: &str) -> String {
    match serde_json::from_str::<AuthorizeResponseWire>(body) {
        Ok(AuthorizeResponseWire {
            reason: Some(reason),
            ..
        }) => reason,
        Ok(_) => DEFAULT_DENIAL_REASON.to_string(),
        Err(_) if body.trim().is_empty() => DEFAULT_DENIAL_REASON.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl BackendApi for HttpBackendClient {
    async fn authorize(
        &self,
        target: &BackendTarget,
        credentials: &AppCredentials,
        usage: &UsageDelta,
    ) -> Result<Decision, FetchError> {
        self.decide(target, "authorize", credentials, usage).await
    }

    async fn authrep(
        &self,
        target: &BackendTarget,
        credentials: &AppCredentials,
        usage: &UsageDelta,
    ) -> Result<Decision, FetchError> {
        self.decide(target, "authrep", credentials, usage).await
    }

    async fn report(
        &self,
        target: &BackendTarget,
        transactions: &[Transaction],
    ) -> Result<(), FetchError> {
        let endpoint = format!("{}/transactions.json", target.url);
        let body = ReportRequestWire {
            service_id: &target.service_id,
            service_token: &target.service_token,
            transactions: transactions
                .iter()
                .map(|tx| TransactionWire {
                    credentials: (&tx.credentials).into(),
                    usage: &tx.usage,
                })
                .collect(),
        };

        let (status, text) = self.post(&endpoint, &body).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(FetchError::Status {
                endpoint,
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_http_client;
    use serde_json::json;
    use turnstile_core::ClientConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpBackendClient {
        HttpBackendClient::new(build_http_client(&ClientConfig::default()).unwrap())
    }

    fn target(server: &MockServer) -> BackendTarget {
        BackendTarget::new(server.uri(), "42", "svc-token")
    }

    #[tokio::test]
    async fn test_authrep_allowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions/authrep.json"))
            .and(body_partial_json(json!({
                "service_id": "42",
                "service_token": "svc-token",
                "user_key": "uk-1",
                "usage": {"hits": 1}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authorized": true})))
            .expect(1)
            .mount(&server)
            .await;

        let decision = client()
            .authrep(
                &target(&server),
                &AppCredentials::user_key("uk-1"),
                &UsageDelta::single("hits", 1),
            )
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_authorize_denied_with_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions/authorize.json"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "authorized": false,
                "reason": "usage limits are exceeded"
            })))
            .mount(&server)
            .await;

        let decision = client()
            .authorize(
                &target(&server),
                &AppCredentials::app_id("app-1", None),
                &UsageDelta::single("hits", 1),
            )
            .await
            .unwrap();
        assert!(!decision.is_allowed());
        assert_eq!(decision.reason.as_deref(), Some("usage limits are exceeded"));
    }

    #[tokio::test]
    async fn test_server_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions/authorize.json"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client()
            .authorize(
                &target(&server),
                &AppCredentials::user_key("uk-1"),
                &UsageDelta::single("hits", 1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_report_sends_all_transactions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions.json"))
            .and(body_partial_json(json!({
                "service_id": "42",
                "transactions": [
                    {"user_key": "uk-1", "usage": {"hits": 2}},
                    {"app_id": "app-1", "usage": {"hits": 1, "search": 4}}
                ]
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mut search = UsageDelta::single("hits", 1);
        search.add("search", 4);
        let transactions = vec![
            Transaction {
                credentials: AppCredentials::user_key("uk-1"),
                usage: UsageDelta::single("hits", 2),
            },
            Transaction {
                credentials: AppCredentials::app_id("app-1", None),
                usage: search,
            },
        ];

        client()
            .report(&target(&server), &transactions)
            .await
            .unwrap();
    }

    #[test]
    fn test_denial_reason_parsing() {
        assert_eq!(denial_reason(r#"{"authorized":false,"reason":"limits"}"#), "limits");
        assert_eq!(denial_reason(r#"{"authorized":false}"#), DEFAULT_DENIAL_REASON);
        assert_eq!(denial_reason("application key is invalid"), "application key is invalid");
        assert_eq!(denial_reason(""), DEFAULT_DENIAL_REASON);
    }
}
