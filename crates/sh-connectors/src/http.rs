//! HTTP plumbing for adapter handshakes.
//!
//! Auth requests are retried only on timeouts, connect failures, and 5xx
//! responses; a 4xx is authoritative and returned immediately. Every attempt
//! carries a fresh `X-Request-Nonce` so backends can deduplicate replayed
//! handshakes.

use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sh_core::{ServiceError, ServiceType};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Upper bound for single-attempt teardown calls. A hung logout must not
/// stall a full disconnect.
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for a single service's auth endpoints.
#[derive(Clone)]
pub struct AuthHttpClient {
    client: Client,
    service: ServiceType,
}

/// Static headers attached to every attempt of a request.
pub type Headers = Vec<(&'static str, String)>;

impl AuthHttpClient {
    pub fn new(service: ServiceType) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| ServiceError::Connection {
                service,
                message: format!("http client init: {}", e),
            })?;
        Ok(Self { client, service })
    }

    /// POSTs a JSON body and parses a JSON response, retrying transient
    /// failures up to `max_attempts` total attempts.
    pub async fn post_auth<B, R>(
        &self,
        url: &str,
        headers: &Headers,
        body: &B,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut last_error = ServiceError::Connection {
            service: self.service,
            message: "no attempt made".into(),
        };
        let mut backoff = INITIAL_BACKOFF;

        for attempt in 1..=max_attempts.max(1) {
            if attempt > 1 {
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
                sleep(backoff + jitter).await;
                backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
            }

            let mut request = self
                .client
                .post(url)
                .timeout(timeout)
                .header("X-Request-Nonce", Uuid::new_v4().to_string())
                .json(body);
            for (name, value) in headers {
                request = request.header(*name, value);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() {
                        warn!(service = self.service.tag(), %status, attempt, "server error, retrying");
                        last_error = ServiceError::Connection {
                            service: self.service,
                            message: format!("server error: {}", status),
                        };
                        continue;
                    }
                    if status.is_client_error() {
                        // Authoritative rejection, retrying cannot help
                        return Err(ServiceError::Connection {
                            service: self.service,
                            message: format!("authentication rejected: {}", status),
                        });
                    }
                    return self.parse_json(response).await;
                }
                Err(e) if e.is_timeout() => {
                    debug!(service = self.service.tag(), attempt, "request timed out");
                    last_error = ServiceError::Connection {
                        service: self.service,
                        message: format!("timed out after {:?}", timeout),
                    };
                }
                Err(e) if e.is_connect() => {
                    debug!(service = self.service.tag(), attempt, "connect failed");
                    last_error = ServiceError::Connection {
                        service: self.service,
                        message: format!("connect failed: {}", e),
                    };
                }
                Err(e) => {
                    // Not known to be idempotency-safe, do not retry
                    return Err(ServiceError::Connection {
                        service: self.service,
                        message: format!("request failed: {}", e),
                    });
                }
            }
        }

        Err(last_error)
    }

    /// Single-attempt request for best-effort logout calls, bounded by
    /// [`TERMINATE_TIMEOUT`].
    pub async fn execute_once(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(), ServiceError> {
        self.execute_once_within(request, TERMINATE_TIMEOUT).await
    }

    pub(crate) async fn execute_once_within(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<(), ServiceError> {
        let response = request.timeout(timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Connection {
                    service: self.service,
                    message: format!("timed out after {:?}", timeout),
                }
            } else {
                ServiceError::Connection {
                    service: self.service,
                    message: format!("request failed: {}", e),
                }
            }
        })?;
        let status = response.status();
        // Logout of an already-dead session is success
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(ServiceError::Connection {
                service: self.service,
                message: format!("unexpected status: {}", status),
            })
        }
    }

    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url)
    }

    pub fn delete(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.delete(url)
    }

    async fn parse_json<R: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<R, ServiceError> {
        let status = response.status();
        let text = response.text().await.map_err(|e| ServiceError::Protocol {
            service: self.service,
            message: format!("reading body: {}", e),
        })?;
        serde_json::from_str(&text).map_err(|e| ServiceError::Protocol {
            service: self.service,
            message: format!(
                "unparseable response (status {}): {}",
                status,
                e
            ),
        })
    }
}
