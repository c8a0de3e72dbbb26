//! Scriptable adapter used by registry and guard tests.

use crate::adapter::ServiceAdapter;
use crate::types::{ConnectionConfig, Session};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sh_core::{ServiceError, ServiceType};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Adapter whose behavior is scripted per test: forced validation failures,
/// forced handshake failures, artificial handshake latency, failing logout.
pub struct MockAdapter {
    service: ServiceType,
    missing_fields: Mutex<Vec<String>>,
    init_failure: Mutex<Option<String>>,
    init_delay: Mutex<Option<Duration>>,
    fail_terminate: AtomicBool,
    init_calls: AtomicUsize,
    terminate_calls: AtomicUsize,
    session_ttl_secs: Mutex<i64>,
}

impl MockAdapter {
    pub fn new(service: ServiceType) -> Self {
        Self {
            service,
            missing_fields: Mutex::new(Vec::new()),
            init_failure: Mutex::new(None),
            init_delay: Mutex::new(None),
            fail_terminate: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            terminate_calls: AtomicUsize::new(0),
            session_ttl_secs: Mutex::new(3600),
        }
    }

    /// `validate_config` will report these fields as missing.
    pub fn set_missing_fields(&self, fields: Vec<String>) {
        *self.missing_fields.lock().unwrap() = fields;
    }

    /// `initialize` will fail with a connection error.
    pub fn fail_initialize(&self, message: impl Into<String>) {
        *self.init_failure.lock().unwrap() = Some(message.into());
    }

    /// `initialize` will sleep before completing the handshake.
    pub fn set_init_delay(&self, delay: Duration) {
        *self.init_delay.lock().unwrap() = Some(delay);
    }

    /// `terminate` will fail with a termination error.
    pub fn fail_terminate(&self, fail: bool) {
        self.fail_terminate.store(fail, Ordering::SeqCst);
    }

    /// Sessions will expire this long after the handshake.
    pub fn set_session_ttl_secs(&self, secs: i64) {
        *self.session_ttl_secs.lock().unwrap() = secs;
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn terminate_calls(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceAdapter for MockAdapter {
    fn service_type(&self) -> ServiceType {
        self.service
    }

    fn validate_config(&self, _config: &ConnectionConfig) -> Result<(), ServiceError> {
        let missing = self.missing_fields.lock().unwrap().clone();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Config {
                service: self.service,
                missing,
            })
        }
    }

    async fn initialize(&self, config: &ConnectionConfig) -> Result<Session, ServiceError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.init_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.init_failure.lock().unwrap().clone() {
            return Err(ServiceError::Connection {
                service: self.service,
                message,
            });
        }

        let ttl = *self.session_ttl_secs.lock().unwrap();
        Ok(Session {
            service: self.service,
            session_id: Uuid::new_v4().to_string(),
            token: "mock-token".into(),
            refresh_token: None,
            base_url: config.base_url.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(ttl),
            endpoints: HashMap::new(),
        })
    }

    async fn terminate(&self, _session: &Session) -> Result<(), ServiceError> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_terminate.load(Ordering::SeqCst) {
            Err(ServiceError::Termination {
                service: self.service,
                message: "simulated logout failure".into(),
            })
        } else {
            Ok(())
        }
    }
}
