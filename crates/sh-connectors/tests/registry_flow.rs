//! End-to-end registry behavior against scripted adapters.

use sh_connectors::{
    AuthType, ConnectionConfig, ConnectorRegistry, MockAdapter, ServiceError, ServiceType,
};
use sh_core::{Aes256GcmEncryptor, AuditConfig, ErrorHandler, FeatureToggles, MemorySessionStore};
use sh_observability::{
    AuditMetadata, MemoryAuditStore, MetadataProvider, MockAuditSink, SecurityAuditLog,
    SharedNetworkStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct FixedMetadata;

#[async_trait::async_trait]
impl MetadataProvider for FixedMetadata {
    async fn resolve(&self) -> AuditMetadata {
        AuditMetadata {
            session_id: "test-session".into(),
            device_id: "test-device".into(),
            user_agent: "test-agent".into(),
            ip_hash: "0".repeat(64),
            environment: "test".into(),
        }
    }
}

struct Harness {
    registry: Arc<ConnectorRegistry>,
    audit: Arc<SecurityAuditLog>,
}

async fn harness_with(toggles: FeatureToggles, overrides: HashMap<ServiceType, String>) -> Harness {
    let audit = Arc::new(
        SecurityAuditLog::new(
            AuditConfig {
                buffer_size: 1000,
                retry_delay_ms: 1,
                max_retries: 1,
                persist_events: false,
                encryption_key: None,
            },
            "test",
            Arc::new(Aes256GcmEncryptor::new([7u8; 32])),
            Arc::new(MemoryAuditStore::default()),
            Arc::new(MockAuditSink::new()),
            Arc::new(SharedNetworkStatus::new(true)),
            Arc::new(FixedMetadata),
        )
        .await,
    );
    let errors = Arc::new(ErrorHandler::new(Arc::new(MemorySessionStore::default())));
    let registry = Arc::new(ConnectorRegistry::new(
        toggles,
        overrides,
        audit.clone(),
        errors,
    ));
    Harness { registry, audit }
}

async fn harness() -> Harness {
    harness_with(FeatureToggles::all_enabled(), HashMap::new()).await
}

fn config() -> ConnectionConfig {
    ConnectionConfig::new("https://svc.example.com", AuthType::ApiKey)
        .with_credential("api_key", "k-123")
}

async fn event_types(audit: &SecurityAuditLog) -> Vec<String> {
    audit
        .entries()
        .await
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

#[tokio::test]
async fn test_connect_without_adapter_fails_without_dialing() {
    let h = harness().await;
    let err = h
        .registry
        .connect(ServiceType::Vi, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Adapter { .. }));
    assert_eq!(err.code(), "NO_ADAPTER");
    assert_eq!(err.status(), 501);
}

#[tokio::test]
async fn test_config_error_precedes_any_handshake() {
    let h = harness().await;
    let adapter = Arc::new(MockAdapter::new(ServiceType::Soar));
    adapter.set_missing_fields(vec!["username".into(), "api_key".into()]);
    h.registry.register_adapter(adapter.clone()).await;

    let err = h
        .registry
        .connect(ServiceType::Soar, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Config { .. }));
    // Validation failed before the adapter ever dialed out
    assert_eq!(adapter.init_calls(), 0);
    assert!(event_types(&h.audit)
        .await
        .contains(&"SOAR_CONFIG_ERROR".to_string()));
}

#[tokio::test]
async fn test_non_http_endpoint_rejected_before_handshake() {
    let h = harness().await;
    let adapter = Arc::new(MockAdapter::new(ServiceType::Vi));
    h.registry.register_adapter(adapter.clone()).await;

    let bad = ConnectionConfig::new("ftp://vi.example.com", AuthType::ApiKey)
        .with_credential("api_key", "k");
    let err = h.registry.connect(ServiceType::Vi, &bad).await.unwrap_err();
    assert!(matches!(err, ServiceError::Config { missing, .. } if missing == ["base_url"]));
    assert_eq!(adapter.init_calls(), 0);
}

#[tokio::test]
async fn test_endpoint_override_takes_precedence() {
    let overrides = HashMap::from([(
        ServiceType::Vi,
        "https://override.example.com".to_string(),
    )]);
    let h = harness_with(FeatureToggles::all_enabled(), overrides).await;
    h.registry
        .register_adapter(Arc::new(MockAdapter::new(ServiceType::Vi)))
        .await;

    let session = h.registry.connect(ServiceType::Vi, &config()).await.unwrap();
    assert_eq!(session.base_url, "https://override.example.com");
}

#[tokio::test]
async fn test_disabled_toggle_skips_registration() {
    // Defaults disable ASM
    let h = harness_with(FeatureToggles::default(), HashMap::new()).await;
    h.registry
        .register_adapter(Arc::new(MockAdapter::new(ServiceType::Asm)))
        .await;

    let err = h
        .registry
        .connect(ServiceType::Asm, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Adapter { .. }));
    assert!(event_types(&h.audit)
        .await
        .contains(&"ADAPTER_DISABLED".to_string()));
}

#[tokio::test]
async fn test_successful_connect_caches_and_audits() {
    let h = harness().await;
    let adapter = Arc::new(MockAdapter::new(ServiceType::Cti));
    h.registry.register_adapter(adapter.clone()).await;

    let session = h.registry.connect(ServiceType::Cti, &config()).await.unwrap();
    let cached = h
        .registry
        .get_service_connection(ServiceType::Cti)
        .await
        .unwrap();
    assert_eq!(session.session_id, cached.session_id);
    assert!(Arc::ptr_eq(&session, &cached));

    let events = event_types(&h.audit).await;
    assert!(events.contains(&"ADAPTER_REGISTERED".to_string()));
    assert!(events.contains(&"CONNECTION_SUCCESS".to_string()));
}

#[tokio::test]
async fn test_audit_context_never_carries_credentials() {
    let h = harness().await;
    h.registry
        .register_adapter(Arc::new(MockAdapter::new(ServiceType::Vi)))
        .await;
    let config = ConnectionConfig::new("https://vi.example.com", AuthType::ApiKey)
        .with_credential("api_key", "sk-very-secret-key");
    h.registry.connect(ServiceType::Vi, &config).await.unwrap();

    for event in h.audit.entries().await {
        let context = serde_json::to_string(&event.context).unwrap();
        assert!(
            !context.contains("sk-very-secret-key"),
            "secret leaked into audit context of {}",
            event.event_type
        );
    }
}

#[tokio::test]
async fn test_lookup_never_dials() {
    let h = harness().await;
    let adapter = Arc::new(MockAdapter::new(ServiceType::Vi));
    h.registry.register_adapter(adapter.clone()).await;

    let err = h
        .registry
        .get_service_connection(ServiceType::Vi)
        .await
        .unwrap_err();
    assert_eq!(err.status(), 503);
    assert_eq!(adapter.init_calls(), 0);
}

#[tokio::test]
async fn test_failed_connect_reports_and_leaves_no_session() {
    let h = harness().await;
    let adapter = Arc::new(MockAdapter::new(ServiceType::Soar));
    adapter.fail_initialize("backend unreachable");
    h.registry.register_adapter(adapter).await;

    let err = h
        .registry
        .connect(ServiceType::Soar, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Connection { .. }));
    assert!(h
        .registry
        .get_service_connection(ServiceType::Soar)
        .await
        .is_err());
    assert!(event_types(&h.audit)
        .await
        .contains(&"CONNECTION_FAILED".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_handshake() {
    let h = harness().await;
    let adapter = Arc::new(MockAdapter::new(ServiceType::Vi));
    adapter.set_init_delay(Duration::from_millis(200));
    h.registry.register_adapter(adapter.clone()).await;

    let r1 = {
        let registry = h.registry.clone();
        tokio::spawn(async move { registry.connect(ServiceType::Vi, &config()).await })
    };
    let r2 = {
        let registry = h.registry.clone();
        tokio::spawn(async move { registry.connect(ServiceType::Vi, &config()).await })
    };

    let s1 = r1.await.unwrap().unwrap();
    let s2 = r2.await.unwrap().unwrap();
    assert_eq!(s1.session_id, s2.session_id);
    assert_eq!(adapter.init_calls(), 1);
    assert_eq!(h.registry.active_count().await, 1);
}

#[tokio::test]
async fn test_sequential_reconnect_replaces_session() {
    let h = harness().await;
    let adapter = Arc::new(MockAdapter::new(ServiceType::Vi));
    h.registry.register_adapter(adapter.clone()).await;

    let first = h.registry.connect(ServiceType::Vi, &config()).await.unwrap();
    let second = h.registry.connect(ServiceType::Vi, &config()).await.unwrap();
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(adapter.init_calls(), 2);
    assert_eq!(h.registry.active_count().await, 1);
}

#[tokio::test]
async fn test_reconnect_terminates_superseded_session() {
    let h = harness().await;
    let adapter = Arc::new(MockAdapter::new(ServiceType::Vi));
    h.registry.register_adapter(adapter.clone()).await;

    let first = h.registry.connect(ServiceType::Vi, &config()).await.unwrap();
    assert_eq!(adapter.terminate_calls(), 0);

    let second = h.registry.connect(ServiceType::Vi, &config()).await.unwrap();
    assert_ne!(first.session_id, second.session_id);
    // Replacing a cached session tears the old one down
    assert_eq!(adapter.terminate_calls(), 1);
    assert_eq!(h.registry.active_count().await, 1);

    let summary = h.registry.disconnect_all().await;
    assert_eq!(summary.attempted, 1);
    // Every session handed out was terminated exactly once
    assert_eq!(adapter.terminate_calls(), 2);
    assert_eq!(adapter.init_calls(), 2);
}

#[tokio::test]
async fn test_disconnect_all_is_all_settled() {
    let h = harness().await;
    let failing = Arc::new(MockAdapter::new(ServiceType::Vi));
    failing.fail_terminate(true);
    let clean = Arc::new(MockAdapter::new(ServiceType::Soar));
    h.registry.register_adapter(failing.clone()).await;
    h.registry.register_adapter(clean.clone()).await;

    h.registry.connect(ServiceType::Vi, &config()).await.unwrap();
    h.registry.connect(ServiceType::Soar, &config()).await.unwrap();

    let summary = h.registry.disconnect_all().await;
    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.failures, 1);
    assert!(!summary.clean());
    assert!(matches!(
        summary.warning(),
        Some(ServiceError::Disconnect { failures: 1 })
    ));

    // Both terminations ran despite one failing; cache is empty regardless
    assert_eq!(failing.terminate_calls(), 1);
    assert_eq!(clean.terminate_calls(), 1);
    assert_eq!(h.registry.active_count().await, 0);
    assert!(event_types(&h.audit)
        .await
        .contains(&"DISCONNECT_WARNINGS".to_string()));
}

#[tokio::test]
async fn test_disconnect_all_is_idempotent() {
    let h = harness().await;
    let adapter = Arc::new(MockAdapter::new(ServiceType::Vi));
    h.registry.register_adapter(adapter.clone()).await;
    h.registry.connect(ServiceType::Vi, &config()).await.unwrap();

    let first = h.registry.disconnect_all().await;
    assert_eq!(first.attempted, 1);
    assert!(first.clean());

    let second = h.registry.disconnect_all().await;
    assert_eq!(second.attempted, 0);
    assert_eq!(adapter.terminate_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_racing_connect_terminates_fresh_session() {
    let h = harness().await;
    let adapter = Arc::new(MockAdapter::new(ServiceType::Vi));
    adapter.set_init_delay(Duration::from_millis(500));
    h.registry.register_adapter(adapter.clone()).await;

    let pending = {
        let registry = h.registry.clone();
        tokio::spawn(async move { registry.connect(ServiceType::Vi, &config()).await })
    };
    // Let the handshake begin before tearing everything down
    tokio::task::yield_now().await;
    h.registry.disconnect_all().await;

    let result = pending.await.unwrap();
    let err = result.unwrap_err();
    assert!(matches!(err, ServiceError::Connection { .. }));
    // The fresh session was terminated instead of being cached
    assert_eq!(adapter.terminate_calls(), 1);
    assert_eq!(h.registry.active_count().await, 0);
}
