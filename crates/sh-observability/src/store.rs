//! Local persistence slot for the audit buffer.
//!
//! A single key-value slot holds the encrypted, serialized event buffer. It
//! is written when a flush cannot reach the remote sink and read back on
//! startup so audit continuity survives restarts and crashes.

use async_trait::async_trait;
use sh_core::ServiceError;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Fixed key under which the encrypted buffer is persisted.
pub const AUDIT_STORE_KEY: &str = "audit_logs";

/// Key-value persistence for the audit buffer.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Reads the value for `key`, or `None` when nothing is persisted.
    async fn read(&self, key: &str) -> Result<Option<String>, ServiceError>;

    /// Writes (replacing) the value for `key`.
    async fn write(&self, key: &str, value: &str) -> Result<(), ServiceError>;

    /// Deletes the value for `key`, if present.
    async fn delete(&self, key: &str) -> Result<(), ServiceError>;
}

/// File-backed store: each key is a file under the base directory.
pub struct FileAuditStore {
    base_dir: PathBuf,
}

impl FileAuditStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.dat", key))
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn read(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ServiceError::Storage(format!(
                "read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| ServiceError::Storage(format!("create dir: {}", e)))?;
        let path = self.path_for(key);
        tokio::fs::write(&path, value)
            .await
            .map_err(|e| ServiceError::Storage(format!("write {}: {}", path.display(), e)))
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServiceError::Storage(format!(
                "delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryAuditStore {
    slots: RwLock<std::collections::HashMap<String, String>>,
    /// When set, `write` fails; used to exercise persistence failure paths.
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryAuditStore {
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of writes performed, for assertions on persist-once behavior.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn read(&self, key: &str) -> Result<Option<String>, ServiceError> {
        Ok(self.slots.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ServiceError::Storage("simulated write failure".into()));
        }
        self.slots
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ServiceError> {
        self.slots.write().await.remove(key);
        Ok(())
    }
}
