use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taskhive_types::{MarketError, Result, UserId, UserRecord};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// Buffer for the store change stream before old events are dropped.
const EVENT_BUFFER: usize = 256;

/// Change events emitted by a store, for real-time admin views.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    UserUpserted { user_id: UserId, version: u64 },
}

/// Persistent user-record collaborator.
///
/// Writes are compare-and-swap on the record's version counter: a `put` whose
/// version does not match the stored record fails with `VersionConflict`
/// instead of silently overwriting a concurrent session's update.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn get(&self, id: &UserId) -> Result<Option<UserRecord>>;

    /// CAS write. Returns the new version on success; the caller is expected
    /// to adopt it before writing again.
    async fn put(&self, record: &UserRecord) -> Result<u64>;

    /// First write for a fresh registrant; fails if the id is taken.
    async fn insert(&self, record: &UserRecord) -> Result<()>;

    async fn list(&self) -> Result<Vec<UserRecord>>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Store access with the bounded timeout required at every suspension point.
/// Timeout expiry surfaces as a reportable error, never a silent retry.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn MarketStore>,
    timeout: Duration,
}

impl StoreHandle {
    pub fn new(inner: Arc<dyn MarketStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(MarketError::Timeout),
        }
    }

    pub async fn try_get(&self, id: &UserId) -> Result<Option<UserRecord>> {
        self.bounded(self.inner.get(id)).await
    }

    pub async fn load(&self, id: &UserId) -> Result<UserRecord> {
        self.try_get(id)
            .await?
            .ok_or_else(|| MarketError::UserNotFound(id.to_string()))
    }

    /// CAS write; adopts the new version into `record` on success.
    pub async fn save(&self, record: &mut UserRecord) -> Result<()> {
        let version = self.bounded(self.inner.put(record)).await?;
        record.version = version;
        Ok(())
    }

    pub async fn insert(&self, record: &UserRecord) -> Result<()> {
        self.bounded(self.inner.insert(record)).await
    }

    pub async fn list(&self) -> Result<Vec<UserRecord>> {
        self.bounded(self.inner.list()).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.subscribe()
    }
}

type UserMap = HashMap<UserId, UserRecord>;

/// In-memory backend.
pub struct MemoryStore {
    users: Arc<RwLock<UserMap>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }
}

fn cas_upsert(users: &mut UserMap, record: &UserRecord) -> Result<u64> {
    let stored = users
        .get(&record.id)
        .ok_or_else(|| MarketError::UserNotFound(record.id.to_string()))?;

    if stored.version != record.version {
        return Err(MarketError::VersionConflict {
            expected: record.version,
            actual: stored.version,
        });
    }

    let mut updated = record.clone();
    updated.version = record.version + 1;
    let version = updated.version;
    users.insert(record.id.clone(), updated);
    Ok(version)
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn get(&self, id: &UserId) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.get(id).cloned())
    }

    async fn put(&self, record: &UserRecord) -> Result<u64> {
        let mut users = self.users.write().await;
        let version = cas_upsert(&mut users, record)?;

        debug!(
            user_id = %record.id,
            version = version,
            storage_type = "memory",
            "💾 User record stored"
        );
        let _ = self.events.send(StoreEvent::UserUpserted {
            user_id: record.id.clone(),
            version,
        });
        Ok(version)
    }

    async fn insert(&self, record: &UserRecord) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&record.id) {
            return Err(MarketError::Storage(format!(
                "user {} already registered",
                record.id
            )));
        }

        let mut fresh = record.clone();
        fresh.version = 1;
        let version = fresh.version;
        users.insert(record.id.clone(), fresh);

        info!(
            user_id = %record.id,
            storage_type = "memory",
            "💾 User record created"
        );
        let _ = self.events.send(StoreEvent::UserUpserted {
            user_id: record.id.clone(),
            version,
        });
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        let users = self.users.read().await;
        let mut records: Vec<UserRecord> = users.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

/// File-backed backend: the whole user table as one JSON document, reloaded
/// on open and rewritten after every successful mutation. The in-memory map
/// stays authoritative between writes.
pub struct JsonFileStore {
    path: PathBuf,
    users: Arc<RwLock<UserMap>>,
    events: broadcast::Sender<StoreEvent>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let users = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| MarketError::Storage(format!("read {}: {}", path.display(), e)))?;
            serde_json::from_str::<UserMap>(&content)?
        } else {
            HashMap::new()
        };

        info!(
            path = %path.display(),
            users = users.len(),
            storage_type = "file",
            "🗄️ User table loaded"
        );

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Self {
            path,
            users: Arc::new(RwLock::new(users)),
            events,
        })
    }

    fn persist(&self, users: &UserMap) -> Result<()> {
        let content = serde_json::to_string_pretty(users)?;
        std::fs::write(&self.path, content)
            .map_err(|e| MarketError::Storage(format!("write {}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl MarketStore for JsonFileStore {
    async fn get(&self, id: &UserId) -> Result<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.get(id).cloned())
    }

    async fn put(&self, record: &UserRecord) -> Result<u64> {
        let mut users = self.users.write().await;
        let version = cas_upsert(&mut users, record)?;
        self.persist(&users)?;

        debug!(
            user_id = %record.id,
            version = version,
            storage_type = "file",
            "💾 User record stored"
        );
        let _ = self.events.send(StoreEvent::UserUpserted {
            user_id: record.id.clone(),
            version,
        });
        Ok(version)
    }

    async fn insert(&self, record: &UserRecord) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&record.id) {
            return Err(MarketError::Storage(format!(
                "user {} already registered",
                record.id
            )));
        }

        let mut fresh = record.clone();
        fresh.version = 1;
        let version = fresh.version;
        users.insert(record.id.clone(), fresh);
        self.persist(&users)?;

        let _ = self.events.send(StoreEvent::UserUpserted {
            user_id: record.id.clone(),
            version,
        });
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        let users = self.users.read().await;
        let mut records: Vec<UserRecord> = users.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(id: &str) -> UserRecord {
        UserRecord::new_registrant(
            UserId::from_string(id),
            id,
            format!("{}@example.com", id),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        let rec = record("u-1");

        store.insert(&rec).await.unwrap();
        let loaded = store.get(&rec.id).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.name, "u-1");

        // Duplicate registration rejected
        assert!(store.insert(&rec).await.is_err());
    }

    #[tokio::test]
    async fn test_version_conflict() {
        let store = MemoryStore::new();
        let rec = record("u-1");
        store.insert(&rec).await.unwrap();

        // Two sessions load the same version
        let mut session_a = store.get(&rec.id).await.unwrap().unwrap();
        let session_b = store.get(&rec.id).await.unwrap().unwrap();

        session_a.name = "renamed".to_string();
        let v = store.put(&session_a).await.unwrap();
        assert_eq!(v, 2);

        // The stale write loses instead of clobbering
        let err = store.put(&session_b).await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::VersionConflict {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_put_unknown_user() {
        let store = MemoryStore::new();
        let rec = record("ghost");
        assert!(matches!(
            store.put(&rec).await.unwrap_err(),
            MarketError::UserNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_subscribe_sees_writes() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();

        let rec = record("u-1");
        store.insert(&rec).await.unwrap();

        match events.recv().await.unwrap() {
            StoreEvent::UserUpserted { user_id, version } => {
                assert_eq!(user_id, rec.id);
                assert_eq!(version, 1);
            }
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("users.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.insert(&record("u-1")).await.unwrap();
            let mut rec = store.get(&UserId::from_string("u-1")).await.unwrap().unwrap();
            rec.tasks_completed_today = 3;
            store.put(&rec).await.unwrap();
        }

        // Reopen from disk
        let store = JsonFileStore::open(&path).unwrap();
        let rec = store.get(&UserId::from_string("u-1")).await.unwrap().unwrap();
        assert_eq!(rec.tasks_completed_today, 3);
        assert_eq!(rec.version, 2);
    }

    #[tokio::test]
    async fn test_store_handle_timeout_path() {
        use async_trait::async_trait;

        struct StalledStore;

        #[async_trait]
        impl MarketStore for StalledStore {
            async fn get(&self, _id: &UserId) -> Result<Option<UserRecord>> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(None)
            }
            async fn put(&self, _record: &UserRecord) -> Result<u64> {
                unreachable!()
            }
            async fn insert(&self, _record: &UserRecord) -> Result<()> {
                unreachable!()
            }
            async fn list(&self) -> Result<Vec<UserRecord>> {
                unreachable!()
            }
            fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
                let (tx, _) = broadcast::channel(1);
                tx.subscribe()
            }
        }

        let handle = StoreHandle::new(Arc::new(StalledStore), Duration::from_millis(20));
        let err = handle.try_get(&UserId::from_string("u-1")).await.unwrap_err();
        assert_eq!(err, MarketError::Timeout);
    }
}
