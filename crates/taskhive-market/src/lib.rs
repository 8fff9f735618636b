//! # Taskhive Market
//!
//! The marketplace engine: account ledger, task lifecycle, daily quota
//! monitor, admin template pool, and the storage/generation collaborators.
//!
//! All state mutation goes through an explicit [`Session`] context and a
//! compare-and-swap storage write; there is no global "current user" and no
//! last-write-wins overwrite.

pub mod generator;
pub mod ledger;
pub mod lifecycle;
pub mod marketplace;
pub mod quota;
pub mod store;

pub use generator::{CatalogGenerator, GenerationQuery, TaskGenerator};
pub use ledger::LedgerManager;
pub use lifecycle::LifecycleManager;
pub use marketplace::MarketplaceManager;
pub use store::{JsonFileStore, MarketStore, MemoryStore, StoreEvent, StoreHandle};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use taskhive_types::{MarketError, Result, Role, TaskId, TaskTemplate, UserId, UserRecord};
use tokio::sync::{broadcast, RwLock};

pub(crate) type SharedPool = Arc<RwLock<BTreeMap<TaskId, TaskTemplate>>>;

/// When the task reward is credited to the worker's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RewardPolicy {
    /// Credited when an admin approves the submission (default; no reclaim
    /// path exists under this policy).
    #[default]
    OnApproval,
    /// Credited immediately at submission and reclaimed on rejection; the
    /// original prototype's behavior, kept for compatibility.
    OnSubmission,
}

#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub reward_policy: RewardPolicy,
    pub min_submission_len: usize,
    /// Bound on every backing-store call; expiry is a reportable failure.
    pub store_timeout: Duration,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            reward_policy: RewardPolicy::OnApproval,
            min_submission_len: 10,
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// Explicit per-operation actor context, produced by the auth layer.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub role: Role,
}

impl Session {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(MarketError::Unauthorized)
        }
    }
}

/// Facade wiring the managers over one store handle and one template pool.
pub struct MarketEngine {
    pub ledger: Arc<LedgerManager>,
    pub lifecycle: Arc<LifecycleManager>,
    pub marketplace: Arc<MarketplaceManager>,
    store: StoreHandle,
}

impl MarketEngine {
    pub fn new(store: Arc<dyn MarketStore>, config: MarketConfig) -> Self {
        Self::build(store, config, None)
    }

    pub fn with_generator(
        store: Arc<dyn MarketStore>,
        config: MarketConfig,
        generator: Arc<dyn TaskGenerator>,
    ) -> Self {
        Self::build(store, config, Some(generator))
    }

    fn build(
        store: Arc<dyn MarketStore>,
        config: MarketConfig,
        generator: Option<Arc<dyn TaskGenerator>>,
    ) -> Self {
        let handle = StoreHandle::new(store, config.store_timeout);
        let pool: SharedPool = Arc::new(RwLock::new(BTreeMap::new()));

        let mut marketplace = MarketplaceManager::new(handle.clone(), pool.clone());
        if let Some(generator) = generator {
            marketplace = marketplace.with_generator(generator);
        }

        Self {
            ledger: Arc::new(LedgerManager::new(handle.clone())),
            lifecycle: Arc::new(LifecycleManager::new(handle.clone(), pool, config)),
            marketplace: Arc::new(marketplace),
            store: handle,
        }
    }

    /// First write for a fresh account (registration, bootstrap).
    pub async fn register_user(&self, record: &UserRecord) -> Result<()> {
        self.store.insert(record).await
    }

    /// Resolve a stored user into a session context.
    pub async fn session_for(&self, user_id: &UserId) -> Result<Session> {
        let record = self.store.load(user_id).await?;
        Ok(Session::new(record.id, record.role))
    }

    pub async fn get_user(&self, user_id: &UserId) -> Result<UserRecord> {
        self.store.load(user_id).await
    }

    /// Store change stream, for real-time admin views.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }
}
