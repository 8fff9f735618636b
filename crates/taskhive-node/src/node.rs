use crate::auth::{AuthError, AuthProvider, LocalAuthProvider, NewAccount};
use crate::bootstrap;
use crate::config::NodeConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use taskhive_market::{
    quota, CatalogGenerator, JsonFileStore, MarketEngine, MarketStore, MemoryStore, Session,
};
use taskhive_types::{UserId, UserRecord};
use tracing::info;

/// Application node: storage backend selection, engine wiring, auth, and
/// first-run bootstrap.
pub struct TaskhiveNode {
    pub config: NodeConfig,
    pub engine: Arc<MarketEngine>,
    pub auth: Arc<LocalAuthProvider>,
}

impl TaskhiveNode {
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let store: Arc<dyn MarketStore> = match config.storage.backend.as_str() {
            "file" => {
                if let Some(parent) = config.storage.path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create data dir {}", parent.display()))?;
                }
                Arc::new(
                    JsonFileStore::open(&config.storage.path)
                        .with_context(|| "open file-backed user store")?,
                )
            }
            _ => Arc::new(MemoryStore::new()),
        };

        let engine = Arc::new(MarketEngine::with_generator(
            store,
            config.market_config(),
            Arc::new(CatalogGenerator::new()),
        ));
        let auth = Arc::new(LocalAuthProvider::new());

        bootstrap::apply(&engine, &auth, &config).await?;

        info!(
            node = %config.node.name,
            backend = %config.storage.backend,
            reward_policy = ?config.market.reward_policy,
            "🚀 Node ready"
        );
        Ok(Self {
            config,
            engine,
            auth,
        })
    }

    /// Public registration: credential first, then the profile record with
    /// the standard signup grants.
    pub async fn register(&self, account: NewAccount) -> Result<UserId, AuthError> {
        let name = account.name.trim().to_string();
        let email = account.email.trim().to_lowercase();
        let user_id = self.auth.sign_up(account).await?;

        let record = UserRecord::new_registrant(user_id.clone(), name, email, quota::today_utc());
        self.engine
            .register_user(&record)
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))?;
        Ok(user_id)
    }

    /// Sign in and run the session check-in (daily quota roll).
    pub async fn login(&self, identifier: &str, password: &str) -> Result<(String, Session), AuthError> {
        let token = self.auth.sign_in(identifier, password).await?;
        let user_id = self
            .auth
            .current_user(&token)
            .await
            .ok_or(AuthError::UnknownSession)?;
        let session = self
            .engine
            .session_for(&user_id)
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))?;
        self.engine
            .ledger
            .check_in(&session)
            .await
            .map_err(|e| AuthError::Profile(e.to_string()))?;
        Ok((token, session))
    }

    pub async fn session_from_token(&self, token: &str) -> Option<Session> {
        let user_id = self.auth.current_user(token).await?;
        self.engine.session_for(&user_id).await.ok()
    }
}
