use crate::auth::{LocalAuthProvider, NewAccount};
use crate::config::NodeConfig;
use anyhow::Result;
use taskhive_market::{quota, MarketEngine, Session};
use taskhive_types::{NewTemplate, Role, TaskKind, Tier, UserRecord};
use tracing::info;

pub const ADMIN_NAME: &str = "admin";
pub const ADMIN_EMAIL: &str = "admin@taskhive.local";

/// First-run seeding: the admin account and a starter template catalog.
/// Idempotent — an existing admin record and a non-empty pool are left alone.
pub async fn apply(
    engine: &MarketEngine,
    auth: &LocalAuthProvider,
    config: &NodeConfig,
) -> Result<()> {
    let admin_id = LocalAuthProvider::account_id(ADMIN_EMAIL);

    if engine.get_user(&admin_id).await.is_err() {
        auth.seed_account(NewAccount {
            name: ADMIN_NAME.to_string(),
            email: ADMIN_EMAIL.to_string(),
            password: config.node.admin_password.clone(),
        })
        .await
        .map_err(|e| anyhow::anyhow!("seed admin credential: {}", e))?;

        let record =
            UserRecord::new_admin(admin_id.clone(), ADMIN_NAME, ADMIN_EMAIL, quota::today_utc());
        engine.register_user(&record).await?;
        info!(user_id = %admin_id, "🧬 Admin account seeded");
    } else {
        // Credential registry is process-local; re-seed it on every start so
        // the persisted admin record stays reachable.
        let _ = auth
            .seed_account(NewAccount {
                name: ADMIN_NAME.to_string(),
                email: ADMIN_EMAIL.to_string(),
                password: config.node.admin_password.clone(),
            })
            .await;
    }

    if engine.marketplace.templates().await.is_empty() {
        let session = Session::new(admin_id, Role::Admin);
        for spec in starter_catalog() {
            engine.marketplace.publish_template(&session, spec).await?;
        }
        info!(
            templates = engine.marketplace.templates().await.len(),
            "🧬 Starter catalog seeded"
        );
    }

    Ok(())
}

fn starter_catalog() -> Vec<NewTemplate> {
    vec![
        NewTemplate {
            kind: TaskKind::Comment,
            description: "Leave a positive comment on a video about travel".to_string(),
            instructions: "Mention one concrete detail from the video".to_string(),
            link: "https://example.com/watch/travel".to_string(),
            tier: Tier::Basic,
        },
        NewTemplate {
            kind: TaskKind::Review,
            description: "Write a 4-star review for \"Central Park\"".to_string(),
            instructions: "At least 80 words, no copied text".to_string(),
            link: "https://example.com/reviews/central-park".to_string(),
            tier: Tier::Basic,
        },
        NewTemplate {
            kind: TaskKind::Social,
            description: "Post a supportive comment on our new page post".to_string(),
            instructions: "Keep the original caption".to_string(),
            link: "https://example.com/page/post".to_string(),
            tier: Tier::Gold,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use taskhive_market::{MarketConfig, MemoryStore};

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let engine = MarketEngine::new(Arc::new(MemoryStore::new()), MarketConfig::default());
        let auth = LocalAuthProvider::new();
        let config = NodeConfig::default();

        apply(&engine, &auth, &config).await.unwrap();
        let templates_after_first = engine.marketplace.templates().await.len();
        assert!(templates_after_first > 0);

        apply(&engine, &auth, &config).await.unwrap();
        assert_eq!(
            engine.marketplace.templates().await.len(),
            templates_after_first
        );

        // Admin record exists exactly once and is an admin
        let admin = engine
            .get_user(&LocalAuthProvider::account_id(ADMIN_EMAIL))
            .await
            .unwrap();
        assert!(admin.is_admin());
    }
}
