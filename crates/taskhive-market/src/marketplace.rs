use crate::generator::{GenerationQuery, TaskGenerator};
use crate::quota;
use crate::store::StoreHandle;
use crate::{Session, SharedPool};
use chrono::Utc;
use std::sync::Arc;
use taskhive_types::{
    MarketError, NewTemplate, Result, TaskId, TaskKind, TaskTemplate, UserId, UserRecord,
};
use tracing::{info, warn};

/// Admin-curated template pool and assignment paths.
pub struct MarketplaceManager {
    store: StoreHandle,
    pool: SharedPool,
    generator: Option<Arc<dyn TaskGenerator>>,
}

impl MarketplaceManager {
    pub fn new(store: StoreHandle, pool: SharedPool) -> Self {
        Self {
            store,
            pool,
            generator: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TaskGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Pool snapshot, in id order.
    pub async fn templates(&self) -> Vec<TaskTemplate> {
        let pool = self.pool.read().await;
        pool.values().cloned().collect()
    }

    pub async fn publish_template(
        &self,
        session: &Session,
        spec: NewTemplate,
    ) -> Result<TaskTemplate> {
        session.require_admin()?;

        let template = TaskTemplate::new(spec, Utc::now());
        let mut pool = self.pool.write().await;
        pool.insert(template.id.clone(), template.clone());

        info!(
            template_id = %template.id,
            kind = %template.kind,
            tier = %template.tier,
            pool_size = pool.len(),
            "📋 Template published"
        );
        Ok(template)
    }

    pub async fn remove_template(&self, session: &Session, template_id: &TaskId) -> Result<()> {
        session.require_admin()?;

        let mut pool = self.pool.write().await;
        pool.remove(template_id)
            .ok_or_else(|| MarketError::TaskNotFound(template_id.to_string()))?;

        info!(template_id = %template_id, pool_size = pool.len(), "🗑️ Template removed");
        Ok(())
    }

    /// Direct assignment: move one pool template into the target's collection
    /// as `available`. No credit charge; the target's assigned counter still
    /// advances.
    pub async fn admin_assign(
        &self,
        session: &Session,
        target: &UserId,
        template_id: &TaskId,
    ) -> Result<UserRecord> {
        session.require_admin()?;

        let mut record = quota::load_rolled(&self.store, target).await?;
        if record.tasks.contains_key(template_id) {
            return Err(MarketError::TaskAlreadyHeld(template_id.to_string()));
        }

        let template = {
            let mut pool = self.pool.write().await;
            pool.remove(template_id)
                .ok_or_else(|| MarketError::TaskNotFound(template_id.to_string()))?
        };

        let now = Utc::now();
        let instance = template.instantiate(now);
        record.tasks.insert(instance.id.clone(), instance);
        record.tasks_assigned_today += 1;
        record.record_history(
            format!("Assigned task: \"{}\"", template.description),
            0,
            now,
        );

        if let Err(e) = self.store.save(&mut record).await {
            // Put the template back so a failed save does not lose it
            let mut pool = self.pool.write().await;
            pool.insert(template.id.clone(), template);
            return Err(e);
        }

        info!(
            user_id = %record.id,
            template_id = %template_id,
            "📌 Task assigned"
        );
        Ok(record)
    }

    /// Bulk assignment, all-or-nothing: if fewer matching templates exist
    /// than requested, nothing is assigned and the short count is reported.
    /// Selection is deterministic (pool id order).
    pub async fn bulk_assign(
        &self,
        session: &Session,
        target: &UserId,
        quantity: usize,
        kind: Option<TaskKind>,
    ) -> Result<Vec<TaskId>> {
        session.require_admin()?;
        if quantity == 0 {
            return Err(MarketError::InvalidAmount);
        }

        let mut record = quota::load_rolled(&self.store, target).await?;

        let removed: Vec<TaskTemplate> = {
            let mut pool = self.pool.write().await;
            let matching: Vec<TaskId> = pool
                .values()
                .filter(|t| kind.map_or(true, |k| t.kind == k))
                .filter(|t| !record.tasks.contains_key(&t.id))
                .map(|t| t.id.clone())
                .collect();

            if matching.len() < quantity {
                return Err(MarketError::InsufficientPoolTasks {
                    requested: quantity,
                    available: matching.len(),
                });
            }

            matching
                .into_iter()
                .take(quantity)
                .map(|id| pool.remove(&id).expect("selected id is in pool"))
                .collect()
        };

        let now = Utc::now();
        let assigned: Vec<TaskId> = removed.iter().map(|t| t.id.clone()).collect();
        for template in &removed {
            let instance = template.instantiate(now);
            record.tasks.insert(instance.id.clone(), instance);
            record.tasks_assigned_today += 1;
            record.record_history(
                format!("Assigned task: \"{}\"", template.description),
                0,
                now,
            );
        }

        if let Err(e) = self.store.save(&mut record).await {
            let mut pool = self.pool.write().await;
            for template in removed {
                pool.insert(template.id.clone(), template);
            }
            return Err(e);
        }

        info!(
            user_id = %record.id,
            count = assigned.len(),
            kind = ?kind,
            "📌 Tasks bulk-assigned"
        );
        Ok(assigned)
    }

    /// Ask the generation collaborator for a candidate and publish it.
    /// Best-effort: a generator failure means no task, never an error.
    pub async fn generate_template(
        &self,
        session: &Session,
        query: GenerationQuery,
    ) -> Result<Option<TaskTemplate>> {
        session.require_admin()?;

        let Some(generator) = &self.generator else {
            return Ok(None);
        };

        match generator.generate(&query).await {
            Ok(Some(spec)) => {
                let template = self.publish_template(session, spec).await?;
                Ok(Some(template))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, kind = %query.kind, "⚠️ Task generation failed");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MarketStore, MemoryStore};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use taskhive_types::{Role, Tier, UserRecord};
    use tokio::sync::RwLock;

    fn spec(kind: TaskKind, description: &str) -> NewTemplate {
        NewTemplate {
            kind,
            description: description.to_string(),
            instructions: String::new(),
            link: "https://example.com".to_string(),
            tier: Tier::Basic,
        }
    }

    async fn setup() -> (MarketplaceManager, StoreHandle, Session, Session) {
        let store: Arc<dyn MarketStore> = Arc::new(MemoryStore::new());
        let handle = StoreHandle::new(store, Duration::from_secs(1));

        let user = UserRecord::new_registrant(
            UserId::from_string("u-1"),
            "JaneDoe",
            "jane@example.com",
            quota::today_utc(),
        );
        let admin = UserRecord::new_admin(
            UserId::from_string("admin"),
            "admin",
            "admin@example.com",
            quota::today_utc(),
        );
        handle.insert(&user).await.unwrap();
        handle.insert(&admin).await.unwrap();

        let pool: SharedPool = Arc::new(RwLock::new(BTreeMap::new()));
        let manager = MarketplaceManager::new(handle.clone(), pool);
        (
            manager,
            handle,
            Session::new(user.id, Role::User),
            Session::new(admin.id, Role::Admin),
        )
    }

    #[tokio::test]
    async fn test_publish_requires_admin() {
        let (manager, _store, user, admin) = setup().await;

        let err = manager
            .publish_template(&user, spec(TaskKind::Comment, "a"))
            .await
            .unwrap_err();
        assert_eq!(err, MarketError::Unauthorized);

        manager
            .publish_template(&admin, spec(TaskKind::Comment, "a"))
            .await
            .unwrap();
        assert_eq!(manager.templates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_admin_assign_moves_out_of_pool() {
        let (manager, store, user, admin) = setup().await;

        let template = manager
            .publish_template(&admin, spec(TaskKind::Review, "write a review"))
            .await
            .unwrap();

        let record = manager
            .admin_assign(&admin, &user.user_id, &template.id)
            .await
            .unwrap();
        assert!(record.tasks.contains_key(&template.id));
        assert_eq!(record.tasks_assigned_today, 1);
        assert!(manager.templates().await.is_empty());

        // No credit charge on an admin gift
        let record = store.load(&user.user_id).await.unwrap();
        assert_eq!(record.credits.get(), 50);
    }

    #[tokio::test]
    async fn test_bulk_assign_all_or_nothing() {
        let (manager, store, user, admin) = setup().await;

        for i in 0..3 {
            manager
                .publish_template(&admin, spec(TaskKind::Comment, &format!("comment {}", i)))
                .await
                .unwrap();
        }
        manager
            .publish_template(&admin, spec(TaskKind::Review, "review one"))
            .await
            .unwrap();

        // Only 3 comment templates exist; asking for 5 assigns none
        let err = manager
            .bulk_assign(&admin, &user.user_id, 5, Some(TaskKind::Comment))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientPoolTasks {
                requested: 5,
                available: 3
            }
        );
        assert_eq!(manager.templates().await.len(), 4);
        assert!(store.load(&user.user_id).await.unwrap().tasks.is_empty());

        // Asking for what exists assigns all of it
        let assigned = manager
            .bulk_assign(&admin, &user.user_id, 3, Some(TaskKind::Comment))
            .await
            .unwrap();
        assert_eq!(assigned.len(), 3);
        let record = store.load(&user.user_id).await.unwrap();
        assert_eq!(record.tasks.len(), 3);
        assert_eq!(record.tasks_assigned_today, 3);
        // The review template is still in the pool
        assert_eq!(manager.templates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_assign_skips_already_held() {
        let (manager, _store, user, admin) = setup().await;

        let held = manager
            .publish_template(&admin, spec(TaskKind::Comment, "held one"))
            .await
            .unwrap();
        manager
            .publish_template(&admin, spec(TaskKind::Comment, "fresh one"))
            .await
            .unwrap();
        manager
            .admin_assign(&admin, &user.user_id, &held.id)
            .await
            .unwrap();
        // Republish the held template so the pool contains a duplicate offer
        let mut pool = manager.pool.write().await;
        pool.insert(held.id.clone(), {
            let t = TaskTemplate::new(spec(TaskKind::Comment, "held one"), Utc::now());
            TaskTemplate { id: held.id.clone(), ..t }
        });
        drop(pool);

        // Two pool entries, but only one the user does not already hold
        let err = manager
            .bulk_assign(&admin, &user.user_id, 2, None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientPoolTasks {
                requested: 2,
                available: 1
            }
        );
    }
}
