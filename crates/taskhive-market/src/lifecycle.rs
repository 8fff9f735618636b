use crate::quota;
use crate::store::StoreHandle;
use crate::{MarketConfig, RewardPolicy, Session, SharedPool};
use chrono::Utc;
use taskhive_types::{
    MarketError, Result, TaskId, TaskInstance, TaskStatus, UserId, UserRecord,
};
use tracing::info;

/// Task lifecycle: reserve from the pool, start, submit proof, admin review.
pub struct LifecycleManager {
    store: StoreHandle,
    pool: SharedPool,
    config: MarketConfig,
}

/// Move a held task along a valid edge, or reject without mutating.
fn transition<'a>(
    record: &'a mut UserRecord,
    task_id: &TaskId,
    next: TaskStatus,
) -> Result<&'a mut TaskInstance> {
    let task = record
        .tasks
        .get_mut(task_id)
        .ok_or_else(|| MarketError::TaskNotFound(task_id.to_string()))?;
    if !task.status.can_transition_to(next) {
        return Err(MarketError::InvalidTransition {
            from: task.status,
            to: next,
        });
    }
    task.status = next;
    Ok(task)
}

impl LifecycleManager {
    pub fn new(store: StoreHandle, pool: SharedPool, config: MarketConfig) -> Self {
        Self {
            store,
            pool,
            config,
        }
    }

    pub async fn tasks(&self, session: &Session) -> Result<Vec<TaskInstance>> {
        let record = self.store.load(&session.user_id).await?;
        Ok(record.tasks.values().cloned().collect())
    }

    /// Reserve a marketplace template: debit its credit cost and clone it
    /// into the caller's collection as `available`. The template stays in the
    /// pool for other users.
    pub async fn reserve_task(&self, session: &Session, template_id: &TaskId) -> Result<UserRecord> {
        let mut record = quota::load_rolled(&self.store, &session.user_id).await?;

        if !record.is_active() {
            return Err(MarketError::AccountSuspended);
        }
        if record.tasks_assigned_today >= record.daily_task_quota {
            return Err(MarketError::QuotaExceeded {
                assigned_today: record.tasks_assigned_today,
                quota: record.daily_task_quota,
            });
        }

        let template = {
            let pool = self.pool.read().await;
            pool.get(template_id)
                .cloned()
                .ok_or_else(|| MarketError::TaskNotFound(template_id.to_string()))?
        };
        if record.tasks.contains_key(&template.id) {
            return Err(MarketError::TaskAlreadyHeld(template.id.to_string()));
        }

        let cost = template.tier.rates().credit_cost_per_task;
        let credits_before = record.credits;
        record.credits =
            record
                .credits
                .checked_sub(cost)
                .ok_or(MarketError::InsufficientCredits {
                    required: cost,
                    available: record.credits,
                })?;
        record.tasks_assigned_today += 1;

        let now = Utc::now();
        let instance = template.instantiate(now);
        record.record_history(
            format!("Reserved task: \"{}\" ({})", template.description, cost),
            0,
            now,
        );
        record.tasks.insert(instance.id.clone(), instance);
        self.store.save(&mut record).await?;

        info!(
            user_id = %record.id,
            task_id = %template.id,
            tier = %template.tier,
            credits_before = %credits_before,
            credits_after = %record.credits,
            assigned_today = record.tasks_assigned_today,
            "🎯 Task reserved"
        );
        Ok(record)
    }

    /// `available -> started`. Credits were already charged at reservation;
    /// this only moves status.
    pub async fn start_task(&self, session: &Session, task_id: &TaskId) -> Result<UserRecord> {
        let mut record = self.store.load(&session.user_id).await?;
        let description = {
            let task = transition(&mut record, task_id, TaskStatus::Started)?;
            task.description.clone()
        };
        record.record_history(format!("Started task: \"{}\"", description), 0, Utc::now());
        self.store.save(&mut record).await?;

        info!(user_id = %record.id, task_id = %task_id, "▶️ Task started");
        Ok(record)
    }

    /// `started -> pending`. Stores the proof text and counts the task
    /// toward today's quota. Under the `OnSubmission` policy the reward is
    /// credited here and flagged so approval cannot double-credit.
    pub async fn submit_task(
        &self,
        session: &Session,
        task_id: &TaskId,
        submission: &str,
    ) -> Result<UserRecord> {
        let trimmed = submission.trim();
        if trimmed.chars().count() < self.config.min_submission_len {
            return Err(MarketError::InvalidSubmission {
                min_len: self.config.min_submission_len,
            });
        }

        let mut record = quota::load_rolled(&self.store, &session.user_id).await?;
        let (tier, description) = {
            let task = transition(&mut record, task_id, TaskStatus::Pending)?;
            task.submission = Some(trimmed.to_string());
            (task.tier, task.description.clone())
        };
        record.tasks_completed_today += 1;

        let now = Utc::now();
        if self.config.reward_policy == RewardPolicy::OnSubmission {
            let earning = tier.rates().earning_per_task;
            record.balance = record
                .balance
                .checked_add(earning)
                .ok_or_else(|| MarketError::Storage("ledger cap exceeded".to_string()))?;
            if let Some(task) = record.tasks.get_mut(task_id) {
                task.reward_granted = true;
            }
            record.record_history(
                format!("Task reward: \"{}\"", description),
                earning.as_signed(),
                now,
            );
        }
        self.store.save(&mut record).await?;

        info!(
            user_id = %record.id,
            task_id = %task_id,
            completed_today = record.tasks_completed_today,
            reward_policy = ?self.config.reward_policy,
            "📦 Submission received"
        );
        Ok(record)
    }

    /// Admin review: `pending -> completed`. Credits the tier earning unless
    /// it was already granted at submission time.
    pub async fn approve_task(
        &self,
        session: &Session,
        owner: &UserId,
        task_id: &TaskId,
    ) -> Result<UserRecord> {
        session.require_admin()?;

        let mut record = self.store.load(owner).await?;
        let (tier, description, already_granted) = {
            let task = transition(&mut record, task_id, TaskStatus::Completed)?;
            (task.tier, task.description.clone(), task.reward_granted)
        };

        let now = Utc::now();
        if already_granted {
            record.record_history(format!("Task approved: \"{}\"", description), 0, now);
        } else {
            let earning = tier.rates().earning_per_task;
            record.balance = record
                .balance
                .checked_add(earning)
                .ok_or_else(|| MarketError::Storage("ledger cap exceeded".to_string()))?;
            if let Some(task) = record.tasks.get_mut(task_id) {
                task.reward_granted = true;
            }
            record.record_history(
                format!("Task approved: \"{}\"", description),
                earning.as_signed(),
                now,
            );
        }
        self.store.save(&mut record).await?;

        info!(
            user_id = %record.id,
            task_id = %task_id,
            balance_after = %record.balance,
            "✅ Task approved"
        );
        Ok(record)
    }

    /// Admin review: `pending -> started` for rework. A reward granted at
    /// submission time is reclaimed, capped at the current balance.
    pub async fn reject_task(
        &self,
        session: &Session,
        owner: &UserId,
        task_id: &TaskId,
    ) -> Result<UserRecord> {
        session.require_admin()?;

        let mut record = self.store.load(owner).await?;
        let (tier, description, had_reward) = {
            let task = transition(&mut record, task_id, TaskStatus::Started)?;
            task.submission = None;
            let had = task.reward_granted;
            task.reward_granted = false;
            (task.tier, task.description.clone(), had)
        };

        let now = Utc::now();
        if had_reward {
            let earning = tier.rates().earning_per_task;
            let reclaimed = earning.min(record.balance);
            record.balance = record.balance.saturating_sub(reclaimed);
            record.record_history(
                format!("Task rejected: \"{}\" (reward reclaimed)", description),
                -reclaimed.as_signed(),
                now,
            );
        } else {
            record.record_history(format!("Task rejected: \"{}\"", description), 0, now);
        }
        self.store.save(&mut record).await?;

        info!(
            user_id = %record.id,
            task_id = %task_id,
            reclaimed = had_reward,
            "❌ Task rejected"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MarketStore, MemoryStore};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;
    use taskhive_types::{Credits, NewTemplate, Role, TaskKind, Tier, UsdAmount};
    use tokio::sync::RwLock;

    struct Fixture {
        lifecycle: LifecycleManager,
        store: StoreHandle,
        user: Session,
        admin: Session,
        template_id: TaskId,
    }

    async fn setup(policy: RewardPolicy) -> Fixture {
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

        let template = taskhive_types::TaskTemplate::new(
            NewTemplate {
                kind: TaskKind::Comment,
                description: "Leave a positive comment on a travel video".to_string(),
                instructions: "Mention one concrete detail".to_string(),
                link: "https://example.com/video".to_string(),
                tier: Tier::Basic,
            },
            Utc::now(),
        );
        let template_id = template.id.clone();
        let pool: SharedPool = Arc::new(RwLock::new(BTreeMap::new()));
        pool.write().await.insert(template_id.clone(), template);

        let config = MarketConfig {
            reward_policy: policy,
            ..MarketConfig::default()
        };
        Fixture {
            lifecycle: LifecycleManager::new(handle.clone(), pool, config),
            store: handle,
            user: Session::new(user.id, Role::User),
            admin: Session::new(admin.id, Role::Admin),
            template_id,
        }
    }

    #[tokio::test]
    async fn test_reserve_debits_credits_and_clones() {
        let fx = setup(RewardPolicy::OnApproval).await;

        let record = fx
            .lifecycle
            .reserve_task(&fx.user, &fx.template_id)
            .await
            .unwrap();
        assert_eq!(record.credits, Credits::new(49));
        assert_eq!(record.tasks_assigned_today, 1);
        let task = record.tasks.get(&fx.template_id).unwrap();
        assert_eq!(task.status, TaskStatus::Available);

        // Second reservation of the same template is a duplicate hold
        let err = fx
            .lifecycle
            .reserve_task(&fx.user, &fx.template_id)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::TaskAlreadyHeld(_)));
    }

    #[tokio::test]
    async fn test_reserve_respects_quota() {
        let fx = setup(RewardPolicy::OnApproval).await;

        let mut record = fx.store.load(&fx.user.user_id).await.unwrap();
        record.tasks_assigned_today = record.daily_task_quota;
        fx.store.save(&mut record).await.unwrap();

        let err = fx
            .lifecycle
            .reserve_task(&fx.user, &fx.template_id)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_suspended_user_cannot_reserve() {
        let fx = setup(RewardPolicy::OnApproval).await;

        let mut record = fx.store.load(&fx.user.user_id).await.unwrap();
        record.status = taskhive_types::AccountStatus::Blocked;
        fx.store.save(&mut record).await.unwrap();

        let err = fx
            .lifecycle
            .reserve_task(&fx.user, &fx.template_id)
            .await
            .unwrap_err();
        assert_eq!(err, MarketError::AccountSuspended);
    }

    #[tokio::test]
    async fn test_full_flow_reward_on_approval() {
        let fx = setup(RewardPolicy::OnApproval).await;

        fx.lifecycle
            .reserve_task(&fx.user, &fx.template_id)
            .await
            .unwrap();
        fx.lifecycle
            .start_task(&fx.user, &fx.template_id)
            .await
            .unwrap();
        let record = fx
            .lifecycle
            .submit_task(&fx.user, &fx.template_id, "Commented as instructed, link attached")
            .await
            .unwrap();

        // Reward deferred to approval
        assert_eq!(record.balance, UsdAmount::ZERO);
        assert_eq!(record.tasks_completed_today, 1);
        assert_eq!(
            record.tasks.get(&fx.template_id).unwrap().status,
            TaskStatus::Pending
        );

        let record = fx
            .lifecycle
            .approve_task(&fx.admin, &fx.user.user_id, &fx.template_id)
            .await
            .unwrap();
        assert_eq!(record.balance, UsdAmount::from_cents(10));
        assert_eq!(
            record.tasks.get(&fx.template_id).unwrap().status,
            TaskStatus::Completed
        );

        // Approving again is an invalid transition, not a double credit
        let err = fx
            .lifecycle
            .approve_task(&fx.admin, &fx.user.user_id, &fx.template_id)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_submission_too_short() {
        let fx = setup(RewardPolicy::OnApproval).await;

        fx.lifecycle
            .reserve_task(&fx.user, &fx.template_id)
            .await
            .unwrap();
        fx.lifecycle
            .start_task(&fx.user, &fx.template_id)
            .await
            .unwrap();

        let err = fx
            .lifecycle
            .submit_task(&fx.user, &fx.template_id, "   too short   ")
            .await
            .unwrap_err();
        assert_eq!(err, MarketError::InvalidSubmission { min_len: 10 });

        // Status and counters untouched
        let record = fx.store.load(&fx.user.user_id).await.unwrap();
        assert_eq!(
            record.tasks.get(&fx.template_id).unwrap().status,
            TaskStatus::Started
        );
        assert_eq!(record.tasks_completed_today, 0);
    }

    #[tokio::test]
    async fn test_no_state_skipping() {
        let fx = setup(RewardPolicy::OnApproval).await;

        fx.lifecycle
            .reserve_task(&fx.user, &fx.template_id)
            .await
            .unwrap();

        // available -> pending is not an edge
        let err = fx
            .lifecycle
            .submit_task(&fx.user, &fx.template_id, "a perfectly valid submission")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MarketError::InvalidTransition {
                from: TaskStatus::Available,
                to: TaskStatus::Pending
            }
        );

        // available -> completed is not an edge either
        let err = fx
            .lifecycle
            .approve_task(&fx.admin, &fx.user.user_id, &fx.template_id)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_reject_reclaims_submission_time_reward() {
        let fx = setup(RewardPolicy::OnSubmission).await;

        fx.lifecycle
            .reserve_task(&fx.user, &fx.template_id)
            .await
            .unwrap();
        fx.lifecycle
            .start_task(&fx.user, &fx.template_id)
            .await
            .unwrap();
        let record = fx
            .lifecycle
            .submit_task(&fx.user, &fx.template_id, "Commented as instructed, link attached")
            .await
            .unwrap();

        // Prototype policy: paid out at submission
        assert_eq!(record.balance, UsdAmount::from_cents(10));

        let record = fx
            .lifecycle
            .reject_task(&fx.admin, &fx.user.user_id, &fx.template_id)
            .await
            .unwrap();
        assert_eq!(record.balance, UsdAmount::ZERO);
        let task = record.tasks.get(&fx.template_id).unwrap();
        assert_eq!(task.status, TaskStatus::Started);
        assert!(task.submission.is_none());
        assert!(!task.reward_granted);
        assert_eq!(record.history.front().unwrap().amount_cents, -10);

        // Resubmit and approve: no double credit
        let record = fx
            .lifecycle
            .submit_task(&fx.user, &fx.template_id, "Reworked the comment with more detail")
            .await
            .unwrap();
        assert_eq!(record.balance, UsdAmount::from_cents(10));
        let record = fx
            .lifecycle
            .approve_task(&fx.admin, &fx.user.user_id, &fx.template_id)
            .await
            .unwrap();
        assert_eq!(record.balance, UsdAmount::from_cents(10));
    }

    #[tokio::test]
    async fn test_review_requires_admin() {
        let fx = setup(RewardPolicy::OnApproval).await;

        fx.lifecycle
            .reserve_task(&fx.user, &fx.template_id)
            .await
            .unwrap();

        let err = fx
            .lifecycle
            .approve_task(&fx.user, &fx.user.user_id, &fx.template_id)
            .await
            .unwrap_err();
        assert_eq!(err, MarketError::Unauthorized);
    }
}
