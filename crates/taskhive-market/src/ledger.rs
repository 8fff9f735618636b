use crate::quota;
use crate::store::StoreHandle;
use crate::Session;
use chrono::Utc;
use taskhive_types::{
    AccountStatus, Credits, LedgerEntry, MarketError, PayoutProfile, Result, Tier, UsdAmount,
    UserId, UserRecord,
};
use tracing::info;

/// Account ledger: balances, credits, history, and the admin money taps.
pub struct LedgerManager {
    store: StoreHandle,
}

impl LedgerManager {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Session start: applies the daily quota roll and returns the fresh
    /// record for display.
    pub async fn check_in(&self, session: &Session) -> Result<UserRecord> {
        quota::load_rolled(&self.store, &session.user_id).await
    }

    pub async fn history(&self, session: &Session) -> Result<Vec<LedgerEntry>> {
        let record = self.store.load(&session.user_id).await?;
        Ok(record.history.iter().cloned().collect())
    }

    /// Request a payout. Requires a populated payout profile and sufficient
    /// balance; rejects before any mutation otherwise.
    pub async fn withdraw(&self, session: &Session, amount: UsdAmount) -> Result<UserRecord> {
        if amount.is_zero() {
            return Err(MarketError::InvalidAmount);
        }

        let mut record = self.store.load(&session.user_id).await?;
        if !record.can_withdraw() {
            return Err(MarketError::MissingPayoutProfile);
        }

        let balance_before = record.balance;
        record.balance =
            record
                .balance
                .checked_sub(amount)
                .ok_or(MarketError::InsufficientBalance {
                    required: amount,
                    available: record.balance,
                })?;
        record.record_history("Withdrawal request", -amount.as_signed(), Utc::now());
        self.store.save(&mut record).await?;

        info!(
            user_id = %record.id,
            amount = %amount,
            balance_before = %balance_before,
            balance_after = %record.balance,
            "💸 Withdrawal requested"
        );
        Ok(record)
    }

    pub async fn set_payout_profile(
        &self,
        session: &Session,
        profile: PayoutProfile,
    ) -> Result<UserRecord> {
        let mut record = self.store.load(&session.user_id).await?;
        record.payout_profile = Some(profile);
        self.store.save(&mut record).await?;

        info!(user_id = %record.id, "📋 Payout profile updated");
        Ok(record)
    }

    /// Grant credits to a user. Counts toward cumulative purchases, so the
    /// tier is recomputed afterwards.
    pub async fn admin_credit(
        &self,
        session: &Session,
        target: &UserId,
        amount: Credits,
    ) -> Result<UserRecord> {
        session.require_admin()?;
        if amount.is_zero() {
            return Err(MarketError::InvalidAmount);
        }

        let mut record = self.store.load(target).await?;
        record.credits = record
            .credits
            .checked_add(amount)
            .ok_or(MarketError::InvalidAmount)?;
        record.credits_purchased += amount.get() as u64;

        let tier_before = record.tier;
        record.recompute_tier();
        record.record_history(format!("Admin credit grant: {}", amount), 0, Utc::now());
        self.store.save(&mut record).await?;

        info!(
            user_id = %record.id,
            credits = %amount,
            credits_total = %record.credits,
            tier_before = %tier_before,
            tier_after = %record.tier,
            "💰 Credits granted"
        );
        Ok(record)
    }

    /// Add funds directly to a user's balance.
    pub async fn admin_fund(
        &self,
        session: &Session,
        target: &UserId,
        amount: UsdAmount,
    ) -> Result<UserRecord> {
        session.require_admin()?;
        if amount.is_zero() {
            return Err(MarketError::InvalidAmount);
        }

        let mut record = self.store.load(target).await?;
        let balance_before = record.balance;
        record.balance = record
            .balance
            .checked_add(amount)
            .ok_or_else(|| MarketError::Storage("ledger cap exceeded".to_string()))?;
        record.record_history("Admin funding", amount.as_signed(), Utc::now());
        self.store.save(&mut record).await?;

        info!(
            user_id = %record.id,
            amount = %amount,
            balance_before = %balance_before,
            balance_after = %record.balance,
            "💰 Balance funded"
        );
        Ok(record)
    }

    pub async fn admin_set_status(
        &self,
        session: &Session,
        target: &UserId,
        status: AccountStatus,
    ) -> Result<UserRecord> {
        session.require_admin()?;
        let mut record = self.store.load(target).await?;
        if record.status == status {
            return Ok(record);
        }
        record.status = status;
        self.store.save(&mut record).await?;

        info!(user_id = %record.id, status = ?status, "🔄 Account status changed");
        Ok(record)
    }

    pub async fn admin_set_quota(
        &self,
        session: &Session,
        target: &UserId,
        quota: u32,
    ) -> Result<UserRecord> {
        session.require_admin()?;
        if quota == 0 {
            return Err(MarketError::InvalidAmount);
        }
        let mut record = self.store.load(target).await?;
        record.daily_task_quota = quota;
        self.store.save(&mut record).await?;

        info!(user_id = %record.id, quota = quota, "🔄 Daily quota changed");
        Ok(record)
    }

    /// Explicit tier override. Back-fills the cumulative purchase counter to
    /// the tier's threshold so tier stays a function of purchases.
    pub async fn admin_set_tier(
        &self,
        session: &Session,
        target: &UserId,
        tier: Tier,
    ) -> Result<UserRecord> {
        session.require_admin()?;
        let mut record = self.store.load(target).await?;
        record.credits_purchased = tier.unlock_requirement();
        record.recompute_tier();
        self.store.save(&mut record).await?;

        info!(user_id = %record.id, tier = %record.tier, "🔄 Tier overridden");
        Ok(record)
    }

    pub async fn list_users(&self, session: &Session) -> Result<Vec<UserRecord>> {
        session.require_admin()?;
        self.store.list().await
    }
}
