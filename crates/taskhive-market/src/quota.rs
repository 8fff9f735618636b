use crate::store::StoreHandle;
use chrono::{NaiveDate, Utc};
use taskhive_types::{AccountStatus, Result, Role, UserId, UserRecord};
use tracing::{info, warn};

/// Current calendar day at UTC granularity; the only day boundary used
/// anywhere in the engine.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Roll a record forward to `today`. Returns `true` if the day changed.
///
/// On the first activity of a new day: a regular user who missed the prior
/// day's quota is suspended, both per-day counters reset, and the activity
/// date advances. Idempotent once the stored date matches `today`.
pub fn roll_daily(record: &mut UserRecord, today: NaiveDate) -> bool {
    if record.last_activity_date >= today {
        return false;
    }

    if record.role == Role::User && record.tasks_completed_today < record.daily_task_quota {
        record.status = AccountStatus::Blocked;
        warn!(
            user_id = %record.id,
            completed = record.tasks_completed_today,
            quota = record.daily_task_quota,
            "⛔ Daily quota missed, account suspended"
        );
    }

    record.tasks_completed_today = 0;
    record.tasks_assigned_today = 0;
    record.last_activity_date = today;

    info!(
        user_id = %record.id,
        date = %today,
        status = ?record.status,
        "📅 Daily counters rolled"
    );
    true
}

/// Load a record with the quota roll applied and persisted. Used by every
/// task-count-affecting operation and by session check-in.
pub(crate) async fn load_rolled(store: &StoreHandle, id: &UserId) -> Result<UserRecord> {
    let mut record = store.load(id).await?;
    if roll_daily(&mut record, today_utc()) {
        store.save(&mut record).await?;
    }
    Ok(record)
}
