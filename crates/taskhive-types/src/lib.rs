pub mod amount;
pub mod error;
pub mod task;
pub mod tier;
pub mod user;

pub use amount::{Credits, UsdAmount};
pub use error::{MarketError, Result};
pub use task::{NewTemplate, TaskId, TaskInstance, TaskKind, TaskStatus, TaskTemplate};
pub use tier::{Tier, TierRates};
pub use user::{
    AccountStatus, LedgerEntry, PayoutProfile, Role, UserId, UserRecord, DEFAULT_DAILY_QUOTA,
    HISTORY_CAP,
};
