use crate::amount::{Credits, UsdAmount};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const GOLD_UNLOCK: u64 = 100;
pub const PLATINUM_UNLOCK: u64 = 500;
pub const DIAMOND_UNLOCK: u64 = 1000;

/// Reward bracket. Unlocked by cumulative credit purchases, never stored
/// independently of them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Tier {
    #[default]
    Basic,
    Gold,
    Platinum,
    Diamond,
}

/// Per-task payout and credit cost for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRates {
    pub earning_per_task: UsdAmount,
    pub credit_cost_per_task: Credits,
}

impl Tier {
    /// Threshold table: Diamond >= 1000, Platinum >= 500, Gold >= 100, else Basic.
    pub fn for_credits_purchased(purchased: u64) -> Self {
        if purchased >= DIAMOND_UNLOCK {
            Tier::Diamond
        } else if purchased >= PLATINUM_UNLOCK {
            Tier::Platinum
        } else if purchased >= GOLD_UNLOCK {
            Tier::Gold
        } else {
            Tier::Basic
        }
    }

    pub const fn rates(&self) -> TierRates {
        match self {
            Tier::Basic => TierRates {
                earning_per_task: UsdAmount::from_cents(10),
                credit_cost_per_task: Credits::new(1),
            },
            Tier::Gold => TierRates {
                earning_per_task: UsdAmount::from_cents(25),
                credit_cost_per_task: Credits::new(2),
            },
            Tier::Platinum => TierRates {
                earning_per_task: UsdAmount::from_cents(50),
                credit_cost_per_task: Credits::new(3),
            },
            Tier::Diamond => TierRates {
                earning_per_task: UsdAmount::from_cents(120),
                credit_cost_per_task: Credits::new(5),
            },
        }
    }

    pub const fn unlock_requirement(&self) -> u64 {
        match self {
            Tier::Basic => 0,
            Tier::Gold => GOLD_UNLOCK,
            Tier::Platinum => PLATINUM_UNLOCK,
            Tier::Diamond => DIAMOND_UNLOCK,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Tier::Basic => "Basic",
            Tier::Gold => "Gold",
            Tier::Platinum => "Platinum",
            Tier::Diamond => "Diamond",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
