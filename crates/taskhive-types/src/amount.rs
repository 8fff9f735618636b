use serde::{Deserialize, Serialize};
use std::fmt;

pub const USD_DECIMALS: u32 = 2;
pub const CENTS_PER_DOLLAR: u64 = 100;

/// Currency balance in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UsdAmount(u64);

impl UsdAmount {
    pub const ZERO: Self = Self(0);
    /// Ledger cap: no single account may hold more than this.
    pub const MAX: Self = Self(1_000_000_000 * CENTS_PER_DOLLAR);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub fn from_dollars(dollars: f64) -> Self {
        Self((dollars * CENTS_PER_DOLLAR as f64).round() as u64)
    }

    pub const fn to_cents(&self) -> u64 {
        self.0
    }

    pub fn to_dollars(&self) -> f64 {
        self.0 as f64 / CENTS_PER_DOLLAR as f64
    }

    /// Signed cents, for ledger entries.
    pub const fn as_signed(&self) -> i64 {
        self.0 as i64
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) if v <= Self::MAX.0 => Some(Self(v)),
            _ => None,
        }
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0).min(Self::MAX.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for UsdAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.to_dollars())
    }
}

/// Spendable task-starting units, distinct from currency balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Credits(u32);

impl Credits {
    pub const ZERO: Self = Self(0);

    pub const fn new(count: u32) -> Self {
        Self(count)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} credits", self.0)
    }
}
