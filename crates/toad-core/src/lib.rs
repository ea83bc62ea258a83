// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - CORE MODULE
//
// Daily claim primitives: ClaimRecord, Ledger, and the cooldown/streak
// transition shared by the server ledger and the client's offline mirror.
// All points arithmetic is integer (u64), all timestamps are epoch millis.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod config;
pub mod countdown;
pub mod error;
pub mod mirror;
pub mod service;
pub mod store;

pub use error::ClaimError;

/// Minimum interval between two accepted claims for one identity (24h).
pub const COOLDOWN_MS: u64 = 24 * 60 * 60 * 1000; // 86,400,000

/// Points paid per streak step: the n-th consecutive claim pays n * BASE_AMOUNT.
pub const BASE_AMOUNT: u64 = 100;

/// One record per identity. Missing fields in persisted JSON read as zero.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimRecord {
    #[serde(default)]
    pub total: u64,
    /// Epoch millis of the last accepted claim, 0 when never claimed.
    #[serde(default)]
    pub last: u64,
    #[serde(default)]
    pub streak: u64,
}

impl ClaimRecord {
    /// A claim stamped at epoch 0 still leaves streak >= 1, so both fields
    /// must be zero for the record to count as untouched.
    pub fn has_claimed(&self) -> bool {
        self.last != 0 || self.streak != 0
    }
}

/// identity (lowercase wallet address) → record
pub type Ledger = BTreeMap<String, ClaimRecord>;

/// What happens to the streak when a whole cooldown window is skipped.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreakPolicy {
    /// Keep counting no matter how long the gap was.
    #[default]
    Preserve,
    /// Restart at 1 when `now - last >= 2 * COOLDOWN_MS`.
    ResetOnMiss,
}

/// Successful outcome of a claim: the updated record and what was credited.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimResult {
    pub record: ClaimRecord,
    pub credited: u64,
}

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Settable clock for tests and replay tools.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::sync::atomic::AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: std::sync::atomic::AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now
            .fetch_add(delta_ms, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Trim and lowercase a wallet address. Returns None for an empty identity.
pub fn normalize_identity(raw: &str) -> Option<String> {
    let id = raw.trim().to_lowercase();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Reward for the upcoming claim: `(streak + 1) * BASE_AMOUNT`.
pub fn next_claim_amount(record: &ClaimRecord) -> u64 {
    record
        .streak
        .saturating_add(1)
        .saturating_mul(BASE_AMOUNT)
}

/// Milliseconds until the next claim is allowed, 0 when claimable.
/// A clock behind `last` counts as zero elapsed time.
pub fn cooldown_remaining(record: &ClaimRecord, now_ms: u64) -> u64 {
    if !record.has_claimed() {
        return 0;
    }
    let elapsed = now_ms.saturating_sub(record.last);
    COOLDOWN_MS.saturating_sub(elapsed)
}

/// The single claim transition. On success the record has `streak + 1`,
/// `total + amount` and `last = now`; on cooldown it is returned untouched
/// as an error carrying the remaining wait.
pub fn apply_claim(
    record: &ClaimRecord,
    now_ms: u64,
    amount: u64,
    policy: StreakPolicy,
) -> Result<ClaimResult, ClaimError> {
    let remaining_ms = cooldown_remaining(record, now_ms);
    if remaining_ms > 0 {
        return Err(ClaimError::Cooldown { remaining_ms });
    }

    let mut next = *record;
    if policy == StreakPolicy::ResetOnMiss
        && record.has_claimed()
        && now_ms.saturating_sub(record.last) >= 2 * COOLDOWN_MS
    {
        next.streak = 0;
    }
    next.streak = next.streak.saturating_add(1);
    next.total = next.total.saturating_add(amount);
    next.last = now_ms;

    Ok(ClaimResult {
        record: next,
        credited: amount,
    })
}
