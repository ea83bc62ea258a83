// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - CLAIM LEDGER SERVICE
//
// Server-side authority for claim records. Each claim is one critical
// section: load ledger → evaluate cooldown → mutate → save. The section is
// serialized by a single mutex, so two claims can never both read the same
// pre-claim state and both commit.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::store::{safe_lock, LedgerStore};
use crate::{
    apply_claim, next_claim_amount, normalize_identity, ClaimError, ClaimRecord, ClaimResult,
    Clock, StreakPolicy,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Largest integer a JSON client can send without precision loss (2^53 - 1).
pub const MAX_CLAIM_AMOUNT: f64 = 9_007_199_254_740_991.0;

/// How the credited amount of a server claim is decided.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AmountPolicy {
    /// Credit what the client asked for.
    #[default]
    Client,
    /// Credit `next_claim_amount(record)`; the requested amount is only validated.
    Schedule,
}

/// Validate a requested amount: positive, finite, integral, JSON-safe.
pub fn validate_amount(amount: f64) -> Result<u64, ClaimError> {
    if !amount.is_finite() || amount <= 0.0 || amount.fract() != 0.0 || amount > MAX_CLAIM_AMOUNT
    {
        return Err(ClaimError::InvalidArgument(format!(
            "amount must be a positive whole number, got {}",
            amount
        )));
    }
    Ok(amount as u64)
}

pub struct ClaimLedger {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    streak_policy: StreakPolicy,
    amount_policy: AmountPolicy,
    write_lock: Mutex<()>,
}

impl ClaimLedger {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            streak_policy: StreakPolicy::default(),
            amount_policy: AmountPolicy::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_policies(mut self, streak: StreakPolicy, amount: AmountPolicy) -> Self {
        self.streak_policy = streak;
        self.amount_policy = amount;
        self
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Record for an identity, the zero record if it never claimed.
    pub fn get_record(&self, identity: &str) -> Result<ClaimRecord, ClaimError> {
        let id = normalize_identity(identity)
            .ok_or_else(|| ClaimError::InvalidArgument("identity is empty".to_string()))?;
        let ledger = self.store.load().map_err(ClaimError::Persistence)?;
        Ok(ledger.get(&id).copied().unwrap_or_default())
    }

    /// Accept or reject one claim. Nothing is observable unless the save
    /// succeeded.
    pub fn submit_claim(&self, identity: &str, amount: f64) -> Result<ClaimResult, ClaimError> {
        let id = normalize_identity(identity)
            .ok_or_else(|| ClaimError::InvalidArgument("identity is empty".to_string()))?;
        let requested = validate_amount(amount)?;

        let _guard = safe_lock(&self.write_lock);
        let now = self.clock.now_ms();

        let mut ledger = self.store.load().map_err(ClaimError::Persistence)?;
        let current = ledger.get(&id).copied().unwrap_or_default();
        let credit = match self.amount_policy {
            AmountPolicy::Client => requested,
            AmountPolicy::Schedule => next_claim_amount(&current),
        };

        let result = apply_claim(&current, now, credit, self.streak_policy)?;
        ledger.insert(id.clone(), result.record);

        if let Err(e) = self.store.save(&ledger) {
            tracing::error!(identity = %id, "claim not persisted: {}", e);
            return Err(ClaimError::Persistence(e));
        }

        tracing::info!(
            identity = %id,
            credited = result.credited,
            total = result.record.total,
            streak = result.record.streak,
            "claim accepted"
        );
        Ok(result)
    }

    /// Number of identities that have ever claimed.
    pub fn identity_count(&self) -> Result<usize, ClaimError> {
        Ok(self.store.load().map_err(ClaimError::Persistence)?.len())
    }
}
