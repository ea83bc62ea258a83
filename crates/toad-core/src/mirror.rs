// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - OFFLINE LEDGER MIRROR
//
// Client-held copy of the claim state machine. It follows the server after
// every confirmed claim and takes over when the server cannot be reached.
// Offline claims are provisional: nothing replays them to the server later,
// so the mirror may drift from the authoritative ledger.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::store::{safe_lock, LedgerStore};
use crate::{
    apply_claim, next_claim_amount, normalize_identity, ClaimError, ClaimRecord, ClaimResult,
    Clock, Ledger, StreakPolicy,
};
use std::sync::{Arc, Mutex};

pub struct OfflineMirror {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    streak_policy: StreakPolicy,
    write_lock: Mutex<()>,
}

impl OfflineMirror {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            streak_policy: StreakPolicy::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_streak_policy(mut self, policy: StreakPolicy) -> Self {
        self.streak_policy = policy;
        self
    }

    fn identity(raw: &str) -> Result<String, ClaimError> {
        normalize_identity(raw)
            .ok_or_else(|| ClaimError::InvalidArgument("identity is empty".to_string()))
    }

    /// Local record for an identity (zero record when unknown).
    pub fn record(&self, identity: &str) -> Result<ClaimRecord, ClaimError> {
        let id = Self::identity(identity)?;
        let ledger = self.store.load().map_err(ClaimError::Persistence)?;
        Ok(ledger.get(&id).copied().unwrap_or_default())
    }

    /// Full local mapping.
    pub fn ledger(&self) -> Result<Ledger, ClaimError> {
        self.store.load().map_err(ClaimError::Persistence)
    }

    /// Reward the next claim would pay, from the local view.
    pub fn next_claim_amount(&self, identity: &str) -> Result<u64, ClaimError> {
        Ok(next_claim_amount(&self.record(identity)?))
    }

    /// Follow a claim the server confirmed. The streak only advances when
    /// the local cooldown had elapsed too, so a mirror that already claimed
    /// offline in this window is not advanced twice.
    pub fn apply_after_server_success(
        &self,
        identity: &str,
        credited: u64,
    ) -> Result<ClaimRecord, ClaimError> {
        let id = Self::identity(identity)?;
        let _guard = safe_lock(&self.write_lock);
        let now = self.clock.now_ms();

        let mut ledger = self.store.load().map_err(ClaimError::Persistence)?;
        let current = ledger.get(&id).copied().unwrap_or_default();

        let updated = match apply_claim(&current, now, credited, self.streak_policy) {
            Ok(res) => res.record,
            Err(ClaimError::Cooldown { .. }) => ClaimRecord {
                total: current.total.saturating_add(credited),
                last: now,
                streak: current.streak,
            },
            Err(e) => return Err(e),
        };

        ledger.insert(id, updated);
        self.store.save(&ledger).map_err(ClaimError::Persistence)?;
        Ok(updated)
    }

    /// Claim against the local ledger only, paying `(streak + 1) * BASE_AMOUNT`.
    pub fn claim_locally(&self, identity: &str) -> Result<ClaimResult, ClaimError> {
        let id = Self::identity(identity)?;
        let _guard = safe_lock(&self.write_lock);
        let now = self.clock.now_ms();

        let mut ledger = self.store.load().map_err(ClaimError::Persistence)?;
        let current = ledger.get(&id).copied().unwrap_or_default();
        let amount = next_claim_amount(&current);

        let result = apply_claim(&current, now, amount, self.streak_policy)?;
        ledger.insert(id.clone(), result.record);
        self.store.save(&ledger).map_err(ClaimError::Persistence)?;

        tracing::debug!(identity = %id, credited = result.credited, "offline claim recorded");
        Ok(result)
    }
}
