// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - DATABASE MODULE
//
// sled-backed claim ledger. One key per identity in the `claims` tree,
// JSON-encoded ClaimRecord values. A whole-ledger save is a single sled
// transaction followed by a flush.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;
use toad_core::store::LedgerStore;
use toad_core::{ClaimRecord, Ledger};

const TREE_CLAIMS: &str = "claims";

pub struct SledStore {
    db: Arc<Db>,
}

impl SledStore {
    /// Open or create the database. Lock errors (another process still
    /// releasing the directory) are retried with backoff: 500ms, 1s, 2s.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path_ref = path.as_ref();
        let retry_delays_ms: [u64; 3] = [500, 1000, 2000];

        match sled::open(path_ref) {
            Ok(db) => return Ok(SledStore { db: Arc::new(db) }),
            Err(e) if Self::is_lock_error(&e) => {
                tracing::warn!(
                    "database lock held at {}, retrying ({} attempts remain)",
                    path_ref.display(),
                    retry_delays_ms.len()
                );
            }
            Err(e) => return Err(format!("Failed to open database: {}", e)),
        }

        for (i, delay_ms) in retry_delays_ms.iter().enumerate() {
            std::thread::sleep(std::time::Duration::from_millis(*delay_ms));
            match sled::open(path_ref) {
                Ok(db) => {
                    tracing::info!("database lock acquired on retry {}", i + 1);
                    return Ok(SledStore { db: Arc::new(db) });
                }
                Err(e) if Self::is_lock_error(&e) && i + 1 < retry_delays_ms.len() => continue,
                Err(e) => {
                    return Err(format!(
                        "Failed to open database after {} retries: {} \
                         (another toad-node process may still be running)",
                        i + 1,
                        e
                    ))
                }
            }
        }

        Err(format!("Failed to open database at {}", path_ref.display()))
    }

    /// sled wraps IO errors, so lock contention is only visible in the message.
    fn is_lock_error(e: &sled::Error) -> bool {
        let msg = e.to_string();
        msg.contains("Resource temporarily unavailable")
            || msg.contains("WouldBlock")
            || msg.contains("Would block")
            || msg.contains("lock")
            || msg.contains("EAGAIN")
    }

    fn claims_tree(&self) -> Result<Tree, String> {
        self.db
            .open_tree(TREE_CLAIMS)
            .map_err(|e| format!("Failed to open claims tree: {}", e))
    }

    /// Flush pending writes, used on shutdown.
    pub fn flush(&self) -> Result<(), String> {
        self.db
            .flush()
            .map_err(|e| format!("Failed to flush database: {}", e))?;
        Ok(())
    }
}

impl LedgerStore for SledStore {
    fn load(&self) -> Result<Ledger, String> {
        let tree = self.claims_tree()?;
        let mut ledger = Ledger::new();
        for item in tree.iter() {
            let (key, value) = item.map_err(|e| format!("Failed to read claims tree: {}", e))?;
            let identity = String::from_utf8(key.to_vec())
                .map_err(|e| format!("Non-UTF8 identity key: {}", e))?;
            let record: ClaimRecord = serde_json::from_slice(&value)
                .map_err(|e| format!("Corrupt record for {}: {}", identity, e))?;
            ledger.insert(identity, record);
        }
        Ok(ledger)
    }

    fn save(&self, ledger: &Ledger) -> Result<(), String> {
        let tree = self.claims_tree()?;

        // Serialize outside the transaction, which may be re-run on conflict
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(ledger.len());
        for (identity, record) in ledger {
            let value = serde_json::to_vec(record)
                .map_err(|e| format!("Failed to serialize record: {}", e))?;
            entries.push((identity.as_bytes().to_vec(), value));
        }
        let mut stale: Vec<Vec<u8>> = Vec::new();
        for key in tree.iter().keys() {
            let key = key.map_err(|e| format!("Failed to read claims tree: {}", e))?;
            let known = std::str::from_utf8(&key)
                .map(|k| ledger.contains_key(k))
                .unwrap_or(false);
            if !known {
                stale.push(key.to_vec());
            }
        }

        tree.transaction(|tx| {
            for key in &stale {
                tx.remove(key.as_slice())?;
            }
            for (key, value) in &entries {
                tx.insert(key.as_slice(), value.as_slice())?;
            }
            Ok(())
        })
        .map_err(|e: sled::transaction::TransactionError<()>| {
            format!("Atomic save failed: {:?}", e)
        })?;

        self.flush()
    }
}
