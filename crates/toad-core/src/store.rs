// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - LEDGER STORAGE
//
// Whole-ledger persistence: every load returns the full mapping, every save
// overwrites it. Callers provide the single-writer discipline.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::Ledger;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Recover from poisoned mutex instead of panicking
pub(crate) fn safe_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Durable home of a [`Ledger`].
pub trait LedgerStore: Send + Sync {
    /// Read the full ledger. A store that was never written reads as empty.
    fn load(&self) -> Result<Ledger, String>;

    /// Replace the full ledger.
    fn save(&self, ledger: &Ledger) -> Result<(), String>;
}

/// Pretty-printed JSON document on disk.
///
/// Writes go to `<file>.tmp` first and are renamed over the target, so a
/// crash mid-write leaves the previous ledger in place.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self) -> Result<Ledger, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Ledger::new()),
            Err(e) => return Err(format!("Failed to read {}: {}", self.path.display(), e)),
        };
        if raw.trim().is_empty() {
            return Ok(Ledger::new());
        }
        // A corrupt file is an error, not an empty ledger: the next save
        // would otherwise wipe every record.
        serde_json::from_str(&raw)
            .map_err(|e| format!("Corrupt ledger file {}: {}", self.path.display(), e))
    }

    fn save(&self, ledger: &Ledger) -> Result<(), String> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
            }
        }
        let json = serde_json::to_string_pretty(ledger)
            .map_err(|e| format!("Failed to serialize ledger: {}", e))?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json).map_err(|e| format!("Failed to write {}: {}", tmp.display(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            format!(
                "Failed to move {} into place at {}: {}",
                tmp.display(),
                self.path.display(),
                e
            )
        })?;
        Ok(())
    }
}

/// In-process store. `fail_writes` makes every save fail, which is how the
/// persistence-failure paths are exercised.
#[derive(Default)]
pub struct MemoryStore {
    ledger: Mutex<Ledger>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Result<Ledger, String> {
        Ok(safe_lock(&self.ledger).clone())
    }

    fn save(&self, ledger: &Ledger) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err("write rejected: store is read-only".to_string());
        }
        *safe_lock(&self.ledger) = ledger.clone();
        Ok(())
    }
}
