//! Time-to-next-claim presentation. Pure functions; the caller decides how
//! often to recompute (the CLI ticks once per second).

use crate::{cooldown_remaining, ClaimRecord};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    Claimable,
    Waiting { remaining_ms: u64 },
}

impl Countdown {
    pub fn for_record(record: &ClaimRecord, now_ms: u64) -> Self {
        match cooldown_remaining(record, now_ms) {
            0 => Countdown::Claimable,
            remaining_ms => Countdown::Waiting { remaining_ms },
        }
    }

    pub fn is_claimable(&self) -> bool {
        matches!(self, Countdown::Claimable)
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Countdown::Claimable => f.write_str("Ready to claim"),
            Countdown::Waiting { remaining_ms } => f.write_str(&format_hms(*remaining_ms)),
        }
    }
}

/// `HH:MM:SS`, zero padded. Partial seconds round up so the display never
/// shows 00:00:00 while the claim is still blocked.
pub fn format_hms(remaining_ms: u64) -> String {
    let total_secs = remaining_ms.div_ceil(1000);
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}
