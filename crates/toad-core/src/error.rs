use std::fmt;

/// Failures of the claim ledger and its offline mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// Empty identity, or an amount that is not a positive finite integer.
    InvalidArgument(String),
    /// Claimed again inside the cooldown window.
    Cooldown { remaining_ms: u64 },
    /// The ledger could not be read or written; nothing was committed.
    Persistence(String),
    /// The claim server could not be reached.
    NetworkUnavailable(String),
}

impl ClaimError {
    /// Short machine-readable tag, used as the `error` field of API replies.
    pub fn code(&self) -> &'static str {
        match self {
            ClaimError::InvalidArgument(_) => "invalid_argument",
            ClaimError::Cooldown { .. } => "cooldown",
            ClaimError::Persistence(_) => "write_failed",
            ClaimError::NetworkUnavailable(_) => "network_unavailable",
        }
    }
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            ClaimError::Cooldown { remaining_ms } => {
                write!(f, "Claim cooldown active: {} ms remaining", remaining_ms)
            }
            ClaimError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            ClaimError::NetworkUnavailable(msg) => write!(f, "Network unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ClaimError {}
