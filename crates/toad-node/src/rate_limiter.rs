// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - REQUEST BUDGETS
//
// Per-IP token buckets in front of the API. Every request spends from the
// client's `Api` budget; `POST /claim` also spends from the much smaller
// `ClaimSubmit` budget, so hammering the claim button cannot starve the
// client's own status reads. A request is admitted only if every budget it
// touches has a token, and then all of them are charged together.
//
// Refill is whole tokens on a fixed period; the unspent part of a period
// carries over, so the long-run rate is exact.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::safe_lock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use toad_core::config::NodeConfig;
use warp::http::Method;

/// Full buckets are forgotten every this many checks.
const SWEEP_EVERY: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Budget {
    Api,
    ClaimSubmit,
}

impl Budget {
    /// Budgets a request spends from.
    pub fn for_request(method: &Method, path: &str) -> &'static [Budget] {
        if method == Method::POST && path.trim_end_matches('/') == "/claim" {
            &[Budget::Api, Budget::ClaimSubmit]
        } else {
            &[Budget::Api]
        }
    }
}

/// Bucket shape: `capacity` tokens, one more every `refill_every`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub capacity: u32,
    pub refill_every: Duration,
}

impl Allowance {
    pub fn per_second(rate: u32, burst: u32) -> Self {
        Self {
            capacity: burst.max(1),
            refill_every: Duration::from_secs(1) / rate.max(1),
        }
    }

    pub fn per_minute(count: u32) -> Self {
        Self {
            capacity: count.max(1),
            refill_every: Duration::from_secs(60) / count.max(1),
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denied {
    pub budget: Budget,
    /// Time until the exhausted budget earns its next token.
    pub retry_after: Duration,
}

struct Bucket {
    tokens: u32,
    refilled_at: Instant,
}

impl Bucket {
    fn refill(&mut self, allowance: &Allowance, now: Instant) {
        if self.tokens >= allowance.capacity {
            self.refilled_at = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.refilled_at);
        let earned = elapsed.as_nanos() / allowance.refill_every.as_nanos().max(1);
        if earned == 0 {
            return;
        }
        let room = u128::from(allowance.capacity - self.tokens);
        if earned >= room {
            self.tokens = allowance.capacity;
            self.refilled_at = now;
        } else {
            // earned < room <= u32::MAX
            self.tokens += earned as u32;
            self.refilled_at += allowance.refill_every * earned as u32;
        }
    }

    fn retry_after(&self, allowance: &Allowance, now: Instant) -> Duration {
        (self.refilled_at + allowance.refill_every).saturating_duration_since(now)
    }
}

#[derive(Default)]
struct Buckets {
    map: HashMap<(IpAddr, Budget), Bucket>,
    checks: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<Buckets>>,
    api: Allowance,
    claim_submit: Allowance,
}

impl RateLimiter {
    pub fn new(api: Allowance, claim_submit: Allowance) -> Self {
        RateLimiter {
            buckets: Arc::new(Mutex::new(Buckets::default())),
            api,
            claim_submit,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(
            Allowance::per_second(config.rate_limit_per_sec, config.rate_limit_burst),
            Allowance::per_minute(config.claim_submits_per_min),
        )
    }

    pub fn allowance(&self, budget: Budget) -> Allowance {
        match budget {
            Budget::Api => self.api,
            Budget::ClaimSubmit => self.claim_submit,
        }
    }

    pub fn check(&self, ip: IpAddr, budgets: &[Budget]) -> Result<(), Denied> {
        self.check_at(ip, budgets, Instant::now())
    }

    /// Admit or deny one request from `ip` at `now`. Nothing is charged
    /// on denial.
    pub fn check_at(&self, ip: IpAddr, budgets: &[Budget], now: Instant) -> Result<(), Denied> {
        let mut guard = safe_lock(&self.buckets);
        let state = &mut *guard;

        state.checks += 1;
        if state.checks % SWEEP_EVERY == 0 {
            self.sweep(&mut state.map, now);
        }

        for &budget in budgets {
            let allowance = self.allowance(budget);
            let bucket = state.map.entry((ip, budget)).or_insert(Bucket {
                tokens: allowance.capacity,
                refilled_at: now,
            });
            bucket.refill(&allowance, now);
            if bucket.tokens == 0 {
                return Err(Denied {
                    budget,
                    retry_after: bucket.retry_after(&allowance, now),
                });
            }
        }

        for &budget in budgets {
            if let Some(bucket) = state.map.get_mut(&(ip, budget)) {
                bucket.tokens -= 1;
            }
        }
        Ok(())
    }

    /// Drop every bucket that has refilled to capacity; it is
    /// indistinguishable from a fresh one.
    pub fn forget_idle(&self, now: Instant) {
        let mut guard = safe_lock(&self.buckets);
        self.sweep(&mut guard.map, now);
    }

    fn sweep(&self, map: &mut HashMap<(IpAddr, Budget), Bucket>, now: Instant) {
        map.retain(|(_, budget), bucket| {
            let allowance = self.allowance(*budget);
            bucket.refill(&allowance, now);
            bucket.tokens < allowance.capacity
        });
    }

    pub fn tracked_buckets(&self) -> usize {
        safe_lock(&self.buckets).map.len()
    }
}

pub mod filters {
    use super::{Budget, RateLimiter};
    use std::net::IpAddr;
    use std::time::Duration;
    use warp::http::Method;
    use warp::path::FullPath;
    use warp::Filter;

    /// Remote IP, or loopback when the transport has none (warp::test).
    pub fn client_ip() -> impl Filter<Extract = (IpAddr,), Error = std::convert::Infallible> + Clone
    {
        warp::addr::remote().map(|addr: Option<std::net::SocketAddr>| {
            addr.map(|a| a.ip())
                .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
        })
    }

    pub fn rate_limit(
        limiter: RateLimiter,
    ) -> impl Filter<Extract = (), Error = warp::Rejection> + Clone {
        client_ip()
            .and(warp::method())
            .and(warp::path::full())
            .and(warp::any().map(move || limiter.clone()))
            .and_then(
                |ip: IpAddr, method: Method, path: FullPath, limiter: RateLimiter| async move {
                    limiter
                        .check(ip, Budget::for_request(&method, path.as_str()))
                        .map_err(|denied| {
                            warp::reject::custom(RateLimitExceeded {
                                ip,
                                budget: denied.budget,
                                retry_after: denied.retry_after,
                            })
                        })
                },
            )
            .untuple_one()
    }

    #[derive(Debug)]
    pub struct RateLimitExceeded {
        pub ip: IpAddr,
        pub budget: Budget,
        pub retry_after: Duration,
    }

    impl warp::reject::Reject for RateLimitExceeded {}
}
