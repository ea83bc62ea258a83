// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - METRICS MODULE
//
// Prometheus-compatible metrics for the claim API.
// Exposes counters, gauges, and histograms via /metrics endpoint.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

pub struct ToadMetrics {
    registry: Registry,

    // Claim ledger
    pub claims_accepted_total: IntCounter,
    pub claims_cooldown_total: IntCounter,
    pub claims_invalid_total: IntCounter,
    pub claims_failed_total: IntCounter,
    pub points_credited_total: IntCounter,
    pub ledger_identities: IntGauge,

    // Collaborators
    pub profile_lookups_total: IntCounter,
    pub profile_cache_hits_total: IntCounter,
    pub profile_not_found_total: IntCounter,
    pub webhook_events_total: IntCounter,

    // API
    pub api_requests_total: IntCounter,
    pub api_errors_total: IntCounter,
    pub api_request_duration_seconds: Histogram,
    pub rate_limit_rejections_total: IntCounter,
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
) -> Result<IntCounter, Box<dyn std::error::Error>> {
    let c = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl ToadMetrics {
    /// Create new metrics registry with all node metrics
    pub fn new() -> Result<Arc<Self>, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let claims_accepted_total =
            counter(&registry, "toad_claims_accepted_total", "Claims accepted")?;
        let claims_cooldown_total = counter(
            &registry,
            "toad_claims_cooldown_total",
            "Claims rejected because the cooldown was still active",
        )?;
        let claims_invalid_total = counter(
            &registry,
            "toad_claims_invalid_total",
            "Claims rejected for a bad address or amount",
        )?;
        let claims_failed_total = counter(
            &registry,
            "toad_claims_failed_total",
            "Claims that failed to persist",
        )?;
        let points_credited_total = counter(
            &registry,
            "toad_points_credited_total",
            "Points credited across all identities",
        )?;

        let ledger_identities = IntGauge::with_opts(Opts::new(
            "toad_ledger_identities",
            "Identities present in the claim ledger",
        ))?;
        registry.register(Box::new(ledger_identities.clone()))?;

        let profile_lookups_total = counter(
            &registry,
            "toad_profile_lookups_total",
            "Profile lookups served",
        )?;
        let profile_cache_hits_total = counter(
            &registry,
            "toad_profile_cache_hits_total",
            "Profile lookups answered from cache",
        )?;
        let profile_not_found_total = counter(
            &registry,
            "toad_profile_not_found_total",
            "Profile lookups where no source matched",
        )?;
        let webhook_events_total = counter(
            &registry,
            "toad_webhook_events_total",
            "Webhook payloads received",
        )?;

        let api_requests_total =
            counter(&registry, "toad_api_requests_total", "Total REST API requests")?;
        let api_errors_total = counter(
            &registry,
            "toad_api_errors_total",
            "REST API responses with status >= 400",
        )?;
        let api_request_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "toad_api_request_duration_seconds",
                "REST API request latency",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(api_request_duration_seconds.clone()))?;

        let rate_limit_rejections_total = counter(
            &registry,
            "toad_rate_limit_rejections_total",
            "Requests rejected by the per-IP rate limiter",
        )?;

        Ok(Arc::new(ToadMetrics {
            registry,
            claims_accepted_total,
            claims_cooldown_total,
            claims_invalid_total,
            claims_failed_total,
            points_credited_total,
            ledger_identities,
            profile_lookups_total,
            profile_cache_hits_total,
            profile_not_found_total,
            webhook_events_total,
            api_requests_total,
            api_errors_total,
            api_request_duration_seconds,
            rate_limit_rejections_total,
        }))
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Record one finished HTTP exchange.
    pub fn observe_request(&self, status: u16, elapsed: std::time::Duration) {
        self.api_requests_total.inc();
        if status >= 400 {
            self.api_errors_total.inc();
        }
        self.api_request_duration_seconds
            .observe(elapsed.as_secs_f64());
    }
}
