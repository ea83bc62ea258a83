// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VICE TOADS - REST API
//
//   GET  /claim?address=        record for an identity
//   POST /claim {address,amount} daily claim
//   GET  /profile?address=      best-effort social profile
//   *    /webhook               event sink (logged only)
//   GET  /.well-known/farcaster.json, /health, /metrics
//
// Every reply is JSON with an `ok` flag (except /metrics) and a real HTTP
// status code.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::profile::LookupOutcome;
use crate::rate_limiter::filters::{rate_limit, RateLimitExceeded};
use crate::rate_limiter::RateLimiter;
use crate::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use toad_core::service::ClaimLedger;
use toad_core::{normalize_identity, ClaimError};
use warp::http::{Method, StatusCode};
use warp::{Filter, Rejection, Reply};

/// Claim bodies are tiny; anything bigger is refused before parsing.
const MAX_BODY_BYTES: u64 = 16 * 1024;

type BoxReply = Box<dyn Reply>;

fn api_json(status: StatusCode, body: Value) -> BoxReply {
    Box::new(warp::reply::with_status(warp::reply::json(&body), status))
}

fn with_state<T: Clone + Send>(
    state: T,
) -> impl Filter<Extract = (T,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// `address` is read like a loosely-typed form field: strings are used as
/// is, numbers are stringified, anything else counts as missing.
fn body_address(body: &Value) -> String {
    match body.get("address") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// `amount` may be a JSON number or a numeric string; anything else is NaN
/// and fails validation.
fn body_amount(body: &Value) -> f64 {
    match body.get("amount") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// Ledger calls hit the disk under the ledger's write lock; keep them off
/// the async workers.
async fn run_ledger<T, F>(state: &AppState, op: F) -> Result<T, ClaimError>
where
    F: FnOnce(&ClaimLedger) -> Result<T, ClaimError> + Send + 'static,
    T: Send + 'static,
{
    let ledger = state.ledger.clone();
    tokio::task::spawn_blocking(move || op(&ledger))
        .await
        .unwrap_or_else(|e| Err(ClaimError::Persistence(format!("ledger task failed: {}", e))))
}

// ─────────────────────────────────────────────────────────────────
// CLAIM
// ─────────────────────────────────────────────────────────────────

async fn get_claim(query: HashMap<String, String>, state: AppState) -> BoxReply {
    let address = query.get("address").cloned().unwrap_or_default();
    if normalize_identity(&address).is_none() {
        return api_json(
            StatusCode::BAD_REQUEST,
            json!({"ok": false, "error": "address query required"}),
        );
    }

    match run_ledger(&state, move |ledger| ledger.get_record(&address)).await {
        Ok(rec) => api_json(
            StatusCode::OK,
            json!({"ok": true, "total": rec.total, "last": rec.last, "streak": rec.streak}),
        ),
        Err(e) => {
            tracing::error!("claim lookup failed: {}", e);
            api_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"ok": false, "error": "server_error", "detail": e.to_string()}),
            )
        }
    }
}

async fn post_claim(body: bytes::Bytes, state: AppState) -> BoxReply {
    let invalid = || {
        api_json(
            StatusCode::BAD_REQUEST,
            json!({"ok": false, "error": "invalid address or amount"}),
        )
    };

    let req: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            state.metrics.claims_invalid_total.inc();
            return invalid();
        }
    };

    let address = body_address(&req);
    let amount = body_amount(&req);

    let outcome = run_ledger(&state, move |ledger| {
        let res = ledger.submit_claim(&address, amount)?;
        Ok((res, ledger.identity_count().ok()))
    })
    .await;

    match outcome {
        Ok((res, identities)) => {
            state.metrics.claims_accepted_total.inc();
            state.metrics.points_credited_total.inc_by(res.credited);
            if let Some(n) = identities {
                state.metrics.ledger_identities.set(n as i64);
            }
            api_json(
                StatusCode::OK,
                json!({
                    "ok": true,
                    "claimedAmount": res.credited,
                    "total": res.record.total,
                    "last": res.record.last,
                    "streak": res.record.streak,
                }),
            )
        }
        Err(err) => {
            let (status, body) = match &err {
                ClaimError::InvalidArgument(_) => {
                    state.metrics.claims_invalid_total.inc();
                    return invalid();
                }
                ClaimError::Cooldown { remaining_ms } => {
                    state.metrics.claims_cooldown_total.inc();
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        json!({"ok": false, "error": err.code(), "remaining": remaining_ms}),
                    )
                }
                ClaimError::Persistence(detail) => {
                    state.metrics.claims_failed_total.inc();
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({"ok": false, "error": err.code(), "detail": detail}),
                    )
                }
                ClaimError::NetworkUnavailable(_) => {
                    state.metrics.claims_failed_total.inc();
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({"ok": false, "error": "server_error", "detail": err.to_string()}),
                    )
                }
            };
            api_json(status, body)
        }
    }
}

fn claim_routes(
    state: AppState,
) -> impl Filter<Extract = (BoxReply,), Error = Rejection> + Clone {
    let claim = warp::path("claim").and(warp::path::end());

    let get = claim
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_state(state.clone()))
        .then(get_claim);

    let post = claim
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_state(state))
        .then(post_claim);

    let other = claim
        .and(warp::method())
        .and_then(|method: Method| async move {
            if method == Method::GET || method == Method::POST {
                // Let the GET/POST rejection (e.g. payload too large) win
                Err(warp::reject::not_found())
            } else {
                Ok(api_json(
                    StatusCode::METHOD_NOT_ALLOWED,
                    json!({"ok": false, "error": "method_not_allowed"}),
                ))
            }
        });

    get.or(post).unify().or(other).unify()
}

// ─────────────────────────────────────────────────────────────────
// PROFILE
// ─────────────────────────────────────────────────────────────────

async fn get_profile(query: HashMap<String, String>, state: AppState) -> BoxReply {
    let address = match query.get("address").and_then(|a| normalize_identity(a)) {
        Some(a) => a,
        None => {
            return api_json(
                StatusCode::BAD_REQUEST,
                json!({"ok": false, "error": "address required"}),
            )
        }
    };

    state.metrics.profile_lookups_total.inc();
    let body = match state.profiles.lookup(&address).await {
        LookupOutcome::Cached(profile) => {
            state.metrics.profile_cache_hits_total.inc();
            json!({"ok": true, "profile": profile, "source": "cache"})
        }
        LookupOutcome::Found { profile, source } => {
            json!({"ok": true, "profile": profile, "source": source})
        }
        LookupOutcome::NotFound { tried } => {
            state.metrics.profile_not_found_total.inc();
            return api_json(
                StatusCode::OK,
                json!({
                    "ok": false,
                    "error": "profile not found (best-effort)",
                    "sourceTried": tried,
                }),
            );
        }
    };

    Box::new(warp::reply::with_header(
        api_json(StatusCode::OK, body),
        "Cache-Control",
        "public, max-age=60",
    ))
}

fn profile_routes(
    state: AppState,
) -> impl Filter<Extract = (BoxReply,), Error = Rejection> + Clone {
    warp::path("profile")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_state(state))
        .then(get_profile)
}

// ─────────────────────────────────────────────────────────────────
// WEBHOOK
// ─────────────────────────────────────────────────────────────────

async fn handle_webhook(method: Method, body: bytes::Bytes, state: AppState) -> BoxReply {
    match method {
        Method::OPTIONS => Box::new(warp::reply::with_status(
            warp::reply(),
            StatusCode::NO_CONTENT,
        )) as BoxReply,
        Method::GET => api_json(
            StatusCode::OK,
            json!({"ok": true, "message": "Webhook endpoint active"}),
        ),
        Method::POST => {
            state.metrics.webhook_events_total.inc();
            match serde_json::from_slice::<Value>(&body) {
                Ok(payload) => tracing::info!(
                    received_at = %chrono::Utc::now().to_rfc3339(),
                    %payload,
                    "webhook received"
                ),
                Err(_) => tracing::info!(
                    received_at = %chrono::Utc::now().to_rfc3339(),
                    payload = %String::from_utf8_lossy(&body),
                    bytes = body.len(),
                    "webhook received (non-JSON)"
                ),
            }
            api_json(StatusCode::OK, json!({"ok": true}))
        }
        _ => Box::new(warp::reply::with_header(
            api_json(
                StatusCode::METHOD_NOT_ALLOWED,
                json!({"ok": false, "error": "Method Not Allowed"}),
            ),
            "Allow",
            "GET, POST, OPTIONS",
        )),
    }
}

fn webhook_routes(
    state: AppState,
) -> impl Filter<Extract = (BoxReply,), Error = Rejection> + Clone {
    warp::path("webhook")
        .and(warp::path::end())
        .and(warp::method())
        .and(warp::body::bytes())
        .and(with_state(state))
        .then(handle_webhook)
}

// ─────────────────────────────────────────────────────────────────
// MANIFEST, HEALTH, METRICS
// ─────────────────────────────────────────────────────────────────

fn info_routes(
    state: AppState,
) -> impl Filter<Extract = (BoxReply,), Error = Rejection> + Clone {
    let manifest = warp::path(".well-known")
        .and(warp::path("farcaster.json"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|s: AppState| api_json(StatusCode::OK, (*s.manifest).clone()));

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .then(|s: AppState| async move {
            let identities = run_ledger(&s, |ledger| ledger.identity_count()).await;
            let healthy = identities.is_ok();
            api_json(
                if healthy {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                },
                json!({
                    "ok": healthy,
                    "version": env!("CARGO_PKG_VERSION"),
                    "uptime_secs": s.started.elapsed().as_secs(),
                    "identities": identities.unwrap_or(0),
                }),
            )
        });

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state))
        .then(|s: AppState| async move {
            if let Ok(n) = run_ledger(&s, |ledger| ledger.identity_count()).await {
                s.metrics.ledger_identities.set(n as i64);
            }
            let reply: BoxReply = match s.metrics.export() {
                Ok(text) => Box::new(warp::reply::with_header(
                    text,
                    "Content-Type",
                    "text/plain; version=0.0.4",
                )),
                Err(e) => api_json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"ok": false, "error": "server_error", "detail": e.to_string()}),
                ),
            };
            reply
        });

    manifest.or(health).unify().or(metrics).unify()
}

// ─────────────────────────────────────────────────────────────────
// ASSEMBLY
// ─────────────────────────────────────────────────────────────────

/// Full API: rate limit → routes (CORS) → rejection handler, wrapped in
/// request logging and metrics.
pub fn routes(
    state: AppState,
    limiter: RateLimiter,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let metrics = state.metrics.clone();
    let rejection_metrics = state.metrics.clone();

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["Content-Type", "Authorization"]);

    let api = claim_routes(state.clone())
        .or(profile_routes(state.clone()))
        .unify()
        .or(webhook_routes(state.clone()))
        .unify()
        .or(info_routes(state))
        .unify()
        .with(cors);

    rate_limit(limiter)
        .and(api)
        .recover(move |err: Rejection| handle_rejection(err, rejection_metrics.clone()))
        .with(warp::log("toad::api"))
        .with(warp::log::custom(move |info| {
            metrics.observe_request(info.status().as_u16(), info.elapsed())
        }))
}

async fn handle_rejection(
    err: Rejection,
    metrics: std::sync::Arc<crate::metrics::ToadMetrics>,
) -> Result<BoxReply, Infallible> {
    let reply = if let Some(RateLimitExceeded {
        ip,
        budget,
        retry_after,
    }) = err.find()
    {
        metrics.rate_limit_rejections_total.inc();
        tracing::debug!(%ip, ?budget, ?retry_after, "rate limited");
        let secs = retry_after.as_millis().div_ceil(1000).max(1);
        Box::new(warp::reply::with_header(
            api_json(
                StatusCode::TOO_MANY_REQUESTS,
                json!({"ok": false, "error": "rate_limited", "retryAfter": secs as u64}),
            ),
            "Retry-After",
            secs.to_string(),
        ))
    } else if err.is_not_found() {
        api_json(
            StatusCode::NOT_FOUND,
            json!({"ok": false, "error": "not_found"}),
        )
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        api_json(
            StatusCode::PAYLOAD_TOO_LARGE,
            json!({"ok": false, "error": "payload_too_large"}),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        api_json(
            StatusCode::LENGTH_REQUIRED,
            json!({"ok": false, "error": "length_required"}),
        )
    } else if err.find::<warp::cors::CorsForbidden>().is_some() {
        api_json(
            StatusCode::FORBIDDEN,
            json!({"ok": false, "error": "cors_forbidden"}),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        api_json(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({"ok": false, "error": "method_not_allowed"}),
        )
    } else {
        tracing::warn!("unhandled rejection: {:?}", err);
        api_json(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"ok": false, "error": "server_error"}),
        )
    };
    Ok(reply)
}
