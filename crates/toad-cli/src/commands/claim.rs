use super::common::{fetch_record, Context};
use crate::{print_error, print_info, print_success, print_warn};
use colored::*;
use serde_json::Value;
use toad_core::countdown::Countdown;
use toad_core::mirror::OfflineMirror;
use toad_core::{
    next_claim_amount, ClaimError, ClaimRecord, ClaimResult, Clock, SystemClock, BASE_AMOUNT,
};

/// What the server said about a claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerClaim {
    Accepted { credited: u64, record: ClaimRecord },
    Cooldown { remaining_ms: u64 },
    /// Transport failure or any non-cooldown error reply.
    Failed(String),
}

/// How a claim attempt ended on this machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Confirmed {
        credited: u64,
        server: ClaimRecord,
        /// `None` when the mirror could not be updated; the server's
        /// record is authoritative either way.
        mirror: Option<ClaimRecord>,
    },
    Cooldown {
        remaining_ms: u64,
    },
    /// Recorded in the mirror only; the server never saw it.
    Provisional {
        result: ClaimResult,
        reason: String,
    },
}

pub fn interpret_claim_reply(status: u16, body: &Value) -> ServerClaim {
    if status == 200 && body["ok"] == Value::Bool(true) {
        let credited = body["claimedAmount"].as_u64();
        let record = serde_json::from_value::<ClaimRecord>(body.clone());
        return match (credited, record) {
            (Some(credited), Ok(record)) => ServerClaim::Accepted { credited, record },
            _ => ServerClaim::Failed("malformed success reply".to_string()),
        };
    }
    if status == 429 && body["error"] == "cooldown" {
        return ServerClaim::Cooldown {
            remaining_ms: body["remaining"].as_u64().unwrap_or(0),
        };
    }
    ServerClaim::Failed(format!(
        "HTTP {}: {}",
        status,
        body["error"].as_str().unwrap_or("unknown error")
    ))
}

/// Amount to ask the server for. An unreadable mirror falls back to the
/// base amount; the server has the final say.
pub fn requested_amount(mirror: &OfflineMirror, address: &str) -> u64 {
    mirror.next_claim_amount(address).unwrap_or_else(|e| {
        tracing::warn!(address, "offline mirror unreadable, requesting base amount: {}", e);
        BASE_AMOUNT
    })
}

pub async fn submit_to_server(ctx: &Context, address: &str, amount: u64) -> ServerClaim {
    let response = match ctx
        .client
        .post(ctx.url("/claim"))
        .json(&serde_json::json!({"address": address, "amount": amount}))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => return ServerClaim::Failed(format!("network error: {}", e)),
    };
    let status = response.status().as_u16();
    match response.json::<Value>().await {
        Ok(body) => interpret_claim_reply(status, &body),
        Err(e) => ServerClaim::Failed(format!("HTTP {}: unreadable reply ({})", status, e)),
    }
}

/// Bring the mirror in line with the server's answer, claiming locally
/// when the server could not take the claim. A server-accepted claim is
/// never reported as failed because the mirror could not follow it.
pub fn settle(
    mirror: &OfflineMirror,
    address: &str,
    server: ServerClaim,
) -> Result<Settlement, ClaimError> {
    match server {
        ServerClaim::Accepted { credited, record } => {
            let local = match mirror.apply_after_server_success(address, credited) {
                Ok(local) => Some(local),
                Err(e) => {
                    tracing::warn!(address, credited, "offline mirror not updated: {}", e);
                    None
                }
            };
            Ok(Settlement::Confirmed {
                credited,
                server: record,
                mirror: local,
            })
        }
        ServerClaim::Cooldown { remaining_ms } => Ok(Settlement::Cooldown { remaining_ms }),
        ServerClaim::Failed(reason) => {
            let result = mirror.claim_locally(address)?;
            Ok(Settlement::Provisional { result, reason })
        }
    }
}

fn print_record(record: &ClaimRecord, now_ms: u64) {
    println!("{} {}", "Total:".bold(), record.total.to_string().cyan().bold());
    println!("{} {}", "Streak:".bold(), record.streak);
    println!(
        "{} {}",
        "Next reward:".bold(),
        next_claim_amount(record).to_string().green()
    );
    println!(
        "{} {}",
        "Next claim:".bold(),
        Countdown::for_record(record, now_ms)
    );
}

pub async fn status(ctx: &Context, address: &str) -> Result<(), Box<dyn std::error::Error>> {
    print_info(&format!("Fetching claim status for {}...", address));
    let now = SystemClock.now_ms();

    match fetch_record(ctx, address).await {
        Ok(record) => {
            println!();
            println!("{} {}", "Address:".bold(), address.green());
            print_record(&record, now);
        }
        Err(e) => {
            print_warn(&format!("Server unavailable ({}), showing offline mirror", e));
            let record = ctx.mirror.record(address)?;
            println!();
            println!("{} {} {}", "Address:".bold(), address.green(), "(offline)".yellow());
            print_record(&record, now);
        }
    }
    Ok(())
}

pub async fn claim(ctx: &Context, address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let amount = requested_amount(&ctx.mirror, address);
    print_info(&format!("Claiming {} points for {}...", amount, address));

    let server = submit_to_server(ctx, address, amount).await;
    match settle(&ctx.mirror, address, server) {
        Ok(Settlement::Confirmed {
            credited,
            server,
            mirror,
        }) => {
            print_success(&format!("Claimed {} points!", credited));
            println!("{} {}", "Total:".bold(), server.total.to_string().cyan().bold());
            println!("{} {}", "Streak:".bold(), server.streak);
            if mirror.is_none() {
                print_warn("Offline mirror could not be updated; it will lag until the next claim");
            }
        }
        Ok(Settlement::Cooldown { remaining_ms }) => {
            print_warn(&format!(
                "Already claimed. Next claim in {}",
                toad_core::countdown::format_hms(remaining_ms)
            ));
        }
        Ok(Settlement::Provisional { result, reason }) => {
            print_warn(&format!("Server claim failed ({})", reason));
            print_success(&format!(
                "Claimed {} points offline (provisional)",
                result.credited
            ));
            println!(
                "{} {}",
                "Local total:".bold(),
                result.record.total.to_string().cyan()
            );
            println!("{} {}", "Local streak:".bold(), result.record.streak);
        }
        Err(ClaimError::Cooldown { remaining_ms }) => {
            print_error(&format!(
                "Server unavailable and local cooldown active: {} left",
                toad_core::countdown::format_hms(remaining_ms)
            ));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
