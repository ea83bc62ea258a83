use super::common::Context;
use crate::print_info;
use colored::*;
use toad_core::countdown::Countdown;
use toad_core::{next_claim_amount, ClaimRecord, Clock, SystemClock};

fn print_row(identity: &str, record: &ClaimRecord, now_ms: u64) {
    println!(
        "{:<44} {:>10} {:>6} {:>8}  {}",
        identity.green(),
        record.total,
        record.streak,
        next_claim_amount(record),
        Countdown::for_record(record, now_ms)
    );
}

pub fn handle(ctx: &Context, address: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let now = SystemClock.now_ms();

    println!(
        "{}",
        format!(
            "{:<44} {:>10} {:>6} {:>8}  {}",
            "ADDRESS", "TOTAL", "STREAK", "NEXT", "COUNTDOWN"
        )
        .bold()
    );

    match address {
        Some(address) => {
            let record = ctx.mirror.record(address)?;
            print_row(&address.trim().to_lowercase(), &record, now);
        }
        None => {
            let ledger = ctx.mirror.ledger()?;
            if ledger.is_empty() {
                print_info("Offline mirror is empty");
            }
            for (identity, record) in &ledger {
                print_row(identity, record, now);
            }
        }
    }
    Ok(())
}
