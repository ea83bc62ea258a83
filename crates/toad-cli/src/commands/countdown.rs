use super::common::{fetch_record, Context};
use crate::{print_info, print_success, print_warn};
use colored::*;
use std::io::Write;
use std::time::Duration;
use toad_core::countdown::Countdown;
use toad_core::{Clock, SystemClock};

pub async fn handle(
    ctx: &Context,
    address: &str,
    once: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = match fetch_record(ctx, address).await {
        Ok(record) => record,
        Err(e) => {
            print_warn(&format!("Server unavailable ({}), using offline mirror", e));
            ctx.mirror.record(address)?
        }
    };

    let clock = SystemClock;
    if once {
        println!(
            "{} {}",
            "Next claim:".bold(),
            Countdown::for_record(&record, clock.now_ms())
        );
        return Ok(());
    }

    print_info("Press Ctrl+C to stop");
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let countdown = Countdown::for_record(&record, clock.now_ms());
        if countdown.is_claimable() {
            println!();
            print_success("Ready to claim!");
            return Ok(());
        }
        print!("\r{} {}", "⏳ Next claim in".bold(), countdown.to_string().cyan());
        std::io::stdout().flush()?;
    }
}
