use super::common::Context;
use crate::{print_error, print_info, print_warn};
use colored::*;
use serde_json::Value;

pub async fn handle(ctx: &Context, address: &str) -> Result<(), Box<dyn std::error::Error>> {
    print_info(&format!("Looking up profile for {}...", address));

    let response = match ctx
        .client
        .get(ctx.url("/profile"))
        .query(&[("address", address)])
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            print_error(&format!("Network error: {}", e));
            return Ok(());
        }
    };

    let status = response.status();
    let data: Value = response.json().await?;

    if data["ok"] != Value::Bool(true) {
        if status.is_success() {
            print_warn("No profile found");
            if let Some(tried) = data["sourceTried"].as_array() {
                for url in tried.iter().filter_map(Value::as_str) {
                    println!("  {} {}", "tried".dimmed(), url);
                }
            }
        } else {
            print_error(&format!(
                "HTTP {}: {}",
                status,
                data["error"].as_str().unwrap_or("unknown error")
            ));
        }
        return Ok(());
    }

    let profile = &data["profile"];
    println!();
    if profile.get("raw").is_some() {
        println!("{}", "Unrecognised profile shape, raw reply:".bold());
        println!("{}", serde_json::to_string_pretty(&profile["raw"])?);
    } else {
        println!(
            "{} {}",
            "Username:".bold(),
            profile["username"].as_str().unwrap_or("-").green()
        );
        println!(
            "{} {}",
            "Display name:".bold(),
            profile["displayName"].as_str().unwrap_or("-")
        );
        println!(
            "{} {}",
            "Avatar:".bold(),
            profile["avatar"].as_str().unwrap_or("-")
        );
    }
    println!(
        "{} {}",
        "Source:".bold(),
        data["source"].as_str().unwrap_or("unknown").dimmed()
    );
    Ok(())
}
