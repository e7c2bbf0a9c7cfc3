//! List command - show cached working copies

use super::print_json;
use crate::cache::CacheRecord;
use crate::cli::args::{ListArgs, ListFormat};
use crate::config::Config;
use crate::error::RepoCacheResult;
use crate::service::AnalysisService;
use crate::ui::{self, UiContext};
use chrono::Utc;
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, caller: &str, config: &Config) -> RepoCacheResult<()> {
    let service = AnalysisService::from_config(config);
    let mut records = service.list().await?;
    if args.mine {
        records.retain(|r| r.caller_identity == caller);
    }

    if records.is_empty() {
        match args.format {
            ListFormat::Json => println!("[]"),
            ListFormat::Plain => {}
            ListFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, "No working copies");
            }
        }
        return Ok(());
    }

    match args.format {
        ListFormat::Table => print_table(&records, config.cache.ttl_secs),
        ListFormat::Json => print_json(&records)?,
        ListFormat::Plain => {
            for record in &records {
                println!("{}", record.slug);
            }
        }
    }

    Ok(())
}

fn print_table(records: &[CacheRecord], ttl_secs: u64) {
    println!(
        "{:<16} {:<56} {:<17} {:<8}",
        style("CALLER").bold(),
        style("SLUG").bold(),
        style("LAST USED").bold(),
        style("EXPIRES").bold()
    );
    println!("{}", "-".repeat(100));

    let now = Utc::now();
    for record in records {
        let caller = if record.caller_identity.is_empty() {
            "(anonymous)"
        } else {
            record.caller_identity.as_str()
        };
        let idle = (now - record.last_used_at).num_seconds().max(0) as u64;
        let expires = match ttl_secs.checked_sub(idle) {
            Some(left) if left > 0 => style(format_duration(left)).green(),
            _ => style("due".to_string()).yellow(),
        };

        println!(
            "{:<16} {:<56} {:<17} {:<8}",
            caller,
            record.slug,
            record.last_used_at.format("%Y-%m-%d %H:%M"),
            expires
        );
    }

    println!();
    println!("{} working copy(s)", records.len());
}

fn format_duration(secs: u64) -> String {
    match secs {
        s if s >= 3600 => format!("{}h", s / 3600),
        s if s >= 60 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}
