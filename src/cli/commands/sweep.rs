//! Sweep command - evict idle working copies once

use super::print_json;
use crate::cli::args::{OutputFormat, SweepArgs};
use crate::config::Config;
use crate::error::RepoCacheResult;
use crate::service::AnalysisService;
use crate::ui::{self, UiContext};

/// Execute the sweep command
pub async fn execute(args: SweepArgs, config: &Config) -> RepoCacheResult<()> {
    let service = AnalysisService::from_config(config);
    let report = service.sweep().await?;

    if args.format == OutputFormat::Json {
        return print_json(&serde_json::json!({
            "evicted": report.evicted,
            "orphansRemoved": report.orphans_removed,
            "deferred": report.deferred,
        }));
    }

    let ctx = UiContext::detect();
    if report.is_empty() {
        ui::step_info(&ctx, "Nothing to evict");
        return Ok(());
    }

    for slug in &report.evicted {
        ui::step_ok_detail(&ctx, "Evicted", slug);
    }
    if report.orphans_removed > 0 {
        let noun = if report.orphans_removed == 1 {
            "directory"
        } else {
            "directories"
        };
        ui::step_ok(
            &ctx,
            &format!("Removed {} orphaned {}", report.orphans_removed, noun),
        );
    }
    if report.deferred > 0 {
        ui::step_warn_hint(
            &ctx,
            &format!("{} in use, skipped", report.deferred),
            "They will be retried on the next sweep",
        );
    }

    Ok(())
}
