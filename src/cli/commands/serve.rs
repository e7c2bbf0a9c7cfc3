//! Serve command - run the eviction scheduler in the foreground

use crate::cli::args::ServeArgs;
use crate::config::Config;
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::service::AnalysisService;
use crate::ui::{self, UiContext};
use std::time::Duration;
use tracing::info;

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: &Config) -> RepoCacheResult<()> {
    let service = AnalysisService::from_config(config);
    let interval = args
        .interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.cache.sweep_interval());

    let ctx = UiContext::detect();
    ui::step_info(
        &ctx,
        &format!(
            "Sweeping {} every {}s (TTL {}s), Ctrl-C to stop",
            service.cache().layout().base_dir().display(),
            interval.as_secs(),
            config.cache.ttl_secs
        ),
    );

    let scheduler = service.spawn_eviction(interval);
    let stopped = tokio::signal::ctrl_c().await;
    scheduler.abort();

    stopped.map_err(|e| RepoCacheError::io("waiting for Ctrl-C", e))?;
    info!("Eviction scheduler stopped");
    Ok(())
}
