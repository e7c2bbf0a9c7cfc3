//! Run command - free-text analysis command, optionally streamed

use super::{print_json, print_report};
use crate::cli::args::{OutputFormat, RunArgs};
use crate::config::Config;
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::service::AnalysisService;
use crate::ui::{TaskSpinner, UiContext};
use std::io::Write;
use tracing::warn;

/// Execute the run command
pub async fn execute(args: RunArgs, caller: &str, config: &Config) -> RepoCacheResult<()> {
    let service = AnalysisService::from_config(config);

    if args.stream {
        let url = args.url.as_deref().ok_or_else(|| {
            RepoCacheError::InvalidCommand("--stream needs a repository URL".to_string())
        })?;
        return stream(&service, url, caller, &args.command).await;
    }

    let run = async {
        match (&args.url, &args.slug) {
            (_, Some(slug)) => service.run_slug(caller, slug, &args.command).await,
            (Some(url), None) => service.run(url, caller, &args.command).await,
            (None, None) => Err(RepoCacheError::InvalidCommand(
                "a repository URL or --slug is required".to_string(),
            )),
        }
    };

    if args.format == OutputFormat::Json {
        return print_json(&run.await?);
    }

    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Running {}", service.runner().tool()));

    match run.await {
        Ok(report) => {
            spinner.stop("Command finished");
            print_report(&ctx, &report);
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Command failed");
            Err(e)
        }
    }
}

/// One JSON event per line on stdout, flushed as produced
async fn stream(
    service: &AnalysisService,
    url: &str,
    caller: &str,
    command: &str,
) -> RepoCacheResult<()> {
    let mut on_event = |event: crate::sandbox::RunEvent| {
        let line = match event.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Dropping unserializable event: {}", e);
                return;
            }
        };
        let mut stdout = std::io::stdout().lock();
        if writeln!(stdout, "{}", line).and_then(|_| stdout.flush()).is_err() {
            warn!("stdout closed while streaming");
        }
    };

    service
        .run_streaming(url, caller, command, &mut on_event)
        .await
        .map(|_| ())
}
