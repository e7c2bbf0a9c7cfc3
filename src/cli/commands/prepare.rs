//! Prepare command - clone or reuse a working copy

use super::print_json;
use crate::cache::Slug;
use crate::cli::args::{OutputFormat, PrepareArgs};
use crate::config::Config;
use crate::error::RepoCacheResult;
use crate::service::AnalysisService;
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the prepare command
pub async fn execute(args: PrepareArgs, caller: &str, config: &Config) -> RepoCacheResult<()> {
    let service = AnalysisService::from_config(config);
    let ctx = UiContext::detect();

    if args.format == OutputFormat::Json {
        let record = service.prepare(&args.url, caller).await?;
        return print_json(&record);
    }

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Preparing {}", args.url));
    let record = match service.prepare(&args.url, caller).await {
        Ok(record) => record,
        Err(e) => {
            spinner.stop_error("Working copy unavailable");
            return Err(e);
        }
    };
    spinner.stop("Working copy ready");

    ui::key_value(&ctx, "slug", &record.slug);
    let path = Slug::parse(&record.slug)
        .and_then(|slug| service.cache().layout().path_for(caller, &slug).ok());
    if let Some(path) = path {
        ui::key_value(&ctx, "path", &path.display().to_string());
    }

    Ok(())
}
