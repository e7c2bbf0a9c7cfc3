//! Result command - reports from the last run

use super::print_json;
use crate::cli::args::{OutputFormat, ResultArgs};
use crate::config::Config;
use crate::error::RepoCacheResult;
use crate::service::AnalysisService;
use crate::ui::{self, UiContext};

/// Execute the result command
pub async fn execute(args: ResultArgs, caller: &str, config: &Config) -> RepoCacheResult<()> {
    let service = AnalysisService::from_config(config);

    if args.pdf {
        let path = service.pdf_path(caller, &args.slug).await?;
        match args.format {
            OutputFormat::Json => print_json(&serde_json::json!({ "pdfPath": path }))?,
            OutputFormat::Text => println!("{}", path.display()),
        }
        return Ok(());
    }

    let artifacts = service.artifacts(caller, &args.slug).await?;
    match args.format {
        OutputFormat::Json => print_json(&artifacts)?,
        OutputFormat::Text => match artifacts.markdown_content {
            Some(markdown) => print!("{}", markdown),
            None => {
                let ctx = UiContext::detect();
                ui::step_warn_hint(
                    &ctx,
                    "No report in this working copy",
                    "Run: repocache run --slug <slug>",
                );
            }
        },
    }

    Ok(())
}
