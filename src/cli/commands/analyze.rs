//! Analyze command - run the tool with structured options

use super::{print_json, print_report};
use crate::cli::args::{AnalyzeArgs, OutputFormat};
use crate::config::Config;
use crate::error::RepoCacheResult;
use crate::sandbox::AnalysisOptions;
use crate::service::AnalysisService;
use crate::ui::{TaskSpinner, UiContext};

/// Execute the analyze command
pub async fn execute(args: AnalyzeArgs, caller: &str, config: &Config) -> RepoCacheResult<()> {
    let service = AnalysisService::from_config(config);
    let options = AnalysisOptions {
        max_tokens: args.max_tokens,
        includes: args.include,
        excludes: args.exclude,
    };

    if args.format == OutputFormat::Json {
        let report = service.analyze(&args.url, caller, &options).await?;
        return print_json(&report);
    }

    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Analyzing {}", args.url));

    match service.analyze(&args.url, caller, &options).await {
        Ok(report) => {
            spinner.stop("Analysis complete");
            print_report(&ctx, &report);
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Analysis failed");
            Err(e)
        }
    }
}
