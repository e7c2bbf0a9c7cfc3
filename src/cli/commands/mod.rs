//! CLI command implementations

pub mod analyze;
pub mod config;
pub mod list;
pub mod prepare;
pub mod result;
pub mod run;
pub mod serve;
pub mod sweep;

pub use analyze::execute as analyze;
pub use config::execute as config;
pub use list::execute as list;
pub use prepare::execute as prepare;
pub use result::execute as result;
pub use run::execute as run;
pub use serve::execute as serve;
pub use sweep::execute as sweep;

use crate::error::RepoCacheResult;
use crate::service::AnalysisReport;
use crate::ui::{self, UiContext};
use serde::Serialize;

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> RepoCacheResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Human-readable rendering of an analysis run
pub(crate) fn print_report(ctx: &UiContext, report: &AnalysisReport) {
    ui::key_value(ctx, "slug", &report.slug);
    if let Some(tokens) = report.token_count {
        ui::key_value(ctx, "tokens", &tokens.to_string());
    }
    ui::key_value(
        ctx,
        "report",
        match (report.markdown_content.is_some(), report.pdf_exists) {
            (true, true) => "markdown + pdf",
            (true, false) => "markdown",
            (false, true) => "pdf",
            (false, false) => "none",
        },
    );

    match report.file_tree {
        Some(ref tree) => ui::block(ctx, "File tree", tree),
        None => ui::block(ctx, "Output", &report.stdout),
    }
    ui::block(ctx, "Errors", &report.stderr);
}
