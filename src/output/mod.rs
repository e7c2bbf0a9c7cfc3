//! Parsing analysis output and generated reports

mod artifacts;
mod parser;

pub use artifacts::{
    markdown_path, pdf_path, read_generated_artifacts, Artifacts, MARKDOWN_REPORT, PDF_REPORT,
};
pub use parser::{
    extract_marked_tree, extract_prefixed_tree, extract_token_count, parse_stdout, strip_ansi,
    ParsedOutput,
};
