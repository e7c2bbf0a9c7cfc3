//! Report files the analysis tool leaves in the working copy

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

pub const MARKDOWN_REPORT: &str = "ccontext-output.md";
pub const PDF_REPORT: &str = "ccontext-output.pdf";

/// Generated reports found in a working copy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    pub markdown_content: Option<String>,
    pub pdf_exists: bool,
}

pub fn markdown_path(working_copy: &Path) -> PathBuf {
    working_copy.join(MARKDOWN_REPORT)
}

pub fn pdf_path(working_copy: &Path) -> PathBuf {
    working_copy.join(PDF_REPORT)
}

/// Read whatever reports exist. Missing or unreadable files degrade to
/// `None`/`false`.
pub async fn read_generated_artifacts(working_copy: &Path) -> Artifacts {
    let markdown_path = markdown_path(working_copy);
    let markdown_content = match fs::read(&markdown_path).await {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Cannot read {}: {}", markdown_path.display(), e);
            None
        }
    };

    let pdf_exists = fs::metadata(pdf_path(working_copy))
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);

    Artifacts {
        markdown_content,
        pdf_exists,
    }
}
