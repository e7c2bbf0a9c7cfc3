//! Text extraction from analysis output
//!
//! The tool's output format is not under our control, so nothing here
//! fails: anything that cannot be found is `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const TREE_START: &str = "## FILE TREE ##";
const TREE_END: &str = "## END FILE TREE ##";

/// Line prefixes the tool uses for tree entries
const TREE_PREFIXES: &[&str] = &["📁", "📄", "[Excluded]"];

static TOKEN_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Total context size:\s*(\d[\d,]*)").expect("valid token count regex")
});

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:\[[0-9;?]*[ -/]*[@-~]|\][^\x07\x1B]*(?:\x07|\x1B\\)|[@-Z\\-_])")
        .expect("valid ansi regex")
});

/// What could be recovered from one run's stdout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedOutput {
    pub file_tree: Option<String>,
    pub token_count: Option<u64>,
}

/// Extract the file tree and token count from stdout
pub fn parse_stdout(stdout: &str) -> ParsedOutput {
    let clean = strip_ansi(stdout);
    ParsedOutput {
        file_tree: extract_marked_tree(&clean).or_else(|| extract_prefixed_tree(&clean)),
        token_count: extract_token_count(&clean),
    }
}

/// Text between the `## FILE TREE ##` marker pair, trimmed
pub fn extract_marked_tree(text: &str) -> Option<String> {
    let start = text.find(TREE_START)? + TREE_START.len();
    let len = text[start..].find(TREE_END)?;
    let tree = text[start..start + len].trim();
    (!tree.is_empty()).then(|| tree.to_string())
}

/// Lines that start with a tree glyph, in order
pub fn extract_prefixed_tree(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| {
            let line = line.trim_start();
            TREE_PREFIXES.iter().any(|p| line.starts_with(p))
        })
        .collect();

    (!lines.is_empty()).then(|| lines.join("\n"))
}

pub fn extract_token_count(text: &str) -> Option<u64> {
    let caps = TOKEN_COUNT.captures_iter(text).last()?;
    caps[1].replace(',', "").parse().ok()
}

/// Remove terminal escape sequences
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_marked_tree_and_count() {
        let stdout = "## FILE TREE ##\n📁 src\n## END FILE TREE ##\n...Total context size: 4821";
        let parsed = parse_stdout(stdout);
        assert_eq!(parsed.file_tree.as_deref(), Some("📁 src"));
        assert_eq!(parsed.token_count, Some(4821));
    }

    #[test]
    fn missing_markers_yield_none() {
        let parsed = parse_stdout("Analyzing repository...\nDone.\n");
        assert_eq!(parsed, ParsedOutput::default());
    }

    #[test]
    fn falls_back_to_prefixed_lines() {
        let stdout = "Scanning\n📁 src\n  📄 main.rs\n[Excluded] target\nWrote report\n";
        assert_eq!(
            parse_stdout(stdout).file_tree.as_deref(),
            Some("📁 src\n  📄 main.rs\n[Excluded] target")
        );
    }

    #[test]
    fn unterminated_marker_falls_back() {
        let stdout = "## FILE TREE ##\n📁 lib\n";
        assert_eq!(parse_stdout(stdout).file_tree.as_deref(), Some("📁 lib"));
    }

    #[test]
    fn token_count_accepts_separators() {
        assert_eq!(extract_token_count("Total context size: 1,234,567 tokens"), Some(1234567));
        assert_eq!(extract_token_count("Total context size:"), None);
    }

    #[test]
    fn strips_colour_codes() {
        let coloured = "\x1b[1;32m📁 src\x1b[0m\nTotal context size: \x1b[33m99\x1b[0m";
        assert_eq!(strip_ansi(coloured), "📁 src\nTotal context size: 99");

        let parsed = parse_stdout(coloured);
        assert_eq!(parsed.file_tree.as_deref(), Some("📁 src"));
        assert_eq!(parsed.token_count, Some(99));
    }
}
