//! Turning caller input into an argument vector
//!
//! Two entry points produce a [`CommandSpec`]:
//!
//! - [`CommandSpec::from_options`]: structured options mapped onto known
//!   flags. Preferred, nothing free-form reaches the tool.
//! - [`CommandSpec::from_raw`]: a free-text command line. Shell
//!   metacharacters are stripped, the rest is split on whitespace with
//!   quotes honoured. The result is exec'd directly, never through a shell.

use crate::error::{RepoCacheError, RepoCacheResult};
use std::path::Path;

/// Characters removed from free-text commands
pub const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '(', ')', '<', '>', '\n', '\r'];

/// Strip shell metacharacters from a raw command line.
///
/// This is a denylist and not a parser. It only matters because the
/// command used to reach a shell; arguments are exec'd directly now.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !SHELL_METACHARACTERS.contains(c) && *c != '\0')
        .collect()
}

/// Split a command line into words. Single and double quotes group words
/// and are removed; there are no escapes.
pub fn tokenize(line: &str) -> RepoCacheResult<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(RepoCacheError::InvalidCommand(format!(
            "unterminated {} quote",
            q
        )));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Structured analysis options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisOptions {
    /// Token budget for the generated context (`-m`)
    pub max_tokens: Option<u64>,
    /// Glob patterns to include (`-i`)
    pub includes: Vec<String>,
    /// Glob patterns to exclude (`-e`)
    pub excludes: Vec<String>,
}

impl AnalysisOptions {
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn validate(&self) -> RepoCacheResult<()> {
        if self.max_tokens == Some(0) {
            return Err(RepoCacheError::InvalidCommand(
                "max tokens must be a positive number".to_string(),
            ));
        }

        for pattern in self.includes.iter().chain(&self.excludes) {
            let trimmed = pattern.trim();
            if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.contains(',') {
                return Err(RepoCacheError::InvalidCommand(format!(
                    "invalid pattern '{}'",
                    pattern
                )));
            }
            if trimmed.contains(|c: char| c.is_control()) {
                return Err(RepoCacheError::InvalidCommand(
                    "patterns cannot contain control characters".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Arguments for one analysis run, without the tool or its fixed flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    args: Vec<String>,
}

impl CommandSpec {
    /// Build from a free-text command. A leading `tool` word is dropped, so
    /// `"ccontext -m 5000"` and `"-m 5000"` are the same command.
    pub fn from_raw(raw: &str, tool: &str) -> RepoCacheResult<Self> {
        let mut args = tokenize(&sanitize(raw))?;

        if args.first().is_some_and(|first| is_tool(first, tool)) {
            args.remove(0);
        }

        Ok(Self { args })
    }

    pub fn from_options(options: &AnalysisOptions) -> RepoCacheResult<Self> {
        options.validate()?;

        let mut args = Vec::new();
        if let Some(max_tokens) = options.max_tokens {
            args.push("-m".to_string());
            args.push(max_tokens.to_string());
        }
        if !options.includes.is_empty() {
            args.push("-i".to_string());
            args.push(join_patterns(&options.includes));
        }
        if !options.excludes.is_empty() {
            args.push("-e".to_string());
            args.push(join_patterns(&options.excludes));
        }

        Ok(Self { args })
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Caller arguments followed by any `fixed_args` not already present
    pub fn argv(&self, fixed_args: &[String]) -> Vec<String> {
        let mut argv = self.args.clone();
        for arg in fixed_args {
            if !argv.contains(arg) {
                argv.push(arg.clone());
            }
        }
        argv
    }

    /// Printable form for logs and audit entries
    pub fn display(&self, tool: &str, fixed_args: &[String]) -> String {
        std::iter::once(tool.to_string())
            .chain(self.argv(fixed_args))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn is_tool(word: &str, tool: &str) -> bool {
    let name = |s: &str| {
        Path::new(s)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
    };
    word == tool || (name(word).is_some() && name(word) == name(tool))
}

fn join_patterns(patterns: &[String]) -> String {
    patterns
        .iter()
        .map(|p| p.trim())
        .collect::<Vec<_>>()
        .join(",")
}
