//! Terminal detection for CLI output

use std::io::IsTerminal;

/// CI systems that set a marker variable but still allocate a TTY
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "BUILDKITE",
    "JENKINS_URL",
];

/// Decides between decorated and plain output
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    interactive: bool,
}

impl UiContext {
    /// Decorate only on a TTY outside CI
    pub fn detect() -> Self {
        let interactive = std::io::stderr().is_terminal()
            && std::io::stdout().is_terminal()
            && !CI_VARS.iter().any(|var| std::env::var_os(var).is_some());
        Self { interactive }
    }

    pub fn non_interactive() -> Self {
        Self { interactive: false }
    }

    /// Spinners and colour
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_is_plain() {
        assert!(!UiContext::non_interactive().use_fancy_output());
    }
}
