//! Console output for the CLI
//!
//! Decorated output (colour, spinners) on an interactive terminal, plain
//! `[OK]`/`[WARN]` lines everywhere else.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{block, key_value, section, step_info, step_ok, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
