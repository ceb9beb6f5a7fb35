//! Terminal output for the CLI
//!
//! Styled with `console` when attached to a terminal, with plain
//! `[OK]`/`[WARN]` prefixes in CI and when piped.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, key_value, remark, step_info, step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::BuildProgress;
