//! Terminal output helpers
//!
//! Interactive terminals get `cliclack` prompts and `indicatif` progress
//! bars; pipes and CI fall back to plain line output.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    key_value, remark, section, step_error_detail, step_ok, step_ok_detail, step_warn,
    step_warn_hint,
};
pub use progress::PrefetchProgress;
pub use prompts::confirm;
pub use theme::{init_theme, CardcacheTheme};
