//! Prompt styling
//!
//! The only prompt cardcache shows guards deleting cached images, so the
//! answers read as "Delete" / "Keep" and a cancelled prompt says the
//! cache was left alone.

use cliclack::{Theme, ThemeState};
use console::Style;

const BAR: &str = "│";
const BAR_END: &str = "└";

const DELETE: &str = "Delete";
const KEEP: &str = "Keep";

/// Warning-coloured theme for destructive cache prompts
#[derive(Debug, Clone, Default)]
pub struct CardcacheTheme;

impl Theme for CardcacheTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().yellow(),
            ThemeState::Error(_) => Style::new().red(),
            ThemeState::Cancel | ThemeState::Submit => Style::new().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Submit => Style::new().green(),
            _ => self.bar_color(state),
        }
    }

    fn format_confirm(&self, state: &ThemeState, confirm: bool) -> String {
        let delete = self.radio_item(state, confirm, DELETE, "");
        let keep = self.radio_item(state, !confirm, KEEP, "");
        let divider = match state {
            ThemeState::Active => self.placeholder_style(state).apply_to(" / ").to_string(),
            _ => String::new(),
        };

        format!(
            "{bar}  {delete}{divider}{keep}\n",
            bar = self.bar_color(state).apply_to(BAR),
        )
    }

    fn format_footer_with_message(&self, state: &ThemeState, message: &str) -> String {
        let line = match state {
            ThemeState::Active => format!("{BAR_END}  {message}"),
            ThemeState::Cancel => format!("{BAR_END}  Cancelled, cache left untouched."),
            ThemeState::Submit => BAR.to_string(),
            ThemeState::Error(err) => format!("{BAR_END}  {err}"),
        };
        // Styling swallows a trailing newline
        format!("{}\n", self.bar_color(state).apply_to(line))
    }
}

/// Install the theme for all later prompts
pub fn init_theme() {
    cliclack::set_theme(CardcacheTheme);
}
