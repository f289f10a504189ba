//! Progress bar for prefetch runs, with CI fallback

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Counts finished prefetch requests.
///
/// Draws an indicatif bar in interactive mode; in CI only failures are
/// printed, one per line.
pub struct PrefetchProgress {
    bar: Option<ProgressBar>,
}

impl PrefetchProgress {
    pub fn new(ctx: &UiContext, total: u64) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(total);
            if let Ok(bar_style) = ProgressStyle::default_bar().template(
                "  {spinner:.cyan} Prefetching  {bar:24.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}",
            ) {
                bar.set_style(
                    bar_style
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .progress_chars("━╸─"),
                );
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Prefetching {} image(s)...", total);
            None
        };
        Self { bar }
    }

    /// Record one finished request
    pub fn on_done(&self, label: &str, failure: Option<&str>) {
        match (&self.bar, failure) {
            (Some(bar), None) => {
                bar.set_message(label.to_string());
                bar.inc(1);
            }
            (Some(bar), Some(reason)) => {
                bar.println(format!("  {} {}: {}", style("✗").red(), label, reason));
                bar.inc(1);
            }
            (None, Some(reason)) => {
                println!("  {} {}: {}", style("[FAIL]").red(), label, reason);
            }
            (None, None) => {}
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}
