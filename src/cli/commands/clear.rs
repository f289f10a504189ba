//! Clear command - delete every cached image

use super::format_bytes;
use crate::cli::args::ClearArgs;
use crate::config::Config;
use crate::error::CardcacheResult;
use crate::service::open_cache;
use crate::ui::{self, UiContext};

/// Execute the clear command
pub async fn execute(args: ClearArgs, config: &Config) -> CardcacheResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let cache = open_cache(config).await?;
    let info = cache.info().await;

    if info.entry_count == 0 {
        println!("Image cache is already empty.");
        return Ok(());
    }

    let prompt = format!(
        "Delete {} cached image(s) ({})?",
        info.entry_count,
        format_bytes(info.total_bytes)
    );
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::remark(&ctx, "Aborted. Pass --yes to clear without prompting.");
        return Ok(());
    }

    let removed = cache.clear().await?;
    ui::step_ok(&ctx, &format!("Cleared {} image(s)", removed));

    Ok(())
}
