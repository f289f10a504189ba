//! Get command - fetch one card image

use super::format_bytes;
use crate::cli::args::GetArgs;
use crate::config::Config;
use crate::error::{CardcacheError, CardcacheResult};
use crate::service::ImageService;
use crate::ui::{self, UiContext};
use tokio::fs;

/// Execute the get command
pub async fn execute(args: GetArgs, config: &Config) -> CardcacheResult<()> {
    let ctx = UiContext::detect();
    let service = ImageService::from_config(config).await?;

    let was_cached = service.is_image_cached(&args.card_id).await;
    let result = service.get_image(&args.card_id).await;
    service.flush().await;
    let bytes = result?;

    match args.output {
        Some(path) => {
            fs::write(&path, &bytes)
                .await
                .map_err(|e| CardcacheError::io(format!("writing {}", path.display()), e))?;
            ui::step_ok_detail(
                &ctx,
                &format!("Saved {} ({})", args.card_id, format_bytes(bytes.len() as u64)),
                &path.display().to_string(),
            );
        }
        None => {
            let source = service.source(&args.card_id)?;
            ui::key_value(&ctx, "card", &args.card_id);
            ui::key_value(&ctx, "key", source.key.as_str());
            ui::key_value(&ctx, "size", &format_bytes(bytes.len() as u64));
            ui::key_value(&ctx, "cache", if was_cached { "hit" } else { "downloaded" });
        }
    }

    Ok(())
}
