//! Info command - show cache usage

use super::format_bytes;
use crate::cache::CacheInfo;
use crate::cli::args::{InfoArgs, OutputFormat};
use crate::config::Config;
use crate::error::CardcacheResult;
use crate::service::inspect_cache;
use crate::ui::{self, UiContext};
use serde::Serialize;

#[derive(Serialize)]
struct InfoJson<'a> {
    #[serde(flatten)]
    info: &'a CacheInfo,
    usage_percent: f64,
    auto_download: bool,
}

/// Execute the info command
pub async fn execute(args: InfoArgs, config: &Config) -> CardcacheResult<()> {
    let info = inspect_cache(config).await?;

    match args.format {
        OutputFormat::Table => print_info_table(&info, config),
        OutputFormat::Json => {
            let json = InfoJson {
                info: &info,
                usage_percent: usage_percent(&info),
                auto_download: config.images.auto_download,
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}

fn print_info_table(info: &CacheInfo, config: &Config) {
    let ctx = UiContext::detect();

    ui::section(&ctx, "Image cache");
    ui::key_value(&ctx, "location", &info.root.display().to_string());
    ui::key_value(&ctx, "images", &info.entry_count.to_string());
    ui::key_value(
        &ctx,
        "used",
        &format!(
            "{} of {} ({:.1}%)",
            format_bytes(info.total_bytes),
            format_bytes(info.budget_bytes),
            usage_percent(info)
        ),
    );
    ui::key_value(&ctx, "auto download", &config.images.auto_download.to_string());
    ui::key_value(&ctx, "quality", config.images.image_quality.variant());
}

fn usage_percent(info: &CacheInfo) -> f64 {
    if info.budget_bytes == 0 {
        return 0.0;
    }
    info.total_bytes as f64 * 100.0 / info.budget_bytes as f64
}
