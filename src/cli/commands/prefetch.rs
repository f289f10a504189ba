//! Prefetch command - warm the cache ahead of time

use crate::cache::PrefetchOutcome;
use crate::cli::args::PrefetchArgs;
use crate::config::Config;
use crate::error::{CardcacheError, CardcacheResult};
use crate::service::ImageService;
use crate::ui::{self, PrefetchProgress, UiContext};
use std::collections::HashMap;

/// Execute the prefetch command
pub async fn execute(args: PrefetchArgs, config: &Config) -> CardcacheResult<()> {
    let ctx = UiContext::detect();
    let mut service = ImageService::from_config(config).await?;
    if let Some(concurrency) = args.concurrency {
        service = service.with_prefetch_concurrency(concurrency);
    }

    let ids: Vec<String> = if args.all {
        service.catalog().ids().map(str::to_string).collect()
    } else {
        args.card_ids
    };

    if ids.is_empty() {
        ui::step_warn(&ctx, "Nothing to prefetch");
        return Ok(());
    }

    // Only resolvable ids reach the cache, so only they advance the bar
    let resolved = service.resolve(&ids);
    let labels: HashMap<_, _> = resolved
        .sources
        .iter()
        .map(|(id, source)| (source.key.clone(), *id))
        .collect();

    let progress = PrefetchProgress::new(&ctx, resolved.sources.len() as u64);
    let report = service
        .preload(&ids, |source, outcome| {
            let label = labels
                .get(&source.key)
                .copied()
                .unwrap_or(source.key.as_str());
            let failure = match outcome {
                PrefetchOutcome::Failed(err) => Some(err.to_string()),
                _ => None,
            };
            progress.on_done(label, failure.as_deref());
        })
        .await;
    progress.finish();
    service.flush().await;

    for (id, err) in &resolved.unresolved {
        ui::step_error_detail(&ctx, &format!("Skipped {}", id), &err.to_string());
    }

    ui::step_ok(
        &ctx,
        &format!(
            "{} downloaded, {} already cached, {} failed",
            report.fetched,
            report.cached,
            report.failed.len() + report.unresolved.len()
        ),
    );

    if report.is_success() {
        Ok(())
    } else {
        Err(CardcacheError::User(format!(
            "{} of {} image(s) could not be prefetched",
            report.failed.len() + report.unresolved.len(),
            report.total()
        )))
    }
}
