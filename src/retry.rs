use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;

use crate::config::RetryConfig;
use crate::error::ParseError;
use crate::extract::extract_document;
use crate::model::{ImageCandidate, PageMetadata, ParseOutcome, ParsedRecipe};
use crate::rate_limit::{origin_of, OriginRateLimiter};
use crate::render::PageRenderer;

/// Drives one URL through admit-render-extract with exponential backoff.
/// Fatal failures abort immediately; transient ones are retried until the
/// attempt budget runs out.
pub(crate) async fn parse_with_retries<R>(
    renderer: &R,
    limiter: &OriginRateLimiter,
    retry: &RetryConfig,
    url: &str,
    max_attempts: Option<u32>,
) -> ParseOutcome
where
    R: PageRenderer + ?Sized,
{
    let origin = match origin_of(url) {
        Ok(origin) => origin,
        Err(e) => return ParseOutcome::failure(e.to_string()),
    };
    let max_attempts = max_attempts.unwrap_or(retry.max_attempts).max(1);
    let mut last_error: Option<ParseError> = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let delay = backoff_delay(retry, attempt);
            debug!(
                "retrying {url} in {}ms (attempt {attempt}/{max_attempts})",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        match attempt_once(renderer, limiter, &origin, url).await {
            Ok((recipe, images, metadata)) => {
                info!("parsed \"{}\" from {url} on attempt {attempt}", recipe.name);
                return ParseOutcome::success(recipe, images, metadata);
            }
            Err(e) if !e.is_retryable() => {
                warn!("{url}: {e} (fatal, not retrying)");
                return ParseOutcome::failure(e.to_string());
            }
            Err(e) => {
                warn!("attempt {attempt}/{max_attempts} for {url} failed: {e}");
                last_error = Some(e);
            }
        }
    }

    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    ParseOutcome::failure(format!(
        "failed after {max_attempts} attempt{}: {reason}",
        if max_attempts == 1 { "" } else { "s" }
    ))
}

async fn attempt_once<R>(
    renderer: &R,
    limiter: &OriginRateLimiter,
    origin: &str,
    url: &str,
) -> Result<(ParsedRecipe, Vec<ImageCandidate>, PageMetadata), ParseError>
where
    R: PageRenderer + ?Sized,
{
    // The origin slot is held for the fetch only; extraction and backoff
    // run with the slot released.
    let rendered = {
        let _slot = limiter.admit(origin).await;
        renderer.render(url).await?
    };

    let document = extract_document(&rendered.html, &rendered.final_url);
    match document.recipe {
        Some(recipe) => Ok((recipe, document.images, document.metadata)),
        None => Err(ParseError::ExtractionEmpty),
    }
}

/// Delay before `attempt` (>= 2): base doubled per prior failure, plus a
/// random smear up to jitter_ms so synchronized clients spread out.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(2).min(10);
    let base = retry.backoff_base_ms.saturating_mul(1u64 << exponent);
    let jitter = if retry.jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=retry.jitter_ms)
    } else {
        0
    };
    Duration::from_millis(base.saturating_add(jitter))
}
