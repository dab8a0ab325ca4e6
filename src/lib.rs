pub mod config;
pub mod error;
pub mod extract;
pub mod identity;
pub mod model;
pub mod providers;
pub mod rate_limit;
pub mod render;
pub mod text_mode;

mod retry;

pub use config::{AiConfig, ParserConfig, RenderConfig, RetryConfig};
pub use error::ParseError;
pub use model::{
    ImageCandidate, ImageRole, Ingredient, NutritionInfo, PageMetadata, ParseOutcome,
    ParsedRecipe, SiteRuleSummary, TextParseOutcome, UrlValidation,
};
pub use providers::{LlmProvider, OpenAiProvider};
pub use render::{PageRenderer, RenderedPage, RenderingEngine};
pub use text_mode::{ContextHint, TextModeExtractor};

use std::sync::Arc;

use crate::extract::{rule_for_domain, rule_summaries};
use crate::rate_limit::{origin_of, OriginRateLimiter};

/// Entry point for recipe extraction. One parser owns one browser engine
/// and one rate limiter, so clone-free sharing across tasks goes through
/// an `Arc<RecipeParser>`.
///
/// # Example
/// ```
/// use ladle::RecipeParser;
///
/// let parser = RecipeParser::with_defaults();
/// let verdict = parser.validate_url("https://www.budgetbytes.com/baked-ziti/");
/// assert!(verdict.valid);
/// assert!(verdict.supported);
/// ```
pub struct RecipeParser {
    config: ParserConfig,
    renderer: Arc<dyn PageRenderer>,
    limiter: OriginRateLimiter,
}

impl RecipeParser {
    pub fn new(config: ParserConfig) -> Self {
        let renderer = Arc::new(RenderingEngine::new(config.render.clone()));
        RecipeParser {
            config,
            renderer,
            limiter: OriginRateLimiter::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ParserConfig::default())
    }

    /// Build from `ladle.toml` plus `LADLE__*` environment overrides.
    pub fn from_env() -> Result<Self, ParseError> {
        Ok(Self::new(ParserConfig::load()?))
    }

    /// Swap in a custom rendering engine. Used by tests and by callers
    /// that already run their own browser pool.
    pub fn with_renderer(config: ParserConfig, renderer: Arc<dyn PageRenderer>) -> Self {
        RecipeParser {
            config,
            renderer,
            limiter: OriginRateLimiter::new(),
        }
    }

    /// Fetch, render and extract a recipe from a URL.
    ///
    /// `max_attempts` overrides the configured retry budget for this call
    /// only. The returned outcome never panics a caller: failures come
    /// back as `success == false` with a human-readable error.
    pub async fn parse_from_url(&self, url: &str, max_attempts: Option<u32>) -> ParseOutcome {
        retry::parse_with_retries(
            &*self.renderer,
            &self.limiter,
            &self.config.retry,
            url,
            max_attempts,
        )
        .await
    }

    /// Extract a recipe from pasted text (captions, notes, transcripts)
    /// using the configured language model.
    pub async fn parse_from_text(
        &self,
        text: &str,
        context_hint: Option<ContextHint>,
        source_url: Option<&str>,
    ) -> TextParseOutcome {
        let provider = match OpenAiProvider::new(&self.config.ai) {
            Ok(provider) => provider,
            Err(e) => {
                return TextParseOutcome {
                    outcome: ParseOutcome::failure(e.to_string()),
                    confidence: 0,
                }
            }
        };
        TextModeExtractor::new(provider)
            .extract(text, context_hint, source_url)
            .await
    }

    /// Cheap single-URL verdict without rendering anything.
    pub fn validate_url(&self, url: &str) -> UrlValidation {
        match origin_of(url) {
            Ok(domain) => UrlValidation {
                valid: true,
                supported: rule_for_domain(&domain).is_some(),
                domain: Some(domain),
            },
            Err(_) => UrlValidation {
                valid: false,
                supported: false,
                domain: None,
            },
        }
    }

    /// Domains covered by a dedicated site rule. Everything else still
    /// goes through the structured-data and generic strategies.
    pub fn supported_domains(&self) -> Vec<SiteRuleSummary> {
        rule_summaries()
    }

    /// Verify the rendering engine can start (launches the browser if it
    /// is not already running).
    pub async fn health_check(&self) -> Result<(), ParseError> {
        self.renderer.ensure_ready().await
    }

    /// Close the shared browser. In-flight fetches keep their pages; the
    /// engine relaunches lazily on the next parse.
    pub async fn shutdown(&self) {
        self.renderer.shutdown().await
    }
}
