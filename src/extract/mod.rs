use log::debug;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::model::{ImageCandidate, PageMetadata, ParsedRecipe};

pub mod generic;
pub mod images;
pub mod json_ld;
pub mod microdata;
pub mod site_rules;

pub use site_rules::{rule_for_domain, rule_summaries, SiteRule};

/// One rendered page, ready for extraction.
pub struct ExtractionContext {
    /// Final (post-redirect) URL of the document.
    pub url: String,
    pub document: Html,
}

impl ExtractionContext {
    pub fn new(html: &str, url: impl Into<String>) -> Self {
        ExtractionContext {
            url: url.into(),
            document: Html::parse_document(html),
        }
    }
}

/// One rung of the extraction cascade. Implementations never panic past
/// their boundary and never return an invalid recipe on purpose; `None`
/// means "nothing usable here, try the next strategy".
pub trait ExtractStrategy {
    fn name(&self) -> &'static str;
    fn extract(&self, context: &ExtractionContext) -> Option<ParsedRecipe>;
}

/// Everything one rendering+extraction cycle produces.
pub struct ExtractedDocument {
    pub recipe: Option<ParsedRecipe>,
    pub images: Vec<ImageCandidate>,
    pub metadata: PageMetadata,
}

fn strategies() -> Vec<Box<dyn ExtractStrategy>> {
    vec![
        Box::new(json_ld::JsonLdStrategy),
        Box::new(microdata::MicrodataStrategy),
        Box::new(site_rules::SiteRuleStrategy),
        Box::new(generic::GenericStrategy),
    ]
}

/// Runs the cascade plus image and metadata extraction over one rendered
/// page. Synchronous on purpose: the parsed document never crosses an
/// await point.
pub fn extract_document(html: &str, final_url: &str) -> ExtractedDocument {
    let context = ExtractionContext::new(html, final_url);
    let recipe = run_cascade(&context);
    let images = images::extract_candidates(&context);
    let metadata = extract_page_metadata(&context);
    ExtractedDocument {
        recipe,
        images,
        metadata,
    }
}

/// Fixed priority order, first valid result wins. Strategies that return
/// something below the validity gate are treated the same as strategies
/// that return nothing.
pub fn run_cascade(context: &ExtractionContext) -> Option<ParsedRecipe> {
    for strategy in strategies() {
        debug!("cascade: trying {}", strategy.name());
        match strategy.extract(context) {
            Some(recipe) if recipe.is_valid() => {
                debug!("cascade: {} produced a valid recipe", strategy.name());
                let mut recipe = recipe;
                recipe.source_url = context.url.clone();
                return Some(recipe);
            }
            Some(_) => {
                debug!("cascade: {} result failed the validity gate", strategy.name());
            }
            None => {}
        }
    }
    debug!("cascade: no strategy produced a valid recipe");
    None
}

/// Flattened, whitespace-trimmed text content of an element.
pub(crate) fn element_text(el: ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_page_metadata(context: &ExtractionContext) -> PageMetadata {
    let document = &context.document;

    let title_selector = Selector::parse("title").unwrap();
    let title = document
        .select(&title_selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| meta_content(document, "meta[property='og:title']"));

    let description = meta_content(document, "meta[name='description']")
        .or_else(|| meta_content(document, "meta[property='og:description']"));

    let base = Url::parse(&context.url).ok();
    let site_name = meta_content(document, "meta[property='og:site_name']").or_else(|| {
        base.as_ref()
            .and_then(|u| u.host_str())
            .map(|h| h.to_string())
    });

    let icon_selector =
        Selector::parse("link[rel='icon'], link[rel='shortcut icon'], link[rel='apple-touch-icon']")
            .unwrap();
    let favicon = document
        .select(&icon_selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .or(Some("/favicon.ico"))
        .and_then(|href| base.as_ref().and_then(|b| b.join(href).ok()))
        .map(|u| u.to_string());

    PageMetadata {
        title,
        description,
        site_name,
        favicon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_metadata_prefers_document_tags() {
        let html = r#"
            <html><head>
                <title>Best Lasagna Ever</title>
                <meta name="description" content="Layers of pasta and cheese">
                <meta property="og:site_name" content="The Pasta Blog">
                <link rel="icon" href="/assets/favicon.png">
            </head><body></body></html>
        "#;
        let context = ExtractionContext::new(html, "https://pasta.blog/lasagna");
        let meta = extract_page_metadata(&context);
        assert_eq!(meta.title.as_deref(), Some("Best Lasagna Ever"));
        assert_eq!(meta.description.as_deref(), Some("Layers of pasta and cheese"));
        assert_eq!(meta.site_name.as_deref(), Some("The Pasta Blog"));
        assert_eq!(
            meta.favicon.as_deref(),
            Some("https://pasta.blog/assets/favicon.png")
        );
    }

    #[test]
    fn test_page_metadata_falls_back_to_host_and_default_icon() {
        let html = "<html><head></head><body></body></html>";
        let context = ExtractionContext::new(html, "https://example.com/recipe");
        let meta = extract_page_metadata(&context);
        assert!(meta.title.is_none());
        assert_eq!(meta.site_name.as_deref(), Some("example.com"));
        assert_eq!(meta.favicon.as_deref(), Some("https://example.com/favicon.ico"));
    }
}
