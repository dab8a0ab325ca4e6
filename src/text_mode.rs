use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;
use crate::extract::json_ld::parse_leading_count;
use crate::model::{Ingredient, PageMetadata, ParseOutcome, ParsedRecipe, TextParseOutcome};
use crate::providers::LlmProvider;
use crate::rate_limit::{domain_matches, origin_of};

/// Upper bound on pasted text, in characters.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// How the pasted text should be read. Social captions need different
/// handling: hashtag noise, emoji, and steps compressed into one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextHint {
    SocialMedia,
    General,
}

impl std::str::FromStr for ContextHint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "social_media" | "social-media" | "social" => Ok(ContextHint::SocialMedia),
            "general" | "text" => Ok(ContextHint::General),
            other => Err(ParseError::Validation(format!(
                "unknown context hint \"{other}\" (expected social_media or general)"
            ))),
        }
    }
}

const SOCIAL_HOSTS: &[&str] = &[
    "instagram.com",
    "tiktok.com",
    "facebook.com",
    "twitter.com",
    "x.com",
    "pinterest.com",
    "youtube.com",
    "youtu.be",
];

const SCHEMA_PROMPT: &str = r#"Extract the recipe from the user's text.
Respond with a single JSON object and nothing else, using exactly these keys:
{
  "name": string,
  "ingredients": [string, ...],
  "instructions": [string, ...],
  "prep_time": string or null,
  "cook_time": string or null,
  "total_time": string or null,
  "servings": integer or null,
  "cuisine": string or null,
  "category": string or null,
  "author": string or null,
  "description": string or null
}
Use null for anything the text does not state. Never invent ingredients or steps."#;

fn prompt_for(hint: ContextHint) -> String {
    match hint {
        ContextHint::SocialMedia => format!(
            "You are reading a social media caption. Ignore hashtags, emoji, \
             follower calls to action and giveaway text.\n{SCHEMA_PROMPT}"
        ),
        ContextHint::General => format!(
            "You are reading free-form text pasted by a user, such as a note, \
             an email or a transcription.\n{SCHEMA_PROMPT}"
        ),
    }
}

/// Recipe extraction from pasted text via a language model. No rendering,
/// no rate limiting; the only external call is the completion request.
pub struct TextModeExtractor<P> {
    provider: P,
}

impl<P: LlmProvider> TextModeExtractor<P> {
    pub fn new(provider: P) -> Self {
        TextModeExtractor { provider }
    }

    pub async fn extract(
        &self,
        text: &str,
        hint: Option<ContextHint>,
        source_url: Option<&str>,
    ) -> TextParseOutcome {
        if let Err(e) = validate_text(text) {
            return failure(e.to_string());
        }

        // Captions often carry their own link when the caller passed none.
        let source_url = source_url.or_else(|| first_url_in(text));
        let hint = hint.unwrap_or_else(|| detect_hint(text, source_url));
        debug!(
            "text-mode: {} chars, hint {hint:?}, provider {}",
            text.chars().count(),
            self.provider.provider_name()
        );

        let raw = match self.provider.complete(&prompt_for(hint), text).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("text-mode: completion failed: {e}");
                return failure(e.to_string());
            }
        };

        let mut recipe = match recipe_from_llm_json(&raw) {
            Ok(recipe) => recipe,
            Err(e) => {
                warn!("text-mode: {e}");
                return failure(e.to_string());
            }
        };

        if !recipe.is_valid() {
            return failure(ParseError::ExtractionEmpty.to_string());
        }

        recipe.source_url = source_url.unwrap_or_default().to_string();
        let confidence = confidence_for(&recipe);
        info!(
            "text-mode: extracted \"{}\" with confidence {confidence}",
            recipe.name
        );
        TextParseOutcome {
            outcome: ParseOutcome::success(recipe, Vec::new(), PageMetadata::default()),
            confidence,
        }
    }
}

fn failure(error: String) -> TextParseOutcome {
    TextParseOutcome {
        outcome: ParseOutcome::failure(error),
        confidence: 0,
    }
}

fn validate_text(text: &str) -> Result<(), ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Validation("text input is empty".into()));
    }
    let chars = text.chars().count();
    if chars > MAX_TEXT_CHARS {
        return Err(ParseError::Validation(format!(
            "text input is {chars} characters; the limit is {MAX_TEXT_CHARS}"
        )));
    }
    Ok(())
}

/// First absolute URL in the text, trailing punctuation stripped.
fn first_url_in(text: &str) -> Option<&str> {
    let start = match (text.find("http://"), text.find("https://")) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    let tail = &text[start..];
    let end = tail
        .find(|c: char| c.is_whitespace() || c == ')' || c == '"' || c == '>')
        .unwrap_or(tail.len());
    let url = tail[..end].trim_end_matches(['.', ',', ';', '!', '?']);
    if url.len() > "https://".len() {
        Some(url)
    } else {
        None
    }
}

/// Hint inference when the caller gave none: a social host in the source
/// URL, or caption markers in the text itself.
fn detect_hint(text: &str, source_url: Option<&str>) -> ContextHint {
    if let Some(url) = source_url {
        if let Ok(origin) = origin_of(url) {
            if SOCIAL_HOSTS.iter().any(|host| domain_matches(&origin, host)) {
                return ContextHint::SocialMedia;
            }
        }
    }
    if text.matches('#').count() >= 3 || text.to_ascii_lowercase().contains("link in bio") {
        return ContextHint::SocialMedia;
    }
    ContextHint::General
}

#[derive(Debug, Deserialize)]
struct LlmRecipe {
    #[serde(default)]
    name: String,
    #[serde(default)]
    ingredients: Vec<String>,
    #[serde(default)]
    instructions: LlmInstructions,
    prep_time: Option<String>,
    cook_time: Option<String>,
    total_time: Option<String>,
    servings: Option<LlmServings>,
    cuisine: Option<String>,
    category: Option<String>,
    author: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LlmInstructions {
    Steps(Vec<String>),
    Blob(String),
}

impl Default for LlmInstructions {
    fn default() -> Self {
        LlmInstructions::Steps(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LlmServings {
    Number(u32),
    Text(String),
}

fn recipe_from_llm_json(raw: &str) -> Result<ParsedRecipe, ParseError> {
    let cleaned = strip_code_fence(raw);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| ParseError::LlmError(format!("model returned invalid JSON: {e}")))?;
    let llm: LlmRecipe = serde_json::from_value(value)
        .map_err(|e| ParseError::LlmError(format!("model JSON had the wrong shape: {e}")))?;

    let instructions = match llm.instructions {
        LlmInstructions::Steps(steps) => steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        LlmInstructions::Blob(blob) => blob.trim().to_string(),
    };

    Ok(ParsedRecipe {
        name: llm.name.trim().to_string(),
        ingredients: llm
            .ingredients
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .map(Ingredient::named)
            .collect(),
        instructions,
        prep_time: llm.prep_time.filter(|t| !t.trim().is_empty()),
        cook_time: llm.cook_time.filter(|t| !t.trim().is_empty()),
        total_time: llm.total_time.filter(|t| !t.trim().is_empty()),
        servings: llm.servings.and_then(|s| match s {
            LlmServings::Number(n) if n > 0 => Some(n),
            LlmServings::Number(_) => None,
            LlmServings::Text(t) => parse_leading_count(&t),
        }),
        cuisine: llm.cuisine.filter(|v| !v.trim().is_empty()),
        category: llm.category.filter(|v| !v.trim().is_empty()),
        author: llm.author.filter(|v| !v.trim().is_empty()),
        description: llm.description.filter(|v| !v.trim().is_empty()),
        nutrition: None,
        source_url: String::new(),
        images: Vec::new(),
    })
}

/// Models occasionally wrap their JSON in a markdown fence despite being
/// told not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let opened = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    opened.strip_suffix("```").unwrap_or(opened).trim()
}

/// Field-completeness confidence on a 0..=100 scale. The gate fields carry
/// most of the weight; optional metadata tops it up.
fn confidence_for(recipe: &ParsedRecipe) -> u8 {
    let mut score: u32 = 0;
    if !recipe.name.trim().is_empty() {
        score += 25;
    }
    if !recipe.ingredients.is_empty() {
        score += 25;
    }
    if recipe.ingredients.len() >= 3 {
        score += 10;
    }
    if !recipe.instructions.trim().is_empty() {
        score += 20;
    }
    if recipe.prep_time.is_some() || recipe.cook_time.is_some() || recipe.total_time.is_some() {
        score += 10;
    }
    if recipe.servings.is_some() {
        score += 5;
    }
    if recipe.description.is_some() || recipe.category.is_some() || recipe.cuisine.is_some() {
        score += 5;
    }
    score.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedProvider {
        response: Result<String, String>,
    }

    impl CannedProvider {
        fn json(body: &str) -> Self {
            CannedProvider {
                response: Ok(body.to_string()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn provider_name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String, ParseError> {
            self.response
                .clone()
                .map_err(ParseError::LlmError)
        }
    }

    const FULL_RESPONSE: &str = r#"{
        "name": "Overnight Oats",
        "ingredients": ["1 cup oats", "1 cup milk", "1 tbsp honey"],
        "instructions": ["Combine everything", "Refrigerate overnight"],
        "prep_time": "5 minutes",
        "cook_time": null,
        "total_time": null,
        "servings": 2,
        "cuisine": null,
        "category": "Breakfast",
        "author": null,
        "description": "No-cook breakfast."
    }"#;

    #[test]
    fn test_length_limit_boundary() {
        assert!(validate_text(&"a".repeat(10_000)).is_ok());
        assert!(validate_text(&"a".repeat(10_001)).is_err());
        assert!(validate_text("   ").is_err());
    }

    #[test]
    fn test_hint_detection() {
        assert_eq!(
            detect_hint("pasta recipe", Some("https://www.instagram.com/p/abc/")),
            ContextHint::SocialMedia
        );
        assert_eq!(
            detect_hint("#foodie #yum #recipe great pasta", None),
            ContextHint::SocialMedia
        );
        assert_eq!(
            detect_hint("Full recipe below, link in bio!", None),
            ContextHint::SocialMedia
        );
        assert_eq!(
            detect_hint("Boil pasta. Add sauce.", Some("https://example.com/notes")),
            ContextHint::General
        );
    }

    #[test]
    fn test_first_url_in_text() {
        assert_eq!(
            first_url_in("full recipe at https://example.com/pasta. enjoy!"),
            Some("https://example.com/pasta")
        );
        assert_eq!(
            first_url_in("(see https://blog.example/post)"),
            Some("https://blog.example/post")
        );
        assert_eq!(first_url_in("no links here"), None);
    }

    #[tokio::test]
    async fn test_url_embedded_in_text_becomes_source() {
        let extractor = TextModeExtractor::new(CannedProvider::json(FULL_RESPONSE));
        let outcome = extractor
            .extract(
                "oats!! saved from https://www.instagram.com/p/xyz/ last week",
                None,
                None,
            )
            .await;
        let recipe = outcome.outcome.recipe.unwrap();
        assert_eq!(recipe.source_url, "https://www.instagram.com/p/xyz/");
    }

    #[test]
    fn test_hint_parses_from_str() {
        assert_eq!(
            "social_media".parse::<ContextHint>().unwrap(),
            ContextHint::SocialMedia
        );
        assert_eq!("general".parse::<ContextHint>().unwrap(), ContextHint::General);
        assert!("whatever".parse::<ContextHint>().is_err());
    }

    #[test]
    fn test_code_fence_stripping() {
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn test_llm_json_conversion() {
        let recipe = recipe_from_llm_json(FULL_RESPONSE).unwrap();
        assert_eq!(recipe.name, "Overnight Oats");
        assert_eq!(recipe.ingredients.len(), 3);
        assert_eq!(
            recipe.instructions,
            "Combine everything\n\nRefrigerate overnight"
        );
        assert_eq!(recipe.servings, Some(2));
        assert_eq!(recipe.category.as_deref(), Some("Breakfast"));
        assert!(recipe.cook_time.is_none());
    }

    #[test]
    fn test_llm_json_accepts_string_instructions_and_servings() {
        let recipe = recipe_from_llm_json(
            r#"{"name": "Toast", "ingredients": ["bread"], "instructions": "Toast the bread.", "servings": "4 slices"}"#,
        )
        .unwrap();
        assert_eq!(recipe.instructions, "Toast the bread.");
        assert_eq!(recipe.servings, Some(4));
    }

    #[test]
    fn test_invalid_llm_json_is_an_error() {
        assert!(recipe_from_llm_json("definitely not json").is_err());
    }

    #[test]
    fn test_confidence_rewards_completeness() {
        let full = recipe_from_llm_json(FULL_RESPONSE).unwrap();
        let sparse = recipe_from_llm_json(
            r#"{"name": "Mystery", "ingredients": ["thing"], "instructions": []}"#,
        )
        .unwrap();
        assert!(confidence_for(&full) > confidence_for(&sparse));
        assert_eq!(confidence_for(&full), 100);
        assert_eq!(confidence_for(&sparse), 50);
    }

    #[tokio::test]
    async fn test_extract_end_to_end_with_canned_provider() {
        let extractor = TextModeExtractor::new(CannedProvider::json(FULL_RESPONSE));
        let caption = "homemade overnight oats!! #mealprep #breakfast #oats";
        let outcome = extractor
            .extract(caption, None, Some("https://www.instagram.com/p/xyz/"))
            .await;

        assert!(outcome.outcome.success);
        let recipe = outcome.outcome.recipe.unwrap();
        assert_eq!(recipe.name, "Overnight Oats");
        assert_eq!(recipe.source_url, "https://www.instagram.com/p/xyz/");
        assert_eq!(outcome.confidence, 100);
    }

    #[tokio::test]
    async fn test_oversized_text_rejected_before_any_completion() {
        struct PanickingProvider;
        #[async_trait]
        impl LlmProvider for PanickingProvider {
            fn provider_name(&self) -> &str {
                "panicking"
            }
            async fn complete(&self, _s: &str, _u: &str) -> Result<String, ParseError> {
                panic!("completion must not be called for oversized input");
            }
        }

        let extractor = TextModeExtractor::new(PanickingProvider);
        let outcome = extractor.extract(&"a".repeat(10_001), None, None).await;
        assert!(!outcome.outcome.success);
        assert!(outcome.outcome.error.unwrap().contains("10001"));
        assert_eq!(outcome.confidence, 0);
    }

    #[tokio::test]
    async fn test_invalid_model_output_fails_gate() {
        let extractor = TextModeExtractor::new(CannedProvider::json(
            r#"{"name": "", "ingredients": [], "instructions": []}"#,
        ));
        let outcome = extractor.extract("some text about food", None, None).await;
        assert!(!outcome.outcome.success);
        assert_eq!(outcome.confidence, 0);
    }
}
