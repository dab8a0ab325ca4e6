use serde::{Deserialize, Serialize};

/// A recipe extracted from a web page or pasted text.
///
/// Every extraction strategy produces this shape. A recipe is only treated
/// as a usable result when [`ParsedRecipe::is_valid`] holds; anything less
/// is a failed attempt, never a partial success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedRecipe {
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    /// Steps joined by blank lines into a single blob.
    #[serde(default)]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cuisine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionInfo>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl ParsedRecipe {
    /// The universal acceptance gate: a name and at least one ingredient.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && !self.ingredients.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub notes: String,
}

impl Ingredient {
    /// Name-only ingredient, as produced by structured-data extraction
    /// (quantity/unit decomposition happens downstream, not here).
    pub fn named(name: impl Into<String>) -> Self {
        Ingredient {
            name: name.into(),
            ..Ingredient::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NutritionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protein: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sodium: Option<String>,
}

/// Where an image sits in the page relative to the recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRole {
    Hero,
    Step,
    Ingredient,
    Gallery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageCandidate {
    /// Absolute URL, resolved against the final page URL.
    pub url: String,
    pub role: ImageRole,
    #[serde(default)]
    pub alt: String,
    /// Heuristic quality, clamped to 0..=100.
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

/// Final result of a parse, after the retry budget has been spent or a
/// valid recipe was produced.
#[derive(Debug, Clone, Serialize)]
pub struct ParseOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<ParsedRecipe>,
    pub images: Vec<ImageCandidate>,
    pub metadata: PageMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ParseOutcome {
    pub fn success(recipe: ParsedRecipe, images: Vec<ImageCandidate>, metadata: PageMetadata) -> Self {
        ParseOutcome {
            success: true,
            recipe: Some(recipe),
            images,
            metadata,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ParseOutcome {
            success: false,
            recipe: None,
            images: Vec::new(),
            metadata: PageMetadata::default(),
            error: Some(error.into()),
        }
    }
}

/// Text-path result: the usual outcome plus an extraction confidence.
#[derive(Debug, Clone, Serialize)]
pub struct TextParseOutcome {
    #[serde(flatten)]
    pub outcome: ParseOutcome,
    /// 0..=100, derived from field completeness.
    pub confidence: u8,
}

/// Cheap, render-free verdict on a URL.
#[derive(Debug, Clone, Serialize)]
pub struct UrlValidation {
    pub valid: bool,
    /// True when a site rule covers the domain; unsupported URLs still go
    /// through the structured-data and generic strategies.
    pub supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Static introspection row for one site rule.
#[derive(Debug, Clone, Serialize)]
pub struct SiteRuleSummary {
    pub name: &'static str,
    pub domains: Vec<&'static str>,
    pub has_structured_data: bool,
}
