use scraper::{Html, Selector};

use super::{element_text, ExtractStrategy, ExtractionContext};
use crate::model::{Ingredient, ParsedRecipe};

/// Strategy 4: last-resort heuristics for pages with no structured data
/// and no recognized recipe card. Deliberately conservative; a wrong
/// answer here is worse than none.
pub struct GenericStrategy;

const TITLE_SELECTORS: &[&str] = &["h1", ".recipe-title", ".entry-title", ".post-title"];

const INGREDIENT_SELECTORS: &[&str] = &[
    "[class*='ingredient'] li",
    "ul[class*='ingredient'] li",
    ".ingredients li",
    "[itemprop='recipeIngredient']",
];

const INSTRUCTION_SELECTORS: &[&str] = &[
    "[class*='instruction'] li",
    "[class*='direction'] li",
    "[class*='method'] li",
    "[class*='step'] li",
    "[class*='instruction'] p",
    "[class*='direction'] p",
];

impl ExtractStrategy for GenericStrategy {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn extract(&self, context: &ExtractionContext) -> Option<ParsedRecipe> {
        let document = &context.document;
        let name = find_title(document)?;
        // Require a few plausible ingredient lines before trusting the page.
        let ingredients = find_items(document, INGREDIENT_SELECTORS, 3);
        if ingredients.is_empty() {
            return None;
        }

        Some(ParsedRecipe {
            name,
            ingredients: ingredients.into_iter().map(Ingredient::named).collect(),
            instructions: find_items(document, INSTRUCTION_SELECTORS, 1).join("\n\n"),
            ..ParsedRecipe::default()
        })
    }
}

fn find_title(document: &Html) -> Option<String> {
    for raw in TITLE_SELECTORS {
        let selector = match Selector::parse(raw) {
            Ok(s) => s,
            Err(_) => continue,
        };
        for el in document.select(&selector) {
            let text = element_text(el);
            if text.len() > 5 {
                return Some(text);
            }
        }
    }
    None
}

/// First selector producing at least `min_count` short text lines wins.
/// The length caps keep navigation blocks and article bodies out.
fn find_items(document: &Html, selectors: &[&str], min_count: usize) -> Vec<String> {
    for raw in selectors {
        let selector = match Selector::parse(raw) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let items: Vec<String> = document
            .select(&selector)
            .map(element_text)
            .filter(|text| text.len() > 2 && text.len() < 500)
            .collect();
        if items.len() >= min_count {
            return items;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn context(html: &str) -> ExtractionContext {
        ExtractionContext {
            url: "https://example.com/post".to_string(),
            document: Html::parse_document(html),
        }
    }

    #[test]
    fn test_extracts_from_plain_markup() {
        let ctx = context(
            r#"<html><body>
            <h1>Grandma's Goulash</h1>
            <ul class="ingredients-list">
                <li>1 lb beef</li>
                <li>2 onions</li>
                <li>1 tbsp paprika</li>
            </ul>
            <div class="directions">
                <ol><li>Brown the beef</li><li>Simmer one hour</li></ol>
            </div>
            </body></html>"#,
        );
        let recipe = GenericStrategy.extract(&ctx).unwrap();
        assert_eq!(recipe.name, "Grandma's Goulash");
        assert_eq!(recipe.ingredients.len(), 3);
        assert_eq!(recipe.instructions, "Brown the beef\n\nSimmer one hour");
        assert!(recipe.is_valid());
    }

    #[test]
    fn test_short_h1_falls_through_to_title_classes() {
        let ctx = context(
            r#"<h1>Menu</h1>
            <div class="recipe-title">Slow Cooker Chili</div>
            <ul class="ingredient-group">
                <li>2 cans beans</li><li>1 lb turkey</li><li>1 jar salsa</li>
            </ul>"#,
        );
        let recipe = GenericStrategy.extract(&ctx).unwrap();
        assert_eq!(recipe.name, "Slow Cooker Chili");
    }

    #[test]
    fn test_too_few_ingredient_lines_rejected() {
        let ctx = context(
            r#"<h1>Questionable Page</h1>
            <ul class="ingredients"><li>water</li></ul>"#,
        );
        assert!(GenericStrategy.extract(&ctx).is_none());
    }

    #[test]
    fn test_no_title_rejected() {
        let ctx = context(
            r#"<ul class="ingredients">
                <li>flour</li><li>sugar</li><li>eggs</li>
            </ul>"#,
        );
        assert!(GenericStrategy.extract(&ctx).is_none());
    }

    #[test]
    fn test_giant_text_blocks_filtered() {
        let blob = "x".repeat(600);
        let html = format!(
            r#"<h1>Padded Page</h1>
            <ul class="ingredients">
                <li>{blob}</li><li>{blob}</li><li>{blob}</li>
            </ul>"#
        );
        let ctx = context(&html);
        assert!(GenericStrategy.extract(&ctx).is_none());
    }
}
