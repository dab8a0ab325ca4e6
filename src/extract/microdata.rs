use scraper::{ElementRef, Html, Selector};

use super::json_ld::{convert_duration, parse_leading_count};
use super::{element_text, ExtractStrategy, ExtractionContext};
use crate::model::{Ingredient, ParsedRecipe};

/// Strategy 2: schema.org microdata embedded in element attributes.
/// Sites that predate JSON-LD still mark recipes up this way.
pub struct MicrodataStrategy;

impl ExtractStrategy for MicrodataStrategy {
    fn name(&self) -> &'static str {
        "microdata"
    }

    fn extract(&self, context: &ExtractionContext) -> Option<ParsedRecipe> {
        let container = find_recipe_container(&context.document)?;

        // Legacy data-vocabulary pages used "ingredients"; schema.org uses
        // "recipeIngredient". Try modern first.
        let mut ingredient_names = itemprop_values(container, "recipeIngredient");
        if ingredient_names.is_empty() {
            ingredient_names = itemprop_values(container, "ingredients");
        }
        let ingredients: Vec<Ingredient> =
            ingredient_names.into_iter().map(Ingredient::named).collect();

        let mut steps = itemprop_values(container, "recipeInstructions");
        if steps.is_empty() {
            steps = itemprop_values(container, "instructions");
        }

        Some(ParsedRecipe {
            name: itemprop_value(container, "name").unwrap_or_default(),
            ingredients,
            instructions: steps.join("\n\n"),
            prep_time: itemprop_value(container, "prepTime").map(|t| convert_duration(&t)),
            cook_time: itemprop_value(container, "cookTime").map(|t| convert_duration(&t)),
            total_time: itemprop_value(container, "totalTime").map(|t| convert_duration(&t)),
            servings: itemprop_value(container, "recipeYield")
                .and_then(|y| parse_leading_count(&y)),
            cuisine: itemprop_value(container, "recipeCuisine"),
            category: itemprop_value(container, "recipeCategory"),
            author: itemprop_value(container, "author"),
            description: itemprop_value(container, "description"),
            nutrition: None,
            source_url: String::new(),
            images: itemprop_images(container),
        })
    }
}

fn find_recipe_container(document: &Html) -> Option<ElementRef<'_>> {
    let scope_selector = Selector::parse("[itemscope]").unwrap();
    document.select(&scope_selector).find(|el| {
        el.value().attr("itemtype").is_some_and(|itemtype| {
            itemtype.contains("schema.org/Recipe")
                || itemtype.contains("data-vocabulary.org/Recipe")
        })
    })
}

/// Props inside a nested itemscope (author, nutrition, review) belong to
/// that scope, not to the recipe.
fn in_recipe_scope(container: ElementRef<'_>, el: ElementRef<'_>) -> bool {
    for ancestor in el.ancestors() {
        if let Some(element) = ElementRef::wrap(ancestor) {
            if element.value().attr("itemscope").is_some() {
                return element.id() == container.id();
            }
        }
    }
    false
}

fn itemprop_value(container: ElementRef<'_>, prop: &str) -> Option<String> {
    let selector = Selector::parse(&format!("[itemprop='{prop}']")).unwrap();
    container
        .select(&selector)
        .filter(|el| in_recipe_scope(container, *el))
        .find_map(|el| {
            let value = extract_value(el);
            if value.is_empty() {
                None
            } else {
                Some(value)
            }
        })
}

fn itemprop_values(container: ElementRef<'_>, prop: &str) -> Vec<String> {
    let selector = Selector::parse(&format!("[itemprop='{prop}']")).unwrap();
    container
        .select(&selector)
        .filter(|el| in_recipe_scope(container, *el))
        .map(extract_value)
        .filter(|v| !v.is_empty())
        .collect()
}

/// meta tags carry their value in `content`, time tags in `datetime`;
/// everything else uses the element text.
fn extract_value(el: ElementRef<'_>) -> String {
    if let Some(content) = el.value().attr("content") {
        return content.trim().to_string();
    }
    if let Some(datetime) = el.value().attr("datetime") {
        return datetime.trim().to_string();
    }
    element_text(el)
}

fn itemprop_images(container: ElementRef<'_>) -> Vec<String> {
    let selector = Selector::parse("[itemprop='image']").unwrap();
    container
        .select(&selector)
        .filter(|el| in_recipe_scope(container, *el))
        .filter_map(|el| {
            el.value()
                .attr("src")
                .or_else(|| el.value().attr("content"))
                .or_else(|| el.value().attr("href"))
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn context(html: &str) -> ExtractionContext {
        ExtractionContext {
            url: "https://example.com/recipe".to_string(),
            document: Html::parse_document(html),
        }
    }

    #[test]
    fn test_extracts_scoped_recipe() {
        let ctx = context(
            r#"<html><body>
            <div itemscope itemtype="https://schema.org/Recipe">
                <h1 itemprop="name">Lentil Soup</h1>
                <meta itemprop="recipeYield" content="4 servings">
                <time itemprop="prepTime" datetime="PT15M">15 min</time>
                <li itemprop="recipeIngredient">1 cup lentils</li>
                <li itemprop="recipeIngredient">1 onion</li>
                <div itemprop="recipeInstructions">Simmer lentils</div>
                <div itemprop="recipeInstructions">Add onion</div>
            </div>
            </body></html>"#,
        );
        let recipe = MicrodataStrategy.extract(&ctx).unwrap();
        assert_eq!(recipe.name, "Lentil Soup");
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.ingredients[0].name, "1 cup lentils");
        assert_eq!(recipe.instructions, "Simmer lentils\n\nAdd onion");
        assert_eq!(recipe.servings, Some(4));
        assert_eq!(recipe.prep_time.as_deref(), Some("15 minutes"));
        assert!(recipe.is_valid());
    }

    #[test]
    fn test_legacy_data_vocabulary_markup() {
        let ctx = context(
            r#"<div itemscope itemtype="http://data-vocabulary.org/Recipe">
                <span itemprop="name">Old School Pancakes</span>
                <span itemprop="ingredients">flour</span>
                <span itemprop="ingredients">milk</span>
                <span itemprop="instructions">Mix and fry</span>
            </div>"#,
        );
        let recipe = MicrodataStrategy.extract(&ctx).unwrap();
        assert_eq!(recipe.name, "Old School Pancakes");
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.instructions, "Mix and fry");
    }

    #[test]
    fn test_props_outside_container_are_ignored() {
        let ctx = context(
            r#"<body>
            <span itemprop="name">Site Header</span>
            <div itemscope itemtype="https://schema.org/Recipe">
                <span itemprop="name">Real Name</span>
                <span itemprop="recipeIngredient">salt</span>
            </div>
            </body>"#,
        );
        let recipe = MicrodataStrategy.extract(&ctx).unwrap();
        assert_eq!(recipe.name, "Real Name");
    }

    #[test]
    fn test_nested_scope_does_not_shadow_recipe_props() {
        let ctx = context(
            r#"<div itemscope itemtype="https://schema.org/Recipe">
                <div itemprop="author" itemscope itemtype="https://schema.org/Person">
                    <span itemprop="name">Jane Doe</span>
                </div>
                <h1 itemprop="name">Braised Leeks</h1>
                <span itemprop="recipeIngredient">leeks</span>
            </div>"#,
        );
        let recipe = MicrodataStrategy.extract(&ctx).unwrap();
        assert_eq!(recipe.name, "Braised Leeks");
    }

    #[test]
    fn test_no_recipe_scope_returns_none() {
        let ctx = context(
            r#"<div itemscope itemtype="https://schema.org/Article">
                <span itemprop="name">Not a recipe</span>
            </div>"#,
        );
        assert!(MicrodataStrategy.extract(&ctx).is_none());
    }

    #[test]
    fn test_image_src_collected() {
        let ctx = context(
            r#"<div itemscope itemtype="https://schema.org/Recipe">
                <span itemprop="name">Toast</span>
                <span itemprop="recipeIngredient">bread</span>
                <img itemprop="image" src="https://example.com/toast.jpg">
            </div>"#,
        );
        let recipe = MicrodataStrategy.extract(&ctx).unwrap();
        assert_eq!(recipe.images, vec!["https://example.com/toast.jpg"]);
    }
}
