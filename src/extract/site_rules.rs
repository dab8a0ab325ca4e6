use log::debug;
use scraper::{Html, Selector};

use super::json_ld::{convert_duration, parse_leading_count};
use super::{element_text, ExtractStrategy, ExtractionContext};
use crate::model::{Ingredient, ParsedRecipe, SiteRuleSummary};
use crate::rate_limit::{domain_matches, origin_of};

/// Selector bundle for one recipe-card platform. Selector lists are tried
/// in order; the first that yields content wins.
pub struct SiteRule {
    pub name: &'static str,
    pub domains: &'static [&'static str],
    pub has_structured_data: bool,
    title: &'static [&'static str],
    description: &'static [&'static str],
    ingredients: &'static [&'static str],
    instructions: &'static [&'static str],
    prep_time: &'static [&'static str],
    cook_time: &'static [&'static str],
    total_time: &'static [&'static str],
    servings: &'static [&'static str],
}

/// The three plugins behind most independent food blogs. All of them also
/// emit JSON-LD, so these selectors usually act as a repair path for pages
/// whose structured data is broken or stripped by an optimizer.
static SITE_RULES: &[SiteRule] = &[
    SiteRule {
        name: "WordPress Recipe Maker",
        domains: &[
            "budgetbytes.com",
            "recipetineats.com",
            "cookieandkate.com",
            "damndelicious.net",
        ],
        has_structured_data: true,
        title: &[".wprm-recipe-name"],
        description: &[".wprm-recipe-summary"],
        ingredients: &[
            ".wprm-recipe-ingredient",
            ".wprm-recipe-ingredients-container li",
        ],
        instructions: &[
            ".wprm-recipe-instruction-text",
            ".wprm-recipe-instruction",
            ".wprm-recipe-instructions-container li",
        ],
        prep_time: &[".wprm-recipe-prep-time"],
        cook_time: &[".wprm-recipe-cook-time"],
        total_time: &[".wprm-recipe-total-time"],
        servings: &[".wprm-recipe-servings"],
    },
    SiteRule {
        name: "Tasty Recipes",
        domains: &[
            "sallysbakingaddiction.com",
            "pinchofyum.com",
            "halfbakedharvest.com",
        ],
        has_structured_data: true,
        title: &[".tasty-recipes-title"],
        description: &[".tasty-recipes-description"],
        ingredients: &[
            ".tasty-recipes-ingredients li",
            ".tasty-recipes-ingredients-body li",
        ],
        instructions: &[
            ".tasty-recipes-instructions li",
            ".tasty-recipes-instructions-body li",
        ],
        prep_time: &[".tasty-recipes-prep-time"],
        cook_time: &[".tasty-recipes-cook-time"],
        total_time: &[".tasty-recipes-total-time"],
        servings: &[".tasty-recipes-yield"],
    },
    SiteRule {
        name: "Create by Mediavine",
        domains: &["thestayathomechef.com", "spendwithpennies.com"],
        has_structured_data: true,
        title: &[".mv-create-title"],
        description: &[".mv-create-description"],
        ingredients: &[".mv-create-ingredients li"],
        instructions: &[".mv-create-instructions li"],
        prep_time: &[".mv-create-time-prep .mv-time-part", ".mv-create-time-prep"],
        cook_time: &[".mv-create-time-active .mv-time-part", ".mv-create-time-active"],
        total_time: &[".mv-create-time-total .mv-time-part", ".mv-create-time-total"],
        servings: &[".mv-create-yield"],
    },
];

pub fn rule_for_domain(domain: &str) -> Option<&'static SiteRule> {
    SITE_RULES
        .iter()
        .find(|rule| rule.domains.iter().any(|entry| domain_matches(domain, entry)))
}

pub fn rule_summaries() -> Vec<SiteRuleSummary> {
    SITE_RULES
        .iter()
        .map(|rule| SiteRuleSummary {
            name: rule.name,
            domains: rule.domains.to_vec(),
            has_structured_data: rule.has_structured_data,
        })
        .collect()
}

/// Strategy 3: selector rules for known recipe-card platforms, matched by
/// domain first and by card markup when the domain is unknown.
pub struct SiteRuleStrategy;

impl ExtractStrategy for SiteRuleStrategy {
    fn name(&self) -> &'static str {
        "site-rules"
    }

    fn extract(&self, context: &ExtractionContext) -> Option<ParsedRecipe> {
        let by_domain = origin_of(&context.url)
            .ok()
            .and_then(|domain| rule_for_domain(&domain));
        let rule = by_domain.or_else(|| probe(&context.document))?;
        debug!("site-rules: applying {} selectors", rule.name);
        apply(rule, &context.document)
    }
}

/// Recipe-card plugins run on thousands of blogs we have never seen;
/// recognize the platform by its title markup when the domain misses.
fn probe(document: &Html) -> Option<&'static SiteRule> {
    SITE_RULES.iter().find(|rule| {
        rule.title.iter().any(|raw| {
            Selector::parse(raw)
                .map(|selector| document.select(&selector).next().is_some())
                .unwrap_or(false)
        })
    })
}

fn apply(rule: &SiteRule, document: &Html) -> Option<ParsedRecipe> {
    let name = first_text(document, rule.title)?;
    let ingredients: Vec<Ingredient> = list_texts(document, rule.ingredients)
        .into_iter()
        .map(Ingredient::named)
        .collect();
    if ingredients.is_empty() {
        return None;
    }

    Some(ParsedRecipe {
        name,
        ingredients,
        instructions: list_texts(document, rule.instructions).join("\n\n"),
        prep_time: first_text(document, rule.prep_time).map(|t| convert_duration(&t)),
        cook_time: first_text(document, rule.cook_time).map(|t| convert_duration(&t)),
        total_time: first_text(document, rule.total_time).map(|t| convert_duration(&t)),
        servings: first_text(document, rule.servings).and_then(|y| parse_leading_count(&y)),
        cuisine: None,
        category: None,
        author: None,
        description: first_text(document, rule.description),
        nutrition: None,
        source_url: String::new(),
        images: Vec::new(),
    })
}

fn first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let selector = match Selector::parse(raw) {
            Ok(s) => s,
            Err(_) => continue,
        };
        if let Some(el) = document.select(&selector).next() {
            let text = element_text(el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn list_texts(document: &Html, selectors: &[&str]) -> Vec<String> {
    for raw in selectors {
        let selector = match Selector::parse(raw) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let items: Vec<String> = document
            .select(&selector)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();
        if !items.is_empty() {
            return items;
        }
    }
    Vec::new()
}
