use html_escape::decode_html_entities;
use log::debug;
use scraper::Selector;
use serde::Deserialize;
use serde_json::Value;
use std::convert::TryFrom;

use super::{ExtractStrategy, ExtractionContext};
use crate::model::{Ingredient, NutritionInfo, ParsedRecipe};

/// Strategy 1: publisher-embedded JSON-LD structured data. By far the most
/// reliable source when present, so it sits at the top of the cascade.
pub struct JsonLdStrategy;

impl ExtractStrategy for JsonLdStrategy {
    fn name(&self) -> &'static str {
        "json-ld"
    }

    fn extract(&self, context: &ExtractionContext) -> Option<ParsedRecipe> {
        let selector = Selector::parse("script[type='application/ld+json']").unwrap();
        let scripts: Vec<_> = context.document.select(&selector).collect();
        debug!("json-ld: found {} script blocks", scripts.len());

        for (index, script) in scripts.iter().enumerate() {
            let raw = script.inner_html();
            // Publishers ship surprisingly broken JSON; try the raw block
            // first and fall back to a sanitized pass.
            let parsed = serde_json::from_str::<Value>(&raw)
                .or_else(|_| serde_json::from_str::<Value>(&sanitize_json(&raw)));
            let json = match parsed {
                Ok(value) => value,
                Err(e) => {
                    debug!("json-ld: block {index} is not parseable JSON: {e}");
                    continue;
                }
            };

            let recipe_node = find_recipe_node(&json);
            if let Some(node) = recipe_node {
                match JsonLdRecipe::try_from(node) {
                    Ok(recipe) => return Some(convert_to_recipe(recipe)),
                    Err(e) => {
                        debug!("json-ld: block {index} recipe did not deserialize: {e}");
                    }
                }
            }
        }

        None
    }
}

/// Payloads come as a bare object, an array of objects, or an `@graph`
/// wrapper; the first Recipe-typed node wins.
fn find_recipe_node(value: &Value) -> Option<&Value> {
    if is_recipe_type(value) {
        return Some(value);
    }
    if let Some(items) = value.as_array() {
        return items.iter().find(|item| is_recipe_type(item));
    }
    if let Some(graph) = value.get("@graph").and_then(Value::as_array) {
        return graph.iter().find(|item| is_recipe_type(item));
    }
    None
}

fn is_recipe_type(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("recipe"),
        Some(Value::Array(types)) => types
            .iter()
            .any(|t| t.as_str().is_some_and(|s| s.eq_ignore_ascii_case("recipe"))),
        _ => false,
    }
}

fn convert_to_recipe(json_ld: JsonLdRecipe) -> ParsedRecipe {
    let ingredients = match json_ld.recipe_ingredient {
        Some(RecipeIngredients::Strings(items)) => items
            .into_iter()
            .filter(|item| !item.trim().is_empty())
            .map(|item| Ingredient::named(decode_html_symbols(item.trim())))
            .collect(),
        Some(RecipeIngredients::Objects(items)) => items
            .into_iter()
            .filter(|item| !item.name.trim().is_empty())
            .map(|item| Ingredient {
                name: decode_html_symbols(item.name.trim()),
                amount: item.amount.unwrap_or_default().trim().to_string(),
                ..Ingredient::default()
            })
            .collect(),
        None => Vec::new(),
    };

    let instructions = json_ld
        .recipe_instructions
        .map(instruction_steps)
        .unwrap_or_default()
        .join("\n\n");

    let author = json_ld.author.and_then(|author| {
        let name = match author {
            Author::String(name) => Some(name),
            Author::Object(obj) => obj.name,
            Author::Multiple(authors) => {
                let names: Vec<String> = authors.into_iter().filter_map(|a| a.name).collect();
                if names.is_empty() {
                    None
                } else {
                    Some(names.join(", "))
                }
            }
        };
        name.map(|n| decode_html_symbols(&n)).filter(|n| !n.is_empty())
    });

    let description = json_ld.description.and_then(|desc| {
        let text = match desc {
            DescriptionType::String(d) => d,
            DescriptionType::Object(d) => d.text,
        };
        let decoded = decode_html_symbols(&text);
        if decoded.is_empty() {
            None
        } else {
            Some(decoded)
        }
    });

    let images = json_ld.image.map_or(Vec::new(), |img| match img {
        ImageType::String(i) => vec![decode_html_symbols(&i)],
        ImageType::MultipleStrings(imgs) => {
            imgs.into_iter().map(|i| decode_html_symbols(&i)).collect()
        }
        ImageType::Object(i) => vec![i.url],
        ImageType::MultipleObjects(imgs) => imgs.into_iter().map(|i| i.url).collect(),
        ImageType::None => Vec::new(),
    });

    ParsedRecipe {
        name: decode_html_symbols(json_ld.name.trim()),
        ingredients,
        instructions,
        prep_time: json_ld
            .prep_time
            .filter(|t| !t.is_empty())
            .map(|t| convert_duration(&t)),
        cook_time: json_ld
            .cook_time
            .filter(|t| !t.is_empty())
            .map(|t| convert_duration(&t)),
        total_time: json_ld
            .total_time
            .filter(|t| !t.is_empty())
            .map(|t| convert_duration(&t)),
        servings: json_ld.recipe_yield.and_then(|y| y.as_servings()),
        cuisine: json_ld.recipe_cuisine.and_then(OneOrMany::into_first),
        category: json_ld.recipe_category.and_then(OneOrMany::into_first),
        author,
        description,
        nutrition: json_ld.nutrition.and_then(NutritionObject::into_info),
        source_url: String::new(),
        images,
    }
}

fn instruction_steps(instructions: RecipeInstructions) -> Vec<String> {
    let steps: Vec<String> = match instructions {
        RecipeInstructions::String(text) => vec![text],
        RecipeInstructions::Multiple(texts) => texts,
        RecipeInstructions::MultipleObject(objects) => {
            objects.into_iter().map(|obj| obj.text).collect()
        }
        RecipeInstructions::HowTo(sections) => {
            sections.into_iter().flat_map(how_to_texts).collect()
        }
        RecipeInstructions::NestedSections(nested) => nested
            .into_iter()
            .flatten()
            .flat_map(how_to_texts)
            .collect(),
    };
    steps
        .into_iter()
        .map(|step| decode_html_symbols(step.trim()))
        .filter(|step| !step.is_empty())
        .collect()
}

fn how_to_texts(entry: HowTo) -> Vec<String> {
    match entry {
        // Prefer text over name
        HowTo::HowToStep(step) => step.text.or(step.name).into_iter().collect(),
        HowTo::HowToSection(section) => section
            .item_list_element
            .into_iter()
            .filter_map(|step| step.text.or(step.name))
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
struct JsonLdRecipe {
    name: String,
    description: Option<DescriptionType>,
    image: Option<ImageType>,
    author: Option<Author>,
    #[serde(rename = "recipeIngredient")]
    recipe_ingredient: Option<RecipeIngredients>,
    #[serde(rename = "recipeInstructions")]
    recipe_instructions: Option<RecipeInstructions>,
    #[serde(rename = "recipeYield")]
    recipe_yield: Option<RecipeYield>,
    #[serde(rename = "prepTime")]
    prep_time: Option<String>,
    #[serde(rename = "cookTime")]
    cook_time: Option<String>,
    #[serde(rename = "totalTime")]
    total_time: Option<String>,
    #[serde(rename = "recipeCategory")]
    recipe_category: Option<OneOrMany>,
    #[serde(rename = "recipeCuisine")]
    recipe_cuisine: Option<OneOrMany>,
    nutrition: Option<NutritionObject>,
}

impl TryFrom<&Value> for JsonLdRecipe {
    type Error = serde_json::Error;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TextObject {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DescriptionType {
    String(String),
    Object(TextObject),
}

#[derive(Debug, Deserialize)]
struct ImageObject {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageType {
    None,
    String(String),
    Object(ImageObject),
    MultipleStrings(Vec<String>),
    MultipleObjects(Vec<ImageObject>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecipeIngredients {
    Strings(Vec<String>),
    Objects(Vec<IngredientObject>),
}

#[derive(Debug, Deserialize)]
struct IngredientObject {
    name: String,
    amount: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Author {
    String(String),
    Object(AuthorObject),
    Multiple(Vec<AuthorObject>),
}

#[derive(Debug, Deserialize)]
struct AuthorObject {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecipeInstructionObject {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecipeInstructions {
    String(String),
    Multiple(Vec<String>),
    MultipleObject(Vec<RecipeInstructionObject>),
    HowTo(Vec<HowTo>),
    NestedSections(Vec<Vec<HowTo>>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "@type")]
enum HowTo {
    HowToStep(HowToStep),
    HowToSection(HowToSection),
}

#[derive(Debug, Deserialize)]
struct HowToStep {
    text: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HowToSection {
    #[serde(rename = "itemListElement")]
    item_list_element: Vec<HowToStep>,
}

/// Yield shows up as a number, a string ("4 servings"), or arrays of
/// either; normalize to an integer serving count.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecipeYield {
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<RecipeYield>),
}

impl RecipeYield {
    fn as_servings(&self) -> Option<u32> {
        match self {
            RecipeYield::Integer(n) if *n > 0 => u32::try_from(*n).ok(),
            RecipeYield::Integer(_) => None,
            RecipeYield::Float(f) if *f > 0.0 => Some(f.round() as u32),
            RecipeYield::Float(_) => None,
            RecipeYield::String(s) => parse_leading_count(s),
            RecipeYield::Array(entries) => entries.iter().find_map(|e| e.as_servings()),
        }
    }
}

/// First run of digits in the string ("Serves 4 people" -> 4).
pub(crate) fn parse_leading_count(s: &str) -> Option<u32> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Category/cuisine fields: plain string or array; the first entry is the
/// primary classification.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_first(self) -> Option<String> {
        let value = match self {
            OneOrMany::One(s) => s,
            OneOrMany::Many(items) => items.into_iter().next().unwrap_or_default(),
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

#[derive(Debug, Deserialize)]
struct NutritionObject {
    calories: Option<NutrientValue>,
    #[serde(rename = "proteinContent")]
    protein: Option<NutrientValue>,
    #[serde(rename = "carbohydrateContent")]
    carbs: Option<NutrientValue>,
    #[serde(rename = "fatContent")]
    fat: Option<NutrientValue>,
    #[serde(rename = "fiberContent")]
    fiber: Option<NutrientValue>,
    #[serde(rename = "sugarContent")]
    sugar: Option<NutrientValue>,
    #[serde(rename = "sodiumContent")]
    sodium: Option<NutrientValue>,
}

impl NutritionObject {
    fn into_info(self) -> Option<NutritionInfo> {
        let info = NutritionInfo {
            calories: self.calories.map(NutrientValue::into_string),
            protein: self.protein.map(NutrientValue::into_string),
            carbs: self.carbs.map(NutrientValue::into_string),
            fat: self.fat.map(NutrientValue::into_string),
            fiber: self.fiber.map(NutrientValue::into_string),
            sugar: self.sugar.map(NutrientValue::into_string),
            sodium: self.sodium.map(NutrientValue::into_string),
        };
        let has_any = info.calories.is_some()
            || info.protein.is_some()
            || info.carbs.is_some()
            || info.fat.is_some()
            || info.fiber.is_some()
            || info.sugar.is_some()
            || info.sodium.is_some();
        if has_any {
            Some(info)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NutrientValue {
    String(String),
    Number(f64),
}

impl NutrientValue {
    fn into_string(self) -> String {
        match self {
            NutrientValue::String(s) => s.trim().to_string(),
            NutrientValue::Number(n) => n.to_string(),
        }
    }
}

fn decode_html_symbols(text: &str) -> String {
    // for some reason need to decode twice to get the correct string
    decode_html_entities(&decode_html_entities(text)).into_owned()
}

/// Converts ISO 8601 durations (PT#H#M) into the short human form used
/// throughout the app: "1h 30m", "2h", "45 minutes". Anything that does
/// not look like an ISO duration passes through unchanged.
pub(crate) fn convert_duration(duration: &str) -> String {
    let rest = match duration.strip_prefix("PT") {
        Some(r) => r,
        None => return duration.to_string(),
    };

    let mut hours: u32 = 0;
    let mut minutes: u32 = 0;
    let mut matched = false;

    if let Some(h_pos) = rest.find('H') {
        if let Ok(h) = rest[..h_pos].parse() {
            hours = h;
            matched = true;
        }
    }
    if let Some(m_pos) = rest.find('M') {
        let start = rest.find('H').map(|p| p + 1).unwrap_or(0);
        if let Ok(m) = rest.get(start..m_pos).unwrap_or("").parse() {
            minutes = m;
            matched = true;
        }
    }
    // Seconds-only durations (PT5400S) fold into hours and minutes.
    if !matched {
        if let Some(s_pos) = rest.find('S') {
            if let Ok(seconds) = rest[..s_pos].parse::<f64>() {
                let total_minutes = (seconds / 60.0).round() as u32;
                hours = total_minutes / 60;
                minutes = total_minutes % 60;
                matched = total_minutes > 0;
            }
        }
    }

    if !matched {
        return duration.to_string();
    }

    if hours > 0 {
        if minutes > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{hours}h")
        }
    } else {
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    }
}

fn sanitize_json(json_str: &str) -> String {
    let mut minified = String::with_capacity(json_str.len());
    let mut in_string = false;
    let mut prev_char = None;
    let chars: Vec<char> = json_str.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '"' if prev_char != Some('\\') => {
                in_string = !in_string;
                if !in_string {
                    // We're ending a string - check if we need a comma
                    let rest_chars = chars.get(i + 1..).unwrap_or(&[]);
                    let next_char = rest_chars.iter().find(|c| !c.is_whitespace());
                    if !matches!(prev_char, Some(',') | Some('[') | Some('{'))
                        && matches!(next_char, Some('"' | '[' | '{'))
                    {
                        minified.push('"');
                        minified.push(',');
                        prev_char = Some(',');
                        continue;
                    }
                }
                minified.push(c);
            }
            ',' if !in_string => {
                // Avoid duplicate commas
                if prev_char != Some(',') {
                    minified.push(c);
                }
            }
            // JSON forbids unescaped control characters inside strings.
            _ if in_string => {
                minified.push(if c.is_control() { ' ' } else { c });
            }
            _ => {
                if !c.is_whitespace() && !c.is_control() {
                    minified.push(c);
                }
            }
        }
        prev_char = Some(c);
    }

    minified
        .replace(",]", "]")
        .replace(",}", "}")
        .replace(",,", ",")
}
