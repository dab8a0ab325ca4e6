use std::collections::HashSet;

use scraper::{ElementRef, Selector};
use url::Url;

use super::ExtractionContext;
use crate::model::{ImageCandidate, ImageRole};

const MAX_CANDIDATES: usize = 10;

/// Substrings that mark tracking pixels and layout filler.
const JUNK_MARKERS: &[&str] = &["pixel", "tracking", "spacer", "blank.", "1x1"];

/// Collects, scores and ranks recipe imagery from the rendered page.
/// Candidates are deduplicated by absolute URL; the first role match wins,
/// and role groups are scanned hero-first so the lead photo never gets
/// demoted to gallery.
pub fn extract_candidates(context: &ExtractionContext) -> Vec<ImageCandidate> {
    let base = Url::parse(&context.url).ok();
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates: Vec<ImageCandidate> = Vec::new();

    // og:image is the publisher's own pick for the lead photo.
    if let Some(og) = meta_og_image(context) {
        if let Some(url) = absolutize(&og, base.as_ref()) {
            if seen.insert(url.clone()) {
                candidates.push(build_candidate(url, ImageRole::Hero, String::new(), None, None));
            }
        }
    }

    let groups: &[(ImageRole, &[&str])] = &[
        (
            ImageRole::Hero,
            &[
                ".recipe-image img",
                "[itemprop='image']",
                "[class*='hero'] img",
                ".post-thumbnail img",
                "img.wp-post-image",
            ],
        ),
        (
            ImageRole::Step,
            &[
                "[class*='instruction'] img",
                "[class*='direction'] img",
                "[class*='step'] img",
            ],
        ),
        (ImageRole::Ingredient, &["[class*='ingredient'] img"]),
        (
            ImageRole::Gallery,
            &["[class*='gallery'] img", "article img", "main img", "img"],
        ),
    ];

    for (role, selectors) in groups {
        for raw in *selectors {
            let selector = match Selector::parse(raw) {
                Ok(s) => s,
                Err(_) => continue,
            };
            for el in context.document.select(&selector) {
                let src = match image_source(el) {
                    Some(src) => src,
                    None => continue,
                };
                let url = match absolutize(&src, base.as_ref()) {
                    Some(url) => url,
                    None => continue,
                };
                if !seen.insert(url.clone()) {
                    continue;
                }
                let alt = el.value().attr("alt").unwrap_or_default().trim().to_string();
                let width = parse_dimension(el.value().attr("width"));
                let height = parse_dimension(el.value().attr("height"));
                let role = if *role == ImageRole::Gallery {
                    role_from_alt(&alt).unwrap_or(ImageRole::Gallery)
                } else {
                    *role
                };
                candidates.push(build_candidate(url, role, alt, width, height));
            }
        }
    }

    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates.truncate(MAX_CANDIDATES);
    candidates
}

/// Rescues images the class-based groups missed but whose alt text names
/// a role ("step 3: fold the dough").
fn role_from_alt(alt: &str) -> Option<ImageRole> {
    let lower = alt.to_ascii_lowercase();
    if lower.contains("hero") {
        Some(ImageRole::Hero)
    } else if lower.contains("step") {
        Some(ImageRole::Step)
    } else if lower.contains("ingredient") {
        Some(ImageRole::Ingredient)
    } else {
        None
    }
}

fn meta_og_image(context: &ExtractionContext) -> Option<String> {
    let selector = Selector::parse("meta[property='og:image']").unwrap();
    context
        .document
        .select(&selector)
        .find_map(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Lazy loaders park the real URL in data attributes and leave a
/// placeholder (or nothing) in src.
fn image_source(el: ElementRef<'_>) -> Option<String> {
    let value = el.value();
    let src = value
        .attr("src")
        .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
        .or_else(|| value.attr("data-src"))
        .or_else(|| value.attr("data-lazy-src"))?;
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    let lower = src.to_ascii_lowercase();
    if JUNK_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return None;
    }
    Some(src.to_string())
}

fn absolutize(src: &str, base: Option<&Url>) -> Option<String> {
    if let Ok(absolute) = Url::parse(src) {
        return Some(absolute.to_string());
    }
    base?.join(src).ok().map(|u| u.to_string())
}

fn parse_dimension(attr: Option<&str>) -> Option<u32> {
    attr.and_then(|v| v.trim().parse().ok()).filter(|&v| v > 0)
}

fn build_candidate(
    url: String,
    role: ImageRole,
    alt: String,
    width: Option<u32>,
    height: Option<u32>,
) -> ImageCandidate {
    let score = score_image(&url, &alt, width);
    ImageCandidate {
        url,
        role,
        alt,
        score,
        width,
        height,
    }
}

/// Quality heuristic on a 0..=100 scale, starting from a neutral 50.
/// Width comes from the element attribute when present, otherwise from
/// size hints embedded in the URL.
fn score_image(url: &str, alt: &str, attr_width: Option<u32>) -> u8 {
    let lower = url.to_ascii_lowercase();
    let mut score: i32 = 50;

    match attr_width.or_else(|| url_width_hint(&lower)) {
        Some(w) if w >= 1200 => score += 30,
        Some(w) if w >= 800 => score += 20,
        Some(w) if w >= 600 => score += 10,
        _ => {}
    }

    if lower.contains("high") || lower.contains("hd") {
        score += 15;
    }
    if lower.contains("thumb") || lower.contains("small") {
        score -= 20;
    }

    if alt.len() > 10 {
        score += 10;
    }
    let alt_lower = alt.to_ascii_lowercase();
    if alt_lower.contains("recipe") || alt_lower.contains("food") {
        score += 5;
    }

    if lower.contains(".webp") {
        score += 10;
    } else if lower.contains(".jpg") || lower.contains(".jpeg") {
        score += 5;
    } else if lower.contains(".png") {
        score += 3;
    }

    score.clamp(0, 100) as u8
}

/// Pixel-width hints embedded in image URLs: "-1200x800.jpg", "?w=1200",
/// "width=1200", Cloudinary-style "/w_1200/". Largest plausible hint wins.
fn url_width_hint(lower: &str) -> Option<u32> {
    let bytes = lower.as_bytes();
    let mut best: Option<u32> = None;
    let mut push = |w: u32| {
        if (100..=10_000).contains(&w) {
            best = Some(best.map_or(w, |b| b.max(w)));
        }
    };

    // WxH segments
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i + 1 < bytes.len() && bytes[i] == b'x' && bytes[i + 1].is_ascii_digit() {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if let (Ok(w), Ok(_h)) = (lower[start..i].parse::<u32>(), lower[i + 1..j].parse::<u32>())
            {
                push(w);
            }
            i = j;
        }
    }

    // Explicit width parameters
    for marker in ["width=", "w=", "w_"] {
        let mut from = 0;
        while let Some(rel) = lower[from..].find(marker) {
            let pos = from + rel;
            let boundary =
                pos == 0 || matches!(bytes[pos - 1], b'?' | b'&' | b'/' | b'-' | b'_' | b',');
            if boundary {
                let digits: String = lower[pos + marker.len()..]
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if let Ok(w) = digits.parse::<u32>() {
                    push(w);
                }
            }
            from = pos + marker.len();
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn context(url: &str, html: &str) -> ExtractionContext {
        ExtractionContext {
            url: url.to_string(),
            document: Html::parse_document(html),
        }
    }

    #[test]
    fn test_og_image_becomes_hero() {
        let ctx = context(
            "https://example.com/recipe",
            r#"<head><meta property="og:image" content="https://cdn.example.com/lead-1200x800.jpg"></head>
            <body><img src="/small-thumb.jpg" alt=""></body>"#,
        );
        let candidates = extract_candidates(&ctx);
        assert_eq!(candidates[0].role, ImageRole::Hero);
        assert_eq!(candidates[0].url, "https://cdn.example.com/lead-1200x800.jpg");
        assert!(candidates[0].score > candidates[1].score);
    }

    #[test]
    fn test_relative_urls_resolved_against_page() {
        let ctx = context(
            "https://example.com/recipes/soup/",
            r#"<body><article><img src="../images/soup.jpg" alt="bowl of soup on table"></article></body>"#,
        );
        let candidates = extract_candidates(&ctx);
        assert_eq!(candidates[0].url, "https://example.com/recipes/images/soup.jpg");
    }

    #[test]
    fn test_lazy_data_src_fallback() {
        let ctx = context(
            "https://example.com/",
            r#"<img data-src="https://cdn.example.com/dish.webp" alt="">"#,
        );
        let candidates = extract_candidates(&ctx);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://cdn.example.com/dish.webp");
    }

    #[test]
    fn test_duplicates_and_trackers_skipped() {
        let ctx = context(
            "https://example.com/",
            r#"<article>
            <img src="https://cdn.example.com/dish.jpg">
            <img src="https://cdn.example.com/dish.jpg">
            <img src="https://stats.example.com/pixel.gif">
            </article>"#,
        );
        let candidates = extract_candidates(&ctx);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_dedup_across_relative_and_absolute_forms() {
        let ctx = context(
            "https://example.com/",
            r#"<article>
            <img src="/photos/lead-1600x900.jpg" alt="finished dish on the table">
            <img src="https://example.com/photos/lead-1600x900.jpg" alt="">
            <img src="/photos/prep.jpg" alt="">
            <img src="/photos/thumb-plated.jpg" alt="">
            <img src="/photos/pan.webp" alt="">
            </article>"#,
        );
        let candidates = extract_candidates(&ctx);
        assert_eq!(candidates.len(), 4);
        assert!(candidates.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_role_classification() {
        let ctx = context(
            "https://example.com/",
            r#"<body>
            <div class="recipe-instructions"><img src="/step1.jpg"></div>
            <div class="ingredient-shot"><img src="/flour.jpg"></div>
            <div class="photo-gallery"><img src="/g1.jpg"></div>
            </body>"#,
        );
        let candidates = extract_candidates(&ctx);
        let role_of = |path: &str| {
            candidates
                .iter()
                .find(|c| c.url.ends_with(path))
                .map(|c| c.role)
        };
        assert_eq!(role_of("/step1.jpg"), Some(ImageRole::Step));
        assert_eq!(role_of("/flour.jpg"), Some(ImageRole::Ingredient));
        assert_eq!(role_of("/g1.jpg"), Some(ImageRole::Gallery));
    }

    #[test]
    fn test_alt_text_rescues_role_for_unclassed_images() {
        let ctx = context(
            "https://example.com/",
            r#"<article><img src="/fold.jpg" alt="step 3: fold the dough"></article>"#,
        );
        let candidates = extract_candidates(&ctx);
        assert_eq!(candidates[0].role, ImageRole::Step);
    }

    #[test]
    fn test_scoring_prefers_large_descriptive_jpegs() {
        let big = score_image(
            "https://cdn.example.com/photos/roast-1600x900.jpg",
            "golden roast chicken recipe",
            None,
        );
        let thumb = score_image("https://cdn.example.com/thumb/roast.jpg", "", None);
        assert!(big > thumb);
        assert!(big <= 100);
    }

    #[test]
    fn test_score_clamped() {
        assert_eq!(
            score_image(
                "https://c.example.com/hd-high-2000x2000.webp",
                "amazing food recipe photo with detail",
                Some(2000),
            ),
            100
        );
        let low = score_image("https://c.example.com/thumb-small.gif", "", None);
        assert!(low < 50);
    }

    #[test]
    fn test_width_hints_from_url() {
        assert_eq!(url_width_hint("https://x.com/a-1200x630.jpg"), Some(1200));
        assert_eq!(url_width_hint("https://x.com/a.jpg?w=800"), Some(800));
        assert_eq!(url_width_hint("https://x.com/w_640/a.jpg"), Some(640));
        assert_eq!(url_width_hint("https://x.com/recipe/123456/a.jpg"), None);
    }

    #[test]
    fn test_truncated_to_ten() {
        let imgs: String = (0..15)
            .map(|i| format!(r#"<img src="/photo-{i}.jpg">"#))
            .collect();
        let html = format!("<article>{imgs}</article>");
        let ctx = context("https://example.com/", &html);
        assert_eq!(extract_candidates(&ctx).len(), 10);
    }
}
