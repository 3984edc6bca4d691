use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

/// A rendered page, parsed once and shared by every strategy.
pub struct PageSource<'a> {
    pub raw: &'a str,
    pub document: Html,
}

impl<'a> PageSource<'a> {
    pub fn parse(raw: &'a str) -> Self {
        Self {
            raw,
            document: Html::parse_document(raw),
        }
    }
}

type Strategy = fn(&PageSource<'_>) -> Option<String>;

/// Caption strategies, most reliable first.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("json_ld", json_ld),
    ("embedded_json", embedded_json),
    ("meta_description", meta_description),
    ("ui_element", ui_element),
    ("clips_metadata", clips_metadata),
];

/// First non-empty caption, with the name of the strategy that found it.
pub fn first_caption(page: &PageSource<'_>) -> Option<(&'static str, String)> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        strategy(page)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .map(|text| (*name, text))
    })
}

/// The page's `og:image`, used as a thumbnail when no post image was read.
pub fn og_image(page: &PageSource<'_>) -> Option<String> {
    meta_content(&page.document, r#"meta[property="og:image"]"#)
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn json_ld(page: &PageSource<'_>) -> Option<String> {
    let scripts = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    page.document.select(&scripts).find_map(|script| {
        let text: String = script.text().collect();
        let value: Value = serde_json::from_str(text.trim()).ok()?;
        find_caption_field(&value)
    })
}

fn find_caption_field(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => ["caption", "articleBody"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .filter(|text| !text.trim().is_empty())
            .map(String::from)
            .or_else(|| map.values().find_map(find_caption_field)),
        Value::Array(items) => items.iter().find_map(find_caption_field),
        _ => None,
    }
}

static EDGE_CAPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#""edge_media_to_caption"\s*:\s*\{\s*"edges"\s*:\s*\[\s*\{\s*"node"\s*:\s*\{\s*"text"\s*:\s*"((?:[^"\\]|\\.)*)""#,
    )
    .expect("valid regex")
});

static CAPTION_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""caption"\s*:\s*\{\s*"text"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex")
});

fn embedded_json(page: &PageSource<'_>) -> Option<String> {
    [&*EDGE_CAPTION, &*CAPTION_TEXT]
        .iter()
        .find_map(|re| re.captures(page.raw))
        .and_then(|caps| unescape_json(&caps[1]))
}

fn meta_description(page: &PageSource<'_>) -> Option<String> {
    let content = meta_content(&page.document, r#"meta[property="og:description"]"#)
        .or_else(|| meta_content(&page.document, r#"meta[name="description"]"#))?;
    Some(quoted_caption(&content).to_string())
}

fn ui_element(page: &PageSource<'_>) -> Option<String> {
    ["h1", r#"div[data-testid="content-container"] span"#]
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|selector| {
            page.document
                .select(&selector)
                .map(|el| el.text().collect::<String>())
                .find(|text| !text.trim().is_empty())
        })
}

static CLIPS_CAPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"clips_metadata"\s*:\s*\{.*?"caption"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("valid regex")
});

fn clips_metadata(page: &PageSource<'_>) -> Option<String> {
    CLIPS_CAPTION
        .captures(page.raw)
        .and_then(|caps| unescape_json(&caps[1]))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
}

/// Decode a JSON string body (the part between the quotes).
fn unescape_json(body: &str) -> Option<String> {
    serde_json::from_str::<String>(&format!("\"{body}\"")).ok()
}

/// Meta descriptions read `N likes, M comments - user on date: "caption".`
/// Keep what sits between the first `: "` and the last closing quote.
fn quoted_caption(content: &str) -> &str {
    let start = [": \"", ": \u{201c}"]
        .iter()
        .filter_map(|delim| content.find(delim).map(|i| i + delim.len()))
        .min();
    let Some(start) = start else {
        return content.trim();
    };

    let rest = &content[start..];
    let end = ['"', '\u{201d}']
        .iter()
        .filter_map(|quote| rest.rfind(*quote))
        .max()
        .unwrap_or(rest.len());
    rest[..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caption_of(html: &str) -> Option<(&'static str, String)> {
        first_caption(&PageSource::parse(html))
    }

    #[test]
    fn json_ld_wins_over_everything_else() {
        let html = r#"<html><head>
            <script type="application/ld+json">{"@type":"SocialMediaPosting","articleBody":"연남동 카페 추천"}</script>
            <meta property="og:description" content='10 likes - a on May 1: "meta caption"'>
            </head><body><h1>heading</h1></body></html>"#;
        assert_eq!(
            caption_of(html),
            Some(("json_ld", "연남동 카페 추천".to_string()))
        );
    }

    #[test]
    fn json_ld_searches_nested_graphs() {
        let html = r#"<script type="application/ld+json">[{"@graph":[{"caption":"nested"}]}]</script>"#;
        assert_eq!(caption_of(html).map(|(_, t)| t), Some("nested".to_string()));
    }

    #[test]
    fn embedded_json_is_unescaped() {
        let html = r#"<script>{"edge_media_to_caption": {"edges": [{"node": {"text": "📍 서울 \"quoted\"\nline"}}]}}</script>"#;
        assert_eq!(
            caption_of(html),
            Some(("embedded_json", "📍 서울 \"quoted\"\nline".to_string()))
        );
    }

    #[test]
    fn meta_description_keeps_quoted_part() {
        let html = r#"<meta property="og:description" content="12 likes, 3 comments - cafe.lover on May 1, 2025: &quot;성수동 카페 방문&quot;. ">"#;
        assert_eq!(
            caption_of(html),
            Some(("meta_description", "성수동 카페 방문".to_string()))
        );
    }

    #[test]
    fn meta_description_with_curly_quotes() {
        assert_eq!(
            quoted_caption("5 likes - user: \u{201c}망원동 맛집\u{201d}"),
            "망원동 맛집"
        );
        assert_eq!(quoted_caption("no delimiter here"), "no delimiter here");
    }

    #[test]
    fn falls_back_to_ui_elements() {
        let html = r#"<body><div data-testid="content-container"><span> </span><span>전시 정보</span></div></body>"#;
        assert_eq!(
            caption_of(html),
            Some(("ui_element", "전시 정보".to_string()))
        );
    }

    #[test]
    fn clips_metadata_is_last_resort() {
        let html = r#"<script>{"clips_metadata": {"audio": {"x": 1}, "caption": "릴스 캡션"}}</script>"#;
        assert_eq!(
            caption_of(html),
            Some(("clips_metadata", "릴스 캡션".to_string()))
        );
    }

    #[test]
    fn nothing_found_is_none() {
        assert_eq!(caption_of("<html><body><p>hi</p></body></html>"), None);
    }

    #[test]
    fn og_image_is_read() {
        let page = PageSource::parse(
            r#"<meta property="og:image" content="https://scontent.cdninstagram.com/v/a.jpg?x=1&amp;y=2">"#,
        );
        assert_eq!(
            og_image(&page).as_deref(),
            Some("https://scontent.cdninstagram.com/v/a.jpg?x=1&y=2")
        );
    }
}
