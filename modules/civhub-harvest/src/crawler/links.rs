//! Link and title extraction from raw HTML.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Matches `href` attributes — `<a href>`, `<link href>`, `<area href>`.
/// URLs in `src`, data attributes, JS, and plain text are not links to follow.
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

/// Resolve a raw href against the page URL, absolute, fragment stripped.
fn resolve_href(raw: &str, base: Option<&url::Url>) -> Option<String> {
    let mut parsed = if raw.starts_with("http://") || raw.starts_with("https://") {
        url::Url::parse(raw).ok()?
    } else {
        base?.join(raw).ok()?
    };
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Extract followable links from raw HTML, resolved against `base_url` and
/// restricted to the base URL's host. Deduplicates, preserves order.
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let base = url::Url::parse(base_url).ok();
    let base_host = base.as_ref().and_then(|u| u.host_str().map(|h| h.to_string()));

    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for cap in HREF_RE.captures_iter(html) {
        let Some(resolved) = resolve_href(&cap[1], base.as_ref()) else {
            continue;
        };
        let same_host = url::Url::parse(&resolved)
            .ok()
            .and_then(|u| u.host_str().map(|h| Some(h.to_string()) == base_host))
            .unwrap_or(false);
        if same_host && seen.insert(resolved.clone()) {
            found.push(resolved);
        }
    }

    found
}

/// Pull the `<title>` text out of an HTML page, whitespace-collapsed.
pub fn page_title(html: &str) -> Option<String> {
    let raw = TITLE_RE.captures(html)?.get(1)?.as_str();
    let title = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}
