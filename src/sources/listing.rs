//! Parsing of the HTML browse pages and the link → detail path transform.
//!
//! The browse page shape is fixed: one `<article>` per project, each holding
//! an anchor whose `href` is `/<author>/<slug>` or `/@<author>/<slug>`.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

static ARTICLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<article\b[^>]*>(.*?)</article\s*>").expect("valid article regex")
});

static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\shref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("valid anchor regex")
});

/// Origin relative links are resolved against. Only its path survives.
static LINK_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("https://codeshare.frida.re/").expect("valid link base"));

/// Prefix of the structured per-project endpoint.
pub const DETAIL_PREFIX: &str = "/api/project";

/// Character some listing links carry in front of the author.
pub const AUTHOR_MARKER: char = '@';

/// One `<article>` from a browse page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// `href` of the first anchor, if the article had one.
    pub href: Option<String>,
}

/// A listing link resolved to its author and detail endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLink {
    pub author: String,
    pub detail_path: String,
}

/// Extract the articles of a browse page, in document order.
pub fn parse_listing(html: &str) -> Vec<ListingEntry> {
    ARTICLE_RE
        .captures_iter(html)
        .map(|article| {
            let body = article.get(1).map(|m| m.as_str()).unwrap_or_default();
            let href = HREF_RE.captures(body).and_then(|c| {
                c.get(1)
                    .or_else(|| c.get(2))
                    .or_else(|| c.get(3))
                    .map(|m| decode_entities(m.as_str()))
            });
            ListingEntry { href }
        })
        .collect()
}

/// Resolve a listing `href` to the project's author and detail path.
///
/// Every marker character is stripped. The link is resolved like a browser
/// would (absolute, protocol-relative or relative) and only its path is
/// kept, so query and fragment are dropped. Non-ASCII path bytes come back
/// percent-encoded. Returns `None` for non-HTTP links and for paths with no
/// author segment.
pub fn resolve_listing_link(href: &str) -> Option<ProjectLink> {
    let stripped: String = href.trim().chars().filter(|c| *c != AUTHOR_MARKER).collect();

    let url = LINK_BASE.join(&stripped).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let path = url.path();

    let author = path.split('/').find(|s| !s.is_empty())?;

    let relative = path.trim_start_matches('/');
    Some(ProjectLink {
        author: author.to_string(),
        detail_path: format!("{DETAIL_PREFIX}/{relative}"),
    })
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .replace("&#64;", "@")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
