use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use super::http::CollectorHttp;
use super::Collector;
use crate::model::{Headings, HtmlData, ImageData, OgTags, PageLinks, TwitterCard};

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .unwrap()
});
static TAG_STRIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<!--.*?-->").unwrap()
});
static BODY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body>").unwrap());
static TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").unwrap());
static H1: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1>").unwrap());
static H2: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<h2\b[^>]*>(.*?)</h2>").unwrap());
static H3: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<h3\b[^>]*>(.*?)</h3>").unwrap());
static JSON_LD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .unwrap()
});

/// Opening tags named `name`, e.g. every `<meta ...>`.
pub(crate) fn opening_tags<'a>(html: &'a str, name: &str) -> Vec<&'a str> {
    let pattern = format!(r"(?i)<{}\b[^>]*>", regex::escape(name));
    match Regex::new(&pattern) {
        Ok(re) => re.find_iter(html).map(|m| m.as_str()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Attribute value from one opening tag. Names compare case-insensitively.
pub(crate) fn attr(tag: &str, name: &str) -> Option<String> {
    ATTR.captures_iter(tag).find_map(|c| {
        if !c[1].eq_ignore_ascii_case(name) {
            return None;
        }
        c.get(2)
            .or_else(|| c.get(3))
            .or_else(|| c.get(4))
            .map(|m| decode_entities(m.as_str()))
    })
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
}

fn clean_text(fragment: &str) -> String {
    let stripped = TAG_STRIP.replace_all(fragment, " ");
    let decoded = decode_entities(&stripped);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn texts(re: &Regex, html: &str) -> Vec<String> {
    re.captures_iter(html)
        .map(|c| clean_text(&c[1]))
        .filter(|t| !t.is_empty())
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First `<meta>` whose `key_attr` equals `key`, returning its content.
fn meta_by(html: &str, key_attr: &str, key: &str) -> Option<String> {
    opening_tags(html, "meta")
        .into_iter()
        .find(|tag| {
            attr(tag, key_attr)
                .map(|v| v.eq_ignore_ascii_case(key))
                .unwrap_or(false)
        })
        .and_then(|tag| non_empty(attr(tag, "content")))
}

fn link_href(html: &str, rel: &str) -> Option<String> {
    opening_tags(html, "link")
        .into_iter()
        .find(|tag| {
            attr(tag, "rel")
                .map(|v| v.eq_ignore_ascii_case(rel))
                .unwrap_or(false)
        })
        .and_then(|tag| non_empty(attr(tag, "href")))
}

/// Resolve every `<a href>` against `base` and split into same-host and
/// other-host links, deduplicated in document order.
pub(crate) fn extract_links(html: &str, base: &Url) -> PageLinks {
    let mut seen = HashSet::new();
    let mut links = PageLinks::default();

    for tag in opening_tags(html, "a") {
        let Some(href) = attr(tag, "href") else {
            continue;
        };
        let Ok(resolved) = base.join(href.trim()) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let href = resolved.to_string();
        if !seen.insert(href.clone()) {
            continue;
        }
        if resolved.host_str() == base.host_str() {
            links.internal.push(href);
        } else {
            links.external.push(href);
        }
    }

    links
}

fn parse_dimension(value: Option<String>) -> Option<u32> {
    let v = value?;
    let digits: String = v.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn count_words(html: &str) -> usize {
    let body = BODY
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html);
    let without_code = SCRIPT_STYLE.replace_all(body, " ");
    clean_text(&without_code).split_whitespace().count()
}

pub fn parse_html(html: &str, base_url: &str) -> anyhow::Result<HtmlData> {
    let base = Url::parse(base_url)?;

    let images = opening_tags(html, "img")
        .into_iter()
        .map(|tag| ImageData {
            src: attr(tag, "src").unwrap_or_default(),
            alt: attr(tag, "alt"),
            width: parse_dimension(attr(tag, "width")),
            height: parse_dimension(attr(tag, "height")),
        })
        .collect();

    let schema_org = JSON_LD
        .captures_iter(html)
        .filter_map(|c| serde_json::from_str(c[1].trim()).ok())
        .collect();

    let language = opening_tags(html, "html")
        .first()
        .and_then(|tag| non_empty(attr(tag, "lang")));

    Ok(HtmlData {
        title: TITLE
            .captures(html)
            .map(|c| clean_text(&c[1]))
            .filter(|t| !t.is_empty()),
        meta_description: meta_by(html, "name", "description"),
        canonical_url: link_href(html, "canonical"),
        headings: Headings {
            h1: texts(&H1, html),
            h2: texts(&H2, html),
            h3: texts(&H3, html),
        },
        images,
        links: extract_links(html, &base),
        og_tags: OgTags {
            title: meta_by(html, "property", "og:title"),
            description: meta_by(html, "property", "og:description"),
            image: meta_by(html, "property", "og:image"),
            kind: meta_by(html, "property", "og:type"),
            url: meta_by(html, "property", "og:url"),
        },
        twitter_card: TwitterCard {
            card: meta_by(html, "name", "twitter:card"),
            title: meta_by(html, "name", "twitter:title"),
            description: meta_by(html, "name", "twitter:description"),
            image: meta_by(html, "name", "twitter:image"),
        },
        schema_org,
        forms: opening_tags(html, "form").len(),
        word_count: count_words(html),
        language,
        favicon: link_href(html, "icon").or_else(|| link_href(html, "shortcut icon")),
        viewport: meta_by(html, "name", "viewport"),
    })
}

pub struct HtmlCollector {
    http: CollectorHttp,
}

impl HtmlCollector {
    pub fn new(http: CollectorHttp) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Collector<HtmlData> for HtmlCollector {
    async fn collect(&self, url: &str, _audit_id: &str) -> anyhow::Result<HtmlData> {
        let html = self.http.fetch_text(url, "html-fetch").await?;
        parse_html(&html, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html lang="en-GB">
<head>
  <title> Acme &amp; Co </title>
  <meta name="description" content="We sell anvils.">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <meta property="og:title" content="Acme">
  <meta property='og:image' content='https://cdn.acme.test/og.png'>
  <meta name="twitter:card" content="summary_large_image">
  <link rel="canonical" href="https://acme.test/">
  <link rel="icon" href="/favicon.ico">
  <script type="application/ld+json">{"@type": "Organization", "name": "Acme"}</script>
  <script type="application/ld+json">{not json</script>
</head>
<body>
  <h1>Best <em>anvils</em></h1>
  <h2>Why us</h2><h2>  </h2>
  <img src="/a.png" alt="An anvil" width="640" height="480px">
  <img src="/b.png">
  <a href="/about">About</a>
  <a href="https://acme.test/about">About again</a>
  <a href="https://other.test/x">Partner</a>
  <a href="mailto:hi@acme.test">Mail</a>
  <form action="/subscribe"></form>
  <script>var hidden = "words that do not count";</script>
  <p>Three more words</p>
</body>
</html>"#;

    #[test]
    fn test_parse_html_extracts_structure() {
        let data = parse_html(PAGE, "https://acme.test/").unwrap();
        assert_eq!(data.title.as_deref(), Some("Acme & Co"));
        assert_eq!(data.meta_description.as_deref(), Some("We sell anvils."));
        assert_eq!(data.canonical_url.as_deref(), Some("https://acme.test/"));
        assert_eq!(data.headings.h1, vec!["Best anvils"]);
        assert_eq!(data.headings.h2, vec!["Why us"]);
        assert_eq!(data.language.as_deref(), Some("en-GB"));
        assert_eq!(data.favicon.as_deref(), Some("/favicon.ico"));
        assert!(data.viewport.is_some());
        assert_eq!(data.forms, 1);
        assert_eq!(data.schema_org.len(), 1);
    }

    #[test]
    fn test_parse_html_images_and_links() {
        let data = parse_html(PAGE, "https://acme.test/").unwrap();
        assert_eq!(data.images.len(), 2);
        assert_eq!(data.images[0].alt.as_deref(), Some("An anvil"));
        assert_eq!(data.images[0].width, Some(640));
        assert_eq!(data.images[0].height, Some(480));
        assert_eq!(data.images[1].alt, None);

        assert_eq!(data.links.internal, vec!["https://acme.test/about"]);
        assert_eq!(data.links.external, vec!["https://other.test/x"]);
    }

    #[test]
    fn test_parse_html_social_tags() {
        let data = parse_html(PAGE, "https://acme.test/").unwrap();
        assert_eq!(data.og_tags.title.as_deref(), Some("Acme"));
        assert_eq!(
            data.og_tags.image.as_deref(),
            Some("https://cdn.acme.test/og.png")
        );
        assert_eq!(
            data.twitter_card.card.as_deref(),
            Some("summary_large_image")
        );
        assert_eq!(data.og_tags.description, None);
    }

    #[test]
    fn test_word_count_skips_scripts() {
        let data = parse_html(PAGE, "https://acme.test/").unwrap();
        // body text: Best anvils / Why us / About / About again / Partner / Mail / Three more words
        assert_eq!(data.word_count, 12);
    }
}
