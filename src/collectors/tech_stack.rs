use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::HeaderMap;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use super::html::{attr, opening_tags};
use super::http::CollectorHttp;
use super::Collector;
use crate::model::{DetectedApp, TechStackData, ThirdPartyScript};

static WP_THEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"wp-content/themes/([^/]+)").unwrap());
static NG_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"ng-version\s*=\s*["']([^"']+)["']"#).unwrap());

/// (needles, name, category). An app is detected when any needle appears in
/// the page source.
const APP_SIGNATURES: &[(&[&str], &str, &str)] = &[
    (&["google-analytics.com", "gtag"], "Google Analytics", "Analytics"),
    (&["googletagmanager.com"], "Google Tag Manager", "Tag Management"),
    (&["connect.facebook.net", "fbq("], "Meta Pixel", "Analytics"),
    (&["hotjar.com"], "Hotjar", "Analytics"),
    (&["clarity.ms"], "Microsoft Clarity", "Analytics"),
    (&["intercom.com", "Intercom("], "Intercom", "Customer Support"),
    (&["crisp.chat"], "Crisp", "Customer Support"),
    (&["tawk.to"], "Tawk.to", "Customer Support"),
    (&["drift.com", "Drift("], "Drift", "Customer Support"),
    (&["cdn.shopify.com/s/files", "shopify-buy"], "Shopify Buy Button", "eCommerce"),
    (&["fonts.googleapis.com", "fonts.gstatic.com"], "Google Fonts", "Font"),
    (&["use.typekit.net"], "Adobe Fonts", "Font"),
    (&["cdn.jsdelivr.net"], "jsDelivr", "CDN"),
    (&["__REACT_DEVTOOLS_GLOBAL_HOOK__", "__reactContainer", "data-reactroot"], "React", "JavaScript Framework"),
    (&["Vue.js", "data-v-"], "Vue.js", "JavaScript Framework"),
    (&["jquery", "jQuery"], "jQuery", "JavaScript Library"),
    (&["bootstrap", "container-fluid"], "Bootstrap", "CSS Framework"),
    (&["tailwindcss", "tailwind"], "Tailwind CSS", "CSS Framework"),
];

/// Third-party script domain fragments and what they're usually for.
const SCRIPT_PURPOSES: &[(&str, &str)] = &[
    ("google-analytics.com", "Analytics"),
    ("googletagmanager.com", "Tag Management"),
    ("connect.facebook.net", "Social / Advertising"),
    ("platform.twitter.com", "Social"),
    ("cdn.shopify.com", "eCommerce"),
    ("js.stripe.com", "Payments"),
    ("cdn.jsdelivr.net", "CDN"),
    ("cdnjs.cloudflare.com", "CDN"),
    ("unpkg.com", "CDN"),
    ("fonts.googleapis.com", "Fonts"),
    ("www.googleadservices.com", "Advertising"),
    ("pagead2.googlesyndication.com", "Advertising"),
    ("static.hotjar.com", "Analytics"),
    ("js.intercomcdn.com", "Customer Support"),
    ("widget.intercom.io", "Customer Support"),
    ("www.clarity.ms", "Analytics"),
    ("snap.licdn.com", "Social / Advertising"),
];

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn generator(html: &str) -> String {
    opening_tags(html, "meta")
        .into_iter()
        .find(|tag| {
            attr(tag, "name")
                .map(|n| n.eq_ignore_ascii_case("generator"))
                .unwrap_or(false)
        })
        .and_then(|tag| attr(tag, "content"))
        .unwrap_or_default()
        .to_lowercase()
}

fn detect_platform(html: &str, headers: &HeaderMap) -> Option<String> {
    let gen = generator(html);
    let platform = if gen.contains("wordpress") || html.contains("wp-content") {
        "WordPress"
    } else if html.contains("cdn.shopify.com") || html.contains("Shopify.theme") {
        "Shopify"
    } else if html.contains("static.wixstatic.com") || html.contains("wix-bolt") {
        "Wix"
    } else if html.contains("static.squarespace.com") || html.contains("squarespace") {
        "Squarespace"
    } else if html.contains("__NEXT_DATA__") || html.contains("/_next/") {
        "Next.js"
    } else if html.contains("__NUXT__") || html.contains("/_nuxt/") {
        "Nuxt"
    } else if header(headers, "x-powered-by").contains("Express") {
        "Express"
    } else if html.contains("__gatsby") {
        "Gatsby"
    } else if html.contains("data-drupal") || gen.contains("drupal") {
        "Drupal"
    } else if gen.contains("joomla") {
        "Joomla"
    } else if html.contains("webflow.com") || html.contains("wf-page") {
        "Webflow"
    } else {
        return None;
    };
    Some(platform.to_string())
}

fn detect_theme(html: &str) -> Option<String> {
    if let Some(c) = WP_THEME.captures(html) {
        return Some(c[1].to_string());
    }
    opening_tags(html, "meta")
        .into_iter()
        .find(|tag| attr(tag, "name").as_deref() == Some("theme-name"))
        .and_then(|tag| attr(tag, "content"))
}

fn detect_apps(html: &str, headers: &HeaderMap) -> Vec<DetectedApp> {
    let mut apps: Vec<DetectedApp> = APP_SIGNATURES
        .iter()
        .filter(|(needles, _, _)| needles.iter().any(|n| html.contains(n)))
        .map(|(_, name, category)| DetectedApp {
            name: name.to_string(),
            category: category.to_string(),
            version: None,
        })
        .collect();

    if header(headers, "server").to_lowercase().contains("cloudflare") || html.contains("cloudflare") {
        apps.push(DetectedApp {
            name: "Cloudflare".to_string(),
            category: "CDN".to_string(),
            version: None,
        });
    }

    if html.contains("ng-version") {
        apps.push(DetectedApp {
            name: "Angular".to_string(),
            category: "JavaScript Framework".to_string(),
            version: NG_VERSION.captures(html).map(|c| c[1].to_string()),
        });
    }

    apps
}

fn detect_third_party_scripts(html: &str, base: &Url) -> Vec<ThirdPartyScript> {
    let mut seen = HashSet::new();
    opening_tags(html, "script")
        .into_iter()
        .filter_map(|tag| attr(tag, "src"))
        .filter_map(|src| base.join(&src).ok())
        .filter_map(|u| u.host_str().map(str::to_string))
        .filter(|host| Some(host.as_str()) != base.host_str())
        .filter(|host| seen.insert(host.clone()))
        .map(|domain| ThirdPartyScript {
            purpose: SCRIPT_PURPOSES
                .iter()
                .find(|(key, _)| domain.contains(key))
                .map(|(_, p)| p.to_string()),
            domain,
        })
        .collect()
}

pub fn detect_tech_stack(html: &str, headers: &HeaderMap, base_url: &str) -> anyhow::Result<TechStackData> {
    let base = Url::parse(base_url)?;
    let third_party_scripts = detect_third_party_scripts(html, &base);
    Ok(TechStackData {
        platform: detect_platform(html, headers),
        theme: detect_theme(html),
        detected_apps: detect_apps(html, headers),
        third_party_count: third_party_scripts.len(),
        third_party_scripts,
    })
}

pub struct TechStackCollector {
    http: CollectorHttp,
}

impl TechStackCollector {
    pub fn new(http: CollectorHttp) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Collector<TechStackData> for TechStackCollector {
    async fn collect(&self, url: &str, _audit_id: &str) -> anyhow::Result<TechStackData> {
        let response = self.http.fetch_ok(url, "tech-stack-fetch").await?;
        let headers = response.headers().clone();
        let html = response.text().await.context("tech stack body")?;
        detect_tech_stack(&html, &headers, url)
    }
}
