use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use std::sync::LazyLock;
use url::Url;

use super::http::CollectorHttp;
use super::Collector;
use crate::config::MAX_SITEMAP_SAMPLE_URLS;
use crate::model::SitemapData;

static LOC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<loc>\s*(.*?)\s*</loc>").unwrap());
static LASTMOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<lastmod>\s*(.*?)\s*</lastmod>").unwrap());

pub fn parse_sitemap(xml: &str) -> SitemapData {
    let urls: Vec<String> = LOC.captures_iter(xml).map(|c| c[1].to_string()).collect();
    let lastmod = LASTMOD
        .captures_iter(xml)
        .last()
        .map(|c| c[1].to_string());

    SitemapData {
        exists: true,
        url_count: urls.len(),
        sample_urls: urls.into_iter().take(MAX_SITEMAP_SAMPLE_URLS).collect(),
        lastmod,
    }
}

pub struct SitemapCollector {
    http: CollectorHttp,
}

impl SitemapCollector {
    pub fn new(http: CollectorHttp) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Collector<SitemapData> for SitemapCollector {
    async fn collect(&self, url: &str, _audit_id: &str) -> anyhow::Result<SitemapData> {
        let sitemap_url = Url::parse(url)?.join("/sitemap.xml")?;
        let response = self
            .http
            .fetch_any(sitemap_url.as_str(), "sitemap-fetch")
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(SitemapData {
                exists: false,
                url_count: 0,
                sample_urls: vec![],
                lastmod: None,
            });
        }
        if !response.status().is_success() {
            anyhow::bail!("sitemap.xml fetch failed: {}", response.status());
        }

        let xml = response.text().await.context("sitemap.xml body")?;
        Ok(parse_sitemap(&xml))
    }
}
