use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use super::http::CollectorHttp;
use super::Collector;
use crate::model::RobotsData;

/// Values of every `directive:` line, with the directive matched
/// case-insensitively and empty values dropped.
fn directive_values(content: &str, directive: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once(':')?;
            if !key.trim().eq_ignore_ascii_case(directive) {
                return None;
            }
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        })
        .collect()
}

pub fn parse_robots(content: &str) -> RobotsData {
    RobotsData {
        exists: true,
        content: Some(content.to_string()),
        disallow_rules: directive_values(content, "disallow"),
        sitemap_refs: directive_values(content, "sitemap"),
    }
}

pub struct RobotsCollector {
    http: CollectorHttp,
}

impl RobotsCollector {
    pub fn new(http: CollectorHttp) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Collector<RobotsData> for RobotsCollector {
    async fn collect(&self, url: &str, _audit_id: &str) -> anyhow::Result<RobotsData> {
        let robots_url = Url::parse(url)?.join("/robots.txt")?;
        let response = self.http.fetch_any(robots_url.as_str(), "robots-fetch").await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(RobotsData {
                exists: false,
                content: None,
                disallow_rules: vec![],
                sitemap_refs: vec![],
            });
        }
        if !response.status().is_success() {
            anyhow::bail!("robots.txt fetch failed: {}", response.status());
        }

        let content = response.text().await.context("robots.txt body")?;
        Ok(parse_robots(&content))
    }
}
