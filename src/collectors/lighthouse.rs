use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use super::http::CollectorHttp;
use super::Collector;
use crate::config::PAGESPEED_API_URL;
use crate::model::{LighthouseData, LighthouseDiagnostic, LighthouseScores};
use crate::retry::with_backoff;

const DIAGNOSTIC_AUDITS: &[&str] = &[
    "render-blocking-resources",
    "uses-optimized-images",
    "uses-responsive-images",
    "unminified-css",
    "unminified-javascript",
    "unused-css-rules",
    "unused-javascript",
    "efficient-animated-content",
    "duplicated-javascript",
    "legacy-javascript",
    "dom-size",
    "critical-request-chains",
    "redirects",
    "uses-rel-preconnect",
    "server-response-time",
    "bootup-time",
    "mainthread-work-breakdown",
    "font-display",
    "third-party-summary",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpeedResponse {
    lighthouse_result: LighthouseResult,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    #[serde(default)]
    categories: HashMap<String, Category>,
    #[serde(default)]
    audits: HashMap<String, Audit>,
}

#[derive(Debug, Deserialize)]
struct Category {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Audit {
    numeric_value: Option<f64>,
    title: Option<String>,
    description: Option<String>,
    score: Option<f64>,
}

impl PageSpeedResponse {
    fn scores(&self) -> LighthouseScores {
        let r = &self.lighthouse_result;
        let category = |key: &str| {
            (r.categories.get(key).and_then(|c| c.score).unwrap_or(0.0) * 100.0).round()
        };
        let metric = |key: &str| {
            r.audits
                .get(key)
                .and_then(|a| a.numeric_value)
                .unwrap_or(0.0)
        };
        LighthouseScores {
            performance: category("performance"),
            accessibility: category("accessibility"),
            best_practices: category("best-practices"),
            seo: category("seo"),
            lcp: metric("largest-contentful-paint"),
            cls: metric("cumulative-layout-shift"),
            tbt: metric("total-blocking-time"),
            fcp: metric("first-contentful-paint"),
            si: metric("speed-index"),
            tti: metric("interactive"),
        }
    }

    fn diagnostics(&self) -> Vec<LighthouseDiagnostic> {
        let audits = &self.lighthouse_result.audits;
        DIAGNOSTIC_AUDITS
            .iter()
            .filter_map(|key| {
                audits.get(*key).map(|a| LighthouseDiagnostic {
                    title: a.title.clone().unwrap_or_else(|| key.to_string()),
                    description: a.description.clone().unwrap_or_default(),
                    score: a.score,
                })
            })
            .collect()
    }
}

/// Combine mobile and desktop runs. Diagnostics come from the mobile run.
pub fn parse_pagespeed(mobile: &PageSpeedResponse, desktop: &PageSpeedResponse) -> LighthouseData {
    LighthouseData {
        mobile: mobile.scores(),
        desktop: desktop.scores(),
        diagnostics: mobile.diagnostics(),
    }
}

pub struct LighthouseCollector {
    http: CollectorHttp,
    api_key: Option<String>,
    endpoint: String,
}

impl LighthouseCollector {
    pub fn new(http: CollectorHttp, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            endpoint: PAGESPEED_API_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn run(&self, url: &str, api_key: &str, strategy: &str) -> anyhow::Result<PageSpeedResponse> {
        let request_url = url::Url::parse_with_params(
            &self.endpoint,
            &[
                ("url", url),
                ("key", api_key),
                ("strategy", strategy),
                ("category", "PERFORMANCE"),
                ("category", "ACCESSIBILITY"),
                ("category", "BEST_PRACTICES"),
                ("category", "SEO"),
            ],
        )?;
        let label = format!("pagespeed-{}", strategy.to_lowercase());

        with_backoff(&label, self.http.backoff, || async {
            let response = self
                .http
                .follow
                .get(request_url.clone())
                .send()
                .await
                .context("PageSpeed request failed")?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("PageSpeed Insights error {}: {}", status, body);
            }
            response
                .json::<PageSpeedResponse>()
                .await
                .context("PageSpeed response was not the expected shape")
        })
        .await
    }
}

#[async_trait]
impl Collector<LighthouseData> for LighthouseCollector {
    async fn collect(&self, url: &str, _audit_id: &str) -> anyhow::Result<LighthouseData> {
        let api_key = self
            .api_key
            .as_deref()
            .context("PAGESPEED_API_KEY is not configured")?;

        let (mobile, desktop) = tokio::try_join!(
            self.run(url, api_key, "MOBILE"),
            self.run(url, api_key, "DESKTOP")
        )?;
        Ok(parse_pagespeed(&mobile, &desktop))
    }
}
