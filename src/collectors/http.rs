use anyhow::Context;
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::warn;

use crate::config::{COLLECTOR_HTTP_TIMEOUT_SECS, MAX_REDIRECTS, USER_AGENT};
use crate::retry::{with_backoff, Backoff};

/// Shared HTTP clients for the network collectors. `manual` never follows
/// redirects so the redirect tracer and link checker can see each hop.
#[derive(Clone)]
pub struct CollectorHttp {
    pub follow: Client,
    pub manual: Client,
    pub backoff: Backoff,
}

impl Default for CollectorHttp {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorHttp {
    pub fn new() -> Self {
        Self {
            follow: build_client(Policy::limited(MAX_REDIRECTS)),
            manual: build_client(Policy::none()),
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// GET `url` with retries, failing on a non-2xx status.
    pub async fn fetch_ok(&self, url: &str, label: &str) -> anyhow::Result<Response> {
        with_backoff(label, self.backoff, || async {
            let response = self
                .follow
                .get(url)
                .header("Accept", "text/html,application/xhtml+xml")
                .send()
                .await
                .with_context(|| format!("{label}: request to {url} failed"))?;
            if !response.status().is_success() {
                anyhow::bail!("{label} error: {}", response.status());
            }
            Ok(response)
        })
        .await
    }

    pub async fn fetch_text(&self, url: &str, label: &str) -> anyhow::Result<String> {
        let response = self.fetch_ok(url, label).await?;
        response
            .text()
            .await
            .with_context(|| format!("{label}: failed to read body"))
    }

    /// GET `url` with retries on transport errors only; any status is
    /// returned to the caller.
    pub async fn fetch_any(&self, url: &str, label: &str) -> anyhow::Result<Response> {
        with_backoff(label, self.backoff, || async {
            self.follow
                .get(url)
                .send()
                .await
                .with_context(|| format!("{label}: request to {url} failed"))
        })
        .await
    }
}

fn build_client(policy: Policy) -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(COLLECTOR_HTTP_TIMEOUT_SECS))
        .redirect(policy)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build collector HTTP client, using default");
            Client::new()
        })
}
