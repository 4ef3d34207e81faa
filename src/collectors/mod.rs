//! Data collectors and the orchestrator that fans them out.
//!
//! Every collector runs once per job, in its own task, under the same
//! timeout. Three of them are required: if any of those fails the job
//! fails, naming every failed one. The rest are optional and simply come
//! back as `None`.

mod html;
mod http;
mod lighthouse;
mod link_check;
mod robots;
mod screenshots;
mod security_headers;
mod serp;
mod sitemap;
mod ssl_dns;
mod tech_stack;

pub use html::{parse_html, HtmlCollector};
pub use http::CollectorHttp;
pub use lighthouse::{parse_pagespeed, LighthouseCollector};
pub use link_check::LinkCheckCollector;
pub use robots::{parse_robots, RobotsCollector};
pub use screenshots::ScreenshotCollector;
pub use security_headers::{security_grade, SecurityHeadersCollector};
pub use serp::SerpCollector;
pub use sitemap::{parse_sitemap, SitemapCollector};
pub use ssl_dns::SslDnsCollector;
pub use tech_stack::{detect_tech_stack, TechStackCollector};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{info, info_span, warn, Instrument};

use crate::config::AuditConfig;
use crate::detached::DetachedTasks;
use crate::error::{AuditError, FailedUnit};
use crate::job::TargetJob;
use crate::model::{
    CollectedData, HtmlData, LighthouseData, LinkCheckData, RobotsData, ScreenshotData,
    SecurityHeadersData, SerpData, SitemapData, SslDnsData, TechStackData,
};
use crate::storage::ReportStore;
use crate::unit::{run_unit, UnitError, UnitOutcome};

#[async_trait]
pub trait Collector<T>: Send + Sync {
    async fn collect(&self, url: &str, audit_id: &str) -> anyhow::Result<T>;
}

/// Any `Fn(url, audit_id) -> Future<anyhow::Result<T>>` is a collector.
#[async_trait]
impl<T, F, Fut> Collector<T> for F
where
    F: Fn(String, String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send,
    T: Send + 'static,
{
    async fn collect(&self, url: &str, audit_id: &str) -> anyhow::Result<T> {
        (self)(url.to_string(), audit_id.to_string()).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Required,
    Optional,
}

/// Every collector, in the order `CollectedData` lists them.
pub const COLLECTORS: &[(&str, Tier)] = &[
    ("screenshots", Tier::Required),
    ("lighthouse", Tier::Required),
    ("html", Tier::Required),
    ("robots", Tier::Optional),
    ("sitemap", Tier::Optional),
    ("sslDns", Tier::Optional),
    ("securityHeaders", Tier::Optional),
    ("serp", Tier::Optional),
    ("linkCheck", Tier::Optional),
    ("techStack", Tier::Optional),
];

pub fn tier_of(name: &str) -> Option<Tier> {
    COLLECTORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, tier)| *tier)
}

/// The subset of collected data the early analyser needs.
#[derive(Debug, Clone)]
pub struct EarlyData {
    pub screenshots: ScreenshotData,
    pub html: HtmlData,
}

pub struct CollectorSuite {
    pub timeout: Duration,
    pub screenshots: Arc<dyn Collector<ScreenshotData>>,
    pub lighthouse: Arc<dyn Collector<LighthouseData>>,
    pub html: Arc<dyn Collector<HtmlData>>,
    pub robots: Arc<dyn Collector<RobotsData>>,
    pub sitemap: Arc<dyn Collector<SitemapData>>,
    pub ssl_dns: Arc<dyn Collector<SslDnsData>>,
    pub security_headers: Arc<dyn Collector<SecurityHeadersData>>,
    pub serp: Arc<dyn Collector<SerpData>>,
    pub link_check: Arc<dyn Collector<LinkCheckData>>,
    pub tech_stack: Arc<dyn Collector<TechStackData>>,
}

impl CollectorSuite {
    /// The real network collectors.
    pub fn from_config(
        config: &AuditConfig,
        store: Arc<dyn ReportStore>,
        detached: DetachedTasks,
    ) -> Self {
        let http = CollectorHttp::new();
        let keys = &config.keys;
        Self {
            timeout: config.collector_timeout,
            screenshots: Arc::new(ScreenshotCollector::new(
                http.clone(),
                keys.screenshotone.clone(),
                store,
                detached,
            )),
            lighthouse: Arc::new(LighthouseCollector::new(http.clone(), keys.pagespeed.clone())),
            html: Arc::new(HtmlCollector::new(http.clone())),
            robots: Arc::new(RobotsCollector::new(http.clone())),
            sitemap: Arc::new(SitemapCollector::new(http.clone())),
            ssl_dns: Arc::new(SslDnsCollector::new(http.clone())),
            security_headers: Arc::new(SecurityHeadersCollector::new(http.clone())),
            serp: Arc::new(SerpCollector::new(http.clone(), keys.google_cse.clone())),
            link_check: Arc::new(LinkCheckCollector::new(http.clone())),
            tech_stack: Arc::new(TechStackCollector::new(http)),
        }
    }

    /// Spawn every collector for `job`. Nothing is awaited here.
    pub fn start(&self, job: &TargetJob) -> CollectionRun {
        let mut aborts = Vec::with_capacity(COLLECTORS.len());
        let t = self.timeout;

        CollectionRun {
            audit_id: job.audit_id.clone(),
            screenshots: spawn_unit("screenshots", t, self.screenshots.clone(), job, &mut aborts),
            lighthouse: spawn_unit("lighthouse", t, self.lighthouse.clone(), job, &mut aborts),
            html: spawn_unit("html", t, self.html.clone(), job, &mut aborts),
            robots: spawn_unit("robots", t, self.robots.clone(), job, &mut aborts),
            sitemap: spawn_unit("sitemap", t, self.sitemap.clone(), job, &mut aborts),
            ssl_dns: spawn_unit("sslDns", t, self.ssl_dns.clone(), job, &mut aborts),
            security_headers: spawn_unit(
                "securityHeaders",
                t,
                self.security_headers.clone(),
                job,
                &mut aborts,
            ),
            serp: spawn_unit("serp", t, self.serp.clone(), job, &mut aborts),
            link_check: spawn_unit("linkCheck", t, self.link_check.clone(), job, &mut aborts),
            tech_stack: spawn_unit("techStack", t, self.tech_stack.clone(), job, &mut aborts),
            aborts,
        }
    }

    /// Run every collector and wait for all of them.
    pub async fn collect(&self, job: &TargetJob) -> Result<CollectedData, AuditError> {
        self.start(job).finish().await
    }
}

type SharedOutcome<T> = Shared<BoxFuture<'static, UnitOutcome<T>>>;

fn spawn_unit<T>(
    name: &'static str,
    timeout: Duration,
    collector: Arc<dyn Collector<T>>,
    job: &TargetJob,
    aborts: &mut Vec<AbortHandle>,
) -> SharedOutcome<T>
where
    T: Clone + Send + Sync + 'static,
{
    let url = job.url.clone();
    let audit_id = job.audit_id.clone();
    let span = info_span!("collector", audit_id = %audit_id, unit = name);

    let handle = tokio::spawn(
        async move { run_unit(name, timeout, collector.collect(&url, &audit_id)).await }
            .instrument(span),
    );
    aborts.push(handle.abort_handle());

    async move {
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => UnitOutcome {
                name: name.to_string(),
                elapsed: Duration::ZERO,
                result: Err(UnitError::Failed(if e.is_cancelled() {
                    format!("{name} was cancelled")
                } else {
                    format!("{name} panicked")
                })),
            },
        }
    }
    .boxed()
    .shared()
}

/// Collectors in flight for one job. Each outcome is computed once and can
/// be observed both by [`CollectionRun::early_inputs`] and by
/// [`CollectionRun::finish`]. Dropping the run aborts whatever is still
/// running.
pub struct CollectionRun {
    audit_id: String,
    screenshots: SharedOutcome<ScreenshotData>,
    lighthouse: SharedOutcome<LighthouseData>,
    html: SharedOutcome<HtmlData>,
    robots: SharedOutcome<RobotsData>,
    sitemap: SharedOutcome<SitemapData>,
    ssl_dns: SharedOutcome<SslDnsData>,
    security_headers: SharedOutcome<SecurityHeadersData>,
    serp: SharedOutcome<SerpData>,
    link_check: SharedOutcome<LinkCheckData>,
    tech_stack: SharedOutcome<TechStackData>,
    aborts: Vec<AbortHandle>,
}

impl CollectionRun {
    /// Resolves as soon as screenshots and html have settled.
    pub fn early_inputs(&self) -> BoxFuture<'static, Result<EarlyData, UnitError>> {
        let screenshots = self.screenshots.clone();
        let html = self.html.clone();
        async move {
            let (s, h) = futures::join!(screenshots, html);
            Ok(EarlyData {
                screenshots: s.result?,
                html: h.result?,
            })
        }
        .boxed()
    }

    pub async fn finish(self) -> Result<CollectedData, AuditError> {
        let (screenshots, lighthouse, html) = futures::join!(
            self.screenshots.clone(),
            self.lighthouse.clone(),
            self.html.clone()
        );
        let (robots, sitemap, ssl_dns, security_headers, serp, link_check, tech_stack) = futures::join!(
            self.robots.clone(),
            self.sitemap.clone(),
            self.ssl_dns.clone(),
            self.security_headers.clone(),
            self.serp.clone(),
            self.link_check.clone(),
            self.tech_stack.clone()
        );

        let mut failed = Vec::new();
        let screenshots = settle(screenshots, &mut failed);
        let lighthouse = settle(lighthouse, &mut failed);
        let html = settle(html, &mut failed);
        let robots = settle(robots, &mut failed);
        let sitemap = settle(sitemap, &mut failed);
        let ssl_dns = settle(ssl_dns, &mut failed);
        let security_headers = settle(security_headers, &mut failed);
        let serp = settle(serp, &mut failed);
        let link_check = settle(link_check, &mut failed);
        let tech_stack = settle(tech_stack, &mut failed);

        let (screenshots, lighthouse, html) = match (screenshots, lighthouse, html) {
            (Some(s), Some(l), Some(h)) if failed.is_empty() => (s, l, h),
            _ => {
                warn!(
                    audit_id = %self.audit_id,
                    failed = failed.len(),
                    "Required collectors failed"
                );
                return Err(AuditError::RequiredCollectors { failed });
            }
        };

        let data = CollectedData {
            screenshots,
            lighthouse,
            html,
            robots,
            sitemap,
            ssl_dns,
            security_headers,
            serp,
            link_check,
            tech_stack,
        };

        info!(
            audit_id = %self.audit_id,
            missing = ?data.missing_optional(),
            "Collection complete"
        );
        Ok(data)
    }
}

impl Drop for CollectionRun {
    fn drop(&mut self) {
        for handle in &self.aborts {
            handle.abort();
        }
    }
}

/// Sort a finished unit by its tier in [`COLLECTORS`]. A failed required
/// collector is added to `failed`; a failed optional one is logged and
/// comes back as `None`.
fn settle<T>(outcome: UnitOutcome<T>, failed: &mut Vec<FailedUnit>) -> Option<T> {
    let err = match outcome.result {
        Ok(v) => return Some(v),
        Err(e) => e,
    };
    match tier_of(&outcome.name) {
        Some(Tier::Required) => failed.push(FailedUnit {
            name: outcome.name,
            message: err.to_string(),
        }),
        _ => warn!(unit = %outcome.name, error = %err, "Optional collector unavailable"),
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_table() {
        assert_eq!(COLLECTORS.len(), 10);
        let required: Vec<_> = COLLECTORS
            .iter()
            .filter(|(_, t)| *t == Tier::Required)
            .map(|(n, _)| *n)
            .collect();
        assert_eq!(required, vec!["screenshots", "lighthouse", "html"]);
        assert_eq!(tier_of("serp"), Some(Tier::Optional));
        assert_eq!(tier_of("nope"), None);
    }
}
