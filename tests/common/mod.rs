#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lcaudit::analysers::AnalyserSuite;
use lcaudit::collectors::{Collector, CollectorSuite};
use lcaudit::job::TargetJob;
use lcaudit::log_capture::LogState;
use lcaudit::model::*;
use lcaudit::pipeline::AuditPipeline;
use lcaudit::providers::ProviderRegistry;
use lcaudit::state::AuditTracker;
use lcaudit::storage::{LocalStore, ReportStore};
use lcaudit::synthesis::Synthesizer;

pub fn job() -> TargetJob {
    TargetJob::new("https://acme.test/", PageLabel::Homepage).unwrap()
}

pub fn ok<T: Clone + Send + Sync + 'static>(value: T) -> Arc<dyn Collector<T>> {
    Arc::new(move |_url: String, _id: String| {
        let value = value.clone();
        async move { Ok::<T, anyhow::Error>(value) }
    })
}

pub fn fail<T: Send + 'static>(message: &'static str) -> Arc<dyn Collector<T>> {
    Arc::new(move |_url: String, _id: String| async move {
        Err::<T, anyhow::Error>(anyhow::anyhow!(message))
    })
}

/// Never resolves; only the unit timeout ends it.
pub fn hang<T: Send + 'static>() -> Arc<dyn Collector<T>> {
    Arc::new(|_url: String, _id: String| async move {
        std::future::pending::<anyhow::Result<T>>().await
    })
}

pub fn screenshots() -> ScreenshotData {
    ScreenshotData {
        desktop: "https://cdn.test/desktop.png".into(),
        mobile: "https://cdn.test/mobile.png".into(),
    }
}

pub fn lighthouse() -> LighthouseData {
    let scores = LighthouseScores {
        performance: 72.0,
        accessibility: 88.0,
        best_practices: 92.0,
        seo: 90.0,
        lcp: 3100.0,
        cls: 0.05,
        tbt: 240.0,
        fcp: 1500.0,
        si: 2800.0,
        tti: 4200.0,
    };
    LighthouseData {
        mobile: scores.clone(),
        desktop: scores,
        diagnostics: Vec::new(),
    }
}

pub fn html() -> HtmlData {
    HtmlData {
        title: Some("Acme Widgets | Handmade widgets".into()),
        meta_description: Some("Handmade widgets shipped worldwide.".into()),
        headings: Headings {
            h1: vec!["Acme Widgets".into()],
            h2: vec!["Shop".into(), "About".into()],
            h3: Vec::new(),
        },
        og_tags: OgTags {
            title: Some("Acme Widgets".into()),
            image: Some("https://acme.test/og.png".into()),
            ..Default::default()
        },
        forms: 1,
        word_count: 640,
        language: Some("en".into()),
        viewport: Some("width=device-width, initial-scale=1".into()),
        ..Default::default()
    }
}

pub fn robots() -> RobotsData {
    RobotsData {
        exists: true,
        content: Some("User-agent: *\nAllow: /".into()),
        disallow_rules: Vec::new(),
        sitemap_refs: vec!["https://acme.test/sitemap.xml".into()],
    }
}

pub fn sitemap() -> SitemapData {
    SitemapData {
        exists: true,
        url_count: 12,
        sample_urls: vec!["https://acme.test/".into()],
        lastmod: None,
    }
}

pub fn ssl_dns() -> SslDnsData {
    SslDnsData {
        is_https: true,
        cert_issuer: None,
        cert_expiry: None,
        protocol: Some("HTTP/2".into()),
        redirect_chain: Vec::new(),
    }
}

pub fn security_headers() -> SecurityHeadersData {
    let mut headers = BTreeMap::new();
    headers.insert(
        "strict-transport-security".to_string(),
        Some("max-age=31536000".to_string()),
    );
    headers.insert("content-security-policy".to_string(), None);
    SecurityHeadersData {
        headers,
        missing_headers: vec!["content-security-policy".into()],
        grade: Some("C".into()),
    }
}

pub fn serp() -> SerpData {
    SerpData {
        indexed_pages: Some(40),
        homepage_snippet: None,
        brand_search_present: true,
        top_results: Vec::new(),
    }
}

pub fn link_check() -> LinkCheckData {
    LinkCheckData {
        total_checked: 8,
        broken: Vec::new(),
        redirects: Vec::new(),
    }
}

pub fn tech_stack() -> TechStackData {
    TechStackData {
        platform: Some("Shopify".into()),
        theme: None,
        detected_apps: Vec::new(),
        third_party_scripts: Vec::new(),
        third_party_count: 0,
    }
}

/// Every collector succeeds immediately.
pub fn healthy_suite(timeout: Duration) -> CollectorSuite {
    CollectorSuite {
        timeout,
        screenshots: ok(screenshots()),
        lighthouse: ok(lighthouse()),
        html: ok(html()),
        robots: ok(robots()),
        sitemap: ok(sitemap()),
        ssl_dns: ok(ssl_dns()),
        security_headers: ok(security_headers()),
        serp: ok(serp()),
        link_check: ok(link_check()),
        tech_stack: ok(tech_stack()),
    }
}

pub fn store(dir: &tempfile::TempDir) -> Arc<dyn ReportStore> {
    Arc::new(
        LocalStore::open(
            dir.path(),
            &dir.path().join("history.db"),
            "http://localhost:3000",
        )
        .unwrap(),
    )
}

/// Pipeline over `collectors` with no providers configured, so every
/// analyser uses its heuristic and synthesis is local.
pub fn pipeline(
    collectors: CollectorSuite,
    store: Arc<dyn ReportStore>,
    tracker: Arc<AuditTracker>,
    logs: Arc<LogState>,
) -> AuditPipeline {
    let registry = ProviderRegistry::new();
    let timeout = Duration::from_secs(5);
    AuditPipeline::new(
        collectors,
        AnalyserSuite::from_registry(&registry, timeout),
        Synthesizer::new(&registry, timeout),
        store,
        tracker,
        logs,
    )
}

/// A full bundle with every optional field present.
pub fn collected() -> CollectedData {
    CollectedData {
        screenshots: screenshots(),
        lighthouse: lighthouse(),
        html: html(),
        robots: Some(robots()),
        sitemap: Some(sitemap()),
        ssl_dns: Some(ssl_dns()),
        security_headers: Some(security_headers()),
        serp: Some(serp()),
        link_check: Some(link_check()),
        tech_stack: Some(tech_stack()),
    }
}

pub fn section_result(section: Section, rating: Rating, score: u8) -> AnalysisResult {
    AnalysisResult {
        section_title: section.title().to_string(),
        eli5_summary: format!("{} summary", section.title()),
        why_it_matters: "It matters.".into(),
        overall_rating: rating,
        score,
        findings: Vec::new(),
    }
}
