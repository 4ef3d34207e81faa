mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lcaudit::collectors::{tier_of, Tier, COLLECTORS};
use lcaudit::error::AuditError;
use lcaudit::model::HtmlData;

use common::*;

#[test]
fn test_three_required_collectors() {
    let required: Vec<_> = COLLECTORS
        .iter()
        .filter(|(_, tier)| *tier == Tier::Required)
        .map(|(name, _)| *name)
        .collect();
    assert_eq!(required, vec!["screenshots", "lighthouse", "html"]);
    assert_eq!(COLLECTORS.len(), 10);
    assert_eq!(tier_of("serp"), Some(Tier::Optional));
    assert_eq!(tier_of("nope"), None);
}

fn fail_by_name(suite: &mut lcaudit::collectors::CollectorSuite, name: &str) {
    match name {
        "screenshots" => suite.screenshots = fail("down"),
        "lighthouse" => suite.lighthouse = fail("down"),
        "html" => suite.html = fail("down"),
        "robots" => suite.robots = fail("down"),
        "sitemap" => suite.sitemap = fail("down"),
        "sslDns" => suite.ssl_dns = fail("down"),
        "securityHeaders" => suite.security_headers = fail("down"),
        "serp" => suite.serp = fail("down"),
        "linkCheck" => suite.link_check = fail("down"),
        "techStack" => suite.tech_stack = fail("down"),
        other => panic!("no collector named {other}"),
    }
}

#[tokio::test]
async fn test_tier_table_decides_what_fails_the_job() {
    for (name, tier) in COLLECTORS {
        let mut suite = healthy_suite(Duration::from_secs(1));
        fail_by_name(&mut suite, name);
        let result = suite.collect(&job()).await;

        match tier {
            Tier::Required => {
                let Err(AuditError::RequiredCollectors { failed }) = result else {
                    panic!("{name} is required but the job did not fail");
                };
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].name, *name);
            }
            Tier::Optional => {
                let data = result.unwrap_or_else(|e| panic!("{name} is optional but got {e}"));
                assert_eq!(data.missing_optional(), vec![*name]);
            }
        }
    }
}

#[tokio::test]
async fn test_all_collectors_succeed() {
    let data = healthy_suite(Duration::from_secs(1))
        .collect(&job())
        .await
        .unwrap();
    assert!(data.missing_optional().is_empty());
    assert_eq!(data.html.word_count, 640);
}

#[tokio::test(start_paused = true)]
async fn test_required_failures_are_all_named() {
    let mut suite = healthy_suite(Duration::from_millis(50));
    suite.lighthouse = hang();
    suite.html = fail("connection refused");

    let err = suite.collect(&job()).await.unwrap_err();
    let AuditError::RequiredCollectors { failed } = &err else {
        panic!("expected RequiredCollectors, got {err:?}");
    };
    let names: Vec<_> = failed.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["lighthouse", "html"]);
    assert_eq!(failed[0].message, "lighthouse timed out after 50ms");
    assert_eq!(failed[1].message, "connection refused");
    assert_eq!(err.code(), "required_data_unavailable");
    assert!(err.to_string().contains("html: connection refused"));
}

#[tokio::test(start_paused = true)]
async fn test_optional_failures_become_none() {
    let mut suite = healthy_suite(Duration::from_millis(50));
    suite.robots = fail("404");
    suite.serp = hang();
    suite.tech_stack = fail("blocked");

    let data = suite.collect(&job()).await.unwrap();
    assert!(data.robots.is_none());
    assert!(data.serp.is_none());
    assert!(data.tech_stack.is_none());
    assert!(data.sitemap.is_some());
    assert_eq!(data.missing_optional(), vec!["robots", "serp", "techStack"]);
}

#[tokio::test(start_paused = true)]
async fn test_early_inputs_do_not_wait_for_slow_collectors() {
    let mut suite = healthy_suite(Duration::from_secs(60));
    suite.lighthouse = Arc::new(|_url: String, _id: String| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok::<_, anyhow::Error>(lighthouse())
    });

    let start = tokio::time::Instant::now();
    let run = suite.start(&job());
    let early = run.early_inputs().await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(30));
    assert_eq!(early.html.word_count, 640);

    run.finish().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test]
async fn test_units_run_once_when_observed_twice() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut suite = healthy_suite(Duration::from_secs(1));
    suite.html = Arc::new(move |_url: String, _id: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<HtmlData, anyhow::Error>(html()) }
    });

    let run = suite.start(&job());
    run.early_inputs().await.unwrap();
    run.early_inputs().await.unwrap();
    run.finish().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_early_inputs_fail_with_required_unit() {
    let mut suite = healthy_suite(Duration::from_secs(1));
    suite.screenshots = fail("SCREENSHOTONE_API_KEY not configured");

    let run = suite.start(&job());
    let err = run.early_inputs().await.unwrap_err();
    assert_eq!(err.to_string(), "SCREENSHOTONE_API_KEY not configured");
    assert!(run.finish().await.is_err());
}
