use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use url::Url;

use super::http::CollectorHttp;
use super::Collector;
use crate::config::{
    SCREENSHOTONE_API_URL, SCREENSHOT_DESKTOP, SCREENSHOT_FULL_PAGE_MAX_HEIGHT, SCREENSHOT_MOBILE,
};
use crate::detached::DetachedTasks;
use crate::model::ScreenshotData;
use crate::retry::with_backoff;
use crate::storage::{ReportStore, Viewport};

/// Captures full-page desktop and mobile PNGs through ScreenshotOne.
///
/// The images are uploaded to the store in the background; the returned
/// URLs are the deterministic ones the store will serve them from.
pub struct ScreenshotCollector {
    http: CollectorHttp,
    api_key: Option<String>,
    endpoint: String,
    store: Arc<dyn ReportStore>,
    detached: DetachedTasks,
}

impl ScreenshotCollector {
    pub fn new(
        http: CollectorHttp,
        api_key: Option<String>,
        store: Arc<dyn ReportStore>,
        detached: DetachedTasks,
    ) -> Self {
        Self {
            http,
            api_key,
            endpoint: SCREENSHOTONE_API_URL.to_string(),
            store,
            detached,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn capture(&self, url: &str, api_key: &str, viewport: Viewport) -> anyhow::Result<Bytes> {
        let (width, height) = match viewport {
            Viewport::Desktop => SCREENSHOT_DESKTOP,
            Viewport::Mobile => SCREENSHOT_MOBILE,
        };
        let width = width.to_string();
        let height = height.to_string();
        let max_height = SCREENSHOT_FULL_PAGE_MAX_HEIGHT.to_string();
        let request_url = Url::parse_with_params(
            &self.endpoint,
            &[
                ("access_key", api_key),
                ("url", url),
                ("viewport_width", width.as_str()),
                ("viewport_height", height.as_str()),
                ("format", "png"),
                ("full_page", "true"),
                ("full_page_max_height", max_height.as_str()),
                ("delay", "3"),
                ("cache", "false"),
                ("block_cookie_banners", "true"),
                ("block_banners_by_heuristics", "true"),
                ("block_chats", "true"),
                ("block_ads", "true"),
            ],
        )?;

        let label = format!("screenshot-{}", viewport.as_str());
        with_backoff(&label, self.http.backoff, || async {
            let response = self
                .http
                .follow
                .get(request_url.clone())
                .send()
                .await
                .context("ScreenshotOne request failed")?;
            if !response.status().is_success() {
                anyhow::bail!("ScreenshotOne error ({}): {}", viewport.as_str(), response.status());
            }
            let png = response.bytes().await.context("ScreenshotOne body")?;
            if png.is_empty() {
                anyhow::bail!("ScreenshotOne returned an empty {} image", viewport.as_str());
            }
            Ok(png)
        })
        .await
    }

    fn upload(&self, audit_id: &str, viewport: Viewport, png: Bytes) {
        let store = self.store.clone();
        let audit_id = audit_id.to_string();
        self.detached
            .spawn(format!("upload {} screenshot", viewport.as_str()), async move {
                store.store_screenshot(&audit_id, viewport, png).await?;
                Ok(())
            });
    }
}

#[async_trait]
impl Collector<ScreenshotData> for ScreenshotCollector {
    async fn collect(&self, url: &str, audit_id: &str) -> anyhow::Result<ScreenshotData> {
        let api_key = self
            .api_key
            .as_deref()
            .context("SCREENSHOTONE_API_KEY not configured")?;

        let (desktop, mobile) = tokio::try_join!(
            self.capture(url, api_key, Viewport::Desktop),
            self.capture(url, api_key, Viewport::Mobile)
        )?;

        self.upload(audit_id, Viewport::Desktop, desktop);
        self.upload(audit_id, Viewport::Mobile, mobile);

        Ok(ScreenshotData {
            desktop: self.store.screenshot_url(audit_id, Viewport::Desktop),
            mobile: self.store.screenshot_url(audit_id, Viewport::Mobile),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_capture::LogState;
    use crate::storage::LocalStore;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn setup(dir: &tempfile::TempDir) -> (Arc<dyn ReportStore>, DetachedTasks) {
        let store = LocalStore::open(
            dir.path(),
            &dir.path().join("history.db"),
            "http://localhost:3000",
        )
        .unwrap();
        (Arc::new(store), DetachedTasks::new(Arc::new(LogState::new())))
    }

    #[tokio::test]
    async fn test_captures_both_viewports_and_uploads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("viewport_width", "1440"))
            .and(query_param("full_page", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"desktop-png".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("viewport_width", "390"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mobile-png".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (store, detached) = setup(&dir);
        let collector =
            ScreenshotCollector::new(CollectorHttp::new(), Some("key".into()), store.clone(), detached.clone())
                .with_endpoint(server.uri());

        let data = collector.collect("https://acme.test/", "abc123").await.unwrap();
        assert_eq!(data.desktop, "http://localhost:3000/audits/abc123/desktop.png");
        assert_eq!(data.mobile, "http://localhost:3000/audits/abc123/mobile.png");

        let mut stored = None;
        for _ in 0..50 {
            stored = store.read_file("abc123", "mobile.png").await.unwrap();
            if stored.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stored.as_deref(), Some(&b"mobile-png"[..]));
        assert_eq!(detached.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (store, detached) = setup(&dir);
        let collector = ScreenshotCollector::new(CollectorHttp::new(), None, store, detached);
        let err = collector.collect("https://acme.test/", "abc123").await.unwrap_err();
        assert!(err.to_string().contains("SCREENSHOTONE_API_KEY"));
    }
}
