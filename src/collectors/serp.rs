use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::http::CollectorHttp;
use super::Collector;
use crate::config::GOOGLE_CSE_API_URL;
use crate::model::{SerpData, SerpResult};
use crate::retry::with_backoff;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CseResponse {
    search_information: Option<SearchInformation>,
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchInformation {
    total_results: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    title: String,
    link: String,
    snippet: Option<String>,
}

pub struct SerpCollector {
    http: CollectorHttp,
    /// (api key, search engine id)
    keys: Option<(String, String)>,
    endpoint: String,
}

impl SerpCollector {
    pub fn new(http: CollectorHttp, keys: Option<(String, String)>) -> Self {
        Self {
            http,
            keys,
            endpoint: GOOGLE_CSE_API_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn search(&self, query: &str, api_key: &str, cse_id: &str) -> anyhow::Result<CseResponse> {
        let request_url = Url::parse_with_params(
            &self.endpoint,
            &[("key", api_key), ("cx", cse_id), ("q", query), ("num", "10")],
        )?;
        let label: String = format!("cse-search-{}", query.chars().take(20).collect::<String>());

        with_backoff(&label, self.http.backoff, || async {
            let response = self
                .http
                .follow
                .get(request_url.clone())
                .send()
                .await
                .context("Google CSE request failed")?;
            if !response.status().is_success() {
                anyhow::bail!("Google CSE error: {}", response.status());
            }
            response
                .json::<CseResponse>()
                .await
                .context("Google CSE response was not the expected shape")
        })
        .await
    }
}

fn summarise(domain: &str, site: CseResponse, brand: CseResponse) -> SerpData {
    let indexed_pages = site
        .search_information
        .and_then(|i| i.total_results)
        .and_then(|t| t.parse().ok());

    let brand_search_present = brand.items.iter().any(|item| {
        Url::parse(&item.link)
            .ok()
            .and_then(|u| u.host_str().map(|h| h == domain))
            .unwrap_or(false)
    });

    let homepage_snippet = site.items.first().and_then(|i| i.snippet.clone());
    let top_results = site
        .items
        .into_iter()
        .take(5)
        .map(|item| SerpResult {
            title: item.title,
            link: item.link,
            snippet: item.snippet.unwrap_or_default(),
        })
        .collect();

    SerpData {
        indexed_pages,
        homepage_snippet,
        brand_search_present,
        top_results,
    }
}

#[async_trait]
impl Collector<SerpData> for SerpCollector {
    async fn collect(&self, url: &str, _audit_id: &str) -> anyhow::Result<SerpData> {
        let (api_key, cse_id) = self
            .keys
            .as_ref()
            .context("Google CSE API keys not configured")?;

        let parsed = Url::parse(url)?;
        let domain = parsed.host_str().context("URL has no host")?.to_string();
        let brand_query = domain.replacen("www.", "", 1);
        let site_query = format!("site:{domain}");

        let (site, brand) = tokio::try_join!(
            self.search(&site_query, api_key, cse_id),
            self.search(&brand_query, api_key, cse_id)
        )?;

        Ok(summarise(&domain, site, brand))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_collect_combines_site_and_brand_searches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "site:www.acme.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "searchInformation": { "totalResults": "42" },
                "items": [
                    { "title": "Acme", "link": "https://www.acme.test/", "snippet": "Anvils since 1949" },
                    { "title": "About", "link": "https://www.acme.test/about" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("q", "acme.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{ "title": "Acme", "link": "https://www.acme.test/" }]
            })))
            .mount(&server)
            .await;

        let collector = SerpCollector::new(CollectorHttp::new(), Some(("k".into(), "cx".into())))
            .with_endpoint(server.uri());
        let data = collector
            .collect("https://www.acme.test/", "a")
            .await
            .unwrap();

        assert_eq!(data.indexed_pages, Some(42));
        assert_eq!(data.homepage_snippet.as_deref(), Some("Anvils since 1949"));
        assert!(data.brand_search_present);
        assert_eq!(data.top_results.len(), 2);
        assert_eq!(data.top_results[1].snippet, "");
    }

    #[tokio::test]
    async fn test_collect_without_keys_fails() {
        let collector = SerpCollector::new(CollectorHttp::new(), None);
        assert!(collector.collect("https://acme.test/", "a").await.is_err());
    }
}
