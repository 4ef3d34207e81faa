use async_trait::async_trait;
use url::Url;

use super::http::CollectorHttp;
use super::Collector;
use crate::config::MAX_REDIRECTS;
use crate::model::{RedirectHop, SslDnsData};

pub struct SslDnsCollector {
    http: CollectorHttp,
}

impl SslDnsCollector {
    pub fn new(http: CollectorHttp) -> Self {
        Self { http }
    }

    /// Follow redirects by hand from `start`, recording each hop. Stops at
    /// the first non-3xx reply, a missing or bad Location, a transport
    /// error or the hop limit.
    pub async fn trace_redirects(&self, start: Url) -> Vec<RedirectHop> {
        let mut chain = Vec::new();
        let mut current = start;

        for _ in 0..MAX_REDIRECTS {
            let Ok(response) = self.http.manual.head(current.clone()).send().await else {
                break;
            };
            let status = response.status();
            chain.push(RedirectHop {
                url: current.to_string(),
                status_code: status.as_u16(),
            });

            if !status.is_redirection() {
                break;
            }
            let next = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| current.join(loc).ok());
            match next {
                Some(url) => current = url,
                None => break,
            }
        }

        chain
    }
}

#[async_trait]
impl Collector<SslDnsData> for SslDnsCollector {
    async fn collect(&self, url: &str, _audit_id: &str) -> anyhow::Result<SslDnsData> {
        let parsed = Url::parse(url)?;
        let is_https = parsed.scheme() == "https";

        let mut http_start = parsed.clone();
        http_start
            .set_scheme("http")
            .map_err(|_| anyhow::anyhow!("cannot trace redirects for {url}"))?;
        http_start.set_query(None);
        http_start.set_fragment(None);

        let redirect_chain = self.trace_redirects(http_start).await;

        Ok(SslDnsData {
            is_https,
            // Certificate details are not exposed by the HTTP client.
            cert_issuer: None,
            cert_expiry: None,
            protocol: Some(if is_https { "https" } else { "http" }.to_string()),
            redirect_chain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_trace_records_each_hop() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", "/new"),
            )
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let collector = SslDnsCollector::new(CollectorHttp::new());
        let start = Url::parse(&format!("{}/old", server.uri())).unwrap();
        let chain = collector.trace_redirects(start).await;

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].status_code, 301);
        assert!(chain[1].url.ends_with("/new"));
        assert_eq!(chain[1].status_code, 200);
    }

    #[tokio::test]
    async fn test_redirect_loop_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let collector = SslDnsCollector::new(CollectorHttp::new());
        let start = Url::parse(&format!("{}/loop", server.uri())).unwrap();
        assert_eq!(collector.trace_redirects(start).await.len(), MAX_REDIRECTS);
    }
}
