use async_trait::async_trait;
use futures::future::join_all;
use url::Url;

use super::html::extract_links;
use super::http::CollectorHttp;
use super::Collector;
use crate::config::MAX_INTERNAL_LINKS_TO_CHECK;
use crate::model::{BrokenLink, LinkCheckData, RedirectLink};

pub struct LinkCheckCollector {
    http: CollectorHttp,
}

impl LinkCheckCollector {
    pub fn new(http: CollectorHttp) -> Self {
        Self { http }
    }

    /// HEAD without following redirects. `None` on a transport error.
    async fn probe(&self, link: &str) -> Option<(u16, Option<String>)> {
        let response = self.http.manual.head(link).send().await.ok()?;
        let status = response.status();
        let location = status
            .is_redirection()
            .then(|| {
                response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .flatten();
        Some((status.as_u16(), location))
    }
}

#[async_trait]
impl Collector<LinkCheckData> for LinkCheckCollector {
    async fn collect(&self, url: &str, _audit_id: &str) -> anyhow::Result<LinkCheckData> {
        // Fetches its own copy of the page so it never waits on the html collector.
        let html = self.http.fetch_text(url, "link-check-html").await?;
        let base = Url::parse(url)?;

        let links: Vec<String> = extract_links(&html, &base)
            .internal
            .into_iter()
            .take(MAX_INTERNAL_LINKS_TO_CHECK)
            .collect();

        let probes = join_all(links.iter().map(|link| self.probe(link))).await;

        let mut broken = Vec::new();
        let mut redirects = Vec::new();
        for (link, probe) in links.iter().zip(probes) {
            let Some((status_code, location)) = probe else {
                continue;
            };
            if status_code >= 400 {
                broken.push(BrokenLink {
                    url: link.clone(),
                    status_code,
                    source_url: url.to_string(),
                });
            } else if (300..400).contains(&status_code) {
                if let Some(redirects_to) = location {
                    redirects.push(RedirectLink {
                        url: link.clone(),
                        redirects_to,
                        status_code,
                    });
                }
            }
        }

        Ok(LinkCheckData {
            total_checked: links.len(),
            broken,
            redirects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sorts_links_into_broken_and_redirects() {
        let server = MockServer::start().await;
        let page = r#"<body>
            <a href="/ok">ok</a>
            <a href="/gone">gone</a>
            <a href="/moved">moved</a>
            <a href="https://elsewhere.test/">external</a>
        </body>"#;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/ok"))
            .mount(&server)
            .await;

        let page_url = format!("{}/", server.uri());
        let data = LinkCheckCollector::new(CollectorHttp::new())
            .collect(&page_url, "a")
            .await
            .unwrap();

        assert_eq!(data.total_checked, 3);
        assert_eq!(data.broken.len(), 1);
        assert!(data.broken[0].url.ends_with("/gone"));
        assert_eq!(data.broken[0].status_code, 404);
        assert_eq!(data.broken[0].source_url, page_url);
        assert_eq!(data.redirects.len(), 1);
        assert_eq!(data.redirects[0].redirects_to, "/ok");
    }
}
