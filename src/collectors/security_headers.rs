use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::collections::BTreeMap;

use super::http::CollectorHttp;
use super::Collector;
use crate::config::SECURITY_HEADERS;
use crate::model::SecurityHeadersData;

/// A for none missing, then B, C, D for up to four, F beyond that.
pub fn security_grade(missing: usize) -> &'static str {
    match missing {
        0 => "A",
        1 => "B",
        2 => "C",
        3 | 4 => "D",
        _ => "F",
    }
}

pub(crate) fn inspect_headers(headers: &HeaderMap) -> SecurityHeadersData {
    let mut values = BTreeMap::new();
    let mut missing = Vec::new();

    for name in SECURITY_HEADERS {
        let value = headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(|v| !v.is_empty());
        if value.is_none() {
            missing.push(name.to_string());
        }
        values.insert(name.to_string(), value);
    }

    SecurityHeadersData {
        grade: Some(security_grade(missing.len()).to_string()),
        headers: values,
        missing_headers: missing,
    }
}

pub struct SecurityHeadersCollector {
    http: CollectorHttp,
}

impl SecurityHeadersCollector {
    pub fn new(http: CollectorHttp) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Collector<SecurityHeadersData> for SecurityHeadersCollector {
    async fn collect(&self, url: &str, _audit_id: &str) -> anyhow::Result<SecurityHeadersData> {
        let response = self.http.follow.head(url).send().await?;
        Ok(inspect_headers(response.headers()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_grades() {
        assert_eq!(security_grade(0), "A");
        assert_eq!(security_grade(1), "B");
        assert_eq!(security_grade(2), "C");
        assert_eq!(security_grade(4), "D");
        assert_eq!(security_grade(5), "F");
        assert_eq!(security_grade(6), "F");
    }

    #[test]
    fn test_inspect_lists_missing_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("strict-transport-security", HeaderValue::from_static("max-age=63072000"));
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
        headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
        headers.insert("referrer-policy", HeaderValue::from_static("same-origin"));

        let data = inspect_headers(&headers);
        assert_eq!(
            data.missing_headers,
            vec!["content-security-policy", "permissions-policy"]
        );
        assert_eq!(data.grade.as_deref(), Some("C"));
        assert_eq!(data.headers.len(), SECURITY_HEADERS.len());
        assert_eq!(
            data.headers["x-frame-options"].as_deref(),
            Some("DENY")
        );
    }
}
