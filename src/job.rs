use std::net::{Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::error::AuditError;
use crate::model::PageLabel;

/// One page to audit. Built once per pipeline run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetJob {
    pub audit_id: String,
    pub url: String,
    pub hostname: String,
    pub page_label: PageLabel,
}

impl TargetJob {
    /// Validate `raw_url` and mint a fresh audit id for it.
    pub fn new(raw_url: &str, page_label: PageLabel) -> Result<Self, AuditError> {
        let url = normalise_url(raw_url)?;
        let hostname = url.host_str().unwrap_or_default().to_string();
        Ok(Self {
            audit_id: generate_audit_id(),
            url: url.to_string(),
            hostname,
            page_label,
        })
    }
}

/// `audit_{unix_ms}_{6 lowercase alnum}`.
pub fn generate_audit_id() -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect();
    format!("audit_{}_{}", chrono::Utc::now().timestamp_millis(), suffix)
}

/// True for ids produced by [`generate_audit_id`]. Used to keep path
/// parameters from escaping the report directory.
pub fn is_valid_audit_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("audit_") else {
        return false;
    };
    let Some((millis, suffix)) = rest.split_once('_') else {
        return false;
    };
    !millis.is_empty()
        && millis.chars().all(|c| c.is_ascii_digit())
        && suffix.len() == 6
        && suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
}

pub fn normalise_url(raw: &str) -> Result<Url, AuditError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AuditError::Validation("URL is required".to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&with_scheme)
        .map_err(|_| AuditError::Validation(format!("Invalid URL: {trimmed}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AuditError::Validation(
            "Only http and https URLs are supported".to_string(),
        ));
    }

    let blocked = match url.host() {
        None => {
            return Err(AuditError::Validation(format!(
                "URL has no host: {trimmed}"
            )))
        }
        Some(Host::Domain(domain)) => {
            let d = domain.to_ascii_lowercase();
            d.is_empty() || d == "localhost" || d.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_private_v4(ip),
        Some(Host::Ipv6(ip)) => is_private_v6(ip),
    };

    if blocked {
        return Err(AuditError::Validation(
            "Private and local addresses cannot be audited".to_string(),
        ));
    }

    Ok(url)
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    a == 127
        || a == 10
        || a == 0
        || (a == 192 && b == 168)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 169 && b == 254)
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
