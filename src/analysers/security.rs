use serde_json::json;

use super::{
    heuristic_result, section_request, AnalyserError, AnalysisInput, FindingBuilder, SectionRules,
    TEXT_CHAIN,
};
use crate::model::{AnalysisResult, EvidenceType, Finding, Impact, Section};
use crate::providers::ProviderRequest;

const SECTION: Section = Section::Security;

pub struct SecurityRules;

fn header_impact(header: &str) -> Impact {
    match header {
        "strict-transport-security" | "content-security-policy" => Impact::High,
        "x-frame-options" | "x-content-type-options" => Impact::Medium,
        _ => Impact::Low,
    }
}

fn header_fix(header: &str) -> &'static str {
    match header {
        "strict-transport-security" => "Send Strict-Transport-Security: max-age=31536000; includeSubDomains.",
        "content-security-policy" => "Add a Content-Security-Policy listing the sources your page loads from.",
        "x-frame-options" => "Send X-Frame-Options: DENY (or SAMEORIGIN) to stop clickjacking.",
        "x-content-type-options" => "Send X-Content-Type-Options: nosniff.",
        "referrer-policy" => "Send Referrer-Policy: strict-origin-when-cross-origin.",
        _ => "Send a Permissions-Policy that disables browser features you don't use.",
    }
}

fn missing_header(header: &str) -> Finding {
    FindingBuilder::new(SECTION, &format!("sec-{header}"), format!("Missing security header: {header}"))
        .impact(header_impact(header))
        .evidence(EvidenceType::Header, format!("{header} not present in the response"))
        .detail(header)
        .describe("Security headers tell browsers how to protect your visitors from common attacks.")
        .fix(header_fix(header))
        .category("Headers")
        .build()
}

impl SectionRules for SecurityRules {
    fn section(&self) -> Section {
        SECTION
    }

    fn chain_prefs(&self) -> &'static [(&'static str, &'static str)] {
        TEXT_CHAIN
    }

    fn prompt(&self, input: &AnalysisInput<'_>) -> Result<ProviderRequest, AnalyserError> {
        let lighthouse = input.lighthouse()?;
        let data = input.full().ok_or(AnalyserError::MissingInput("lighthouse"))?;
        let context = json!({
            "sslDns": data.ssl_dns,
            "securityHeaders": data.security_headers,
            "bestPractices": lighthouse.mobile.best_practices,
            "forms": data.html.forms,
        });
        Ok(section_request(
            SECTION,
            "Assess whether visitors can trust this site with their data: HTTPS, redirect \
             behaviour and security headers. When header or TLS data is null, say it could not \
             be checked rather than assuming it is missing.",
            context,
            Vec::new(),
        ))
    }

    fn heuristic(&self, input: &AnalysisInput<'_>) -> Option<AnalysisResult> {
        let data = input.full()?;
        if data.ssl_dns.is_none() && data.security_headers.is_none() {
            return None;
        }
        let mut findings = Vec::new();

        if let Some(ssl) = &data.ssl_dns {
            if !ssl.is_https {
                findings.push(
                    FindingBuilder::new(SECTION, "sec-https", "Site not using HTTPS")
                        .impact(Impact::High)
                        .evidence(EvidenceType::Metric, "Page was served over plain HTTP")
                        .describe("Browsers mark HTTP pages as Not Secure and anything typed can be intercepted.")
                        .fix("Install a TLS certificate (free from Let's Encrypt) and redirect HTTP to HTTPS.")
                        .category("Encryption")
                        .build(),
                );
            }
            if ssl.redirect_chain.len() > 2 {
                let hops: Vec<_> = ssl.redirect_chain.iter().map(|h| h.url.as_str()).collect();
                findings.push(
                    FindingBuilder::new(SECTION, "sec-redirects", "Excessive redirect chain")
                        .impact(Impact::Medium)
                        .evidence(EvidenceType::Metric, hops.join(" -> "))
                        .describe("Every extra redirect slows the first visit and can leak the first request over HTTP.")
                        .fix("Redirect http:// straight to the final https:// address in one hop.")
                        .category("Encryption")
                        .build(),
                );
            }
        }

        if let Some(headers) = &data.security_headers {
            findings.extend(headers.missing_headers.iter().map(|h| missing_header(h)));
        }

        let grade = data
            .security_headers
            .as_ref()
            .and_then(|h| h.grade.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let summary = format!(
            "Your security headers grade is {grade}. {}",
            if findings.is_empty() {
                "Visitors' browsers get the protection they need."
            } else {
                "A few settings would make visitors safer and build trust."
            }
        );
        Some(heuristic_result(
            SECTION,
            findings,
            summary,
            "A site that looks unsafe loses customers, and a hacked one loses them for good.",
        ))
    }
}
