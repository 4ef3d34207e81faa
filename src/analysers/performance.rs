use serde_json::json;

use super::{
    heuristic_result, section_request, AnalyserError, AnalysisInput, FindingBuilder, SectionRules,
    FAST_CHAIN,
};
use crate::model::{AnalysisResult, EvidenceType, Finding, Impact, Section};
use crate::providers::ProviderRequest;

const SECTION: Section = Section::Performance;

/// (metric, good threshold, poor threshold) for the Core Web Vitals we grade.
const LCP_MS: (f64, f64) = (2500.0, 4000.0);
const TBT_MS: (f64, f64) = (200.0, 600.0);
const CLS: (f64, f64) = (0.1, 0.25);

pub struct PerformanceRules;

fn grade(value: f64, (good, poor): (f64, f64)) -> Option<Impact> {
    if value > poor {
        Some(Impact::High)
    } else if value > good {
        Some(Impact::Medium)
    } else {
        None
    }
}

fn metric_finding(id: &str, title: &str, impact: Impact, evidence: String, fix: &str) -> Finding {
    FindingBuilder::new(SECTION, id, title)
        .impact(impact)
        .evidence(EvidenceType::Metric, evidence)
        .detail("Lighthouse mobile")
        .describe("Slow pages lose visitors before they see anything; Google also ranks slow mobile pages lower.")
        .fix(fix)
        .category("Core Web Vitals")
        .build()
}

impl SectionRules for PerformanceRules {
    fn section(&self) -> Section {
        SECTION
    }

    fn chain_prefs(&self) -> &'static [(&'static str, &'static str)] {
        FAST_CHAIN
    }

    fn prompt(&self, input: &AnalysisInput<'_>) -> Result<ProviderRequest, AnalyserError> {
        let lighthouse = input.lighthouse()?;
        let html = input.html();
        let context = json!({
            "mobile": lighthouse.mobile,
            "desktop": lighthouse.desktop,
            "diagnostics": lighthouse.diagnostics,
            "imageCount": html.images.len(),
        });
        Ok(section_request(
            SECTION,
            "Explain the Lighthouse results in everyday terms. Focus on mobile: LCP, TBT, CLS \
             and the performance score. Tie each fix to a diagnostic where possible.",
            context,
            Vec::new(),
        ))
    }

    fn heuristic(&self, input: &AnalysisInput<'_>) -> Option<AnalysisResult> {
        let mobile = &input.lighthouse().ok()?.mobile;
        let mut findings = Vec::new();

        if mobile.performance < 50.0 {
            findings.push(metric_finding(
                "perf-score",
                "Mobile performance score below 50",
                Impact::High,
                format!("Lighthouse mobile performance: {}/100", mobile.performance),
                "Compress images, defer non-critical JavaScript and remove unused scripts.",
            ));
        } else if mobile.performance < 90.0 {
            findings.push(metric_finding(
                "perf-score",
                "Mobile performance could be faster",
                Impact::Medium,
                format!("Lighthouse mobile performance: {}/100", mobile.performance),
                "Work through the Lighthouse opportunities, starting with the largest savings.",
            ));
        }

        if let Some(impact) = grade(mobile.lcp, LCP_MS) {
            findings.push(metric_finding(
                "perf-lcp",
                "Largest Contentful Paint is slow on mobile",
                impact,
                format!("LCP {:.1}s (good is under 2.5s)", mobile.lcp / 1000.0),
                "Serve the hero image in a modern format at the right size and preload it.",
            ));
        }
        if let Some(impact) = grade(mobile.tbt, TBT_MS) {
            findings.push(metric_finding(
                "perf-tbt",
                "Total Blocking Time is high",
                impact,
                format!("TBT {:.0}ms (good is under 200ms)", mobile.tbt),
                "Split or defer heavy JavaScript and drop third-party scripts you don't need.",
            ));
        }
        if let Some(impact) = grade(mobile.cls, CLS) {
            findings.push(metric_finding(
                "perf-cls",
                "Layout shifts while loading",
                impact,
                format!("CLS {:.2} (good is under 0.1)", mobile.cls),
                "Reserve space for images, embeds and banners with explicit dimensions.",
            ));
        }

        let summary = format!(
            "Your page scores {:.0}/100 for speed on mobile. {}",
            mobile.performance,
            if findings.is_empty() {
                "It loads quickly for most visitors."
            } else {
                "Some visitors will wait noticeably before they can use it."
            }
        );

        Some(heuristic_result(
            SECTION,
            findings,
            summary,
            "Every extra second of loading costs visitors and sales, especially on phones.",
        ))
    }
}
