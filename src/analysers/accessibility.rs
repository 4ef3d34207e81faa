use serde_json::json;

use super::{
    heuristic_result, section_request, AnalyserError, AnalysisInput, FindingBuilder, SectionRules,
    FAST_CHAIN,
};
use crate::model::{AnalysisResult, EvidenceType, Impact, Section};
use crate::providers::ProviderRequest;

const SECTION: Section = Section::Accessibility;

pub struct AccessibilityRules;

impl SectionRules for AccessibilityRules {
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
            "lighthouseAccessibility": {
                "mobile": lighthouse.mobile.accessibility,
                "desktop": lighthouse.desktop.accessibility,
            },
            "images": html.images.len(),
            "imagesMissingAlt": html.images.iter().filter(|i| i.alt.is_none()).count(),
            "language": html.language,
            "headings": html.headings,
            "forms": html.forms,
        });
        Ok(section_request(
            SECTION,
            "Assess how usable the page is for people with disabilities: alt text, page \
             language, heading structure, form labelling and the Lighthouse accessibility score.",
            context,
            Vec::new(),
        ))
    }

    fn heuristic(&self, input: &AnalysisInput<'_>) -> Option<AnalysisResult> {
        let score = input.lighthouse().ok()?.mobile.accessibility;
        let html = input.html();
        let mut findings = Vec::new();

        if score < 90.0 {
            findings.push(
                FindingBuilder::new(SECTION, "a11y-score", format!("Accessibility score: {score:.0}/100"))
                    .impact(if score < 70.0 { Impact::High } else { Impact::Medium })
                    .evidence(EvidenceType::Metric, format!("Lighthouse mobile accessibility {score:.0}"))
                    .describe("Lighthouse found barriers that stop some visitors using the page.")
                    .fix("Run Lighthouse in Chrome DevTools and fix the failed accessibility audits.")
                    .category("Compliance")
                    .build(),
            );
        }

        let missing_alt = html.images.iter().filter(|i| i.alt.is_none()).count();
        if missing_alt > 0 {
            findings.push(
                FindingBuilder::new(SECTION, "a11y-alt", format!("{missing_alt} images without alt text"))
                    .impact(Impact::High)
                    .evidence(EvidenceType::Html, format!("{missing_alt} of {} <img> tags have no alt attribute", html.images.len()))
                    .describe("Screen readers can't describe these images to blind visitors.")
                    .fix("Add a short alt description to every meaningful image; use alt=\"\" for decorative ones.")
                    .category("Images")
                    .build(),
            );
        }

        if html.language.is_none() {
            findings.push(
                FindingBuilder::new(SECTION, "a11y-lang", "Page language not declared")
                    .impact(Impact::Medium)
                    .evidence(EvidenceType::Missing, "<html> has no lang attribute")
                    .describe("Screen readers need the language to pronounce the text correctly.")
                    .fix("Add lang=\"en\" (or your language) to the <html> tag.")
                    .category("Structure")
                    .build(),
            );
        }

        if html.headings.h1.is_empty() {
            findings.push(
                FindingBuilder::new(SECTION, "a11y-h1", "No H1 heading for navigation")
                    .impact(Impact::Medium)
                    .evidence(EvidenceType::Missing, "No <h1> on the page")
                    .describe("Screen reader users jump between headings to find their way around.")
                    .fix("Start the main content with a single H1.")
                    .category("Structure")
                    .build(),
            );
        }

        let summary = format!(
            "Your page scores {score:.0}/100 for accessibility. {}",
            if findings.is_empty() {
                "Most people, including those using assistive technology, can use it."
            } else {
                "Some visitors with disabilities will struggle with parts of it."
            }
        );
        Some(heuristic_result(
            SECTION,
            findings,
            summary,
            "One in five people has a disability, and accessible sites also rank and convert better.",
        ))
    }
}
