use serde_json::json;

use super::{
    heuristic_result, section_request, AnalyserError, AnalysisInput, FindingBuilder, SectionRules,
    TEXT_CHAIN,
};
use crate::model::{AnalysisResult, EvidenceType, Impact, Section};
use crate::providers::ProviderRequest;

const SECTION: Section = Section::Social;

pub struct SocialRules;

impl SectionRules for SocialRules {
    fn section(&self) -> Section {
        SECTION
    }

    fn chain_prefs(&self) -> &'static [(&'static str, &'static str)] {
        TEXT_CHAIN
    }

    fn prompt(&self, input: &AnalysisInput<'_>) -> Result<ProviderRequest, AnalyserError> {
        input.lighthouse()?;
        let html = input.html();
        let context = json!({
            "ogTags": html.og_tags,
            "twitterCard": html.twitter_card,
            "favicon": html.favicon,
            "externalLinks": html.links.external,
        });
        Ok(section_request(
            SECTION,
            "Assess how the page looks when shared on Facebook, LinkedIn, X and messaging \
             apps: Open Graph tags, Twitter card, favicon and links to social profiles.",
            context,
            Vec::new(),
        ))
    }

    fn heuristic(&self, input: &AnalysisInput<'_>) -> Option<AnalysisResult> {
        input.full()?;
        let html = input.html();
        let og = &html.og_tags;
        let mut findings = Vec::new();

        if og.title.is_none() {
            findings.push(
                FindingBuilder::new(SECTION, "social-og-title", "Missing Open Graph title")
                    .impact(Impact::High)
                    .evidence(EvidenceType::Missing, "No og:title meta tag")
                    .describe("Shared links fall back to whatever the platform guesses, often the wrong text.")
                    .fix("Add <meta property=\"og:title\" content=\"...\">.")
                    .category("Open Graph")
                    .build(),
            );
        }
        if og.image.is_none() {
            findings.push(
                FindingBuilder::new(SECTION, "social-og-image", "Missing Open Graph image")
                    .impact(Impact::High)
                    .evidence(EvidenceType::Missing, "No og:image meta tag")
                    .describe("Posts without an image get far fewer clicks.")
                    .fix("Add a 1200x630 og:image that shows your brand or product.")
                    .category("Open Graph")
                    .build(),
            );
        }
        if og.description.is_none() {
            findings.push(
                FindingBuilder::new(SECTION, "social-og-description", "Missing Open Graph description")
                    .impact(Impact::Medium)
                    .evidence(EvidenceType::Missing, "No og:description meta tag")
                    .fix("Add an og:description of one or two enticing sentences.")
                    .category("Open Graph")
                    .build(),
            );
        }
        if html.twitter_card.card.is_none() {
            findings.push(
                FindingBuilder::new(SECTION, "social-twitter", "No Twitter Card configured")
                    .impact(Impact::Medium)
                    .evidence(EvidenceType::Missing, "No twitter:card meta tag")
                    .fix("Add <meta name=\"twitter:card\" content=\"summary_large_image\">.")
                    .category("Twitter")
                    .build(),
            );
        }
        if html.favicon.is_none() {
            findings.push(
                FindingBuilder::new(SECTION, "social-favicon", "No favicon detected")
                    .impact(Impact::Medium)
                    .evidence(EvidenceType::Missing, "No <link rel=\"icon\">")
                    .fix("Add a favicon so your brand shows in browser tabs and bookmarks.")
                    .category("Branding")
                    .build(),
            );
        }

        let summary = if findings.is_empty() {
            "Links to your site look polished when shared. Social platforms get a title, description and image.".to_string()
        } else {
            format!(
                "When people share your site, {} preview element{} missing. Shared links will look bare.",
                findings.len(),
                if findings.len() == 1 { " is" } else { "s are" }
            )
        };
        Some(heuristic_result(
            SECTION,
            findings,
            summary,
            "Word of mouth happens through shared links; a good preview earns the click.",
        ))
    }
}
