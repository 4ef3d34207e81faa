use serde_json::json;

use super::{
    heuristic_result, section_request, AnalyserError, AnalysisInput, FindingBuilder, SectionRules,
    TEXT_CHAIN,
};
use crate::model::{AnalysisResult, EvidenceType, Impact, Section};
use crate::providers::ProviderRequest;

const SECTION: Section = Section::Seo;

pub struct SeoRules;

impl SectionRules for SeoRules {
    fn section(&self) -> Section {
        SECTION
    }

    fn chain_prefs(&self) -> &'static [(&'static str, &'static str)] {
        TEXT_CHAIN
    }

    fn prompt(&self, input: &AnalysisInput<'_>) -> Result<ProviderRequest, AnalyserError> {
        let lighthouse = input.lighthouse()?;
        let data = input.full().ok_or(AnalyserError::MissingInput("lighthouse"))?;
        let html = &data.html;
        let context = json!({
            "title": html.title,
            "metaDescription": html.meta_description,
            "canonicalUrl": html.canonical_url,
            "headings": html.headings,
            "imagesMissingAlt": html.images.iter().filter(|i| i.alt.is_none()).count(),
            "schemaOrg": html.schema_org,
            "language": html.language,
            "lighthouseSeo": lighthouse.mobile.seo,
            "robots": data.robots,
            "sitemap": data.sitemap,
            "serp": data.serp,
        });
        Ok(section_request(
            SECTION,
            "Assess how well search engines can find and describe this page: title, meta \
             description, headings, structured data, robots.txt, sitemap and what Google \
             currently shows for the site.",
            context,
            Vec::new(),
        ))
    }

    fn heuristic(&self, input: &AnalysisInput<'_>) -> Option<AnalysisResult> {
        let data = input.full()?;
        let html = &data.html;
        let mut findings = Vec::new();

        let title_len = html.title.as_deref().map(str::len).unwrap_or(0);
        if title_len == 0 {
            findings.push(
                FindingBuilder::new(SECTION, "seo-title", "Page has no title")
                    .impact(Impact::High)
                    .evidence(EvidenceType::Missing, "No <title> tag")
                    .describe("The title is the blue link people click in Google results.")
                    .fix("Write a 50-60 character title with your main keyword and brand.")
                    .category("On-page")
                    .build(),
            );
        } else if !(30..=60).contains(&title_len) {
            findings.push(
                FindingBuilder::new(SECTION, "seo-title", "Title length is outside 30-60 characters")
                    .impact(Impact::Medium)
                    .evidence(EvidenceType::Html, format!("Title is {title_len} characters"))
                    .describe("Short titles waste ranking potential; long ones get cut off in results.")
                    .fix("Rewrite the title to 50-60 characters.")
                    .category("On-page")
                    .build(),
            );
        }

        if html.meta_description.is_none() {
            findings.push(
                FindingBuilder::new(SECTION, "seo-meta-description", "Missing meta description")
                    .impact(Impact::Medium)
                    .evidence(EvidenceType::Missing, "No <meta name=\"description\">")
                    .describe("Google will invent a snippet from page text, which is rarely persuasive.")
                    .fix("Add a 150-160 character description that sells the click.")
                    .category("On-page")
                    .build(),
            );
        }

        match html.headings.h1.len() {
            0 => findings.push(
                FindingBuilder::new(SECTION, "seo-h1", "No H1 heading")
                    .impact(Impact::High)
                    .evidence(EvidenceType::Missing, "No <h1> on the page")
                    .describe("The H1 tells search engines what the page is about.")
                    .fix("Add a single H1 containing your main keyword.")
                    .category("Structure")
                    .build(),
            ),
            1 => {}
            n => findings.push(
                FindingBuilder::new(SECTION, "seo-h1", format!("{n} H1 headings"))
                    .impact(Impact::Low)
                    .evidence(EvidenceType::Html, html.headings.h1.join(" | "))
                    .describe("Several H1s dilute the main topic of the page.")
                    .fix("Keep one H1 and turn the others into H2s.")
                    .category("Structure")
                    .build(),
            ),
        }

        if !data.sitemap.as_ref().is_some_and(|s| s.exists) {
            findings.push(
                FindingBuilder::new(SECTION, "seo-sitemap", "No XML sitemap found")
                    .impact(Impact::Medium)
                    .evidence(EvidenceType::Missing, "/sitemap.xml not available")
                    .describe("A sitemap helps search engines discover every page.")
                    .fix("Generate a sitemap.xml and submit it in Google Search Console.")
                    .category("Crawling")
                    .build(),
            );
        }

        if let Some(serp) = &data.serp {
            if serp.indexed_pages == Some(0) {
                findings.push(
                    FindingBuilder::new(SECTION, "seo-not-indexed", "Site does not appear in Google")
                        .impact(Impact::High)
                        .evidence(EvidenceType::Metric, "site: search returned 0 results")
                        .describe("If Google has not indexed the site, nobody can find it by searching.")
                        .fix("Verify the site in Google Search Console and request indexing.")
                        .category("Indexing")
                        .build(),
                );
            }
        }

        let summary = if findings.is_empty() {
            "Your page covers the search basics. Search engines have what they need to list it well."
        } else {
            "Your page is missing some search basics. These gaps make it harder for people to find you on Google."
        }
        .to_string();
        Some(heuristic_result(
            SECTION,
            findings,
            summary,
            "Most customers find local businesses through search; small fixes here bring free traffic.",
        ))
    }
}
