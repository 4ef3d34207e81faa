use serde_json::json;

use super::{
    heuristic_result, section_request, AnalyserError, AnalysisInput, FindingBuilder, SectionRules,
    FAST_CHAIN,
};
use crate::model::{AnalysisResult, EvidenceType, Impact, Section};
use crate::providers::ProviderRequest;

const SECTION: Section = Section::Content;

const THIN_CONTENT_WORDS: usize = 300;
const LONG_CONTENT_WORDS: usize = 3000;

pub struct ContentRules;

impl SectionRules for ContentRules {
    fn section(&self) -> Section {
        SECTION
    }

    fn chain_prefs(&self) -> &'static [(&'static str, &'static str)] {
        FAST_CHAIN
    }

    fn prompt(&self, input: &AnalysisInput<'_>) -> Result<ProviderRequest, AnalyserError> {
        input.lighthouse()?;
        let data = input.full().ok_or(AnalyserError::MissingInput("lighthouse"))?;
        let html = &data.html;
        let context = json!({
            "title": html.title,
            "headings": html.headings,
            "wordCount": html.word_count,
            "forms": html.forms,
            "internalLinks": html.links.internal.len(),
            "linkCheck": data.link_check,
        });
        Ok(section_request(
            SECTION,
            "Judge whether the page content persuades a visitor to act: clarity of the offer, \
             structure, calls to action, forms and broken links.",
            context,
            Vec::new(),
        ))
    }

    fn heuristic(&self, input: &AnalysisInput<'_>) -> Option<AnalysisResult> {
        let data = input.full()?;
        let html = &data.html;
        let mut findings = Vec::new();

        if html.word_count < THIN_CONTENT_WORDS {
            findings.push(
                FindingBuilder::new(SECTION, "content-thin", "Very thin content")
                    .impact(Impact::High)
                    .evidence(EvidenceType::Metric, format!("{} words on the page", html.word_count))
                    .describe("There isn't enough text to explain what you offer or to rank in search.")
                    .fix("Expand the page to at least 300 words covering what you do, who for, and why you.")
                    .category("Copy")
                    .build(),
            );
        } else if html.word_count > LONG_CONTENT_WORDS {
            findings.push(
                FindingBuilder::new(SECTION, "content-long", "Content may be too long for a landing page")
                    .impact(Impact::Low)
                    .evidence(EvidenceType::Metric, format!("{} words on the page", html.word_count))
                    .fix("Move detail to supporting pages and keep the key message above the fold.")
                    .category("Copy")
                    .build(),
            );
        }

        if html.forms == 0 {
            findings.push(
                FindingBuilder::new(SECTION, "content-no-forms", "No forms or conversion points found")
                    .impact(Impact::High)
                    .evidence(EvidenceType::Missing, "No <form> elements on the page")
                    .describe("Visitors who are ready to act have no obvious way to get in touch or buy.")
                    .fix("Add a contact, enquiry or newsletter form with a clear call to action.")
                    .category("Conversion")
                    .build(),
            );
        }

        let headings = html.headings.h1.len() + html.headings.h2.len() + html.headings.h3.len();
        if headings < 3 && html.word_count >= THIN_CONTENT_WORDS {
            findings.push(
                FindingBuilder::new(SECTION, "content-structure", "Content lacks structure")
                    .impact(Impact::Medium)
                    .evidence(EvidenceType::Html, format!("{headings} headings for {} words", html.word_count))
                    .fix("Break the text up with descriptive subheadings.")
                    .category("Copy")
                    .build(),
            );
        }

        if let Some(links) = &data.link_check {
            if !links.broken.is_empty() {
                let n = links.broken.len();
                let sample: Vec<_> = links.broken.iter().take(3).map(|b| b.url.as_str()).collect();
                findings.push(
                    FindingBuilder::new(
                        SECTION,
                        "content-broken-links",
                        format!("{n} broken link{} found", if n > 1 { "s" } else { "" }),
                    )
                    .impact(Impact::High)
                    .evidence(EvidenceType::Html, sample.join(", "))
                    .detail(format!("{} links checked", links.total_checked))
                    .describe("Broken links frustrate visitors and make the site look neglected.")
                    .fix("Fix or remove the broken links, or redirect them to a relevant page.")
                    .category("Links")
                    .build(),
                );
            }
        }

        let summary = if findings.is_empty() {
            "Your content explains the offer and gives visitors a way to act.".to_string()
        } else {
            "Your content could do more to convince visitors and guide them to the next step.".to_string()
        };
        Some(heuristic_result(
            SECTION,
            findings,
            summary,
            "Traffic only pays off when the words on the page turn visitors into enquiries.",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysers::tests_support::collected;
    use crate::model::{BrokenLink, LinkCheckData};

    #[test]
    fn test_broken_links_and_no_forms() {
        let mut data = collected();
        data.html.word_count = 800;
        data.html.headings.h2 = vec!["a".into(), "b".into(), "c".into()];
        data.link_check = Some(LinkCheckData {
            total_checked: 10,
            broken: vec![BrokenLink {
                url: "https://acme.test/old".into(),
                status_code: 404,
                source_url: "https://acme.test/".into(),
            }],
            redirects: vec![],
        });
        let r = ContentRules.heuristic(&AnalysisInput::Full(&data)).unwrap();
        let ids: Vec<_> = r.findings.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["content-no-forms", "content-broken-links"]);
        assert_eq!(r.findings[1].title, "1 broken link found");
        assert_eq!(r.score, 50);
    }
}
