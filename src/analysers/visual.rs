use serde_json::json;

use super::{
    heuristic_result, section_request, AnalyserError, AnalysisInput, FindingBuilder, SectionRules,
    VISION_CHAIN,
};
use crate::model::{AnalysisResult, EvidenceType, Impact, Section};
use crate::providers::ProviderRequest;

const SECTION: Section = Section::Visual;

/// Layout, typography and visual hierarchy, judged from the screenshots.
/// Needs only screenshots and html, so it runs on the early projection.
pub struct VisualRules;

impl SectionRules for VisualRules {
    fn section(&self) -> Section {
        SECTION
    }

    fn early_capable(&self) -> bool {
        true
    }

    fn chain_prefs(&self) -> &'static [(&'static str, &'static str)] {
        VISION_CHAIN
    }

    fn prompt(&self, input: &AnalysisInput<'_>) -> Result<ProviderRequest, AnalyserError> {
        let html = input.html();
        let shots = input.screenshots();
        let context = json!({
            "title": html.title,
            "viewport": html.viewport,
            "h1": html.headings.h1,
            "imageCount": html.images.len(),
            "forms": html.forms,
            "screenshots": { "desktop": shots.desktop, "mobile": shots.mobile },
        });
        Ok(section_request(
            SECTION,
            "Judge the attached desktop and mobile screenshots: first impression, visual \
             hierarchy, readability of text on mobile, colour contrast, whitespace and how \
             obvious the main call to action is.",
            context,
            vec![shots.desktop.clone(), shots.mobile.clone()],
        ))
    }

    fn heuristic(&self, input: &AnalysisInput<'_>) -> Option<AnalysisResult> {
        let html = input.html();
        let mut findings = Vec::new();

        if html.viewport.is_none() {
            findings.push(
                FindingBuilder::new(SECTION, "visual-viewport", "No mobile viewport set")
                    .impact(Impact::High)
                    .evidence(EvidenceType::Missing, "No <meta name=\"viewport\"> tag found")
                    .detail("meta viewport")
                    .describe("Without a viewport tag phones render the desktop layout shrunk down, so text is tiny and buttons are hard to tap.")
                    .fix("Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"> to the page head.")
                    .category("Mobile")
                    .build(),
            );
        }

        if html.headings.h1.is_empty() {
            findings.push(
                FindingBuilder::new(SECTION, "visual-no-headline", "No clear main headline")
                    .impact(Impact::Medium)
                    .evidence(EvidenceType::Html, "The page has no <h1> heading")
                    .describe("Visitors decide within seconds whether they are in the right place. A strong headline is the anchor of the page.")
                    .fix("Add one prominent headline near the top that says what you offer.")
                    .category("Hierarchy")
                    .build(),
            );
        }

        let unsized_images = html
            .images
            .iter()
            .filter(|i| i.width.is_none() || i.height.is_none())
            .count();
        if unsized_images > 3 {
            findings.push(
                FindingBuilder::new(SECTION, "visual-unsized-images", format!("{unsized_images} images without dimensions"))
                    .impact(Impact::Low)
                    .evidence(EvidenceType::Html, format!("{unsized_images} of {} <img> tags lack width/height", html.images.len()))
                    .describe("Images without dimensions make content jump around while the page loads.")
                    .fix("Set width and height attributes on images so the browser can reserve space.")
                    .category("Layout")
                    .build(),
            );
        }

        let summary = if findings.is_empty() {
            "The page structure gives a solid base for a clean design. A visual review of the screenshots was not available.".to_string()
        } else {
            format!(
                "We found {} layout issue{} in the page structure. A visual review of the screenshots was not available.",
                findings.len(),
                if findings.len() == 1 { "" } else { "s" }
            )
        };

        Some(heuristic_result(
            SECTION,
            findings,
            summary,
            "Visitors judge a site by its looks in a few seconds; a cluttered or broken layout sends them away.",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::EarlyData;
    use crate::model::{HtmlData, ImageData, ScreenshotData};

    fn early(html: HtmlData) -> EarlyData {
        EarlyData {
            screenshots: ScreenshotData {
                desktop: "https://cdn.test/d.png".into(),
                mobile: "https://cdn.test/m.png".into(),
            },
            html,
        }
    }

    #[test]
    fn test_prompt_attaches_both_screenshots() {
        let data = early(HtmlData::default());
        let req = VisualRules.prompt(&AnalysisInput::Early(&data)).unwrap();
        assert_eq!(req.images, vec!["https://cdn.test/d.png", "https://cdn.test/m.png"]);
        assert!(req.system.contains("Visual & Design"));
    }

    #[test]
    fn test_heuristic_flags_missing_viewport() {
        let data = early(HtmlData::default());
        let r = VisualRules.heuristic(&AnalysisInput::Early(&data)).unwrap();
        assert_eq!(r.findings[0].id, "visual-viewport");
        assert_eq!(r.findings[0].evidence_type, EvidenceType::Missing);
        assert_eq!(r.score, 65);
    }

    #[test]
    fn test_heuristic_counts_images_without_dimensions() {
        let image = |width| ImageData {
            src: "/a.jpg".into(),
            alt: None,
            width,
            height: Some(100),
        };
        let mut html = HtmlData::default();
        html.images = vec![image(None), image(None), image(None), image(None), image(Some(50))];
        let data = early(html);
        let r = VisualRules.heuristic(&AnalysisInput::Early(&data)).unwrap();
        let finding = r
            .findings
            .iter()
            .find(|f| f.id == "visual-unsized-images")
            .unwrap();
        assert_eq!(finding.title, "4 images without dimensions");
        assert_eq!(finding.evidence, "4 of 5 <img> tags lack width/height");
    }
}
