use serde_json::json;

use super::{
    heuristic_result, section_request, AnalyserError, AnalysisInput, FindingBuilder, SectionRules,
    TEXT_CHAIN,
};
use crate::model::{AnalysisResult, EvidenceType, Finding, Impact, Section, TechStackData};
use crate::providers::ProviderRequest;

const SECTION: Section = Section::TechStack;

/// Findings in this category become the report's `missing_apps`.
pub const MISSING_TOOLS_CATEGORY: &str = "Missing Tools";

const THIRD_PARTY_LIMIT: usize = 10;

/// Tool categories every small business site should have, and what to
/// suggest when none is detected.
const ESSENTIALS: &[(&str, &[&str], &str, &str)] = &[
    (
        "tech-analytics",
        &["analytics", "google tag"],
        "No analytics tool detected",
        "Install Google Analytics 4, Plausible, or another analytics tool to start tracking visitor behaviour.",
    ),
    (
        "tech-support",
        &["customer support", "chat"],
        "No live chat or support widget",
        "Add a chat widget such as Crisp, Tawk.to or Intercom so visitors can ask questions.",
    ),
];

pub struct TechStackRules;

fn tech_data<'a>(input: &AnalysisInput<'a>) -> Result<&'a TechStackData, AnalyserError> {
    input
        .full()
        .and_then(|d| d.tech_stack.as_ref())
        .ok_or(AnalyserError::MissingInput("techStack"))
}

fn has_any(tech: &TechStackData, needles: &[&str]) -> bool {
    tech.detected_apps.iter().any(|app| {
        let name = app.name.to_lowercase();
        let category = app.category.to_lowercase();
        needles.iter().any(|n| name.contains(n) || category.contains(n))
    })
}

fn missing_tool(id: &str, title: &str, fix: &str) -> Finding {
    FindingBuilder::new(SECTION, id, title)
        .impact(Impact::High)
        .evidence(EvidenceType::Missing, "Not found among detected technologies")
        .detail("Expected tool")
        .describe("Without this you are missing information or conversations that help the business grow.")
        .fix(fix)
        .category(MISSING_TOOLS_CATEGORY)
        .build()
}

impl SectionRules for TechStackRules {
    fn section(&self) -> Section {
        SECTION
    }

    fn chain_prefs(&self) -> &'static [(&'static str, &'static str)] {
        TEXT_CHAIN
    }

    fn prompt(&self, input: &AnalysisInput<'_>) -> Result<ProviderRequest, AnalyserError> {
        let tech = tech_data(input)?;
        let context = json!({
            "platform": tech.platform,
            "theme": tech.theme,
            "detectedApps": tech.detected_apps,
            "thirdPartyScripts": tech.third_party_scripts,
            "thirdPartyCount": tech.third_party_count,
        });
        Ok(section_request(
            SECTION,
            "Review the detected platform and apps. Flag essential tools that are missing \
             (analytics, support chat, reviews, email capture) as findings with evidenceType \
             MISSING and category \"Missing Tools\", naming the recommended tool in the title.",
            context,
            Vec::new(),
        ))
    }

    fn heuristic(&self, input: &AnalysisInput<'_>) -> Option<AnalysisResult> {
        let tech = tech_data(input).ok()?;
        let mut findings = Vec::new();

        for (id, needles, title, fix) in ESSENTIALS {
            if !has_any(tech, needles) {
                findings.push(missing_tool(id, title, fix));
            }
        }

        if tech.third_party_count > THIRD_PARTY_LIMIT {
            let shown: Vec<_> = tech
                .third_party_scripts
                .iter()
                .take(5)
                .map(|s| s.domain.as_str())
                .collect();
            findings.push(
                FindingBuilder::new(
                    SECTION,
                    "tech-third-party",
                    format!("High number of third-party scripts ({})", tech.third_party_count),
                )
                .impact(Impact::Medium)
                .evidence(EvidenceType::Metric, format!("{}...", shown.join(", ")))
                .describe("Every third-party script adds weight and another company that can break your page.")
                .fix("Audit third-party scripts, remove unused ones and lazy-load the rest.")
                .category("Performance")
                .build(),
            );
        }

        let platform = tech.platform.as_deref().unwrap_or("an unidentified platform");
        let summary = format!(
            "Your site runs on {platform} with {} technologies detected. {}",
            tech.detected_apps.len(),
            if findings.iter().any(|f| f.impact == Impact::High) {
                "Some essential tools appear to be missing."
            } else {
                "Your setup looks solid."
            }
        );
        Some(heuristic_result(
            SECTION,
            findings,
            summary,
            "The right tools show you who visits and help turn them into customers.",
        ))
    }
}
