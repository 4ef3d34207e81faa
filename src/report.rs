use chrono::Utc;

use crate::analysers::MISSING_TOOLS_CATEGORY;
use crate::job::TargetJob;
use crate::model::{
    AnalysisResult, AuditReport, AuditSection, CollectedData, EvidenceType, LighthouseSummary,
    RecommendedApp, Section, SocialPreview, StageTimings,
};
use crate::synthesis::SynthesisResult;

const DEFAULT_ICON: &str = "circle";

fn to_section(result: &AnalysisResult) -> AuditSection {
    let known = Section::from_title(&result.section_title);
    AuditSection {
        id: crate::model::section_id_from_title(&result.section_title),
        title: result.section_title.clone(),
        icon_key: known
            .map(Section::icon_key)
            .unwrap_or(DEFAULT_ICON)
            .to_string(),
        eli5_summary: result.eli5_summary.clone(),
        why_it_matters: result.why_it_matters.clone(),
        rating: result.overall_rating,
        score: (!result.is_error()).then_some(result.score),
        findings: result.findings.clone(),
    }
}

/// Recommendations from the tech-stack section's "Missing Tools" findings.
pub fn missing_apps(results: &[AnalysisResult]) -> Vec<RecommendedApp> {
    let Some(tech) = results
        .iter()
        .find(|r| r.section_title == Section::TechStack.title())
    else {
        return Vec::new();
    };

    tech.findings
        .iter()
        .filter(|f| f.evidence_type == EvidenceType::Missing && f.category == MISSING_TOOLS_CATEGORY)
        .map(|f| {
            let name = f.title.strip_prefix("No ").unwrap_or(&f.title);
            let name = name.strip_suffix(" detected").unwrap_or(name);
            RecommendedApp {
                name: name.to_string(),
                category: f.category.clone(),
                reason: f.description.clone(),
            }
        })
        .collect()
}

/// Assemble the report. `report_url` is filled in by the pipeline once
/// persistence has succeeded.
pub fn build_report(
    job: &TargetJob,
    data: &CollectedData,
    results: &[AnalysisResult],
    synthesis: SynthesisResult,
    timings: StageTimings,
    audit_duration_ms: u64,
) -> AuditReport {
    let sections: Vec<AuditSection> = results.iter().map(to_section).collect();
    let unavailable_sections = sections
        .iter()
        .filter(|s| s.score.is_none())
        .map(|s| s.id.clone())
        .collect();
    let og = &data.html.og_tags;

    AuditReport {
        audit_id: job.audit_id.clone(),
        url: job.url.clone(),
        hostname: job.hostname.clone(),
        page_label: job.page_label,
        generated_at: Utc::now(),
        audit_duration_ms,
        timings,
        overall_score: synthesis.output.overall_score,
        executive_summary: synthesis.output.executive_summary,
        synthesis_source: synthesis.source,
        sections,
        top_fixes: synthesis.output.top_fixes,
        platform: data.tech_stack.as_ref().and_then(|t| t.platform.clone()),
        detected_apps: data
            .tech_stack
            .as_ref()
            .map(|t| t.detected_apps.clone())
            .unwrap_or_default(),
        missing_apps: missing_apps(results),
        screenshots: data.screenshots.clone(),
        social_preview: SocialPreview {
            og_image: og.image.clone(),
            og_title: og.title.clone(),
            og_description: og.description.clone(),
        },
        lighthouse: LighthouseSummary {
            mobile: data.lighthouse.mobile.clone(),
            desktop: data.lighthouse.desktop.clone(),
        },
        unavailable_sections,
        report_url: None,
    }
}
