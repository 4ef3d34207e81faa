use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Collector output types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotData {
    pub desktop: String,
    pub mobile: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LighthouseScores {
    pub performance: f64,
    pub accessibility: f64,
    pub best_practices: f64,
    pub seo: f64,
    pub lcp: f64,
    pub cls: f64,
    pub tbt: f64,
    pub fcp: f64,
    pub si: f64,
    pub tti: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LighthouseDiagnostic {
    pub title: String,
    pub description: String,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LighthouseData {
    pub mobile: LighthouseScores,
    pub desktop: LighthouseScores,
    pub diagnostics: Vec<LighthouseDiagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    pub src: String,
    pub alt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Headings {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageLinks {
    pub internal: Vec<String>,
    pub external: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OgTags {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TwitterCard {
    pub card: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HtmlData {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub headings: Headings,
    pub images: Vec<ImageData>,
    pub links: PageLinks,
    pub og_tags: OgTags,
    pub twitter_card: TwitterCard,
    pub schema_org: Vec<serde_json::Value>,
    pub forms: usize,
    pub word_count: usize,
    pub language: Option<String>,
    pub favicon: Option<String>,
    pub viewport: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RobotsData {
    pub exists: bool,
    pub content: Option<String>,
    pub disallow_rules: Vec<String>,
    pub sitemap_refs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SitemapData {
    pub exists: bool,
    pub url_count: usize,
    pub sample_urls: Vec<String>,
    pub lastmod: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectHop {
    pub url: String,
    pub status_code: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SslDnsData {
    pub is_https: bool,
    pub cert_issuer: Option<String>,
    pub cert_expiry: Option<String>,
    pub protocol: Option<String>,
    pub redirect_chain: Vec<RedirectHop>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityHeadersData {
    pub headers: BTreeMap<String, Option<String>>,
    pub missing_headers: Vec<String>,
    pub grade: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerpResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SerpData {
    pub indexed_pages: Option<u64>,
    pub homepage_snippet: Option<String>,
    pub brand_search_present: bool,
    pub top_results: Vec<SerpResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    pub url: String,
    pub status_code: u16,
    pub source_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RedirectLink {
    pub url: String,
    pub redirects_to: String,
    pub status_code: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkCheckData {
    pub total_checked: usize,
    pub broken: Vec<BrokenLink>,
    pub redirects: Vec<RedirectLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedApp {
    pub name: String,
    pub category: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThirdPartyScript {
    pub domain: String,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TechStackData {
    pub platform: Option<String>,
    pub theme: Option<String>,
    pub detected_apps: Vec<DetectedApp>,
    pub third_party_scripts: Vec<ThirdPartyScript>,
    pub third_party_count: usize,
}

/// Everything the collectors gathered for one page. Required fields are
/// always present; an optional field is `None` when its collector failed.
///
/// Only `CollectorSuite` builds this, and only after every required
/// collector succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectedData {
    pub screenshots: ScreenshotData,
    pub lighthouse: LighthouseData,
    pub html: HtmlData,
    pub robots: Option<RobotsData>,
    pub sitemap: Option<SitemapData>,
    pub ssl_dns: Option<SslDnsData>,
    pub security_headers: Option<SecurityHeadersData>,
    pub serp: Option<SerpData>,
    pub link_check: Option<LinkCheckData>,
    pub tech_stack: Option<TechStackData>,
}

impl CollectedData {
    /// Names of the optional fields that came back empty.
    pub fn missing_optional(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.robots.is_none() {
            missing.push("robots");
        }
        if self.sitemap.is_none() {
            missing.push("sitemap");
        }
        if self.ssl_dns.is_none() {
            missing.push("sslDns");
        }
        if self.security_headers.is_none() {
            missing.push("securityHeaders");
        }
        if self.serp.is_none() {
            missing.push("serp");
        }
        if self.link_check.is_none() {
            missing.push("linkCheck");
        }
        if self.tech_stack.is_none() {
            missing.push("techStack");
        }
        missing
    }
}

// ============================================================================
// Analysis output types
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvidenceType {
    Html,
    Screenshot,
    Metric,
    Header,
    Missing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Impact::High => "High",
            Impact::Medium => "Medium",
            Impact::Low => "Low",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Rating {
    Good,
    #[serde(rename = "Needs Work")]
    NeedsWork,
    Critical,
    Error,
}

impl Rating {
    /// Bucket a continuous 0-100 score into a rating. Never yields `Error`.
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Rating::Good,
            50..=79 => Rating::NeedsWork,
            _ => Rating::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub title: String,
    pub description: String,
    pub evidence: String,
    pub evidence_type: EvidenceType,
    pub evidence_detail: Option<String>,
    pub impact: Impact,
    pub fix: String,
    pub category: String,
    pub section: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub section_title: String,
    pub eli5_summary: String,
    pub why_it_matters: String,
    pub overall_rating: Rating,
    /// Ignored when `overall_rating` is `Error`.
    pub score: u8,
    pub findings: Vec<Finding>,
}

impl AnalysisResult {
    pub fn is_error(&self) -> bool {
        self.overall_rating == Rating::Error
    }
}

/// The eight report sections, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    Visual,
    Performance,
    Seo,
    Accessibility,
    Security,
    Social,
    TechStack,
    Content,
}

impl Section {
    pub const ALL: [Section; 8] = [
        Section::Visual,
        Section::Performance,
        Section::Seo,
        Section::Accessibility,
        Section::Security,
        Section::Social,
        Section::TechStack,
        Section::Content,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Section::Visual => "Visual & Design",
            Section::Performance => "Performance & Speed",
            Section::Seo => "SEO & Keywords",
            Section::Accessibility => "Accessibility",
            Section::Security => "Security & Trust",
            Section::Social => "Social & Sharing",
            Section::TechStack => "Tech Stack & Apps",
            Section::Content => "Content & Conversion",
        }
    }

    pub fn icon_key(self) -> &'static str {
        match self {
            Section::Visual => "eye",
            Section::Performance => "gauge",
            Section::Seo => "search",
            Section::Accessibility => "accessibility",
            Section::Security => "shield",
            Section::Social => "share-2",
            Section::TechStack => "layers",
            Section::Content => "file-text",
        }
    }

    /// Weight in the overall score. Visual and performance count above
    /// baseline, social and tech stack below.
    pub fn weight(self) -> f64 {
        match self {
            Section::Visual | Section::Performance => 1.5,
            Section::Social | Section::TechStack => 0.75,
            _ => 1.0,
        }
    }

    pub fn from_title(title: &str) -> Option<Section> {
        Section::ALL.into_iter().find(|s| s.title() == title)
    }

    /// Stable section id used by the report, e.g. `visual-design`.
    pub fn id(self) -> String {
        section_id_from_title(self.title())
    }
}

/// Lowercase a title and collapse every non-alphanumeric run into one dash.
pub fn section_id_from_title(title: &str) -> String {
    let mut id = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !id.is_empty() {
                id.push('-');
            }
            pending_dash = false;
            id.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    id
}

// ============================================================================
// Synthesis and report types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopFix {
    pub title: String,
    pub section: String,
    pub impact: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisOutput {
    pub executive_summary: String,
    pub overall_score: u8,
    pub top_fixes: Vec<TopFix>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisSource {
    Primary,
    Fallback,
    Local,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PageLabel {
    #[default]
    Homepage,
    ProductPage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendedApp {
    pub name: String,
    pub category: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditSection {
    pub id: String,
    pub title: String,
    pub icon_key: String,
    pub eli5_summary: String,
    pub why_it_matters: String,
    pub rating: Rating,
    pub score: Option<u8>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocialPreview {
    pub og_image: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LighthouseSummary {
    pub mobile: LighthouseScores,
    pub desktop: LighthouseScores,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageTimings {
    pub collecting_ms: u64,
    pub analysing_ms: u64,
    pub synthesizing_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub audit_id: String,
    pub url: String,
    pub hostname: String,
    pub page_label: PageLabel,
    pub generated_at: DateTime<Utc>,
    pub audit_duration_ms: u64,
    pub timings: StageTimings,
    pub overall_score: u8,
    pub executive_summary: String,
    pub synthesis_source: SynthesisSource,
    pub sections: Vec<AuditSection>,
    pub top_fixes: Vec<TopFix>,
    pub platform: Option<String>,
    pub detected_apps: Vec<DetectedApp>,
    pub missing_apps: Vec<RecommendedApp>,
    pub screenshots: ScreenshotData,
    pub social_preview: SocialPreview,
    pub lighthouse: LighthouseSummary,
    pub unavailable_sections: Vec<String>,
    pub report_url: Option<String>,
}

// ============================================================================
// History and API envelope
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Running,
    Complete,
    Failed,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Running => "running",
            AuditStatus::Complete => "complete",
            AuditStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(AuditStatus::Running),
            "complete" => Some(AuditStatus::Complete),
            "failed" => Some(AuditStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditHistoryEntry {
    pub audit_id: String,
    pub url: String,
    pub hostname: String,
    pub overall_score: Option<u8>,
    pub status: AuditStatus,
    pub created_at: String,
    pub report_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            details: None,
        }
    }
}
