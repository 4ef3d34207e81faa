//! Section analysers and the orchestrator that runs them.
//!
//! Each section is a [`SectionRules`] value: a deterministic prompt builder,
//! a provider preference list and a local heuristic. [`SectionAnalyser`]
//! turns rules into an [`Analyser`] by walking the provider chain and
//! falling back to the heuristic. [`AnalyserSuite`] runs all eight and
//! never fails as a whole.

mod accessibility;
mod content;
mod performance;
mod security;
mod seo;
mod social;
mod tech_stack;
mod visual;

pub use accessibility::AccessibilityRules;
pub use content::ContentRules;
pub use performance::PerformanceRules;
pub use security::SecurityRules;
pub use seo::SeoRules;
pub use social::SocialRules;
pub use tech_stack::{TechStackRules, MISSING_TOOLS_CATEGORY};
pub use visual::VisualRules;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn, Instrument};

use crate::collectors::EarlyData;
use crate::fallback::try_in_order;
use crate::model::{
    AnalysisResult, CollectedData, EvidenceType, Finding, HtmlData, Impact, LighthouseData, Rating,
    ScreenshotData, Section,
};
use crate::providers::{ProviderError, ProviderRegistry, ProviderRequest, StructuredProvider, Validate};
use crate::scoring::heuristic_score;
use crate::unit::{run_unit, UnitError};

// ============================================================================
// Inputs and errors
// ============================================================================

/// What an analyser gets to look at: the full collection, or the early
/// projection (screenshots and html only) while other collectors run.
#[derive(Debug, Clone, Copy)]
pub enum AnalysisInput<'a> {
    Full(&'a CollectedData),
    Early(&'a EarlyData),
}

impl<'a> AnalysisInput<'a> {
    pub fn screenshots(&self) -> &'a ScreenshotData {
        match self {
            AnalysisInput::Full(d) => &d.screenshots,
            AnalysisInput::Early(e) => &e.screenshots,
        }
    }

    pub fn html(&self) -> &'a HtmlData {
        match self {
            AnalysisInput::Full(d) => &d.html,
            AnalysisInput::Early(e) => &e.html,
        }
    }

    pub fn full(&self) -> Option<&'a CollectedData> {
        match self {
            AnalysisInput::Full(d) => Some(d),
            AnalysisInput::Early(_) => None,
        }
    }

    pub fn lighthouse(&self) -> Result<&'a LighthouseData, AnalyserError> {
        self.full()
            .map(|d| &d.lighthouse)
            .ok_or(AnalyserError::MissingInput("lighthouse"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyserError {
    #[error("missing input: {0}")]
    MissingInput(&'static str),

    #[error("no provider produced a result ({attempts} attempts) and no local fallback applies")]
    ProvidersExhausted { attempts: usize },
}

// ============================================================================
// Analyser trait and the rules-driven implementation
// ============================================================================

#[async_trait]
pub trait Analyser: Send + Sync {
    fn section(&self) -> Section;

    /// Whether this analyser can run on [`AnalysisInput::Early`].
    fn early_capable(&self) -> bool {
        false
    }

    async fn analyse(&self, input: AnalysisInput<'_>) -> Result<AnalysisResult, AnalyserError>;

    /// Local result used when [`Analyser::analyse`] times out or fails.
    /// Runs outside the unit deadline, so it must not do I/O.
    fn fallback(&self, _input: AnalysisInput<'_>) -> Option<AnalysisResult> {
        None
    }
}

/// The section-specific half of an analyser.
pub trait SectionRules: Send + Sync {
    fn section(&self) -> Section;

    fn early_capable(&self) -> bool {
        false
    }

    /// `(provider, model key)` pairs in preference order.
    fn chain_prefs(&self) -> &'static [(&'static str, &'static str)];

    /// Build the provider request. Fails with `MissingInput` when a field
    /// the section cannot work without is absent.
    fn prompt(&self, input: &AnalysisInput<'_>) -> Result<ProviderRequest, AnalyserError>;

    /// Local result from collected data alone.
    fn heuristic(&self, input: &AnalysisInput<'_>) -> Option<AnalysisResult>;
}

pub struct SectionAnalyser {
    rules: Box<dyn SectionRules>,
    chain: Vec<Arc<dyn StructuredProvider>>,
}

impl SectionAnalyser {
    pub fn new(rules: impl SectionRules + 'static, registry: &ProviderRegistry) -> Self {
        let chain = registry.chain(rules.chain_prefs());
        Self::with_chain(rules, chain)
    }

    pub fn with_chain(
        rules: impl SectionRules + 'static,
        chain: Vec<Arc<dyn StructuredProvider>>,
    ) -> Self {
        Self {
            rules: Box::new(rules),
            chain,
        }
    }
}

#[async_trait]
impl Analyser for SectionAnalyser {
    fn section(&self) -> Section {
        self.rules.section()
    }

    fn early_capable(&self) -> bool {
        self.rules.early_capable()
    }

    async fn analyse(&self, input: AnalysisInput<'_>) -> Result<AnalysisResult, AnalyserError> {
        let section = self.rules.section();
        let request = self.rules.prompt(&input)?;
        let label = section.id();

        let attempts = match try_in_order::<AnalysisResult>(&label, &self.chain, &request).await {
            Ok(success) => {
                info!(
                    unit = %label,
                    provider = %success.provider_id,
                    position = success.position,
                    "Section analysed"
                );
                return Ok(success.value);
            }
            Err(ProviderError::ProvidersExhausted { attempts }) => attempts,
            Err(e) => {
                warn!(unit = %label, error = %e, "Provider chain failed");
                0
            }
        };

        match self.rules.heuristic(&input) {
            Some(result) => {
                info!(unit = %label, attempts, "Using local heuristic");
                Ok(result)
            }
            None => Err(AnalyserError::ProvidersExhausted { attempts }),
        }
    }

    fn fallback(&self, input: AnalysisInput<'_>) -> Option<AnalysisResult> {
        self.rules.heuristic(&input)
    }
}

// ============================================================================
// Result validation and schema
// ============================================================================

impl Validate for AnalysisResult {
    fn validate(&self) -> Result<(), String> {
        if Section::from_title(&self.section_title).is_none() {
            return Err(format!("unknown section title '{}'", self.section_title));
        }
        if self.is_error() {
            return Err("overallRating Error is reserved for analysers that could not run".to_string());
        }
        if self.score > 100 {
            return Err(format!("score {} out of range", self.score));
        }
        if self.eli5_summary.trim().is_empty() {
            return Err("eli5Summary is empty".to_string());
        }
        if let Some(f) = self.findings.iter().find(|f| f.title.trim().is_empty()) {
            return Err(format!("finding '{}' has no title", f.id));
        }
        Ok(())
    }
}

fn finding_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "title": { "type": "string" },
            "description": { "type": "string" },
            "evidence": { "type": "string" },
            "evidenceType": { "type": "string", "enum": ["HTML", "SCREENSHOT", "METRIC", "HEADER", "MISSING"] },
            "evidenceDetail": { "type": ["string", "null"] },
            "impact": { "type": "string", "enum": ["High", "Medium", "Low"] },
            "fix": { "type": "string" },
            "category": { "type": "string" },
            "section": { "type": "string" }
        },
        "required": ["id", "title", "description", "evidence", "evidenceType",
                     "evidenceDetail", "impact", "fix", "category", "section"],
        "additionalProperties": false
    })
}

/// JSON Schema every section reply must satisfy.
pub fn analysis_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "sectionTitle": { "type": "string" },
            "eli5Summary": { "type": "string" },
            "whyItMatters": { "type": "string" },
            "overallRating": { "type": "string", "enum": ["Good", "Needs Work", "Critical"] },
            "score": { "type": "integer", "minimum": 0, "maximum": 100 },
            "findings": { "type": "array", "items": finding_schema() }
        },
        "required": ["sectionTitle", "eli5Summary", "whyItMatters", "overallRating", "score", "findings"],
        "additionalProperties": false
    })
}

/// Shared request shape for every section: the section's own instructions
/// plus its slice of the collected data as JSON.
pub(crate) fn section_request(
    section: Section,
    focus: &str,
    context: serde_json::Value,
    images: Vec<String>,
) -> ProviderRequest {
    let system = format!(
        "You are a website auditor writing the \"{title}\" section of a report for a \
         non-technical small business owner. {focus}\n\n\
         Rules:\n\
         - sectionTitle must be exactly \"{title}\" and every finding's section must match it.\n\
         - Only report what the supplied data shows. Quote the evidence.\n\
         - eli5Summary is two plain-English sentences; whyItMatters is one.\n\
         - score is 0-100; overallRating is Good (80+), Needs Work (50-79) or Critical.\n\
         - Order findings by impact, High first. Each fix is a concrete action.",
        title = section.title(),
    );
    let user = serde_json::to_string_pretty(&context).unwrap_or_else(|_| context.to_string());

    ProviderRequest {
        schema_name: section.id().replace('-', "_"),
        system,
        user,
        schema: analysis_schema(),
        images,
    }
}

// ============================================================================
// Heuristic building blocks
// ============================================================================

/// Builds a [`Finding`] for one section; fields default to empty.
pub(crate) struct FindingBuilder(Finding);

impl FindingBuilder {
    pub(crate) fn new(section: Section, id: &str, title: impl Into<String>) -> Self {
        Self(Finding {
            id: id.to_string(),
            title: title.into(),
            description: String::new(),
            evidence: String::new(),
            evidence_type: EvidenceType::Html,
            evidence_detail: None,
            impact: Impact::Low,
            fix: String::new(),
            category: String::new(),
            section: section.title().to_string(),
        })
    }

    pub(crate) fn impact(mut self, impact: Impact) -> Self {
        self.0.impact = impact;
        self
    }

    pub(crate) fn evidence(mut self, kind: EvidenceType, text: impl Into<String>) -> Self {
        self.0.evidence_type = kind;
        self.0.evidence = text.into();
        self
    }

    pub(crate) fn detail(mut self, detail: impl Into<String>) -> Self {
        self.0.evidence_detail = Some(detail.into());
        self
    }

    pub(crate) fn describe(mut self, description: impl Into<String>) -> Self {
        self.0.description = description.into();
        self
    }

    pub(crate) fn fix(mut self, fix: impl Into<String>) -> Self {
        self.0.fix = fix.into();
        self
    }

    pub(crate) fn category(mut self, category: impl Into<String>) -> Self {
        self.0.category = category.into();
        self
    }

    pub(crate) fn build(self) -> Finding {
        self.0
    }
}

/// Score and rate heuristic findings, High first.
pub(crate) fn heuristic_result(
    section: Section,
    mut findings: Vec<Finding>,
    eli5_summary: String,
    why_it_matters: &str,
) -> AnalysisResult {
    findings.sort_by_key(|f| f.impact);
    let score = heuristic_score(&findings);
    AnalysisResult {
        section_title: section.title().to_string(),
        eli5_summary,
        why_it_matters: why_it_matters.to_string(),
        overall_rating: Rating::from_score(score),
        score,
        findings,
    }
}

/// The error result that stands in for an analyser that failed or timed out.
pub fn placeholder(section: Section, err: &dyn std::fmt::Display) -> AnalysisResult {
    AnalysisResult {
        section_title: section.title().to_string(),
        eli5_summary: format!("Analysis unavailable: {err}"),
        why_it_matters: "This section could not be analysed due to an error.".to_string(),
        overall_rating: Rating::Error,
        score: 0,
        findings: Vec::new(),
    }
}

// Provider preferences shared by several sections.
pub(crate) const VISION_CHAIN: &[(&str, &str)] = &[("gemini", "pro"), ("anthropic", "sonnet")];
pub(crate) const FAST_CHAIN: &[(&str, &str)] = &[("gemini", "flash"), ("anthropic", "sonnet")];
pub(crate) const TEXT_CHAIN: &[(&str, &str)] = &[("openai", "mini"), ("anthropic", "sonnet")];

// ============================================================================
// Orchestrator
// ============================================================================

/// The early analyser in flight. Dropping it aborts the task.
pub struct EarlyAnalysis {
    index: usize,
    section: Section,
    handle: JoinHandle<Result<AnalysisResult, UnitError>>,
}

impl EarlyAnalysis {
    pub fn index(&self) -> usize {
        self.index
    }

    async fn outcome(mut self) -> AnalysisResult {
        let section = self.section;
        match (&mut self.handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => placeholder(section, &e),
            Err(e) => placeholder(section, &format!("{} task ended: {e}", section.title())),
        }
    }
}

impl Drop for EarlyAnalysis {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Resolve a failed unit: the analyser's local fallback if it has one,
/// otherwise the error placeholder.
fn recover(analyser: &dyn Analyser, input: AnalysisInput<'_>, err: &UnitError) -> AnalysisResult {
    let section = analyser.section();
    match analyser.fallback(input) {
        Some(result) => {
            info!(unit = %section.id(), error = %err, "Using local heuristic after unit failure");
            result
        }
        None => placeholder(section, err),
    }
}

/// `timeout`, shortened so the unit ends by `deadline`.
fn bounded(timeout: Duration, deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => timeout.min(deadline.saturating_duration_since(Instant::now())),
        None => timeout,
    }
}

pub struct AnalyserSuite {
    timeout: Duration,
    analysers: Vec<Arc<dyn Analyser>>,
}

impl AnalyserSuite {
    pub fn new(timeout: Duration, analysers: Vec<Arc<dyn Analyser>>) -> Self {
        Self { timeout, analysers }
    }

    /// The eight standard sections, in report order.
    pub fn from_registry(registry: &ProviderRegistry, timeout: Duration) -> Self {
        let analysers: Vec<Arc<dyn Analyser>> = vec![
            Arc::new(SectionAnalyser::new(VisualRules, registry)),
            Arc::new(SectionAnalyser::new(PerformanceRules, registry)),
            Arc::new(SectionAnalyser::new(SeoRules, registry)),
            Arc::new(SectionAnalyser::new(AccessibilityRules, registry)),
            Arc::new(SectionAnalyser::new(SecurityRules, registry)),
            Arc::new(SectionAnalyser::new(SocialRules, registry)),
            Arc::new(SectionAnalyser::new(TechStackRules, registry)),
            Arc::new(SectionAnalyser::new(ContentRules, registry)),
        ];
        Self::new(timeout, analysers)
    }

    pub fn len(&self) -> usize {
        self.analysers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analysers.is_empty()
    }

    pub fn sections(&self) -> Vec<Section> {
        self.analysers.iter().map(|a| a.section()).collect()
    }

    fn early_index(&self) -> Option<usize> {
        self.analysers.iter().position(|a| a.early_capable())
    }

    /// Run every analyser on the full data. One result per analyser, in order.
    pub async fn run_all(&self, data: &CollectedData) -> Vec<AnalysisResult> {
        self.run_batch(data, None, None).await
    }

    async fn run_batch(
        &self,
        data: &CollectedData,
        skip: Option<usize>,
        deadline: Option<Instant>,
    ) -> Vec<AnalysisResult> {
        let timeout = bounded(self.timeout, deadline);
        let runs = self
            .analysers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .map(|(_, analyser)| {
                let section = analyser.section();
                let name = section.id();
                async move {
                    let input = AnalysisInput::Full(data);
                    let outcome = run_unit(&name, timeout, analyser.analyse(input)).await;
                    outcome
                        .result
                        .unwrap_or_else(|e| recover(analyser.as_ref(), input, &e))
                }
                .instrument(tracing::info_span!("analyser", unit = %section.id()))
            });
        join_all(runs).await
    }

    /// Start the early-capable analyser as soon as `inputs` resolves. `None`
    /// when no analyser is early-capable. With a `deadline` the unit is cut
    /// short so it ends by then.
    pub fn start_early(
        &self,
        inputs: BoxFuture<'static, Result<EarlyData, UnitError>>,
        deadline: Option<Instant>,
    ) -> Option<EarlyAnalysis> {
        let index = self.early_index()?;
        let analyser = self.analysers[index].clone();
        let section = analyser.section();
        let timeout = self.timeout;

        let handle = tokio::spawn(
            async move {
                let early = inputs.await?;
                let input = AnalysisInput::Early(&early);
                let name = section.id();
                let outcome = run_unit(&name, bounded(timeout, deadline), analyser.analyse(input)).await;
                Ok::<_, UnitError>(
                    outcome
                        .result
                        .unwrap_or_else(|e| recover(analyser.as_ref(), input, &e)),
                )
            }
            .instrument(tracing::info_span!("analyser", unit = %section.id(), early = true)),
        );

        Some(EarlyAnalysis {
            index,
            section,
            handle,
        })
    }

    /// Run the remaining analysers on the full data, wait for the early one
    /// and merge. Every unit ends by `deadline` when one is given.
    pub async fn run_with_early(
        &self,
        data: &CollectedData,
        early: Option<EarlyAnalysis>,
        deadline: Option<Instant>,
    ) -> Vec<AnalysisResult> {
        let Some(early) = early else {
            return self.run_batch(data, None, deadline).await;
        };
        let index = early.index();
        let (rest, early_result) =
            tokio::join!(self.run_batch(data, Some(index), deadline), early.outcome());
        Self::merge(index, early_result, rest)
    }

    /// Put the early result back at its static index.
    pub fn merge(
        index: usize,
        early: AnalysisResult,
        mut rest: Vec<AnalysisResult>,
    ) -> Vec<AnalysisResult> {
        let index = index.min(rest.len());
        rest.insert(index, early);
        rest
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use crate::model::{CollectedData, HtmlData, LighthouseData, ScreenshotData};

    /// Required fields at their defaults, every optional field missing.
    pub(crate) fn collected() -> CollectedData {
        CollectedData {
            screenshots: ScreenshotData {
                desktop: "https://cdn.test/desktop.png".into(),
                mobile: "https://cdn.test/mobile.png".into(),
            },
            lighthouse: LighthouseData::default(),
            html: HtmlData::default(),
            robots: None,
            sitemap: None,
            ssl_dns: None,
            security_headers: None,
            serp: None,
            link_check: None,
            tech_stack: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_shape() {
        let r = placeholder(Section::Security, &"boom");
        assert_eq!(r.section_title, "Security & Trust");
        assert_eq!(r.overall_rating, Rating::Error);
        assert_eq!(r.score, 0);
        assert!(r.findings.is_empty());
        assert_eq!(r.eli5_summary, "Analysis unavailable: boom");
    }

    #[test]
    fn test_merge_restores_static_order() {
        let rest: Vec<_> = Section::ALL[1..]
            .iter()
            .map(|s| placeholder(*s, &"x"))
            .collect();
        let merged = AnalyserSuite::merge(0, placeholder(Section::Visual, &"x"), rest);
        let titles: Vec<_> = merged.iter().map(|r| r.section_title.as_str()).collect();
        let expected: Vec<_> = Section::ALL.iter().map(|s| s.title()).collect();
        assert_eq!(titles, expected);
    }

    #[test]
    fn test_validate_rejects_unknown_section_and_bad_score() {
        let mut r = heuristic_result(Section::Seo, vec![], "fine".into(), "why");
        assert!(r.validate().is_ok());
        r.score = 101;
        assert!(r.validate().is_err());
        r.score = 50;
        r.section_title = "Vibes".into();
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_error_rating_from_provider() {
        let reply = json!({
            "sectionTitle": "SEO & Keywords",
            "eli5Summary": "Looks great.",
            "whyItMatters": "Search traffic.",
            "overallRating": "Error",
            "score": 95,
            "findings": []
        });
        let r: AnalysisResult = serde_json::from_value(reply).unwrap();
        assert!(r.is_error());
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_heuristic_result_orders_and_scores() {
        let findings = vec![
            FindingBuilder::new(Section::Seo, "a", "low").impact(Impact::Low).build(),
            FindingBuilder::new(Section::Seo, "b", "high").impact(Impact::High).build(),
        ];
        let r = heuristic_result(Section::Seo, findings, "s".into(), "w");
        assert_eq!(r.findings[0].id, "b");
        assert_eq!(r.score, 72);
        assert_eq!(r.overall_rating, Rating::NeedsWork);
    }

    #[test]
    fn test_standard_suite_order() {
        let suite = AnalyserSuite::from_registry(&ProviderRegistry::new(), Duration::from_secs(1));
        assert_eq!(suite.sections(), Section::ALL.to_vec());
        assert_eq!(suite.early_index(), Some(0));
    }
}
