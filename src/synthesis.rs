//! Final synthesis: executive summary, overall score and top fixes.
//!
//! Walks a provider chain (gpt-5, then gemini flash) and degrades to a local
//! computation that cannot fail.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::MAX_TOP_FIXES;
use crate::fallback::try_in_order;
use crate::model::{AnalysisResult, CollectedData, Impact, SynthesisOutput, SynthesisSource};
use crate::providers::{ProviderRegistry, ProviderRequest, StructuredProvider, Validate};
use crate::scoring::{fallback_summary, top_fixes, weighted_score};

pub const SYNTHESIS_CHAIN: &[(&str, &str)] = &[("openai", "gpt5"), ("gemini", "flash")];

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    pub output: SynthesisOutput,
    pub source: SynthesisSource,
}

impl Validate for SynthesisOutput {
    fn validate(&self) -> Result<(), String> {
        if self.executive_summary.trim().is_empty() {
            return Err("executiveSummary is empty".to_string());
        }
        if self.overall_score > 100 {
            return Err(format!("overallScore {} out of range", self.overall_score));
        }
        if self.top_fixes.len() > MAX_TOP_FIXES {
            return Err(format!("{} top fixes, at most {MAX_TOP_FIXES}", self.top_fixes.len()));
        }
        for fix in &self.top_fixes {
            if !["High", "Medium", "Low"].contains(&fix.impact.as_str()) {
                return Err(format!("top fix '{}' has impact '{}'", fix.title, fix.impact));
            }
        }
        Ok(())
    }
}

fn synthesis_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "executiveSummary": { "type": "string" },
            "overallScore": { "type": "integer", "minimum": 0, "maximum": 100 },
            "topFixes": {
                "type": "array",
                "maxItems": MAX_TOP_FIXES,
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "section": { "type": "string" },
                        "impact": { "type": "string", "enum": ["High", "Medium", "Low"] },
                        "description": { "type": "string" }
                    },
                    "required": ["title", "section", "impact", "description"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["executiveSummary", "overallScore", "topFixes"],
        "additionalProperties": false
    })
}

/// The consolidated view sent to the synthesis model: per-section rating,
/// score and high-impact finding titles, plus the local score baseline.
pub fn synthesis_request(
    hostname: &str,
    results: &[AnalysisResult],
    data: &CollectedData,
) -> ProviderRequest {
    let sections: Vec<_> = results
        .iter()
        .map(|r| {
            let high: Vec<_> = r
                .findings
                .iter()
                .filter(|f| f.impact == Impact::High)
                .map(|f| f.title.as_str())
                .collect();
            json!({
                "section": r.section_title,
                "rating": r.overall_rating,
                "score": if r.is_error() { None } else { Some(r.score) },
                "highImpactFindings": high,
            })
        })
        .collect();

    let context = json!({
        "hostname": hostname,
        "platform": data.tech_stack.as_ref().and_then(|t| t.platform.clone()),
        "baselineScore": weighted_score(results),
        "sections": sections,
    });

    ProviderRequest {
        schema_name: "audit_synthesis".to_string(),
        system: format!(
            "You write the executive summary of a website audit for a small business owner. \
             Use plain English, three to five sentences, and mention the most urgent problem. \
             overallScore should stay close to baselineScore unless the findings clearly \
             justify a different number. Pick at most {MAX_TOP_FIXES} topFixes, most \
             impactful first, each naming its section exactly as given. Sections rated Error \
             could not be analysed; say so rather than guessing."
        ),
        user: serde_json::to_string_pretty(&context).unwrap_or_else(|_| context.to_string()),
        schema: synthesis_schema(),
        images: Vec::new(),
    }
}

/// Synthesis computed from the section results alone.
pub fn local_synthesis(hostname: &str, results: &[AnalysisResult]) -> SynthesisOutput {
    let overall_score = weighted_score(results);
    let fixes = top_fixes(results, MAX_TOP_FIXES);
    SynthesisOutput {
        executive_summary: fallback_summary(hostname, overall_score, results, &fixes),
        overall_score,
        top_fixes: fixes,
    }
}

pub struct Synthesizer {
    chain: Vec<Arc<dyn StructuredProvider>>,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(registry: &ProviderRegistry, timeout: Duration) -> Self {
        Self::with_chain(registry.chain(SYNTHESIS_CHAIN), timeout)
    }

    pub fn with_chain(chain: Vec<Arc<dyn StructuredProvider>>, timeout: Duration) -> Self {
        Self { chain, timeout }
    }

    /// Never fails: any provider problem degrades to [`local_synthesis`].
    /// With a `deadline` the provider chain is cut off by then.
    pub async fn synthesize(
        &self,
        hostname: &str,
        results: &[AnalysisResult],
        data: &CollectedData,
        deadline: Option<Instant>,
    ) -> SynthesisResult {
        let timeout = match deadline {
            Some(deadline) => self
                .timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.timeout,
        };
        if !self.chain.is_empty() {
            let request = synthesis_request(hostname, results, data);
            let attempt = tokio::time::timeout(
                timeout,
                try_in_order::<SynthesisOutput>("synthesis", &self.chain, &request),
            )
            .await;

            match attempt {
                Ok(Ok(success)) => {
                    let source = if success.position == 0 {
                        SynthesisSource::Primary
                    } else {
                        SynthesisSource::Fallback
                    };
                    info!(provider = %success.provider_id, ?source, "Synthesis complete");
                    return SynthesisResult {
                        output: success.value,
                        source,
                    };
                }
                Ok(Err(e)) => warn!(error = %e, "Synthesis providers failed, using local synthesis"),
                Err(_) => warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Synthesis timed out, using local synthesis"
                ),
            }
        }

        SynthesisResult {
            output: local_synthesis(hostname, results),
            source: SynthesisSource::Local,
        }
    }
}
