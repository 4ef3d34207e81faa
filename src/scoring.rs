use crate::model::{AnalysisResult, Finding, Impact, Rating, Section, TopFix};

/// Overall 0-100 score: the weighted mean of every section that did not
/// error, rounded. Zero when every section errored.
///
/// Both synthesis paths use this one function; the provider path sends it
/// as the baseline and the local path returns it directly.
pub fn weighted_score(results: &[AnalysisResult]) -> u8 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for r in results.iter().filter(|r| !r.is_error()) {
        let weight = Section::from_title(&r.section_title)
            .map(Section::weight)
            .unwrap_or(1.0);
        weighted_sum += f64::from(r.score.min(100)) * weight;
        total_weight += weight;
    }

    if total_weight == 0.0 {
        return 0;
    }
    (weighted_sum / total_weight).round().clamp(0.0, 100.0) as u8
}

/// The first `limit` High-impact findings, walking sections in report order.
pub fn top_fixes(results: &[AnalysisResult], limit: usize) -> Vec<TopFix> {
    results
        .iter()
        .flat_map(|r| r.findings.iter().map(move |f| (r, f)))
        .filter(|(_, f)| f.impact == Impact::High)
        .take(limit)
        .map(|(r, f)| TopFix {
            title: f.title.clone(),
            section: r.section_title.clone(),
            impact: f.impact.to_string(),
            description: f.fix.clone(),
        })
        .collect()
}

fn plural(n: usize) -> &'static str {
    if n > 1 {
        "s"
    } else {
        ""
    }
}

/// Plain-text summary for when no provider produced one.
pub fn fallback_summary(
    hostname: &str,
    overall_score: u8,
    results: &[AnalysisResult],
    fixes: &[TopFix],
) -> String {
    let count = |rating: Rating| results.iter().filter(|r| r.overall_rating == rating).count();
    let good = count(Rating::Good);
    let critical = count(Rating::Critical);
    let errored = count(Rating::Error);

    let mut parts = vec![format!("{hostname} scored {overall_score}/100 overall.")];
    if good > 0 {
        parts.push(format!("{good} section{} rated Good.", plural(good)));
    }
    if critical > 0 {
        let verb = if critical == 1 { "needs" } else { "need" };
        parts.push(format!(
            "{critical} section{} {verb} urgent attention.",
            plural(critical)
        ));
    }
    if errored > 0 {
        parts.push(format!(
            "{errored} section{} could not be analysed.",
            plural(errored)
        ));
    }
    if let Some(first) = fixes.first() {
        parts.push(format!("Top priority: {}.", first.title.to_lowercase()));
    }
    parts.join(" ")
}

/// Deterministic score for heuristic findings: start from 100 and deduct
/// per finding by impact.
pub fn heuristic_score(findings: &[Finding]) -> u8 {
    let penalty: i32 = findings
        .iter()
        .map(|f| match f.impact {
            Impact::High => 25,
            Impact::Medium => 10,
            Impact::Low => 3,
        })
        .sum();
    (100 - penalty).clamp(0, 100) as u8
}
