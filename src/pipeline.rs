//! Drives one audit through collecting, analysing and synthesizing.

use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};

use crate::analysers::AnalyserSuite;
use crate::collectors::CollectorSuite;
use crate::config::{AuditConfig, PERSIST_RESERVE_SECS, SYNTHESIS_RESERVE_SECS};
use crate::detached::DetachedTasks;
use crate::error::AuditError;
use crate::job::TargetJob;
use crate::log_capture::{LogLevel, LogSource, LogState};
use crate::model::{AuditHistoryEntry, AuditReport, AuditStatus, StageTimings};
use crate::providers::ProviderRegistry;
use crate::report::build_report;
use crate::state::{AuditStage, AuditTracker};
use crate::storage::ReportStore;
use crate::synthesis::Synthesizer;

fn ms_since(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

pub struct AuditPipeline {
    collectors: CollectorSuite,
    analysers: AnalyserSuite,
    synthesizer: Synthesizer,
    store: Arc<dyn ReportStore>,
    tracker: Arc<AuditTracker>,
    logs: Arc<LogState>,
}

impl AuditPipeline {
    pub fn new(
        collectors: CollectorSuite,
        analysers: AnalyserSuite,
        synthesizer: Synthesizer,
        store: Arc<dyn ReportStore>,
        tracker: Arc<AuditTracker>,
        logs: Arc<LogState>,
    ) -> Self {
        Self {
            collectors,
            analysers,
            synthesizer,
            store,
            tracker,
            logs,
        }
    }

    /// Production wiring: real collectors and every configured provider.
    pub fn from_config(
        config: &AuditConfig,
        store: Arc<dyn ReportStore>,
        tracker: Arc<AuditTracker>,
        logs: Arc<LogState>,
        detached: DetachedTasks,
    ) -> Self {
        let registry = ProviderRegistry::from_keys(&config.keys);
        info!(providers = registry.len(), "Provider registry ready");
        Self::new(
            CollectorSuite::from_config(config, store.clone(), detached),
            AnalyserSuite::from_registry(&registry, config.analyser_timeout),
            Synthesizer::new(&registry, config.analyser_timeout),
            store,
            tracker,
            logs,
        )
    }

    async fn emit(&self, job: &TargetJob, source: LogSource, level: LogLevel, message: String) {
        self.logs.emit_for(&job.audit_id, source, level, message).await;
    }

    /// Best-effort history write.
    async fn record_history(
        &self,
        job: &TargetJob,
        status: AuditStatus,
        overall_score: Option<u8>,
        report_url: Option<String>,
    ) {
        let entry = AuditHistoryEntry {
            audit_id: job.audit_id.clone(),
            url: job.url.clone(),
            hostname: job.hostname.clone(),
            overall_score,
            status,
            created_at: chrono::Utc::now().to_rfc3339(),
            report_url,
        };
        if let Err(e) = self.store.append_history(&entry).await {
            warn!(audit_id = %job.audit_id, error = %e, "Failed to record audit history");
            self.emit(
                job,
                LogSource::Storage,
                LogLevel::Warn,
                format!("History write failed: {e}"),
            )
            .await;
        }
    }

    /// Best-effort report write. Returns the report URL on success.
    async fn persist(&self, job: &TargetJob, report: &AuditReport) -> Option<String> {
        match self.store.store_report(&job.audit_id, report).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(audit_id = %job.audit_id, error = %e, "Failed to store report");
                self.emit(
                    job,
                    LogSource::Storage,
                    LogLevel::Warn,
                    format!("Report write failed: {e}"),
                )
                .await;
                None
            }
        }
    }

    pub async fn run(&self, job: &TargetJob) -> Result<AuditReport, AuditError> {
        let span = info_span!("audit", audit_id = %job.audit_id);
        self.run_inner(job, None).instrument(span).await
    }

    /// With a `deadline`, analysing and synthesizing are cut short so the
    /// audit completes before it instead of failing.
    async fn run_inner(
        &self,
        job: &TargetJob,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<AuditReport, AuditError> {
        let analysis_deadline =
            deadline.and_then(|d| d.checked_sub(Duration::from_secs(SYNTHESIS_RESERVE_SECS)));
        let synthesis_deadline =
            deadline.and_then(|d| d.checked_sub(Duration::from_secs(PERSIST_RESERVE_SECS)));
        let started = Instant::now();
        self.tracker.begin(job).await;
        self.record_history(job, AuditStatus::Running, None, None).await;
        info!(url = %job.url, label = ?job.page_label, "Audit started");
        self.emit(
            job,
            LogSource::Pipeline,
            LogLevel::Info,
            format!("Audit started for {}", job.url),
        )
        .await;

        // Collecting, with the early analyser overlapping the tail of it.
        let stage_start = Instant::now();
        let run = self.collectors.start(job);
        let early = self.analysers.start_early(run.early_inputs(), analysis_deadline);
        let data = match run.finish().await {
            Ok(data) => data,
            Err(e) => {
                drop(early);
                self.tracker.advance(&job.audit_id, AuditStage::Failed).await;
                self.record_history(job, AuditStatus::Failed, None, None).await;
                error!(error = %e, elapsed_ms = ms_since(started), "Audit failed");
                self.emit(job, LogSource::Collector, LogLevel::Error, e.to_string())
                    .await;
                return Err(e);
            }
        };
        let collecting_ms = ms_since(stage_start);
        info!(elapsed_ms = collecting_ms, "Collecting complete");
        self.emit(
            job,
            LogSource::Collector,
            LogLevel::Info,
            format!("Collected data in {collecting_ms}ms"),
        )
        .await;

        // Analysing
        self.tracker.advance(&job.audit_id, AuditStage::Analysing).await;
        let stage_start = Instant::now();
        let results = self
            .analysers
            .run_with_early(&data, early, analysis_deadline)
            .await;
        let analysing_ms = ms_since(stage_start);
        let errored = results.iter().filter(|r| r.is_error()).count();
        info!(elapsed_ms = analysing_ms, errored, "Analysing complete");
        self.emit(
            job,
            LogSource::Analyser,
            if errored > 0 { LogLevel::Warn } else { LogLevel::Info },
            format!(
                "{} sections analysed in {analysing_ms}ms, {errored} unavailable",
                results.len()
            ),
        )
        .await;

        // Synthesizing
        self.tracker.advance(&job.audit_id, AuditStage::Synthesizing).await;
        let stage_start = Instant::now();
        let synthesis = self
            .synthesizer
            .synthesize(&job.hostname, &results, &data, synthesis_deadline)
            .await;
        let synthesizing_ms = ms_since(stage_start);
        info!(elapsed_ms = synthesizing_ms, source = ?synthesis.source, "Synthesis complete");
        self.emit(
            job,
            LogSource::Synthesis,
            LogLevel::Info,
            format!("Synthesis ({:?}) in {synthesizing_ms}ms", synthesis.source),
        )
        .await;

        let timings = StageTimings {
            collecting_ms,
            analysing_ms,
            synthesizing_ms,
        };
        let mut report = build_report(job, &data, &results, synthesis, timings, ms_since(started));
        report.report_url = self.persist(job, &report).await;

        self.tracker.advance(&job.audit_id, AuditStage::Complete).await;
        self.record_history(
            job,
            AuditStatus::Complete,
            Some(report.overall_score),
            report.report_url.clone(),
        )
        .await;

        info!(
            overall_score = report.overall_score,
            elapsed_ms = report.audit_duration_ms,
            "Audit complete"
        );
        self.emit(
            job,
            LogSource::Pipeline,
            LogLevel::Info,
            format!(
                "Audit complete: {}/100 in {}ms",
                report.overall_score, report.audit_duration_ms
            ),
        )
        .await;
        Ok(report)
    }

    /// [`Self::run`] under an overall time budget. Later stages shrink to fit
    /// what is left of it; if the budget still runs out the run is dropped,
    /// which aborts every unit still in flight.
    pub async fn run_within(
        &self,
        job: &TargetJob,
        budget: Duration,
    ) -> Result<AuditReport, AuditError> {
        let deadline = tokio::time::Instant::now() + budget;
        let span = info_span!("audit", audit_id = %job.audit_id);
        let run = self.run_inner(job, Some(deadline)).instrument(span);
        match tokio::time::timeout_at(deadline, run).await {
            Ok(result) => result,
            Err(_) => {
                self.tracker.abandon(&job.audit_id).await;
                self.record_history(job, AuditStatus::Failed, None, None).await;
                let message = format!("audit exceeded {}s", budget.as_secs());
                warn!(audit_id = %job.audit_id, "{}", message);
                self.emit(job, LogSource::Pipeline, LogLevel::Error, message.clone())
                    .await;
                Err(AuditError::Timeout(message))
            }
        }
    }

    /// Run several pages concurrently, each under `budget`. Results keep the
    /// order of `jobs`.
    pub async fn run_pages(
        &self,
        jobs: &[TargetJob],
        budget: Duration,
    ) -> Vec<Result<AuditReport, AuditError>> {
        join_all(jobs.iter().map(|job| self.run_within(job, budget))).await
    }
}
