use crate::config::AuditConfig;
use crate::detached::DetachedTasks;
use crate::job::TargetJob;
use crate::log_capture::LogState;
use crate::pipeline::AuditPipeline;
use crate::rate_limit::RateLimiter;
use crate::storage::ReportStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::warn;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AuditConfig,
    pub logs: Arc<LogState>,
    pub rate_limiter: RateLimiter,
    pub tracker: Arc<AuditTracker>,
    pub store: Arc<dyn ReportStore>,
    pub pipeline: Arc<AuditPipeline>,
    pub detached: DetachedTasks,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        config: AuditConfig,
        logs: Arc<LogState>,
        tracker: Arc<AuditTracker>,
        store: Arc<dyn ReportStore>,
        pipeline: Arc<AuditPipeline>,
        detached: DetachedTasks,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            rate_limiter: RateLimiter::new(config.rate_limit_max, config.rate_limit_window),
            config,
            logs,
            tracker,
            store,
            pipeline,
            detached,
            shutdown_tx,
        }
    }
}

// ============================================================================
// Audit stage tracking
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuditStage {
    Collecting,
    Analysing,
    Synthesizing,
    Complete,
    Failed,
}

impl AuditStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, AuditStage::Complete | AuditStage::Failed)
    }

    /// Stages only move forward. Analysis and synthesis degrade instead of
    /// failing, so `Failed` is reachable from `Collecting` alone.
    pub fn can_advance_to(self, next: AuditStage) -> bool {
        matches!(
            (self, next),
            (AuditStage::Collecting, AuditStage::Analysing)
                | (AuditStage::Collecting, AuditStage::Failed)
                | (AuditStage::Analysing, AuditStage::Synthesizing)
                | (AuditStage::Synthesizing, AuditStage::Complete)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAudit {
    pub audit_id: String,
    pub url: String,
    pub hostname: String,
    pub stage: AuditStage,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audits currently in flight. An entry leaves the tracker when it reaches
/// a terminal stage or is abandoned.
#[derive(Default)]
pub struct AuditTracker {
    audits: RwLock<HashMap<String, ActiveAudit>>,
}

impl AuditTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self, job: &TargetJob) {
        let now = Utc::now();
        self.audits.write().await.insert(
            job.audit_id.clone(),
            ActiveAudit {
                audit_id: job.audit_id.clone(),
                url: job.url.clone(),
                hostname: job.hostname.clone(),
                stage: AuditStage::Collecting,
                started_at: now,
                updated_at: now,
            },
        );
    }

    /// Move `audit_id` to `next`. Returns false and leaves the entry alone
    /// when the transition is not allowed or the audit is unknown.
    pub async fn advance(&self, audit_id: &str, next: AuditStage) -> bool {
        let mut audits = self.audits.write().await;
        let Some(entry) = audits.get_mut(audit_id) else {
            return false;
        };
        if !entry.stage.can_advance_to(next) {
            warn!(
                audit_id,
                from = ?entry.stage,
                to = ?next,
                "Ignoring invalid stage transition"
            );
            return false;
        }
        if next.is_terminal() {
            audits.remove(audit_id);
        } else {
            entry.stage = next;
            entry.updated_at = Utc::now();
        }
        true
    }

    /// Drop an audit that will never finish, e.g. one cut off by the
    /// overall time budget.
    pub async fn abandon(&self, audit_id: &str) -> Option<ActiveAudit> {
        self.audits.write().await.remove(audit_id)
    }

    pub async fn stage(&self, audit_id: &str) -> Option<AuditStage> {
        self.audits.read().await.get(audit_id).map(|a| a.stage)
    }

    /// Oldest first.
    pub async fn active(&self) -> Vec<ActiveAudit> {
        let mut list: Vec<_> = self.audits.read().await.values().cloned().collect();
        list.sort_by_key(|a| a.started_at);
        list
    }
}
