//! Session replay over cached simulations
//!
//! A [`ReplaySession`] is a named, ordered snapshot of simulation cache
//! entries. Replaying it re-runs analysis without touching the network;
//! every step shares one analyzer session so the running-average anomaly
//! rule applies across the replay.

use crate::analysis::{AnalysisComparison, AnalysisOptions, AnalysisResult, ResultAnalyzer, TransactionProfile};
use crate::observability::CorrelationId;
use crate::simulation::{SimulationCache, SimulationResult};
use crate::structured_logging::StructuredLogger;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// One resolved cache entry
#[derive(Debug, Clone)]
pub struct ReplayStep {
    pub key: String,
    pub result: Arc<SimulationResult>,
    pub cached_at: DateTime<Utc>,
    pub access_count: u64,
}

#[derive(Debug, Clone)]
pub struct ReplaySession {
    pub id: CorrelationId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub steps: Vec<ReplayStep>,
    /// Requested keys with no cache entry, in request order
    pub missing_keys: Vec<String>,
}

impl ReplaySession {
    /// Snapshot the given keys; reading them does not count as cache access
    pub fn from_cache(name: impl Into<String>, cache: &SimulationCache, keys: &[String]) -> Self {
        let mut steps = Vec::new();
        let mut missing_keys = Vec::new();

        for key in keys {
            match cache.entry(key) {
                Some(entry) => steps.push(ReplayStep {
                    key: key.clone(),
                    result: entry.value,
                    cached_at: entry.created_at,
                    access_count: entry.access_count,
                }),
                None => missing_keys.push(key.clone()),
            }
        }

        Self {
            id: CorrelationId::new(),
            name: name.into(),
            created_at: Utc::now(),
            steps,
            missing_keys,
        }
    }

    /// Snapshot every cached simulation, oldest first
    pub fn from_whole_cache(name: impl Into<String>, cache: &SimulationCache) -> Self {
        Self::from_cache(name, cache, &cache.keys())
    }

    pub fn is_complete(&self) -> bool {
        self.missing_keys.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Compare each analyzed step with the previous analyzed step
    pub compare_adjacent: bool,
    pub profile: Option<TransactionProfile>,
}

#[derive(Debug, Clone)]
pub enum ReplayStepOutcome {
    Analyzed(Arc<AnalysisResult>),
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct ReplayStepReport {
    pub index: usize,
    pub key: String,
    pub outcome: ReplayStepOutcome,
}

#[derive(Debug, Clone)]
pub struct StepComparison {
    pub from: usize,
    pub to: usize,
    pub comparison: AnalysisComparison,
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub session_id: CorrelationId,
    pub name: String,
    pub steps: Vec<ReplayStepReport>,
    pub comparisons: Vec<StepComparison>,
    pub analyzed: usize,
    pub failed: usize,
    pub missing: usize,
}

#[derive(Debug)]
pub struct ReplayRunner {
    analyzer: Arc<ResultAnalyzer>,
}

impl ReplayRunner {
    pub fn new(analyzer: Arc<ResultAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Analyze every step in order; a failing step is recorded and skipped
    pub fn run(&self, session: &ReplaySession, options: &ReplayOptions) -> ReplayReport {
        let logger = StructuredLogger::new(session.id.to_string());
        self.analyzer.reset_session(session.id.as_str());

        let mut analysis_options = AnalysisOptions::new().with_session(session.id.as_str());
        analysis_options.profile = options.profile;

        let mut steps = Vec::with_capacity(session.steps.len());
        let mut comparisons = Vec::new();
        let mut previous: Option<(usize, Arc<AnalysisResult>)> = None;

        for (index, step) in session.steps.iter().enumerate() {
            let outcome = match self.analyzer.analyze(&step.result, &analysis_options) {
                Ok(analysis) => {
                    if options.compare_adjacent {
                        if let Some((from, before)) = &previous {
                            comparisons.push(StepComparison {
                                from: *from,
                                to: index,
                                comparison: self.analyzer.compare(before, &analysis),
                            });
                        }
                    }
                    previous = Some((index, analysis.clone()));
                    ReplayStepOutcome::Analyzed(analysis)
                }
                Err(e) => ReplayStepOutcome::Failed {
                    error: e.to_string(),
                },
            };

            logger.log_replay_step(index, &step.key, matches!(outcome, ReplayStepOutcome::Analyzed(_)));
            steps.push(ReplayStepReport {
                index,
                key: step.key.clone(),
                outcome,
            });
        }

        let failed = steps
            .iter()
            .filter(|s| matches!(s.outcome, ReplayStepOutcome::Failed { .. }))
            .count();
        let report = ReplayReport {
            session_id: session.id.clone(),
            name: session.name.clone(),
            analyzed: steps.len() - failed,
            failed,
            missing: session.missing_keys.len(),
            steps,
            comparisons,
        };

        info!(
            session = %session.id.short(),
            name = %session.name,
            analyzed = report.analyzed,
            failed = report.failed,
            missing = report.missing,
            "Replay finished"
        );
        report
    }
}
