//! Analysis data model

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Analysis cannot fail on valid input; this signals an upstream bug
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Inconsistent simulation result {simulation_id}: {reason}")]
    InconsistentResult {
        simulation_id: String,
        reason: String,
    },

    #[error("Internal analysis error: {0}")]
    Internal(String),
}

pub use crate::simulation::TransactionProfile;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisOptions {
    /// Session for the running-average anomaly rule; sessioned analyses are not cached
    pub session_id: Option<String>,
    pub profile: Option<TransactionProfile>,
    pub use_cache: bool,
}

impl AnalysisOptions {
    pub fn new() -> Self {
        Self {
            session_id: None,
            profile: None,
            use_cache: true,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_profile(mut self, profile: TransactionProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// Decoded payload of a `Program log:` or `Program data:` line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LogPayload {
    Bytes(Vec<u8>),
    Structured(serde_json::Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LogEvent {
    Invoke { program: Pubkey, depth: u32 },
    Success { program: Pubkey },
    Failed { program: Pubkey, reason: String },
    Consumed { program: Pubkey, units: u64, limit: u64 },
    Log { program: Option<Pubkey>, payload: LogPayload },
    Data { program: Option<Pubkey>, payload: LogPayload },
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InvocationStatus {
    /// No matching success/failed line (truncated logs)
    Incomplete,
    Success,
    Failed(String),
}

/// One program invocation reconstructed from the logs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub program: Pubkey,
    pub depth: u32,
    /// Index of the calling invocation
    pub parent: Option<usize>,
    pub status: InvocationStatus,
    pub compute_units: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedLogs {
    pub events: Vec<LogEvent>,
    pub invocations: Vec<Invocation>,
    pub max_depth: u32,
}

impl ParsedLogs {
    pub fn top_level(&self) -> impl Iterator<Item = &Invocation> {
        self.invocations.iter().filter(|i| i.depth == 1)
    }

    pub fn payloads(&self) -> impl Iterator<Item = &LogPayload> {
        self.events.iter().filter_map(|e| match e {
            LogEvent::Log { payload, .. } | LogEvent::Data { payload, .. } => Some(payload),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComputeBreakdown {
    pub overhead: u64,
    pub account_access: u64,
    pub instructions: u64,
    pub per_instruction: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramCompute {
    pub program: Pubkey,
    pub depth: u32,
    pub units: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputeAnalysis {
    pub units_consumed: u64,
    /// Whether the runtime reported consumption
    pub reported: bool,
    pub limit: u64,
    /// `1 - units / limit`
    pub efficiency: f64,
    pub breakdown: ComputeBreakdown,
    pub per_program: Vec<ProgramCompute>,
}

impl ComputeAnalysis {
    pub fn usage_ratio(&self) -> f64 {
        1.0 - self.efficiency
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountAnalysis {
    pub total_accounts: usize,
    pub writable_accounts: usize,
    pub readonly_accounts: usize,
    pub signer_count: usize,
    /// Post-state accounts returned by the runtime
    pub returned_accounts: usize,
    /// Requested accounts that do not exist after simulation
    pub missing_accounts: Vec<Pubkey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallEdge {
    pub caller: Pubkey,
    pub callee: Pubkey,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpiAnalysis {
    pub invocations: Vec<Invocation>,
    pub max_depth: u32,
    /// Invocations below the top level
    pub cpi_count: usize,
    pub call_graph: Vec<CallEdge>,
    pub failed_programs: Vec<Pubkey>,
    pub programs: Vec<Pubkey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IssueCategory {
    Performance,
    Anomaly,
    Accounts,
    Execution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecommendationCategory {
    Compute,
    Accounts,
    Structure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub message: String,
    /// Rough compute units saved when the recommendation is followed
    pub estimated_savings: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    /// 0 to 100
    pub score: f64,
    pub compute_usage_ratio: f64,
    pub cpi_depth: u32,
    pub log_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub simulation_id: String,
    pub fingerprint: String,
    pub success: bool,
    pub compute_analysis: ComputeAnalysis,
    pub account_analysis: AccountAnalysis,
    pub cpi_analysis: CpiAnalysis,
    pub issues: Vec<Issue>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub performance_metrics: PerformanceMetrics,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn issues_with(&self, severity: Severity) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    pub fn has_critical(&self) -> bool {
        self.issues_with(Severity::Critical).next().is_some()
    }
}

/// Difference between two analyses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisComparison {
    pub compute_unit_delta: i64,
    pub account_count_delta: i64,
    pub success_changed: bool,
    pub significant_changes: Vec<String>,
    /// 1.0 for identical analyses
    pub overall_similarity: f64,
}

impl AnalysisComparison {
    pub fn is_identical(&self) -> bool {
        self.compute_unit_delta == 0
            && self.account_count_delta == 0
            && !self.success_changed
            && self.significant_changes.is_empty()
    }
}
