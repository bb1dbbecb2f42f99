//! Simulation result analysis
//!
//! - **log_parser**: invocation stack and payload decoding from runtime logs
//! - **analyzer**: `ResultAnalyzer` (compute/account/CPI analysis, issues,
//!   recommendations, score) and `compare`
//! - **compute_units**: fee tiers and compute budget recommendations

pub mod analyzer;
pub mod compute_units;
pub mod log_parser;
pub mod types;

pub use analyzer::{performance_score, AnalysisCache, AnalyzerConfig, ResultAnalyzer};
pub use compute_units::{
    percentile, total_fee_lamports, BudgetRecommendation, ComputeUnitAnalyzer, CongestionLevel,
    FeeConfig, FeeEstimate, FeeTier, FeeTierKind,
};
pub use log_parser::{decode_data_payload, decode_log_payload, parse_logs};
pub use types::{
    AccountAnalysis, AnalysisComparison, AnalysisError, AnalysisOptions, AnalysisResult, CallEdge,
    ComputeAnalysis, ComputeBreakdown, CpiAnalysis, Invocation, InvocationStatus, Issue,
    IssueCategory, LogEvent, LogPayload, ParsedLogs, PerformanceMetrics, ProgramCompute,
    Recommendation, RecommendationCategory, Severity, TransactionProfile,
};
