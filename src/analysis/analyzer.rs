//! Simulation result analysis
//!
//! Everything here is derived from a [`SimulationResult`] and the analyzer
//! thresholds. The one piece of state is the per-session running average of
//! compute usage, which drives the anomaly rule; sessioned analyses are
//! therefore never served from the analysis cache.

use crate::analysis::log_parser::parse_logs;
use crate::analysis::types::{
    AccountAnalysis, AnalysisComparison, AnalysisError, AnalysisOptions, AnalysisResult, CallEdge,
    ComputeAnalysis, ComputeBreakdown, CpiAnalysis, Invocation, InvocationStatus, Issue,
    IssueCategory, ParsedLogs, PerformanceMetrics, ProgramCompute, Recommendation,
    RecommendationCategory, Severity, TransactionProfile,
};
use crate::cache::{CacheConfig, CacheLayer};
use crate::metrics::metrics;
use crate::observability::CorrelationId;
use crate::simulation::SimulationResult;
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::MAX_COMPUTE_UNITS;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Fixed per-transaction share of the compute breakdown
pub const COMPUTE_OVERHEAD_UNITS: u64 = 5_000;
/// Account-access share per referenced account
pub const COMPUTE_PER_ACCOUNT_ACCESS: u64 = 100;

/// Analysis thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_performance_warning_units")]
    pub performance_warning_units: u64,

    /// Multiple of the session running average that counts as an anomaly
    #[serde(default = "default_anomaly_factor")]
    pub anomaly_factor: f64,

    #[serde(default = "default_writable_account_limit")]
    pub writable_account_limit: usize,

    /// Compute delta above which `compare` reports a significant change
    #[serde(default = "default_significant_compute_delta")]
    pub significant_compute_delta: u64,

    /// Usage above which an explicit compute unit limit is recommended
    #[serde(default = "default_compute_limit_recommendation")]
    pub compute_limit_recommendation: u64,

    /// Account count above which lookup tables are recommended
    #[serde(default = "default_lookup_table_accounts")]
    pub lookup_table_accounts: usize,

    #[serde(default = "default_compute_margin")]
    pub compute_margin: f64,
}

fn default_performance_warning_units() -> u64 {
    1_000_000
}

fn default_anomaly_factor() -> f64 {
    1.5
}

fn default_writable_account_limit() -> usize {
    10
}

fn default_significant_compute_delta() -> u64 {
    10_000
}

fn default_compute_limit_recommendation() -> u64 {
    200_000
}

fn default_lookup_table_accounts() -> usize {
    32
}

fn default_compute_margin() -> f64 {
    0.1
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            performance_warning_units: default_performance_warning_units(),
            anomaly_factor: default_anomaly_factor(),
            writable_account_limit: default_writable_account_limit(),
            significant_compute_delta: default_significant_compute_delta(),
            compute_limit_recommendation: default_compute_limit_recommendation(),
            lookup_table_accounts: default_lookup_table_accounts(),
            compute_margin: default_compute_margin(),
        }
    }
}

pub type AnalysisCache = CacheLayer<String, Arc<AnalysisResult>>;

#[derive(Debug, Clone, Copy, Default)]
struct SessionStats {
    count: u64,
    total_units: u64,
}

impl SessionStats {
    fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total_units as f64 / self.count as f64)
    }
}

#[derive(Debug)]
pub struct ResultAnalyzer {
    config: AnalyzerConfig,
    cache: Arc<AnalysisCache>,
    sessions: DashMap<String, SessionStats>,
    logger: StructuredLogger,
}

impl ResultAnalyzer {
    pub fn new(config: AnalyzerConfig, cache: Arc<AnalysisCache>) -> Self {
        Self {
            config,
            cache,
            sessions: DashMap::new(),
            logger: StructuredLogger::new(CorrelationId::new().to_string()),
        }
    }

    pub fn with_cache_config(config: AnalyzerConfig, cache: &CacheConfig) -> Self {
        Self::new(config, Arc::new(CacheLayer::new("analysis", cache)))
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AnalysisCache> {
        &self.cache
    }

    /// Running compute average of a session, if it has analyzed anything
    pub fn session_average(&self, session_id: &str) -> Option<f64> {
        self.sessions.get(session_id).and_then(|s| s.average())
    }

    pub fn reset_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    #[instrument(skip_all, fields(simulation_id = %result.id))]
    pub fn analyze(
        &self,
        result: &SimulationResult,
        options: &AnalysisOptions,
    ) -> Result<Arc<AnalysisResult>, AnalysisError> {
        if result.success == result.error.is_some() {
            return Err(AnalysisError::InconsistentResult {
                simulation_id: result.id.clone(),
                reason: format!(
                    "success={} but error is {}",
                    result.success,
                    if result.error.is_some() { "set" } else { "absent" }
                ),
            });
        }

        let profile = options.profile.as_ref().or(result.profile.as_ref());
        let cacheable = options.use_cache && options.session_id.is_none();
        let key = cache_key(result, profile);
        if cacheable {
            if let Some(hit) = self.cache.get(&key) {
                metrics().analysis_cache_hits.inc();
                debug!(simulation_id = %result.id, "Analysis cache hit");
                return Ok(hit);
            }
        }

        metrics().analyses_total.inc();
        let parsed = parse_logs(&result.logs);

        let compute_analysis = compute_analysis(result, &parsed, profile);
        let account_analysis = account_analysis(result, profile);
        let cpi_analysis = cpi_analysis(&parsed);

        let prior_average = options
            .session_id
            .as_deref()
            .and_then(|session| self.record_session(session, &compute_analysis));

        let issues = self.detect_issues(result, &compute_analysis, &account_analysis, prior_average);
        let warnings = collect_warnings(&compute_analysis, &cpi_analysis);
        let recommendations = self.recommend(&compute_analysis, &account_analysis, &cpi_analysis);
        let performance_metrics = PerformanceMetrics {
            score: performance_score(&compute_analysis, &cpi_analysis, &issues),
            compute_usage_ratio: compute_analysis.usage_ratio(),
            cpi_depth: cpi_analysis.max_depth,
            log_lines: result.logs.len(),
        };

        let analysis = Arc::new(AnalysisResult {
            simulation_id: result.id.clone(),
            fingerprint: result.fingerprint.clone(),
            success: result.success,
            compute_analysis,
            account_analysis,
            cpi_analysis,
            issues,
            warnings,
            recommendations,
            performance_metrics,
            analyzed_at: Utc::now(),
        });

        self.logger.log_analysis_summary(
            &analysis.simulation_id,
            analysis.issues.len(),
            analysis.recommendations.len(),
            analysis.performance_metrics.score,
        );

        if cacheable {
            self.cache.put(key, analysis.clone());
        }
        Ok(analysis)
    }

    /// Add this run to the session and return the average before it
    fn record_session(&self, session: &str, compute: &ComputeAnalysis) -> Option<f64> {
        if !compute.reported {
            return self.session_average(session);
        }
        let mut stats = self.sessions.entry(session.to_string()).or_default();
        let prior = stats.average();
        stats.count += 1;
        stats.total_units += compute.units_consumed;
        prior
    }

    fn detect_issues(
        &self,
        result: &SimulationResult,
        compute: &ComputeAnalysis,
        accounts: &AccountAnalysis,
        prior_average: Option<f64>,
    ) -> Vec<Issue> {
        let mut issues = Vec::new();
        let units = compute.units_consumed;

        if units > self.config.performance_warning_units {
            issues.push(Issue {
                category: IssueCategory::Performance,
                severity: Severity::Warning,
                message: format!(
                    "compute usage {} exceeds {} units",
                    units, self.config.performance_warning_units
                ),
            });
        }

        if let Some(average) = prior_average.filter(|_| compute.reported) {
            if units as f64 > average * self.config.anomaly_factor {
                issues.push(Issue {
                    category: IssueCategory::Anomaly,
                    severity: Severity::Info,
                    message: format!(
                        "compute usage {} is more than {}x the session average of {:.0}",
                        units, self.config.anomaly_factor, average
                    ),
                });
            }
        }

        if accounts.writable_accounts > self.config.writable_account_limit {
            issues.push(Issue {
                category: IssueCategory::Accounts,
                severity: Severity::Warning,
                message: format!(
                    "{} writable accounts (more than {})",
                    accounts.writable_accounts, self.config.writable_account_limit
                ),
            });
        }

        if let Some(error) = &result.error {
            issues.push(Issue {
                category: IssueCategory::Execution,
                severity: Severity::Critical,
                message: error.to_string(),
            });
        }

        issues
    }

    fn recommend(
        &self,
        compute: &ComputeAnalysis,
        accounts: &AccountAnalysis,
        cpi: &CpiAnalysis,
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        if compute.units_consumed > self.config.compute_limit_recommendation {
            let limit = ((compute.units_consumed as f64) * (1.0 + self.config.compute_margin)).ceil() as u64;
            recommendations.push(Recommendation {
                category: RecommendationCategory::Compute,
                message: format!(
                    "request an explicit compute unit limit of {}",
                    limit.min(MAX_COMPUTE_UNITS)
                ),
                estimated_savings: None,
            });
        }

        if accounts.writable_accounts > self.config.writable_account_limit {
            let excess = accounts.writable_accounts - self.config.writable_account_limit;
            recommendations.push(Recommendation {
                category: RecommendationCategory::Accounts,
                message: format!("mark {} writable accounts read-only where possible", excess),
                estimated_savings: Some(excess as u64 * COMPUTE_PER_ACCOUNT_ACCESS),
            });
        }

        if accounts.total_accounts > self.config.lookup_table_accounts {
            recommendations.push(Recommendation {
                category: RecommendationCategory::Accounts,
                message: format!(
                    "use an address lookup table for {} accounts",
                    accounts.total_accounts
                ),
                estimated_savings: None,
            });
        }

        if cpi.max_depth > 2 {
            let nested: u64 = cpi
                .invocations
                .iter()
                .filter(|i| i.depth > 2)
                .filter_map(|i| i.compute_units)
                .sum();
            recommendations.push(Recommendation {
                category: RecommendationCategory::Structure,
                message: format!("flatten cross-program calls nested {} levels deep", cpi.max_depth),
                estimated_savings: (nested > 0).then_some(nested),
            });
        }

        recommendations
    }

    /// Changes from `before` to `after`
    pub fn compare(&self, before: &AnalysisResult, after: &AnalysisResult) -> AnalysisComparison {
        let compute_unit_delta = after.compute_analysis.units_consumed as i64
            - before.compute_analysis.units_consumed as i64;
        let account_count_delta = after.account_analysis.total_accounts as i64
            - before.account_analysis.total_accounts as i64;
        let success_changed = before.success != after.success;

        let mut significant_changes = Vec::new();
        if compute_unit_delta.unsigned_abs() > self.config.significant_compute_delta {
            significant_changes.push(format!("compute units changed by {:+}", compute_unit_delta));
        }
        if account_count_delta != 0 {
            significant_changes.push(format!("account count changed by {:+}", account_count_delta));
        }
        if success_changed {
            significant_changes.push(format!(
                "outcome changed from {} to {}",
                outcome(before.success),
                outcome(after.success)
            ));
        }

        let overall_similarity = (similarity(
            before.compute_analysis.units_consumed,
            after.compute_analysis.units_consumed,
        ) + similarity(
            before.account_analysis.total_accounts as u64,
            after.account_analysis.total_accounts as u64,
        ) + if success_changed { 0.0 } else { 1.0 })
            / 3.0;

        AnalysisComparison {
            compute_unit_delta,
            account_count_delta,
            success_changed,
            significant_changes,
            overall_similarity,
        }
    }
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

fn similarity(a: u64, b: u64) -> f64 {
    let max = a.max(b);
    if max == 0 {
        return 1.0;
    }
    1.0 - (a.abs_diff(b) as f64 / max as f64)
}

fn cache_key(result: &SimulationResult, profile: Option<&TransactionProfile>) -> String {
    match profile {
        Some(p) => format!(
            "{}:{}:{}:{}:{}",
            result.content_key(),
            p.instruction_count,
            p.account_count,
            p.writable_accounts,
            p.signer_count
        ),
        None => result.content_key(),
    }
}

fn compute_analysis(
    result: &SimulationResult,
    parsed: &ParsedLogs,
    profile: Option<&TransactionProfile>,
) -> ComputeAnalysis {
    let logged: Option<u64> = parsed
        .top_level()
        .map(|i| i.compute_units)
        .try_fold(0u64, |acc, units| units.map(|u| acc + u))
        .filter(|_| parsed.top_level().next().is_some());
    let reported = result.compute_units_consumed.or(logged);
    let units = reported.unwrap_or(0);

    let instruction_count = profile
        .map(|p| p.instruction_count)
        .unwrap_or_else(|| parsed.top_level().count());
    let account_count = profile
        .map(|p| p.account_count)
        .unwrap_or(result.accounts.len());

    let overhead = units.min(COMPUTE_OVERHEAD_UNITS);
    let account_access = (account_count as u64 * COMPUTE_PER_ACCOUNT_ACCESS).min(units - overhead);
    let instructions = units - overhead - account_access;
    let per_instruction = if instruction_count > 0 {
        instructions / instruction_count as u64
    } else {
        0
    };

    let per_program = parsed
        .invocations
        .iter()
        .filter_map(|i| {
            i.compute_units.map(|units| ProgramCompute {
                program: i.program,
                depth: i.depth,
                units,
            })
        })
        .collect();

    ComputeAnalysis {
        units_consumed: units,
        reported: reported.is_some(),
        limit: MAX_COMPUTE_UNITS,
        efficiency: 1.0 - units as f64 / MAX_COMPUTE_UNITS as f64,
        breakdown: ComputeBreakdown {
            overhead,
            account_access,
            instructions,
            per_instruction,
        },
        per_program,
    }
}

fn account_analysis(result: &SimulationResult, profile: Option<&TransactionProfile>) -> AccountAnalysis {
    let returned_accounts = result.accounts.len();
    let missing_accounts = result
        .accounts
        .iter()
        .filter(|(_, snapshot)| snapshot.is_none())
        .map(|(address, _)| *address)
        .collect();

    // Without any profile the returned post-state accounts are the writable set
    let (total_accounts, writable_accounts, signer_count) = match profile {
        Some(p) => (p.account_count, p.writable_accounts, p.signer_count),
        None => (returned_accounts, returned_accounts, 0),
    };

    AccountAnalysis {
        total_accounts,
        writable_accounts,
        readonly_accounts: total_accounts.saturating_sub(writable_accounts),
        signer_count,
        returned_accounts,
        missing_accounts,
    }
}

fn cpi_analysis(parsed: &ParsedLogs) -> CpiAnalysis {
    let invocations: &[Invocation] = &parsed.invocations;

    let mut edges: BTreeMap<(Pubkey, Pubkey), u32> = BTreeMap::new();
    for invocation in invocations {
        if let Some(parent) = invocation.parent {
            *edges
                .entry((invocations[parent].program, invocation.program))
                .or_default() += 1;
        }
    }

    let mut seen = HashSet::new();
    let programs = invocations
        .iter()
        .map(|i| i.program)
        .filter(|p| seen.insert(*p))
        .collect();

    CpiAnalysis {
        invocations: invocations.to_vec(),
        max_depth: parsed.max_depth,
        cpi_count: invocations.iter().filter(|i| i.depth > 1).count(),
        call_graph: edges
            .into_iter()
            .map(|((caller, callee), count)| CallEdge {
                caller,
                callee,
                count,
            })
            .collect(),
        failed_programs: invocations
            .iter()
            .filter(|i| matches!(i.status, InvocationStatus::Failed(_)))
            .map(|i| i.program)
            .collect(),
        programs,
    }
}

fn collect_warnings(compute: &ComputeAnalysis, cpi: &CpiAnalysis) -> Vec<String> {
    let mut warnings = Vec::new();
    if !compute.reported {
        warnings.push("no compute unit consumption reported".to_string());
    }
    let incomplete = cpi
        .invocations
        .iter()
        .filter(|i| i.status == InvocationStatus::Incomplete)
        .count();
    if incomplete > 0 {
        warnings.push(format!(
            "{} invocations have no completion line (logs may be truncated)",
            incomplete
        ));
    }
    if cpi.max_depth >= 4 {
        warnings.push(format!("invocation depth {} is at the runtime limit", cpi.max_depth));
    }
    warnings
}

/// 0 to 100; see [`PerformanceMetrics::score`]
pub fn performance_score(compute: &ComputeAnalysis, cpi: &CpiAnalysis, issues: &[Issue]) -> f64 {
    let ratio = compute.usage_ratio().clamp(0.0, 1.0);
    let warnings = issues.iter().filter(|i| i.severity == Severity::Warning).count() as f64;
    let critical = issues.iter().filter(|i| i.severity == Severity::Critical).count() as f64;
    let depth_penalty = cpi.max_depth.saturating_sub(2) as f64 * 5.0;

    (100.0 - 50.0 * ratio - 10.0 * warnings - 30.0 * critical - depth_penalty).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulationError;
    use std::collections::BTreeMap;

    fn analyzer() -> ResultAnalyzer {
        ResultAnalyzer::with_cache_config(AnalyzerConfig::default(), &CacheConfig::new(32))
    }

    fn sim(units: Option<u64>, logs: Vec<String>, error: Option<SimulationError>) -> SimulationResult {
        SimulationResult::new("fp", logs, error, units, BTreeMap::new(), None)
    }

    #[test]
    fn test_high_usage_single_performance_warning() {
        let analysis = analyzer()
            .analyze(&sim(Some(1_200_000), vec![], None), &AnalysisOptions::new())
            .unwrap();

        let performance: Vec<_> = analysis
            .issues
            .iter()
            .filter(|i| i.category == IssueCategory::Performance)
            .collect();
        assert_eq!(performance.len(), 1);
        assert_eq!(performance[0].severity, Severity::Warning);
    }

    #[test]
    fn test_efficiency_and_breakdown() {
        let profile = TransactionProfile {
            instruction_count: 2,
            account_count: 10,
            writable_accounts: 3,
            signer_count: 1,
        };
        let analysis = analyzer()
            .analyze(
                &sim(Some(140_000), vec![], None),
                &AnalysisOptions::new().with_profile(profile),
            )
            .unwrap();

        let compute = &analysis.compute_analysis;
        assert!((compute.efficiency - 0.9).abs() < 1e-9);
        assert_eq!(compute.breakdown.overhead, 5_000);
        assert_eq!(compute.breakdown.account_access, 1_000);
        assert_eq!(compute.breakdown.instructions, 134_000);
        assert_eq!(compute.breakdown.per_instruction, 67_000);
        assert_eq!(analysis.account_analysis.readonly_accounts, 7);
    }

    #[test]
    fn test_error_is_critical() {
        let error = SimulationError::Instruction {
            index: 0,
            detail: "Custom(1)".to_string(),
            custom_code: Some(1),
        };
        let analysis = analyzer()
            .analyze(&sim(Some(10_000), vec![], Some(error)), &AnalysisOptions::new())
            .unwrap();
        assert!(analysis.has_critical());
        assert!(analysis.performance_metrics.score <= 70.0);
    }

    #[test]
    fn test_inconsistent_result_rejected() {
        let mut result = sim(Some(1), vec![], None);
        result.success = false;
        assert!(matches!(
            analyzer().analyze(&result, &AnalysisOptions::new()),
            Err(AnalysisError::InconsistentResult { .. })
        ));
    }

    #[test]
    fn test_session_anomaly_uses_prior_average() {
        let analyzer = analyzer();
        let options = AnalysisOptions::new().with_session("s1");

        for units in [10_000, 12_000] {
            let analysis = analyzer.analyze(&sim(Some(units), vec![], None), &options).unwrap();
            assert!(analysis.issues.is_empty());
        }
        let spike = analyzer.analyze(&sim(Some(40_000), vec![], None), &options).unwrap();
        assert_eq!(spike.issues.len(), 1);
        assert_eq!(spike.issues[0].category, IssueCategory::Anomaly);
        assert_eq!(spike.issues[0].severity, Severity::Info);

        // Other sessions are unaffected
        let fresh = analyzer
            .analyze(&sim(Some(40_000), vec![], None), &AnalysisOptions::new().with_session("s2"))
            .unwrap();
        assert!(fresh.issues.is_empty());
    }

    #[test]
    fn test_recommendations_are_additive() {
        let profile = TransactionProfile {
            instruction_count: 3,
            account_count: 40,
            writable_accounts: 12,
            signer_count: 1,
        };
        let analysis = analyzer()
            .analyze(
                &sim(Some(300_000), vec![], None),
                &AnalysisOptions::new().with_profile(profile),
            )
            .unwrap();

        let categories: Vec<_> = analysis.recommendations.iter().map(|r| r.category).collect();
        assert_eq!(
            categories,
            vec![
                RecommendationCategory::Compute,
                RecommendationCategory::Accounts,
                RecommendationCategory::Accounts,
            ]
        );
        assert!(analysis
            .issues
            .iter()
            .any(|i| i.category == IssueCategory::Accounts && i.severity == Severity::Warning));
    }

    #[test]
    fn test_compare_identical_and_changed() {
        let analyzer = analyzer();
        let result = sim(Some(50_000), vec![], None);
        let a = analyzer.analyze(&result, &AnalysisOptions::new()).unwrap();
        let b = analyzer.analyze(&result, &AnalysisOptions::new()).unwrap();

        let same = analyzer.compare(&a, &b);
        assert!(same.is_identical());
        assert_eq!(same.overall_similarity, 1.0);

        let heavier = analyzer
            .analyze(&sim(Some(75_000), vec![], None), &AnalysisOptions::new())
            .unwrap();
        let diff = analyzer.compare(&a, &heavier);
        assert_eq!(diff.compute_unit_delta, 25_000);
        assert_eq!(diff.significant_changes, vec!["compute units changed by +25000".to_string()]);
        assert!(diff.overall_similarity < 1.0);
    }

    #[test]
    fn test_cache_bypassed_for_sessions() {
        let analyzer = analyzer();
        let result = sim(Some(5_000), vec![], None);
        analyzer.analyze(&result, &AnalysisOptions::new()).unwrap();
        analyzer.analyze(&result, &AnalysisOptions::new()).unwrap();
        assert_eq!(analyzer.cache().stats().hits, 1);

        analyzer
            .analyze(&result, &AnalysisOptions::new().with_session("s"))
            .unwrap();
        assert_eq!(analyzer.cache().stats().hits, 1);
    }

    #[test]
    fn test_cpi_graph_from_logs() {
        let outer = Pubkey::new_unique();
        let inner = Pubkey::new_unique();
        let logs = vec![
            format!("Program {} invoke [1]", outer),
            format!("Program {} invoke [2]", inner),
            format!("Program {} success", inner),
            format!("Program {} invoke [2]", inner),
            format!("Program {} consumed 3000 of 190000 compute units", inner),
            format!("Program {} failed: boom", inner),
            format!("Program {} consumed 12000 of 200000 compute units", outer),
            format!("Program {} success", outer),
        ];
        let analysis = analyzer()
            .analyze(&sim(None, logs, None), &AnalysisOptions::new())
            .unwrap();

        let cpi = &analysis.cpi_analysis;
        assert_eq!(cpi.cpi_count, 2);
        assert_eq!(
            cpi.call_graph,
            vec![CallEdge {
                caller: outer,
                callee: inner,
                count: 2
            }]
        );
        assert_eq!(cpi.failed_programs, vec![inner]);
        assert_eq!(cpi.programs, vec![outer, inner]);
        // Units fall back to the logged top-level consumption
        assert_eq!(analysis.compute_analysis.units_consumed, 12_000);
        assert!(analysis.compute_analysis.reported);
    }
}
