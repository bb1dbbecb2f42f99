//! Structured logging for pipeline events

/// Structured logger bound to one context (a component instance or a session)
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn log_build_completed(&self, instructions: usize, size: usize, compute: u64, latency_us: u64) {
        tracing::debug!(
            context_id = %self.context_id,
            instructions,
            size_bytes = size,
            compute_units = compute,
            latency_us,
            "Transaction built"
        );
    }

    pub fn log_build_failed(&self, category: &str, error: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            category = %category,
            error = %error,
            "Transaction build rejected"
        );
    }

    pub fn log_validation_summary(&self, accounts: usize, errors: usize, warnings: usize, cache_hits: usize, elapsed_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            accounts,
            errors,
            warnings,
            cache_hits,
            elapsed_ms,
            "Account validation finished"
        );
    }

    pub fn log_simulation_cache(&self, fingerprint: &str, hit: bool) {
        tracing::debug!(
            context_id = %self.context_id,
            fingerprint = %fingerprint,
            hit,
            "Simulation cache lookup"
        );
    }

    pub fn log_simulation_outcome(&self, fingerprint: &str, success: bool, units: Option<u64>, error: Option<&str>) {
        if success {
            tracing::info!(
                context_id = %self.context_id,
                fingerprint = %fingerprint,
                units = ?units,
                "Simulation succeeded"
            );
        } else {
            tracing::warn!(
                context_id = %self.context_id,
                fingerprint = %fingerprint,
                units = ?units,
                error = ?error,
                "Simulation failed"
            );
        }
    }

    pub fn log_analysis_summary(&self, simulation_id: &str, issues: usize, recommendations: usize, score: f64) {
        tracing::debug!(
            context_id = %self.context_id,
            simulation_id = %simulation_id,
            issues,
            recommendations,
            score,
            "Simulation analyzed"
        );
    }

    pub fn log_replay_step(&self, step: usize, key: &str, ok: bool) {
        tracing::debug!(
            context_id = %self.context_id,
            step,
            key = %key,
            ok,
            "Replay step"
        );
    }

    /// Degraded-mode path taken (e.g. placeholder blockhash)
    pub fn log_degraded(&self, what: &str, reason: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            what = %what,
            reason = %reason,
            "Degraded mode"
        );
    }
}
