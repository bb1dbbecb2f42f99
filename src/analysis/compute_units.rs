//! Fee tiers and compute budget recommendations
//!
//! Priority fee samples from `getRecentPrioritizationFees` are in
//! micro-lamports per compute unit. Tiers take the 25th/50th/75th/95th
//! percentile (nearest rank) of the samples.

use crate::analysis::types::AnalysisResult;
use crate::rpc::{NetworkClient, NetworkError};
use crate::tx_builder::{BASE_TRANSACTION_FEE_LAMPORTS, MAX_COMPUTE_UNITS};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, instrument};

const MICRO_LAMPORTS_PER_LAMPORT: u128 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Headroom on top of measured usage for the recommended limit
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,

    /// Median price (micro-lamports/CU) considered uncongested
    #[serde(default = "default_baseline_micro_lamports")]
    pub baseline_micro_lamports: u64,
}

fn default_safety_margin() -> f64 {
    0.1
}

fn default_baseline_micro_lamports() -> u64 {
    1_000
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            safety_margin: default_safety_margin(),
            baseline_micro_lamports: default_baseline_micro_lamports(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl CongestionLevel {
    /// Classify a median price against the uncongested baseline
    pub fn from_median(median: u64, baseline: u64) -> Self {
        if median > baseline.saturating_mul(10) {
            Self::Extreme
        } else if median > baseline.saturating_mul(5) {
            Self::High
        } else if median > baseline.saturating_mul(2) {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTierKind {
    Economy,
    Standard,
    Fast,
    Urgent,
}

impl FeeTierKind {
    pub const ALL: [FeeTierKind; 4] = [Self::Economy, Self::Standard, Self::Fast, Self::Urgent];

    pub fn percentile(&self) -> f64 {
        match self {
            Self::Economy => 25.0,
            Self::Standard => 50.0,
            Self::Fast => 75.0,
            Self::Urgent => 95.0,
        }
    }
}

impl std::fmt::Display for FeeTierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Economy => "economy",
            Self::Standard => "standard",
            Self::Fast => "fast",
            Self::Urgent => "urgent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeTier {
    pub kind: FeeTierKind,
    pub micro_lamports_per_cu: u64,
    pub priority_fee_lamports: u64,
    /// Base signature fees plus the priority fee
    pub total_fee_lamports: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetRecommendation {
    pub compute_unit_limit: u32,
    pub safety_margin: f64,
    /// The padded figure hit the protocol ceiling
    pub clamped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeEstimate {
    pub compute_units: u64,
    pub signatures: u64,
    pub sample_count: usize,
    pub congestion: CongestionLevel,
    pub tiers: Vec<FeeTier>,
    pub budget: BudgetRecommendation,
}

impl FeeEstimate {
    pub fn tier(&self, kind: FeeTierKind) -> Option<&FeeTier> {
        self.tiers.iter().find(|t| t.kind == kind)
    }
}

/// Nearest-rank percentile of sorted samples (0 for no samples)
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// `5000 * signatures + ceil(units * price / 1_000_000)`
pub fn total_fee_lamports(compute_units: u64, micro_lamports_per_cu: u64, signatures: u64) -> u64 {
    let priority = priority_fee_lamports(compute_units, micro_lamports_per_cu);
    BASE_TRANSACTION_FEE_LAMPORTS
        .saturating_mul(signatures)
        .saturating_add(priority)
}

fn priority_fee_lamports(compute_units: u64, micro_lamports_per_cu: u64) -> u64 {
    let micro = compute_units as u128 * micro_lamports_per_cu as u128;
    let lamports = micro.div_ceil(MICRO_LAMPORTS_PER_LAMPORT);
    u64::try_from(lamports).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Default)]
pub struct ComputeUnitAnalyzer {
    config: FeeConfig,
    network: Option<Arc<dyn NetworkClient>>,
}

impl ComputeUnitAnalyzer {
    pub fn new(config: FeeConfig) -> Self {
        Self {
            config,
            network: None,
        }
    }

    pub fn with_network(mut self, network: Arc<dyn NetworkClient>) -> Self {
        self.network = Some(network);
        self
    }

    /// `min(ceil(units * (1 + margin)), 1_400_000)`
    pub fn recommend_budget(&self, compute_units: u64) -> BudgetRecommendation {
        let padded = ((compute_units as f64) * (1.0 + self.config.safety_margin)).ceil() as u64;
        let clamped = padded > MAX_COMPUTE_UNITS;
        BudgetRecommendation {
            compute_unit_limit: padded.min(MAX_COMPUTE_UNITS) as u32,
            safety_margin: self.config.safety_margin,
            clamped,
        }
    }

    /// Tiers from explicit samples (micro-lamports per CU)
    pub fn estimate_from_samples(&self, compute_units: u64, signatures: u64, samples: &[u64]) -> FeeEstimate {
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let tiers = FeeTierKind::ALL
            .iter()
            .map(|&kind| {
                let price = percentile(&sorted, kind.percentile());
                FeeTier {
                    kind,
                    micro_lamports_per_cu: price,
                    priority_fee_lamports: priority_fee_lamports(compute_units, price),
                    total_fee_lamports: total_fee_lamports(compute_units, price, signatures),
                }
            })
            .collect();

        let median = percentile(&sorted, 50.0);
        FeeEstimate {
            compute_units,
            signatures,
            sample_count: sorted.len(),
            congestion: CongestionLevel::from_median(median, self.config.baseline_micro_lamports),
            tiers,
            budget: self.recommend_budget(compute_units),
        }
    }

    /// Tiers from the network's recent prioritization fees
    #[instrument(skip(self, addresses), fields(accounts = addresses.len()))]
    pub async fn estimate(
        &self,
        compute_units: u64,
        signatures: u64,
        addresses: &[Pubkey],
    ) -> Result<FeeEstimate, NetworkError> {
        let network = self
            .network
            .as_ref()
            .ok_or_else(|| NetworkError::Internal("no network client configured".to_string()))?;
        let fees = network.get_recent_prioritization_fees(addresses).await?;
        let samples: Vec<u64> = fees.iter().map(|f| f.prioritization_fee).collect();
        debug!(samples = samples.len(), "Fetched prioritization fees");
        Ok(self.estimate_from_samples(compute_units, signatures, &samples))
    }

    /// Tiers for an analyzed simulation
    pub fn estimate_for_analysis(
        &self,
        analysis: &AnalysisResult,
        signatures: u64,
        samples: &[u64],
    ) -> FeeEstimate {
        self.estimate_from_samples(analysis.compute_analysis.units_consumed, signatures, samples)
    }
}
