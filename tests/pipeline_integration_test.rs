//! End-to-end pipeline: build, preflight, simulate, analyze, replay

use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use txforge::analysis::{
    AnalysisOptions, AnalyzerConfig, ComputeUnitAnalyzer, FeeConfig, FeeTierKind, IssueCategory,
    ResultAnalyzer, Severity, TransactionProfile,
};
use txforge::cache::{CacheConfig, ReplayOptions, ReplayRunner, ReplaySession, ReplayStepOutcome};
use txforge::rpc::{NetworkClient, PrioritizationFee, RawSimulation};
use txforge::simulation::{PreflightConfig, SimulationConfig, SimulationError, Simulator};
use txforge::test_utils::{snapshot, MockNetworkClient};
use txforge::tx_builder::{Transaction, TransactionBuilder, MAX_TRANSACTION_SIZE};
use txforge::validation::{
    AccountDependency, AccountValidator, FetchStrategy, ValidationConfig, ValidationErrorKind,
};

const SOL: u64 = 1_000_000_000;

struct Fixture {
    payer: Pubkey,
    program: Pubkey,
    vault: Pubkey,
    token_program: Pubkey,
    mock: Arc<MockNetworkClient>,
}

impl Fixture {
    fn new() -> Self {
        let payer = Pubkey::new_unique();
        let program = Pubkey::new_unique();
        let vault = Pubkey::new_unique();
        let token_program = spl_token::id();

        let logs = vec![
            format!("Program {} invoke [1]", program),
            "Program log: Instruction: Deposit".to_string(),
            format!("Program {} invoke [2]", token_program),
            format!("Program {} consumed 4000 of 190000 compute units", token_program),
            format!("Program {} success", token_program),
            format!("Program {} consumed 12000 of 200000 compute units", program),
            format!("Program {} success", program),
        ];

        let mock = Arc::new(
            MockNetworkClient::new()
                .with_account(payer, snapshot(solana_sdk::system_program::id(), 5 * SOL, 0))
                .with_account(program, snapshot(Pubkey::new_unique(), SOL, 36))
                .with_account(vault, snapshot(program, 2 * SOL, 165))
                .with_simulation(RawSimulation {
                    logs,
                    units_consumed: Some(12_000),
                    ..Default::default()
                })
                .with_fees(vec![
                    PrioritizationFee { slot: 1, prioritization_fee: 500 },
                    PrioritizationFee { slot: 2, prioritization_fee: 1_500 },
                    PrioritizationFee { slot: 3, prioritization_fee: 2_500 },
                    PrioritizationFee { slot: 4, prioritization_fee: 9_000 },
                ]),
        );

        Self {
            payer,
            program,
            vault,
            token_program,
            mock,
        }
    }

    fn network(&self) -> Arc<dyn NetworkClient> {
        self.mock.clone()
    }

    fn simulator(&self) -> Simulator {
        Simulator::with_cache_configs(self.network(), &CacheConfig::new(64), &CacheConfig::new(64))
    }

    async fn build(&self) -> Transaction {
        let mut builder = TransactionBuilder::default();
        builder
            .set_fee_payer(self.payer)
            .set_recent_blockhash(Hash::new_unique().to_string())
            .set_compute_budget(50_000, Some(1_000))
            .add_instruction(Instruction::new_with_bytes(
                self.program,
                &[1, 0, 0, 0, 0, 0, 0, 0, 0],
                vec![
                    AccountMeta::new(self.vault, false),
                    AccountMeta::new_readonly(self.token_program, false),
                ],
            ))
            .expect("instruction fits");
        builder.build().await.expect("transaction builds").tx
    }

    fn preflight(&self) -> PreflightConfig {
        PreflightConfig {
            validation: ValidationConfig::default(),
            addresses: None,
            dependencies: vec![AccountDependency::ownership(self.vault, self.program)],
            expected_owners: HashMap::from([(self.vault, self.program)]),
        }
    }
}

fn analyzer() -> Arc<ResultAnalyzer> {
    Arc::new(ResultAnalyzer::with_cache_config(
        AnalyzerConfig::default(),
        &CacheConfig::new(64),
    ))
}

#[tokio::test]
async fn test_full_pipeline() {
    let fixture = Fixture::new();
    let tx = fixture.build().await;
    assert!(txforge::tx_builder::estimate_size(&tx) <= MAX_TRANSACTION_SIZE);

    let simulator = fixture.simulator();
    let config = SimulationConfig::default();
    let result = simulator
        .simulate_with_preflight(&tx, &[], &config, &fixture.preflight())
        .await;

    assert!(result.success, "simulation failed: {:?}", result.error);
    assert_eq!(result.compute_units_consumed, Some(12_000));
    assert_eq!(fixture.mock.simulate_calls(), 1);

    let analyzer = analyzer();
    let options = AnalysisOptions::new().with_profile(TransactionProfile::from_transaction(&tx));
    let analysis = analyzer.analyze(&result, &options).expect("consistent result");

    assert!(analysis.success);
    assert!(analysis.issues.is_empty());
    assert_eq!(analysis.compute_analysis.units_consumed, 12_000);
    assert_eq!(analysis.cpi_analysis.max_depth, 2);
    assert_eq!(analysis.cpi_analysis.cpi_count, 1);
    assert_eq!(analysis.cpi_analysis.call_graph.len(), 1);
    assert_eq!(analysis.cpi_analysis.call_graph[0].caller, fixture.program);
    assert_eq!(analysis.cpi_analysis.call_graph[0].callee, fixture.token_program);
    assert_eq!(analysis.account_analysis.writable_accounts, 2);

    let fees = ComputeUnitAnalyzer::new(FeeConfig {
        safety_margin: 0.25,
        ..Default::default()
    })
    .with_network(fixture.network())
    .estimate(analysis.compute_analysis.units_consumed, 1, &tx.writable_accounts())
    .await
    .expect("fee samples");
    assert_eq!(fees.sample_count, 4);
    let economy = fees.tier(FeeTierKind::Economy).expect("economy tier");
    let urgent = fees.tier(FeeTierKind::Urgent).expect("urgent tier");
    assert!(economy.total_fee_lamports <= urgent.total_fee_lamports);
    assert_eq!(fees.budget.compute_unit_limit, 15_000);

    // The cached simulation can be replayed without the network
    let key = Simulator::cache_key(&tx, &config);
    let session = ReplaySession::from_cache("pipeline", simulator.cache(), &[key]);
    assert!(session.is_complete());

    let report = ReplayRunner::new(analyzer).run(&session, &ReplayOptions::default());
    assert_eq!(report.analyzed, 1);
    match &report.steps[0].outcome {
        ReplayStepOutcome::Analyzed(replayed) => {
            assert_eq!(replayed.simulation_id, result.id);
            assert_eq!(replayed.compute_analysis.units_consumed, 12_000);
        }
        other => panic!("replay step failed: {:?}", other),
    }
    assert_eq!(fixture.mock.simulate_calls(), 1);
}

#[tokio::test]
async fn test_preflight_blocks_simulation_of_missing_account() {
    let fixture = Fixture::new();
    let tx = fixture.build().await;
    fixture.mock.set_account(fixture.vault, None);

    let simulator = fixture.simulator();
    let result = simulator
        .simulate_with_preflight(&tx, &[], &SimulationConfig::default(), &fixture.preflight())
        .await;

    assert!(!result.success);
    match &result.error {
        Some(SimulationError::Preflight {
            invalid_accounts, ..
        }) => assert_eq!(invalid_accounts, &vec![fixture.vault]),
        other => panic!("expected preflight failure, got {:?}", other),
    }
    assert_eq!(fixture.mock.simulate_calls(), 0);

    let analysis = analyzer()
        .analyze(&result, &AnalysisOptions::new())
        .expect("consistent result");
    assert!(analysis.has_critical());
}

#[tokio::test]
async fn test_repeated_simulation_is_idempotent() {
    let fixture = Fixture::new();
    let tx = fixture.build().await;
    let simulator = fixture.simulator();
    let config = SimulationConfig::default();

    let first = simulator.simulate(&tx, &[], &config).await;
    let second = simulator.simulate(&tx, &[], &config).await;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(fixture.mock.simulate_calls(), 1);

    let analyzer = analyzer();
    let a = analyzer.analyze(&first, &AnalysisOptions::new()).unwrap();
    let b = analyzer.analyze(&second, &AnalysisOptions::new()).unwrap();
    let comparison = analyzer.compare(&a, &b);
    assert!(comparison.is_identical());
    assert!((comparison.overall_similarity - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_heavy_simulation_yields_one_performance_warning() {
    let fixture = Fixture::new();
    fixture.mock.set_simulation(RawSimulation {
        logs: vec![
            format!("Program {} invoke [1]", fixture.program),
            format!("Program {} consumed 1200000 of 1400000 compute units", fixture.program),
            format!("Program {} success", fixture.program),
        ],
        units_consumed: Some(1_200_000),
        ..Default::default()
    });
    let tx = fixture.build().await;

    let result = fixture.simulator().simulate(&tx, &[], &SimulationConfig::default()).await;
    let analysis = analyzer().analyze(&result, &AnalysisOptions::new()).unwrap();

    let warnings: Vec<_> = analysis.issues_with(Severity::Warning).collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].category, IssueCategory::Performance);
    assert!(!analysis.has_critical());
}

#[tokio::test]
async fn test_many_writable_accounts_warn_without_explicit_profile() {
    let fixture = Fixture::new();
    let metas = (0..12)
        .map(|_| AccountMeta::new(Pubkey::new_unique(), false))
        .collect();

    let mut builder = TransactionBuilder::default();
    builder
        .set_fee_payer(fixture.payer)
        .set_recent_blockhash(Hash::new_unique().to_string())
        .add_instruction(Instruction::new_with_bytes(fixture.program, &[2], metas))
        .expect("instruction fits");
    let tx = builder.build().await.expect("transaction builds").tx;

    let result = fixture.simulator().simulate(&tx, &[], &SimulationConfig::default()).await;
    assert!(result.accounts.is_empty());

    let analysis = analyzer().analyze(&result, &AnalysisOptions::new()).unwrap();

    // Fee payer plus twelve instruction accounts
    assert_eq!(analysis.account_analysis.writable_accounts, 13);
    let account_warnings: Vec<_> = analysis
        .issues_with(Severity::Warning)
        .filter(|i| i.category == IssueCategory::Accounts)
        .collect();
    assert_eq!(account_warnings.len(), 1);
    assert_eq!(analysis.issues.len(), 1);
}

#[tokio::test]
async fn test_batched_and_sequential_validation_agree() {
    let owner = Pubkey::new_unique();
    let mut mock = MockNetworkClient::new();
    let mut addresses = Vec::new();
    let mut expected_owners = HashMap::new();

    for i in 0..25u64 {
        let address = Pubkey::new_unique();
        addresses.push(address);
        match i % 5 {
            // missing
            0 => {}
            // wrong owner
            1 => {
                mock = mock.with_account(address, snapshot(Pubkey::new_unique(), SOL, 10));
                expected_owners.insert(address, owner);
            }
            // low balance
            2 => mock = mock.with_account(address, snapshot(owner, 10, 0)),
            _ => {
                mock = mock.with_account(address, snapshot(owner, SOL, 64));
                expected_owners.insert(address, owner);
            }
        }
    }
    let network: Arc<dyn NetworkClient> = Arc::new(mock);

    let run = |config: ValidationConfig| {
        let network = network.clone();
        let addresses = addresses.clone();
        let expected_owners = expected_owners.clone();
        async move {
            AccountValidator::with_cache_config(network, &CacheConfig::new(64))
                .validate(&addresses, &config, &[], &expected_owners)
                .await
        }
    };

    let sequential = run(ValidationConfig {
        batch_mode: false,
        ..Default::default()
    })
    .await;
    let batched = run(ValidationConfig {
        max_parallel_requests: 4,
        ..Default::default()
    })
    .await;
    let multiple = run(ValidationConfig {
        fetch_strategy: FetchStrategy::MultipleAccounts,
        max_parallel_requests: 7,
        ..Default::default()
    })
    .await;

    assert_eq!(sequential.statuses, batched.statuses);
    assert_eq!(sequential.statuses, multiple.statuses);
    assert!(!sequential.success);
    assert_eq!(sequential.invalid_accounts().len(), 10);

    let not_found = sequential
        .errors()
        .filter(|e| e.kind == ValidationErrorKind::AccountNotFound)
        .count();
    assert_eq!(not_found, 5);
}
