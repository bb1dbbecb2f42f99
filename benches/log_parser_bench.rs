//! Benchmark for simulation log parsing

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use solana_sdk::pubkey::Pubkey;
use txforge::analysis::{decode_log_payload, parse_logs};

fn nested_logs(instructions: usize) -> Vec<String> {
    let mut logs = Vec::new();
    for _ in 0..instructions {
        let outer = Pubkey::new_unique();
        let inner = Pubkey::new_unique();
        logs.push(format!("Program {} invoke [1]", outer));
        logs.push("Program log: Instruction: Swap".to_string());
        logs.push(format!("Program {} invoke [2]", inner));
        logs.push("Program data: AAECAwQFBgcICQoLDA0ODw==".to_string());
        logs.push(format!("Program {} consumed 4521 of 180000 compute units", inner));
        logs.push(format!("Program {} success", inner));
        logs.push(format!("Program {} consumed 20113 of 200000 compute units", outer));
        logs.push(format!("Program {} success", outer));
    }
    logs
}

fn bench_parse_logs(c: &mut Criterion) {
    let logs = nested_logs(16);

    c.bench_function("parse_logs_128_lines", |b| {
        b.iter(|| black_box(parse_logs(black_box(&logs))));
    });
}

fn bench_decode_payload(c: &mut Criterion) {
    c.bench_function("decode_log_payload_json", |b| {
        b.iter(|| black_box(decode_log_payload(black_box(r#"{"amount":42,"side":"buy"}"#))));
    });
}

criterion_group!(benches, bench_parse_logs, bench_decode_payload);
criterion_main!(benches);
