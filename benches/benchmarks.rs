// benches/benchmarks.rs — Performance benchmarks (criterion)
//
// Hot paths of a round that do not involve the network:
//   1. Startup: schema migration + store init
//   2. Quality gate: critique parsing and verdict
//   3. Research merge: canonicalization, dedupe and ranking
//   4. Ledger appends: invariant checks against a growing SQLite ledger

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;

use autonowrite::core::request::StructuredInput;
use autonowrite::core::types::{AgentExecution, AgentRole};
use autonowrite::evaluator::parser::parse_critique;
use autonowrite::evaluator::rubric::Rubric;
use autonowrite::evaluator::QualityEvaluator;
use autonowrite::provider::estimate_tokens;
use autonowrite::research::backend::SimulatedSearch;
use autonowrite::research::canonical::canonical_id;
use autonowrite::research::ResearchAggregator;
use autonowrite::store::{ProjectStore, SqliteStore};

// ─── Helpers ────────────────────────────────────────────────────────────────

const CRITIQUE: &str = "\
**Structure**: 8.5/10
- Depth: 7/10
Clarity - 9
Sourcing: 6,5 / 10
Coherence: 8/10
OVERALL: 7.8/10

RECOMMENDATIONS:
1. Cite the original Raft paper in the election section
2. Split the replication section in two
3. Add a worked failure example";

fn execution(project_id: &str, iteration: u32, role: AgentRole) -> AgentExecution {
    AgentExecution {
        id: format!("{project_id}-{iteration}-{role}"),
        project_id: project_id.to_string(),
        iteration,
        role,
        input_prompt: "prompt ".repeat(200),
        output: Some("output ".repeat(400)),
        execution_time: Duration::from_millis(900),
        tokens_used: 1_200,
        attempts: 1,
        error: None,
        created_at: chrono::Utc::now(),
    }
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_startup(c: &mut Criterion) {
    c.bench_function("startup_in_memory_store", |b| {
        b.iter(|| black_box(SqliteStore::in_memory().expect("store")));
    });
}

fn bench_quality_gate(c: &mut Criterion) {
    let rubric = Rubric::default();
    let evaluator = QualityEvaluator::new(rubric.clone(), 8.0, Some(6.0));

    c.bench_function("parse_critique", |b| {
        b.iter(|| black_box(parse_critique(black_box(CRITIQUE), &rubric)));
    });
    c.bench_function("evaluate_response", |b| {
        b.iter(|| black_box(evaluator.evaluate_response(black_box(CRITIQUE))));
    });
}

fn bench_research(c: &mut Criterion) {
    let urls = [
        "https://WWW.Example.org/guide/?utm_source=x&b=2&a=1#intro",
        "http://example.org:80/guide/",
        "https://docs.rs/tokio/latest/tokio/?gclid=abc",
        "not a url at all",
    ];
    c.bench_function("canonical_id", |b| {
        b.iter(|| {
            for u in urls {
                black_box(canonical_id(black_box(u)));
            }
        });
    });

    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let aggregator = ResearchAggregator::new(Arc::new(SimulatedSearch), 4);
    let queries: Vec<String> = (0..8).map(|i| format!("consensus topic {i}")).collect();
    c.bench_function("research_merge_8_queries", |b| {
        b.iter(|| black_box(rt.block_on(aggregator.research(&queries, 5, 12))));
    });
}

fn bench_ledger(c: &mut Criterion) {
    c.bench_function("append_20_rounds", |b| {
        b.iter(|| {
            let store = SqliteStore::in_memory().expect("store");
            let project = store.create_project("bench").expect("project");
            store
                .begin_run(&project.id, &StructuredInput::new("Bench", "Measure appends"))
                .expect("begin");
            for iteration in 1..=20 {
                for role in AgentRole::ALL {
                    store
                        .append_execution(&execution(&project.id, iteration, role))
                        .expect("append");
                }
            }
            black_box(store.ledger(&project.id).expect("ledger"));
        });
    });
}

fn bench_token_estimation(c: &mut Criterion) {
    let draft = "A long-form paragraph about distributed consensus. ".repeat(2_000);
    c.bench_function("estimate_tokens_100kb", |b| {
        b.iter(|| black_box(estimate_tokens(black_box(&draft))));
    });
}

criterion_group!(
    benches,
    bench_startup,
    bench_quality_gate,
    bench_research,
    bench_ledger,
    bench_token_estimation,
);
criterion_main!(benches);
