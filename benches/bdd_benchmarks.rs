//! Benchmark suite over `Bdd` construction and the solver's cache layers,
//! scaled across a few synthetic call-path fleets (analogous to
//! `examples/marlls1989-espresso-logic`'s size-categorized PLA benchmark).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vigor_synapse::call::{Arg, Call, CallBuilder, CallPath, CallPathBuilder};
use vigor_synapse::synapse::{synthesize, MaximizeHardwareOffload, SearchConfig, Target};
use vigor_synapse::{Bdd, Expr, SolverConfig, SolverContext};

#[derive(Debug, Clone, Copy)]
enum Fleet {
    Small,
    Medium,
    Large,
}

impl Fleet {
    fn as_str(&self) -> &str {
        match self {
            Fleet::Small => "small",
            Fleet::Medium => "medium",
            Fleet::Large => "large",
        }
    }

    /// Number of distinct ethertype branches grouped into the BDD.
    fn branches(&self) -> u32 {
        match self {
            Fleet::Small => 2,
            Fleet::Medium => 8,
            Fleet::Large => 32,
        }
    }
}

fn packet_byte(offset: u64) -> Expr {
    Expr::read_lsb("packet_chunks", offset, 8)
}

fn borrow_and_return(chunk: u64, length: u32) -> Vec<Call> {
    vec![
        CallBuilder::new("packet_borrow_next_chunk").arg("length", Arg::new(Expr::constant(length as u128, 32))).build(),
        CallBuilder::new("packet_return_chunk")
            .arg("the_chunk", Arg::with_in_out(packet_byte(chunk), packet_byte(chunk)))
            .build(),
    ]
}

/// Builds `branches` call paths, each constrained to a distinct value of
/// the Ethernet ethertype field, each borrowing/returning the header
/// unchanged and forwarding out a port derived from the branch index —
/// the BDD constructor groups them into a `branches`-deep binary split
/// (spec.md §4.4), the dominant cost this benchmark is meant to stress.
fn synthetic_fleet(branches: u32) -> Vec<CallPath> {
    let ethertype = packet_byte(12);
    (0..branches)
        .map(|i| {
            let mut builder = CallPathBuilder::new(format!("bench.{}.call_path", i))
                .constraint(Expr::eq(&ethertype, &Expr::constant(i as u128, 8)))
                .call(CallBuilder::new("start_time").build());
            for call in borrow_and_return(0, 14) {
                builder = builder.call(call);
            }
            builder = builder.call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant((i % 4) as u128, 32))).build());
            builder.build()
        })
        .collect()
}

const FLEETS: [Fleet; 3] = [Fleet::Small, Fleet::Medium, Fleet::Large];

fn bench_bdd_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("bdd_construction");
    for fleet in FLEETS {
        let paths = synthetic_fleet(fleet.branches());
        group.throughput(Throughput::Elements(paths.len() as u64));
        group.bench_with_input(BenchmarkId::new("build", fleet.as_str()), &paths, |b, paths| {
            b.iter(|| {
                let mut solver = SolverContext::new(SolverConfig::default());
                let bdd = Bdd::build(black_box(paths), &mut solver).unwrap();
                black_box(bdd);
            });
        });
    }
    group.finish();
}

fn bench_synthesis(c: &mut Criterion) {
    let mut group = c.benchmark_group("synthesis");
    for fleet in FLEETS {
        let paths = synthetic_fleet(fleet.branches());
        group.throughput(Throughput::Elements(paths.len() as u64));
        group.bench_with_input(BenchmarkId::new("x86", fleet.as_str()), &paths, |b, paths| {
            b.iter(|| {
                let mut solver = SolverContext::new(SolverConfig::default());
                let bdd = Bdd::build(black_box(paths), &mut solver).unwrap();
                let plan = synthesize(
                    &bdd,
                    paths,
                    bdd.process_root(),
                    Target::X86,
                    &mut solver,
                    &MaximizeHardwareOffload,
                    &SearchConfig::default(),
                )
                .unwrap();
                black_box(plan);
            });
        });
    }
    group.finish();
}

/// Every independence-query target in this fleet shares the same
/// `packet_chunks[12]` ethertype symbol, so a cold solver pays Z3's query
/// cost on every branch while a warm results/cex cache collapses repeat
/// grouper queries to a hash lookup (spec.md §4.2's three cache layers) —
/// the gap this benchmark is meant to surface.
fn bench_solver_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver_cache");
    let paths = synthetic_fleet(Fleet::Medium.branches());

    group.bench_function("cold", |b| {
        b.iter(|| {
            let config = SolverConfig {
                independence_cache: false,
                cex_cache: false,
                results_cache: false,
                ..SolverConfig::default()
            };
            let mut solver = SolverContext::new(config);
            let bdd = Bdd::build(black_box(&paths), &mut solver).unwrap();
            black_box(bdd);
        });
    });

    group.bench_function("warm", |b| {
        b.iter(|| {
            let mut solver = SolverContext::new(SolverConfig::default());
            let bdd = Bdd::build(black_box(&paths), &mut solver).unwrap();
            black_box(bdd);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_bdd_construction, bench_synthesis, bench_solver_cache);
criterion_main!(benches);
