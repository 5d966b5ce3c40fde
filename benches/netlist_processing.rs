//! Benchmarks for netlist parsing and scenario generation
//!
//! The netlists are generated: a buffer subcircuit built from two inverter
//! instances, and a top level chaining `stages` buffers.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use radnet::classifier::ClassifierTables;
use radnet::config::Config;
use radnet::netlist::Netlist;
use radnet::parser::{ParseOptions, parse_str};
use radnet::resolver::resolve;
use radnet::transform::{
    AlterationMode, InjectionScope, RadiationLibrary, TransformOptions, TransformationEngine,
};
use std::path::Path;

const STAGES: &[usize] = &[10, 100, 1000];

/// Chain of `stages` buffers between `in` and `out`
fn chain(stages: usize) -> String {
    let mut text = String::from(
        "subckt inv (a y vdd)\n\
         mp (y a vdd vdd) bsim4 w=2u l=60n\n\
         mn (y a 0 0) bsim4 w=1u l=60n\n\
         ends inv\n\
         subckt buf (a y vdd)\n\
         x1 (a mid vdd) inv\n\
         x2 (mid y vdd) inv\n\
         ends buf\n\
         v1 (vdd 0) vsource dc=1.2\n",
    );
    for i in 0..stages {
        let input = if i == 0 { "in".to_string() } else { format!("n{}", i) };
        let output = if i + 1 == stages { "out".to_string() } else { format!("n{}", i + 1) };
        text.push_str(&format!("xb{} ({} {} vdd) buf\n", i, input, output));
    }
    text.push_str("tran1 tran stop=10n\n");
    text
}

fn parse(text: &str, tables: &mut ClassifierTables) -> Netlist {
    parse_str(text, Path::new("chain.scs"), tables, ParseOptions::default())
        .expect("generated netlist parses")
        .netlist
}

/// Benchmark parsing and dependency resolution
fn bench_parse_and_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_and_resolve");
    let config = Config::default();

    for &stages in STAGES {
        let text = chain(stages);
        group.throughput(Throughput::Bytes(text.len() as u64));

        group.bench_with_input(BenchmarkId::new("chain", stages), &text, |b, text| {
            b.iter(|| {
                let mut tables = ClassifierTables::from_config(&config).unwrap();
                let mut netlist = parse(black_box(text), &mut tables);
                black_box(resolve(&mut netlist, &tables))
            })
        });
    }

    group.finish();
}

/// Benchmark injection scenario generation
fn bench_injection_scenarios(c: &mut Criterion) {
    let mut group = c.benchmark_group("injection_scenarios");
    let config = Config::default();

    for &stages in &STAGES[..2] {
        let mut tables = ClassifierTables::from_config(&config).unwrap();
        let library = RadiationLibrary::from_config(&config.radiation, &mut tables).unwrap();
        let mut golden = parse(&chain(stages), &mut tables);
        resolve(&mut golden, &tables);

        let options = TransformOptions {
            mode: AlterationMode::Injection(InjectionScope::All),
            prune_analyses: false,
        };
        group.throughput(Throughput::Elements(stages as u64));

        group.bench_with_input(BenchmarkId::new("chain", stages), &golden, |b, golden| {
            b.iter(|| {
                // generate flags the golden targets, so every run starts from a fresh copy
                let mut golden = golden.clone();
                let mut engine = TransformationEngine::new(&tables, &library, options);
                black_box(engine.generate(&mut golden).unwrap().scenarios.len())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_and_resolve, bench_injection_scenarios);
criterion_main!(benches);
