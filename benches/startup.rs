use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ferryd::config::StartupConfig;
use ferryd::debug::DebugFlags;
use ferryd::identity::NodeId;
use ferryd::modules::{ModuleRegistry, DEFAULT_MODULE_DIR};

/// Benchmark configuration resolution, the hot path of every startup
fn bench_config_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");

    let args: Vec<String> = ["-D", "-n", "10.0.0.5", "-p", "7000", "-t", "4"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    group.bench_function("parse_typical", |b| {
        b.iter(|| {
            let mut registry = ModuleRegistry::new(DEFAULT_MODULE_DIR);
            let outcome = StartupConfig::parse(black_box(&args), None, &mut registry);
            black_box(outcome)
        });
    });

    let no_args: Vec<String> = Vec::new();
    group.bench_function("parse_empty", |b| {
        b.iter(|| {
            let mut registry = ModuleRegistry::new(DEFAULT_MODULE_DIR);
            let outcome = StartupConfig::parse(black_box(&no_args), None, &mut registry);
            black_box(outcome)
        });
    });

    group.finish();
}

/// Benchmark node identity parsing and validation
fn bench_node_identity(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity");

    group.bench_function("parse_valid", |b| {
        b.iter(|| black_box(NodeId::parse(black_box("192.168.1.20"))));
    });

    group.bench_function("parse_reserved", |b| {
        b.iter(|| black_box(NodeId::parse(black_box("127.0.0.1"))));
    });

    group.finish();
}

/// Benchmark debug flag string resolution
fn bench_debug_flags(c: &mut Criterion) {
    let mut group = c.benchmark_group("debug_flags");

    group.bench_function("parse_names", |b| {
        b.iter(|| black_box(DebugFlags::parse(black_box("msg,conn,route"))));
    });

    group.bench_function("filter_directives", |b| {
        let flags = DebugFlags::parse("msg,conn,route");
        b.iter(|| black_box(flags.filter_directives()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_config_parse,
    bench_node_identity,
    bench_debug_flags
);
criterion_main!(benches);
