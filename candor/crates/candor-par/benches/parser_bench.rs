//! Parser throughput benchmarks over representative Candor programs.
//! Run with `cargo bench --package candor-par`.

use candor_par::parse_program;
use candor_util::{FileId, Handler};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn parse_source(source: &str) {
    let handler = Handler::new();
    let _ = parse_program(black_box(source), FileId::DUMMY, &handler);
}

fn bench_parser_simple(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_simple");
    let source = "a = 42; return a";
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("assignment", |b| b.iter(|| parse_source(source)));
    group.finish();
}

fn bench_parser_functions(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_functions");
    let source = r#"
        fib(n) {
            if (n <= 1) { return n }
            return fib(n - 1) + fib(n - 2)
        }
        return fib(10)
    "#;
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("recursive_function", |b| b.iter(|| parse_source(source)));
    group.finish();
}

fn bench_parser_objects_and_arrays(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_objects_and_arrays");
    let source = r#"
        point(x, y) {
            return { x: x, y: y, tags: [x, y, x + y] }
        }
        p = point(1, 2)
        return p.tags[2]
    "#;
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("objects_and_arrays", |b| b.iter(|| parse_source(source)));
    group.finish();
}

fn bench_parser_control_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_control_flow");
    let source = r#"
        process(n) {
            sum = 0
            i = 0
            while (i < n) {
                if (i % 2 == 0) {
                    sum = sum + i
                } else {
                    sum = sum - 1
                }
                i = i + 1
            }
            return sum
        }
        return process(100)
    "#;
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("control_flow", |b| b.iter(|| parse_source(source)));
    group.finish();
}

fn bench_parser_closures(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser_closures");
    let source = r#"
        counter() {
            x = 0
            return () { x = x + 1; return x }
        }
        c = counter()
        c()
        c()
        return c()
    "#;
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("closures", |b| b.iter(|| parse_source(source)));
    group.finish();
}

criterion_group!(
    benches,
    bench_parser_simple,
    bench_parser_functions,
    bench_parser_objects_and_arrays,
    bench_parser_control_flow,
    bench_parser_closures,
);
criterion_main!(benches);
