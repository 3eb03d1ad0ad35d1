//! Plan building and adaptation benchmarks.
//!
//! `plan_build` measures a cold cache (every iteration rebuilds); the
//! `adapt_*` benches run against a warm cache.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use morph::{Decimal, Engine, Object, PrimitiveKind, TypeDef, TypeRef, Value};

fn named(name: &str) -> TypeRef {
    TypeRef::named(name)
}

fn engine() -> Engine {
    let engine = Engine::new();
    let line = |name: &str| {
        TypeDef::class(name)
            .member("Sku", TypeRef::String)
            .member("Quantity", TypeRef::primitive(PrimitiveKind::I32))
            .member("Price", TypeRef::primitive(PrimitiveKind::Decimal))
    };
    engine
        .register_all([
            line("Line"),
            line("LineDto"),
            TypeDef::class("Order")
                .member("Id", TypeRef::primitive(PrimitiveKind::I64))
                .member("Lines", TypeRef::list(named("Line")))
                .member("Note", TypeRef::String.optional())
                .member("Parent", named("Order").optional()),
            TypeDef::class("OrderDto")
                .member("Id", TypeRef::primitive(PrimitiveKind::I64))
                .member("Lines", TypeRef::array(named("LineDto")))
                .member("Note", TypeRef::String)
                .member("Parent", named("OrderDto").optional()),
        ])
        .unwrap_or_else(|err| panic!("registration failed: {err}"));
    engine
}

fn order(id: i64, lines: usize) -> Value {
    let lines: Vec<Value> = (0..lines)
        .map(|n| {
            Value::Object(
                Object::new("Line")
                    .with("Sku", format!("sku-{n}"))
                    .with("Quantity", n as i32)
                    .with("Price", Decimal::new(n as i128 * 100 + 99, 2)),
            )
        })
        .collect();
    Value::Object(
        Object::new("Order")
            .with("Id", id)
            .with("Lines", lines)
            .with("Note", "gift"),
    )
}

fn bench_plan_build(c: &mut Criterion) {
    let engine = engine();
    c.bench_function("plan_build", |b| {
        b.iter(|| {
            engine.reset_cache();
            black_box(engine.plan(&named("Order"), &named("OrderDto")))
        })
    });
}

fn bench_adapt_one(c: &mut Criterion) {
    let engine = engine();
    let mut group = c.benchmark_group("adapt_one");
    for lines in [1, 10, 100] {
        let source = order(1, lines);
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &source, |b, source| {
            b.iter(|| black_box(engine.adapt_one(source, &named("OrderDto"))))
        });
    }
    group.finish();
}

fn bench_adapt_many(c: &mut Criterion) {
    let engine = engine();
    let sources: Vec<Value> = (0..1_000).map(|id| order(id, 3)).collect();
    let mut group = c.benchmark_group("adapt_many");
    group.throughput(Throughput::Elements(sources.len() as u64));
    group.bench_function("1000_orders", |b| {
        b.iter(|| {
            engine
                .adapt_many(&sources, &named("OrderDto"))
                .filter(Result::is_ok)
                .count()
        })
    });
    group.finish();
}

criterion_group!(adapt_benches, bench_plan_build, bench_adapt_one, bench_adapt_many);
criterion_main!(adapt_benches);
