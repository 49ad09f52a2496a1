//! Benchmarks for the scheduler hot paths.
//!
//! Sessions are mocks, so these measure queueing and dispatch overhead only.

#![allow(missing_docs, clippy::unwrap_used)]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pgq_client::instrumentation::SanitizationConfig;
use pgq_client::{Config, ConnParams, Driver};
use pgq_testing::{ManualEventLoop, MockConnector, pump};

/// Queue N queries on one connection and run them to completion.
fn bench_queue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_drain");

    for count in [1usize, 16, 256] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let connector = MockConnector::builder()
                    .with_connect_steps(0)
                    .with_query_steps(0)
                    .build();
                let mut driver = Driver::new(connector, ManualEventLoop::new(), Config::default());
                let conn = driver.connect("dbname=bench", |_| {}).unwrap();
                for _ in 0..count {
                    driver.exec(conn, black_box("SELECT 1")).unwrap();
                }
                black_box(pump(&mut driver))
            })
        });
    }

    group.finish();
}

/// Many connections with one query each.
fn bench_many_connections(c: &mut Criterion) {
    c.bench_function("connections_64", |b| {
        b.iter(|| {
            let mut driver = Driver::new(
                MockConnector::default(),
                ManualEventLoop::new(),
                Config::default(),
            );
            for _ in 0..64 {
                let conn = driver.connect("dbname=bench", |_| {}).unwrap();
                driver.exec(conn, "SELECT 1").unwrap();
            }
            black_box(pump(&mut driver))
        })
    });
}

fn bench_conninfo_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("conninfo");

    let simple = "host=localhost dbname=app";
    group.throughput(Throughput::Bytes(simple.len() as u64));
    group.bench_function("simple", |b| {
        b.iter(|| black_box(ConnParams::parse(black_box(simple))))
    });

    let full = "host=db.example.com port=6432 dbname=app user='app user' \
                password='s3cr\\'t' application_name=bench connect_timeout=10 \
                sslmode=require options='-c search_path=app'";
    group.throughput(Throughput::Bytes(full.len() as u64));
    group.bench_function("full", |b| {
        b.iter(|| black_box(ConnParams::parse(black_box(full))))
    });

    group.finish();
}

fn bench_sanitization(c: &mut Criterion) {
    let config = SanitizationConfig::default();
    let sql = "SELECT id, name FROM users WHERE email = 'alice@example.com' \
               AND created_at > '2024-01-01' AND score >= 42.5 LIMIT 10";
    c.bench_function("sanitize_statement", |b| {
        b.iter(|| black_box(config.sanitize(black_box(sql))))
    });
}

criterion_group!(
    benches,
    bench_queue_drain,
    bench_many_connections,
    bench_conninfo_parsing,
    bench_sanitization,
);
criterion_main!(benches);
