//! 状态协调基准测试
//!
//! 测试转换决策、告警格式化和单次协调的性能

use criterion::{criterion_group, criterion_main, Criterion};
use nrpe_vitals::check::CheckResult;
use nrpe_vitals::notification::template::format_alert;
use nrpe_vitals::notification::{craft_sms, NotificationEvent, NotifierRegistry};
use nrpe_vitals::reconciler::{decide, Reconciler, Transition};
use nrpe_vitals::store::{CheckRecord, StateStore, StoreOptions};
use std::hint::black_box;

fn decision_benchmark(c: &mut Criterion) {
    let prior = CheckRecord::new("db.example.com", "disk1", 2, 1_700_000_000);

    c.bench_function("decide_transitions", |b| {
        b.iter(|| {
            for status in [0, 1, 2, 3, 255] {
                black_box(decide(black_box(Some(&prior)), status));
                black_box(decide(black_box(None), status));
            }
        });
    });
}

fn format_benchmark(c: &mut Criterion) {
    let message = "DISK CRITICAL - free space: / 812 MB (4% inode=87%); /var 120 MB (1% inode=90%)";
    let result = CheckResult::new("db.example.com", "disk1", 2, message);
    let event = NotificationEvent::from_result(&result, Transition::NewProblem { status: 2 });
    let time_check = event.time_check();

    c.bench_function("format_alert", |b| {
        b.iter(|| black_box(format_alert(black_box(&event))));
    });

    c.bench_function("craft_sms", |b| {
        b.iter(|| {
            black_box(craft_sms(
                black_box("db.example.com"),
                black_box("disk1"),
                black_box(message),
                black_box(&time_check),
            ))
        });
    });
}

fn reconcile_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path().join("bench.sqlite"), StoreOptions::default());

    let reconciler = runtime.block_on(async {
        store.init().await.unwrap();
        let conn = store.connect().await.unwrap();
        Reconciler::new(conn, NotifierRegistry::empty().resolve(&[]))
    });

    c.bench_function("reconcile_still_problem", |b| {
        let result = CheckResult::new("web1", "load", 1, "load high");
        b.iter(|| {
            runtime
                .block_on(reconciler.reconcile(black_box(&result)))
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    decision_benchmark,
    format_benchmark,
    reconcile_benchmark
);
criterion_main!(benches);
