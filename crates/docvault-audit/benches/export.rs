//! CSV export rendering

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use docvault_audit::{render_csv, AuditLogEntry};
use uuid::Uuid;

fn entries(n: usize) -> Vec<AuditLogEntry> {
    let tenant_id = Uuid::new_v4();
    let actor = Uuid::new_v4();
    (0..n)
        .map(|i| AuditLogEntry {
            id: Uuid::new_v4(),
            tenant_id,
            user_id: (i % 3 != 0).then_some(actor),
            action: "document.viewed".into(),
            resource_type: "document".into(),
            resource_id: Uuid::new_v4(),
            network_address: Some("2001:db8::1".into()),
            // Forces quoting
            agent: Some("Mozilla/5.0 (X11, Linux)".into()),
            details: serde_json::json!({"page": i}),
            created_at: Utc::now(),
        })
        .collect()
}

fn render_csv_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_csv");

    for size in [10, 1000, 10000].iter() {
        let input = entries(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| black_box(render_csv(black_box(input))))
        });
    }

    group.finish();
}

criterion_group!(benches, render_csv_benchmark);
criterion_main!(benches);
