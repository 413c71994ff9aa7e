//! Row channel and end-to-end pipeline throughput.
//!
//! Run with: cargo bench --bench channel_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;
use streamweave_etl::{
  EdgeRecord, GraphDescription, NodeRecord, Row, RowChannel, SharedResources, StepRegistry,
  Value, compile_pipeline,
};

const ROWS: u64 = 20_000;

fn bench_channel_put_get(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().expect("runtime");
  let mut group = c.benchmark_group("channel_put_get");
  group.throughput(Throughput::Elements(ROWS));
  for capacity in [16usize, 10_000] {
    group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &cap| {
      b.to_async(&rt).iter(|| async move {
        let channel = Arc::new(RowChannel::new("bench", cap));
        let producer = channel.clone();
        let feed = tokio::spawn(async move {
          for i in 0..ROWS as i64 {
            if producer.put(Row::new(vec![Value::Integer(i)])).await.is_err() {
              break;
            }
          }
          producer.set_done();
        });
        let mut n = 0u64;
        while let Some(row) = channel.get().await {
          black_box(row);
          n += 1;
        }
        let _ = feed.await;
        n
      });
    });
  }
  group.finish();
}

fn linear(copies: usize) -> GraphDescription {
  GraphDescription::new("bench")
    .with_node(
      NodeRecord::new("gen", "generate_rows")
        .with_config(json!({"limit": ROWS, "sequence_field": "id"})),
    )
    .with_node(NodeRecord::new("work", "dummy").with_copies(copies))
    .with_node(NodeRecord::new("sink", "dummy"))
    .with_edge(EdgeRecord::new("gen", "work"))
    .with_edge(EdgeRecord::new("work", "sink"))
}

fn bench_pipeline(c: &mut Criterion) {
  let rt = tokio::runtime::Runtime::new().expect("runtime");
  let registry = StepRegistry::with_builtin();
  let mut group = c.benchmark_group("pipeline_linear");
  group.throughput(Throughput::Elements(ROWS));
  for copies in [1usize, 4] {
    let desc = linear(copies);
    group.bench_with_input(BenchmarkId::from_parameter(copies), &desc, |b, desc| {
      b.to_async(&rt).iter(|| async {
        let mut pipeline =
          compile_pipeline(desc, &registry, &SharedResources::new()).expect("compile");
        pipeline.start().await.expect("start");
        black_box(pipeline.wait_until_finished().await.expect("wait"))
      });
    });
  }
  group.finish();
}

criterion_group!(benches, bench_channel_put_get, bench_pipeline);
criterion_main!(benches);
