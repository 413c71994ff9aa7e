//! Tests for `DimensionKeyStep`: cache in front of the key store, misses, defaults, inserts.

use super::{
  DimensionKeyConfig, DimensionKeyStep, KEY_NOT_FOUND_CODE, KeyStore, KeyStoreHandle,
  MemoryKeyStore, keystore_resource_name,
};
use crate::compiler::compile_pipeline;
use crate::pipeline::Pipeline;
use crate::resources::SharedResources;
use crate::step::StepRegistry;
use crate::types::{
  EdgeRecord, GraphDescription, NodeRecord, PipelineResult, Row, StepState, Value,
};
use serde_json::json;
use std::sync::Arc;

/// Rows `(country, id)` with a constant country and ids from 1.
fn countries(country: &str, limit: u64) -> NodeRecord {
  NodeRecord::new("gen", "generate_rows").with_config(json!({
    "limit": limit,
    "fields": [{"name": "country", "type": "string", "value": country}],
    "sequence_field": "id"
  }))
}

fn lookup(config: serde_json::Value) -> NodeRecord {
  NodeRecord::new("lookup", "dimension_key").with_config(config)
}

fn resources_with(store: &Arc<MemoryKeyStore>) -> SharedResources {
  let resources = SharedResources::new();
  resources.insert(
    keystore_resource_name("default"),
    KeyStoreHandle::new(store.clone() as Arc<dyn KeyStore>),
  );
  resources
}

fn pipeline(desc: &GraphDescription, resources: &SharedResources) -> Pipeline {
  compile_pipeline(desc, &StepRegistry::with_builtin(), resources).unwrap()
}

async fn run(pipeline: &mut Pipeline) -> PipelineResult {
  pipeline.start().await.unwrap();
  pipeline.wait_until_finished().await.unwrap()
}

fn surrogates(rows: &[Row]) -> Vec<i64> {
  rows
    .iter()
    .filter_map(|r| r.get(2).and_then(Value::as_integer))
    .collect()
}

#[test]
fn config_needs_keys() {
  let empty: DimensionKeyConfig = serde_json::from_value(json!({"keys": []})).unwrap();
  assert!(DimensionKeyStep::new(empty).is_err());
  assert!(serde_json::from_value::<DimensionKeyConfig>(json!({})).is_err());

  let config: DimensionKeyConfig = serde_json::from_value(json!({"keys": ["id"]})).unwrap();
  assert_eq!(config.output_field, "technical_key");
  assert_eq!(config.cache_size, 5000);
  assert!(config.cache_negative);
  assert!(DimensionKeyStep::new(config).unwrap().cache_stats().is_none());
}

#[tokio::test]
async fn memory_store_allocates_after_preloaded_keys() {
  let store = MemoryKeyStore::new().with_key(&[Value::from("NL")], 41);
  assert_eq!(store.len(), 1);
  let key = crate::row_codec::encode_values(&[Value::from("BE")]);
  assert_eq!(store.lookup(&key).await.unwrap(), None);
  assert_eq!(store.insert(&key).await.unwrap(), 42);
  assert_eq!(store.insert(&key).await.unwrap(), 42);
  assert_eq!(store.lookups(), 1);
}

#[tokio::test]
async fn cached_keys_skip_the_store() {
  let store = Arc::new(MemoryKeyStore::new().with_key(&[Value::from("NL")], 7));
  let desc = GraphDescription::new("dk")
    .with_node(countries("NL", 6))
    .with_node(lookup(json!({"keys": ["country"]})))
    .with_edge(EdgeRecord::new("gen", "lookup"));
  let mut p = pipeline(&desc, &resources_with(&store));
  let tap = p.add_output_tap("lookup", 0).unwrap();
  let result = run(&mut p).await;

  assert!(result.is_success(), "{:?}", result);
  let schema = tap.schema().unwrap();
  assert_eq!(schema.index_of("technical_key"), Some(2));
  assert_eq!(surrogates(&tap.collect().await), vec![7; 6]);
  assert_eq!(store.lookups(), 1);
  let counters = result.step_totals("lookup").unwrap();
  assert_eq!(counters.lines_input, 1);
  assert_eq!(counters.lines_written, 6);
}

#[tokio::test]
async fn disabled_cache_asks_the_store_every_time() {
  let store = Arc::new(MemoryKeyStore::new().with_key(&[Value::from("NL")], 7));
  let desc = GraphDescription::new("dk")
    .with_node(countries("NL", 4))
    .with_node(lookup(json!({"keys": ["country"], "cache_size": 0})))
    .with_edge(EdgeRecord::new("gen", "lookup"));
  let mut p = pipeline(&desc, &resources_with(&store));
  assert!(run(&mut p).await.is_success());
  assert_eq!(store.lookups(), 4);
}

#[tokio::test]
async fn unknown_keys_go_to_the_error_output() {
  let store = Arc::new(MemoryKeyStore::new());
  let desc = GraphDescription::new("dk")
    .with_node(countries("XX", 3))
    .with_node(lookup(json!({"keys": ["country"]})))
    .with_node(NodeRecord::new("rejects", "dummy"))
    .with_edge(EdgeRecord::new("gen", "lookup"))
    .with_edge(EdgeRecord::error("lookup", "rejects"));
  let mut p = pipeline(&desc, &resources_with(&store));
  let rejects = p.add_output_tap("rejects", 0).unwrap();
  let result = run(&mut p).await;

  assert!(result.is_success());
  assert_eq!(result.step_totals("lookup").unwrap().lines_rejected, 3);
  // The negative answer is cached after the first miss.
  assert_eq!(store.lookups(), 1);
  let rows = rejects.collect().await;
  assert_eq!(rows.len(), 3);
  let first = &rows[0];
  assert_eq!(first.get(3), Some(&Value::from("no surrogate key for (XX)")));
  assert_eq!(first.get(4), Some(&Value::from("country")));
  assert_eq!(first.get(5), Some(&Value::from(KEY_NOT_FOUND_CODE)));
}

#[tokio::test]
async fn negative_caching_can_be_turned_off() {
  let store = Arc::new(MemoryKeyStore::new());
  let desc = GraphDescription::new("dk")
    .with_node(countries("XX", 3))
    .with_node(lookup(
      json!({"keys": ["country"], "cache_negative": false, "default_key": -1}),
    ))
    .with_edge(EdgeRecord::new("gen", "lookup"));
  let mut p = pipeline(&desc, &resources_with(&store));
  let tap = p.add_output_tap("lookup", 0).unwrap();
  assert!(run(&mut p).await.is_success());
  assert_eq!(store.lookups(), 3);
  assert_eq!(surrogates(&tap.collect().await), vec![-1, -1, -1]);
}

#[tokio::test]
async fn unknown_key_without_error_output_fails_the_step() {
  let desc = GraphDescription::new("dk")
    .with_node(countries("XX", 3))
    .with_node(lookup(json!({"keys": ["country"]})))
    .with_edge(EdgeRecord::new("gen", "lookup"));
  let mut p = pipeline(&desc, &SharedResources::new());
  let result = run(&mut p).await;
  assert_eq!(result.step("lookup", 0).unwrap().state, StepState::Error);
  assert!(result.first_error.unwrap().message.contains(KEY_NOT_FOUND_CODE));
}

#[tokio::test]
async fn lookup_or_insert_allocates_surrogates() {
  let store = Arc::new(MemoryKeyStore::new());
  let desc = GraphDescription::new("dk")
    .with_node(countries("NL", 5))
    .with_node(lookup(json!({"keys": ["id"], "mode": "lookup_or_insert"})))
    .with_edge(EdgeRecord::new("gen", "lookup"));
  let mut p = pipeline(&desc, &resources_with(&store));
  let tap = p.add_output_tap("lookup", 0).unwrap();
  let result = run(&mut p).await;

  assert!(result.is_success());
  assert_eq!(surrogates(&tap.collect().await), vec![1, 2, 3, 4, 5]);
  assert_eq!(store.len(), 5);
  let counters = result.step_totals("lookup").unwrap();
  assert_eq!(counters.lines_input, 5);
  assert_eq!(counters.lines_output, 5);
}

#[tokio::test]
async fn copies_can_share_one_cache() {
  for (shared, expected_lookups) in [(true, 1), (false, 2)] {
    let store = Arc::new(MemoryKeyStore::new().with_key(&[Value::from("NL")], 7));
    let desc = GraphDescription::new("dk")
      .with_node(countries("NL", 6))
      .with_node(lookup(json!({"keys": ["country"], "shared_cache": shared})).with_copies(2))
      .with_edge(EdgeRecord::new("gen", "lookup"));
    let resources = resources_with(&store);
    let mut p = pipeline(&desc, &resources);
    assert!(run(&mut p).await.is_success());
    assert_eq!(store.lookups(), expected_lookups, "shared_cache={}", shared);
    assert_eq!(resources.contains("cache:lookup"), shared);
  }
}

#[tokio::test]
async fn missing_key_field_is_a_schema_error() {
  let desc = GraphDescription::new("dk")
    .with_node(countries("NL", 2))
    .with_node(lookup(json!({"keys": ["region"]})))
    .with_edge(EdgeRecord::new("gen", "lookup"));
  let mut p = pipeline(&desc, &SharedResources::new());
  let result = run(&mut p).await;
  assert_eq!(result.step("lookup", 0).unwrap().state, StepState::Error);
  assert!(result.first_error.unwrap().message.contains("region"));
}

#[tokio::test]
async fn missing_store_group_gets_a_memory_store() {
  let resources = SharedResources::new();
  let desc = GraphDescription::new("dk")
    .with_node(countries("NL", 2))
    .with_node(lookup(json!({"keys": ["country"], "store": "warehouse", "mode": "lookup_or_insert"})))
    .with_edge(EdgeRecord::new("gen", "lookup"));
  let mut p = pipeline(&desc, &resources);
  assert!(run(&mut p).await.is_success());
  assert!(resources.contains(&keystore_resource_name("warehouse")));
}
