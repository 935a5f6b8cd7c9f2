//! Config hash determinism.
//!
//! - same input twice gives the same hash
//! - reordering keys inside YAML does not change the hash
//! - a different value changes the hash
//! - overlay layers take effect and hash stably

use mcd_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
engine:
  data_dir: "data"
  benchmark: "SPY"
  initial_cash: 10000
data:
  request_timeout_ms: 10000
  providers:
    - kind: yahoo
    - kind: alphavantage
      api_key_env: "ALPHAVANTAGE_API_KEY"
"#;

const BASE_YAML_REORDERED: &str = r#"
data:
  providers:
    - kind: yahoo
    - api_key_env: "ALPHAVANTAGE_API_KEY"
      kind: alphavantage
  request_timeout_ms: 10000
engine:
  initial_cash: 10000
  benchmark: "SPY"
  data_dir: "data"
"#;

const OVERLAY_YAML: &str = r#"
engine:
  benchmark: "IWM"
data:
  request_timeout_ms: 2500
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(original.config_hash, reordered.config_hash);
    assert_eq!(original.canonical_json, reordered.canonical_json);
}

#[test]
fn different_values_produce_different_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let modified = BASE_YAML.replace("SPY", "QQQ");
    let b = load_layered_yaml_from_strings(&[modified.as_str()]).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}

#[test]
fn merged_layers_take_effect_and_hash_stably() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED, OVERLAY_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);

    let app = a.app().unwrap();
    assert_eq!(app.engine.benchmark, "IWM");
    assert_eq!(app.data.request_timeout_ms, 2500);
    assert_eq!(app.data.providers.len(), 2);

    let base_only = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_ne!(a.config_hash, base_only.config_hash);
}
