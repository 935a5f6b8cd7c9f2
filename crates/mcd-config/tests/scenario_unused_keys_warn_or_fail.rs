use mcd_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

const YAML: &str = r#"
engine:
  benchmark: SPY
  benchmarks: QQQ
data:
  providers:
    - kind: yahoo
      base_url: "http://localhost:1"
legacy:
  openai_model: gpt-4.1-mini
"#;

#[test]
fn warn_reports_unused_leaves_in_sorted_order() {
    let cfg = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report = report_unused_keys(&cfg.config_json, UnusedKeyPolicy::Warn).unwrap();

    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/engine/benchmarks".to_string(), "/legacy/openai_model".to_string()]
    );
}

#[test]
fn fail_errors_on_unused_leaves() {
    let cfg = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(&cfg.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    assert!(err.to_string().contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn consumed_only_config_is_clean() {
    let yaml = "engine:\n  benchmark: SPY\nperformance:\n  baseline_equity: 1000\n";
    let cfg = load_layered_yaml_from_strings(&[yaml]).unwrap();
    assert!(report_unused_keys(&cfg.config_json, UnusedKeyPolicy::Fail).unwrap().is_clean());
}

#[test]
fn shipped_base_layer_is_clean_and_matches_defaults() {
    let base = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/defaults/base.yaml");
    let base = base.to_string_lossy().to_string();
    let cfg = mcd_config::load_layered_yaml(&[base.as_str()]).unwrap();

    assert!(report_unused_keys(&cfg.config_json, UnusedKeyPolicy::Fail).unwrap().is_clean());
    assert_eq!(cfg.app().unwrap(), mcd_config::AppConfig::default());
}
