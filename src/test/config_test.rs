use crate::ModelError;
use crate::backend::Backend;
use crate::config::MetricConfig;

#[test]
fn defaults_fill_missing_fields() {
    let config = MetricConfig::from_json_str("{}").unwrap();
    assert_eq!(config, MetricConfig::default());
    assert_eq!(config.mask_id, None);
    assert!(!config.has_weights);
    assert_eq!(config.backend, None);
}

#[test]
fn parses_all_fields() {
    let config = MetricConfig::from_json_str(
        r#"{ "mask_id": 0.0, "has_weights": true, "backend": "rayon" }"#,
    )
    .unwrap();
    assert_eq!(
        config,
        MetricConfig::new(Some(0.0), true).with_backend(Backend::Rayon)
    );
}

#[test]
fn rejects_malformed_json() {
    assert!(matches!(
        MetricConfig::from_json_str(r#"{ "mask_id": "zero" }"#),
        Err(ModelError::ConfigError(_))
    ));
    assert!(matches!(
        MetricConfig::from_json_str(r#"{ "backend": "jax" }"#),
        Err(ModelError::ConfigError(_))
    ));
}

#[test]
fn reads_config_file() {
    let path = std::env::temp_dir().join(format!("maskmetric_config_{}.json", std::process::id()));
    let config = MetricConfig::new(Some(3.0), false);
    std::fs::write(&path, config.to_json_string().unwrap()).unwrap();

    let loaded = MetricConfig::from_path(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn missing_file_is_config_error() {
    let path = std::env::temp_dir().join("maskmetric_config_does_not_exist.json");
    assert!(matches!(
        MetricConfig::from_path(path),
        Err(ModelError::ConfigError(_))
    ));
}
