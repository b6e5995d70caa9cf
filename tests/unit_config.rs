use std::fs;
use std::time::Duration;

use clap::Parser;
use factor_canon::grouping::BinningKind;
use factor_canon::{CliArgs, EditPolicy, ServiceConfig, TemperatureBinning};

#[test]
fn defaults_without_file_or_flags() {
    let config = ServiceConfig::from_args(CliArgs::parse_from(["factor-canon"])).expect("config");

    assert_eq!(
        config.http_bind_address,
        "127.0.0.1:8087".parse().expect("default bind")
    );
    assert_eq!(config.classifier.timeout, Duration::from_secs(25));
    assert_eq!(config.limits.max_values, 500);
    assert_eq!(config.limits.max_notes_len, 2000);
    assert_eq!(config.temperature_binning, BinningKind::Bands);
    assert_eq!(config.edit_policy, EditPolicy::Lenient);
    config.validate().expect("defaults are valid");
}

#[test]
fn merges_config_file_and_cli_overrides() {
    let dir = tempfile::tempdir().expect("config tempdir");
    let config_path = dir.path().join("service.yaml");
    let yaml = "\
http_bind: 0.0.0.0:9000
classifier_model: small-model
classifier_timeout_secs: 40
max_values: 200
temperature_binning: interval
temperature_bin_width: 20
edit_policy: strict
";
    fs::write(&config_path, yaml).expect("write config");

    let args = CliArgs::parse_from([
        "factor-canon",
        "--config",
        config_path.to_str().unwrap(),
        "--max-values",
        "50",
        "--edit-policy",
        "lenient",
    ]);
    let config = ServiceConfig::from_args(args).expect("config");

    assert_eq!(config.http_bind_address, "0.0.0.0:9000".parse().unwrap());
    assert_eq!(config.classifier.model, "small-model");
    assert_eq!(config.classifier.timeout, Duration::from_secs(40));
    assert_eq!(config.limits.max_values, 50);
    assert_eq!(config.edit_policy, EditPolicy::Lenient);
    assert_eq!(
        config.binning(),
        TemperatureBinning::Interval { width: 20.0 }
    );
}

#[test]
fn json_config_is_accepted() {
    let dir = tempfile::tempdir().expect("config tempdir");
    let config_path = dir.path().join("service.json");
    fs::write(
        &config_path,
        r#"{"classifier_api_key": "  secret  ", "max_label_len": 64}"#,
    )
    .expect("write config");

    let args = CliArgs::parse_from(["factor-canon", "--config", config_path.to_str().unwrap()]);
    let config = ServiceConfig::from_args(args).expect("config");

    assert_eq!(config.classifier.api_key.as_deref(), Some("secret"));
    assert_eq!(config.limits.max_label_len, 64);
    assert!(!format!("{:?}", config.classifier).contains("secret"));
}

#[test]
fn blank_api_key_counts_as_missing() {
    let args = CliArgs {
        api_key: Some("   ".to_string()),
        ..CliArgs::default()
    };
    let config = ServiceConfig::from_args(args).expect("config");
    assert!(config.classifier.api_key.is_none());
}

#[test]
fn missing_config_file_is_error() {
    let args = CliArgs {
        config: Some("/this/does/not/exist.yaml".into()),
        ..CliArgs::default()
    };
    let err = ServiceConfig::from_args(args).expect_err("expected failure");
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn unsupported_extension_is_error() {
    let dir = tempfile::tempdir().expect("config tempdir");
    let config_path = dir.path().join("service.toml");
    fs::write(&config_path, "max_values = 3").expect("write config");

    let args = CliArgs {
        config: Some(config_path),
        ..CliArgs::default()
    };
    let err = ServiceConfig::from_args(args).expect_err("expected failure");
    assert!(err.to_string().contains("unsupported config extension"));
}

#[test]
fn validate_rejects_zero_limits() {
    let mut config = ServiceConfig::default();
    config.limits.max_uncertainties = 0;
    let err = config.validate().expect_err("zero limit");
    assert!(err.to_string().contains("max_uncertainties"));
}

#[test]
fn validate_rejects_out_of_range_timeout() {
    let mut config = ServiceConfig::default();
    config.classifier.timeout = Duration::from_secs(0);
    assert!(config.validate().is_err());

    config.classifier.timeout = Duration::from_secs(301);
    assert!(config.validate().is_err());

    config.classifier.timeout = Duration::from_secs(300);
    assert!(config.validate().is_ok());
}

#[test]
fn validate_rejects_bad_bin_width() {
    let mut config = ServiceConfig::default();
    config.temperature_bin_width = 0.0;
    assert!(config.validate().is_err());

    config.temperature_bin_width = f64::NAN;
    assert!(config.validate().is_err());
}
