// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Integration tests for service configuration.
//!
//! Tests cover:
//! - Loading YAML, TOML and JSON files
//! - Placeholder resolution and environment overrides
//! - Validation failures
//! - Driving the registry from loaded settings

use std::collections::HashMap;
use std::fs;

use census_config::{
    load_config, resolve_placeholders, CensusConfig, ConfigError, ConfigFormat, ConfigLoader,
    LogFormat, LogLevel,
};
use census_registry::{Disposition, DropReason, RegistryConfig};
use census_tests::common::temp_test_dir;
use census_tests::prelude::*;

const PLANT_YAML: &str = r#"
service:
  instance_id: census-plant-1
  authority_id: census@plant-1
  shutdown_timeout_secs: 10
store:
  default_page_size: 50
  max_page_size: 500
registry:
  max_pending_sweeps: 16
  max_sweep_results: 2
  backoff:
    initial_delay_ms: 5
    max_delay_ms: 200
    multiplier: 2.0
    jitter: 0.1
bus:
  capacity: 4096
logging:
  level: debug
  format: json
"#;

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn test_load_yaml_file() {
    let dir = temp_test_dir("census-config");
    let path = dir.path().join("census.yaml");
    fs::write(&path, PLANT_YAML).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.service.instance_id, "census-plant-1");
    assert_eq!(config.service.authority_id, "census@plant-1");
    assert_eq!(config.store.default_page_size, 50);
    assert_eq!(config.registry.max_sweep_results, 2);
    assert_eq!(config.registry.backoff.initial_delay().as_millis(), 5);
    assert_eq!(config.bus.capacity, 4096);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_formats_agree() {
    let yaml = ConfigLoader::new()
        .with_env_vars(false)
        .load_from_str(PLANT_YAML, ConfigFormat::Yaml)
        .unwrap();

    let toml_text = r#"
[service]
instance_id = "census-plant-1"
authority_id = "census@plant-1"
shutdown_timeout_secs = 10

[store]
default_page_size = 50
max_page_size = 500

[registry]
max_pending_sweeps = 16
max_sweep_results = 2

[registry.backoff]
initial_delay_ms = 5
max_delay_ms = 200
multiplier = 2.0
jitter = 0.1

[bus]
capacity = 4096

[logging]
level = "debug"
format = "json"
"#;
    let toml = ConfigLoader::new()
        .with_env_vars(false)
        .load_from_str(toml_text, ConfigFormat::Toml)
        .unwrap();
    assert_eq!(yaml, toml);

    let json_text = serde_json::to_string(&yaml).unwrap();
    let json = ConfigLoader::new()
        .with_env_vars(false)
        .load_from_str(&json_text, ConfigFormat::Json)
        .unwrap();
    assert_eq!(yaml, json);
}

#[test]
fn test_placeholders_and_overrides() {
    let text = PLANT_YAML.replace("census-plant-1", "${PLANT_INSTANCE}");
    let resolved = resolve_placeholders(&text, env(&[("PLANT_INSTANCE", "census-plant-7")])).unwrap();
    let mut config = ConfigLoader::new()
        .with_env_vars(false)
        .load_from_str(&resolved, ConfigFormat::Yaml)
        .unwrap();
    assert_eq!(config.service.instance_id, "census-plant-7");

    let loader = ConfigLoader::new();
    loader
        .apply_overrides(
            &mut config,
            env(&[
                ("CENSUS_MAX_SWEEP_RESULTS", "5000"),
                ("CENSUS_LOG_LEVEL", "warn"),
                ("CENSUS_AUTHORITY_ID", "ops@plant-7"),
            ]),
        )
        .unwrap();
    assert_eq!(config.registry.max_sweep_results, 5000);
    assert_eq!(config.logging.level, LogLevel::Warn);
    assert_eq!(config.service.authority_id, "ops@plant-7");

    let bad = loader.apply_overrides(&mut config, env(&[("CENSUS_BUS_CAPACITY", "lots")]));
    assert!(matches!(bad, Err(ConfigError::InvalidOverride { ref name, .. }) if name == "CENSUS_BUS_CAPACITY"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let text = PLANT_YAML.replace("max_sweep_results: 2", "max_sweep_results: 0");
    let result = ConfigLoader::new()
        .with_env_vars(false)
        .load_from_str(&text, ConfigFormat::Yaml);
    assert!(matches!(result, Err(ConfigError::Validation { .. })));

    let dir = temp_test_dir("census-config");
    let missing = load_config(dir.path().join("absent.yaml"));
    assert!(matches!(missing, Err(ConfigError::NotFound { .. })));

    let unsupported = load_config(dir.path().join("census.ini"));
    assert!(matches!(unsupported, Err(ConfigError::UnsupportedFormat { ref extension }) if extension == "ini"));

    let path = dir.path().join("census.yaml");
    fs::write(&path, PLANT_YAML.replace("census-plant-1", "${CENSUS_IT_NEVER_SET_7F3A}")).unwrap();
    let unresolved = load_config(&path);
    assert!(matches!(unresolved, Err(ConfigError::UnresolvedPlaceholder { ref name }) if name == "CENSUS_IT_NEVER_SET_7F3A"));
}

#[test]
fn test_default_config_is_valid() {
    CensusConfig::default().validate().unwrap();
}

#[tokio::test]
async fn test_loaded_limits_drive_processor() {
    let config = ConfigLoader::new()
        .with_env_vars(false)
        .load_from_str(PLANT_YAML, ConfigFormat::Yaml)
        .unwrap();
    let harness = TestRegistry::with_config(
        RegistryConfig::for_testing().with_max_sweep_results(config.registry.max_sweep_results),
    );

    let sweep = SweepBuilder::new(DiscovererFixtures::hall_a())
        .application("urn:plant:a", &["opc.tcp://a:4840"])
        .application("urn:plant:b", &["opc.tcp://b:4840"])
        .application("urn:plant:c", &["opc.tcp://c:4840"]);
    let dispositions = harness.feed(&sweep).await.unwrap();
    assert_eq!(dispositions[2], Disposition::Dropped(DropReason::Overflow));
    assert_eq!(dispositions[3], Disposition::Dropped(DropReason::Overflow));
}
