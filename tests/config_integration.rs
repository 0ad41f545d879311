use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use aura_log::config::{ConsoleStream, NetworkProtocol};
use aura_log::env_config::{BUFFER_SIZE, FLUSH_INTERVAL, SERVICE_NAME};
use aura_log::{
    load_config_from_file, load_config_from_str, validate_config, AuraLogError, EnvConfig,
    LogLevel, LogPipeline, SinkConfig,
};
use tempfile::{NamedTempFile, TempDir};

const PRODUCTION_TOML: &str = r#"
environment = "production"
service_name = "scheduler"
version = "2.4.1"

[handler]
buffer_size = 250
flush_interval_secs = 2.0
max_workers = 4
emergency_limit = 20

[sampling]
rate_limit_capacity = 50.0
rate_limit_refill = 10.0

[sampling.sample_rates]
DEBUG = 0.0
INFO = 0.25

[failover]
failover_threshold = 3
recovery_after_secs = 120.0

[metrics]
error_spike_threshold = 25
export_interval_secs = 30

[[sinks]]
type = "console"
name = "stdout"
stream = "stdout"
format = "json"
colored = false

[[sinks]]
type = "network"
name = "search_index"
protocol = "udp"
host = "127.0.0.1"
port = 5140
"#;

#[test]
fn test_load_production_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(PRODUCTION_TOML.as_bytes()).unwrap();

    let config = load_config_from_file(file.path()).unwrap();
    assert_eq!(config.environment, "production");
    assert_eq!(config.handler.queue_capacity(), 500);
    assert_eq!(config.handler.flush_interval(), Duration::from_secs(2));
    assert_eq!(config.sampling.sample_rate(LogLevel::Info), 0.25);
    assert_eq!(config.sampling.sample_rate(LogLevel::Error), 1.0);
    assert_eq!(config.failover.recovery_after(), Duration::from_secs(120));
    assert_eq!(config.metrics.error_spike_threshold, 25);
    assert_eq!(config.metrics.export_interval(), Duration::from_secs(30));

    let ids: Vec<String> = config.sinks.iter().map(SinkConfig::id).collect();
    assert_eq!(ids, vec!["stdout", "search_index"]);
    match &config.sinks[0] {
        SinkConfig::Console(console) => assert_eq!(console.stream, ConsoleStream::Stdout),
        other => panic!("unexpected sink: {:?}", other),
    }
    match &config.sinks[1] {
        SinkConfig::Network(network) => {
            assert_eq!(network.protocol, NetworkProtocol::Udp);
            assert_eq!(network.address(), "127.0.0.1:5140");
        }
        other => panic!("unexpected sink: {:?}", other),
    }
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = load_config_from_file(&temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AuraLogError::ConfigFileMissing(_))));
}

#[test]
fn test_unknown_field_rejected() {
    let result = load_config_from_str("[handler]\nbuffer_sise = 10\n");
    assert!(matches!(result, Err(AuraLogError::ConfigError(_))));
}

#[test]
fn test_invalid_values_rejected() {
    let mut config = load_config_from_str(PRODUCTION_TOML).unwrap();
    config.sampling.sample_rates.insert(LogLevel::Warning, 1.5);
    assert!(matches!(validate_config(&config), Err(AuraLogError::ConfigError(_))));

    let mut config = load_config_from_str(PRODUCTION_TOML).unwrap();
    config.handler.flush_interval_secs = 0.0;
    assert!(validate_config(&config).is_err());
}

#[test]
fn test_environment_overrides() {
    let mut config = load_config_from_str(PRODUCTION_TOML).unwrap();
    let env: HashMap<&str, &str> = HashMap::from([
        (BUFFER_SIZE, "64"),
        (FLUSH_INTERVAL, "0.5"),
        (SERVICE_NAME, "scheduler-canary"),
    ]);
    EnvConfig::apply_overrides_from(&mut config, |name| env.get(name).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.handler.buffer_size, 64);
    assert_eq!(config.handler.flush_interval(), Duration::from_millis(500));
    assert_eq!(config.service_name, "scheduler-canary");
    assert_eq!(config.environment, "production");

    let bad: HashMap<&str, &str> = HashMap::from([(BUFFER_SIZE, "lots")]);
    let result = EnvConfig::apply_overrides_from(&mut config, |name| bad.get(name).map(|v| v.to_string()));
    assert!(matches!(result, Err(AuraLogError::ConfigError(_))));
}

#[tokio::test]
async fn test_pipeline_from_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("aura.toml");
    std::fs::write(
        &path,
        format!(
            "service_name = \"scheduler\"\n\n[[sinks]]\ntype = \"file\"\nname = \"archive\"\ndirectory = {:?}\nfilename = \"app.log\"\n",
            temp_dir.path().join("logs").display().to_string()
        ),
    )
    .unwrap();

    let pipeline = LogPipeline::from_config_file(&path).unwrap();
    assert_eq!(pipeline.service().service_name, "scheduler");
    assert_eq!(pipeline.current_sink(), Some("archive"));
    pipeline.shutdown().await.unwrap();
    assert!(temp_dir.path().join("logs").is_dir());
}
