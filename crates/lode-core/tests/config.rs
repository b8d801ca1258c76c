use lode_core::config::{dirs_path, GlobalConfig, DEFAULT_REGISTRY};

#[test]
fn test_global_config_default_jobs_nonzero() {
    let config = GlobalConfig::default();
    assert!(config.install.jobs > 0, "jobs should be > 0");
}

#[test]
fn test_global_config_defaults_from_empty_toml() {
    let config: GlobalConfig = toml::from_str("").unwrap();
    assert_eq!(config.network.retries, 3);
    assert_eq!(config.network.timeout_secs, 60);
    assert_eq!(config.network.max_backoff_ms, 8000);
    assert_eq!(config.registry.url, DEFAULT_REGISTRY);
    assert!(config.cache.dir.is_none());
}

#[test]
fn test_global_config_parse_from_toml() {
    let toml = r#"
[install]
jobs = 8

[network]
retries = 1
timeout-secs = 5
backoff-ms = 10
max-backoff-ms = 20

[registry]
url = "https://mirror.example.com"

[cache]
dir = "/custom/cache"
"#;
    let config: GlobalConfig = toml::from_str(toml).unwrap();
    assert_eq!(config.install.jobs, 8);
    assert_eq!(config.network.retries, 1);
    assert_eq!(config.network.timeout().as_secs(), 5);
    assert_eq!(config.network.backoff(5).as_millis(), 20);
    assert_eq!(config.registry.url, "https://mirror.example.com");
    assert_eq!(config.cache_dir().to_str(), Some("/custom/cache"));
}

#[test]
fn test_dirs_path_is_lode_dir() {
    let path = dirs_path();
    if std::env::var_os("LODE_HOME").is_none() {
        assert!(path.ends_with(".lode"));
    }
}
