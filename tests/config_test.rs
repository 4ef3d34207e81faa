use clap::Parser;
use lcaudit::config::*;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_defaults() {
    assert_eq!(DEFAULT_PORT, 3000);
    assert_eq!(COLLECTOR_TIMEOUT_SECS, 120);
    assert_eq!(ANALYSER_TIMEOUT_SECS, 120);
    assert_eq!(AUDIT_MAX_DURATION_SECS, 300);
    assert_eq!(RATE_LIMIT_MAX_REQUESTS, 5);
    assert_eq!(RATE_LIMIT_WINDOW_SECS, 60);
    assert_eq!(MAX_TOP_FIXES, 5);
}

#[test]
fn test_config_from_args() {
    let args = CliArgs::parse_from([
        "lcaudit",
        "--port",
        "8080",
        "--data-dir",
        "/tmp/lcaudit-test",
        "--collector-timeout",
        "30",
        "--gemini-api-key",
        "g-key",
        "--openai-api-key",
        "",
        "--google-cse-api-key",
        "cse-key",
    ]);
    let config = AuditConfig::from_args(args);

    assert_eq!(config.port, 8080);
    assert_eq!(config.data_dir, PathBuf::from("/tmp/lcaudit-test"));
    assert_eq!(
        config.history_db_path(),
        PathBuf::from("/tmp/lcaudit-test/audit-history.db")
    );
    assert_eq!(config.collector_timeout, Duration::from_secs(30));
    assert_eq!(config.audit_budget, Duration::from_secs(300));
    assert_eq!(config.keys.gemini.as_deref(), Some("g-key"));
    // Empty keys count as missing.
    assert!(config.keys.openai.is_none());
    // CSE needs both the key and the engine id.
    assert!(config.keys.google_cse.is_none());
}

#[test]
fn test_public_url_defaults_to_localhost() {
    let args = CliArgs::parse_from(["lcaudit", "--port", "4100", "--public-url", ""]);
    let config = AuditConfig::from_args(args);
    assert_eq!(config.public_base_url, "http://localhost:4100");
}

#[test]
fn test_model_table_resolves_every_chain_entry() {
    for (provider, key) in [
        ("gemini", "flash"),
        ("gemini", "pro"),
        ("openai", "mini"),
        ("openai", "gpt5"),
        ("anthropic", "sonnet"),
    ] {
        assert!(resolve_model_id(provider, key).is_some(), "{provider}/{key}");
    }
    assert!(resolve_model_id("openai", "davinci").is_none());
}
