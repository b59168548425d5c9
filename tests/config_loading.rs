// tests/config_loading.rs

use std::io::Write;
use tempfile::NamedTempFile;

use flowdag::config::{load_and_validate, load_or_default};
use flowdag::errors::FlowError;
use flowdag::types::ExecutorMode;

#[test]
fn partial_file_keeps_defaults_for_missing_keys() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[lock]
timeout_ms = 2500

[engine]
executor = "pooled"
pool_size = 4
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.lock.timeout_ms, 2500);
    assert_eq!(cfg.lock.expire_ms, 30_000);
    assert_eq!(cfg.checker.period_ms, 1_000);
    assert_eq!(cfg.checker.bucket_count, 16);
    assert_eq!(cfg.engine.executor, ExecutorMode::Pooled);
    assert_eq!(cfg.engine.pool_size, 4);
    assert_eq!(cfg.engine.max_depth, 3);
}

#[test]
fn zero_batch_size_returns_config_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[checker]
batch_size = 0
"#
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(FlowError::ConfigError(msg)) => assert!(msg.contains("batch_size")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn finished_ttl_longer_than_unfinished_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[engine]
finished_ttl_seconds = 100
unfinished_ttl_seconds = 10
"#
    )
    .unwrap();

    let result = load_and_validate(file.path());
    assert!(matches!(result, Err(FlowError::ConfigError(_))));
}

#[test]
fn malformed_toml_returns_toml_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[lock\ntimeout_ms = ").unwrap();

    let result = load_and_validate(file.path());
    assert!(matches!(result, Err(FlowError::TomlError(_))));
}

#[test]
fn unknown_executor_mode_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[engine]
executor = "threads"
"#
    )
    .unwrap();

    assert!(load_and_validate(file.path()).is_err());
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = load_or_default(dir.path().join("Flowdag.toml")).unwrap();
    assert_eq!(cfg.lock.retry_interval_ms, 50);
    assert_eq!(cfg.engine.executor, ExecutorMode::Inline);
}
