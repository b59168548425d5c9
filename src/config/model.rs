// src/config/model.rs

use serde::Deserialize;

use crate::types::ExecutorMode;

/// Engine configuration as read from a TOML file.
///
/// ```toml
/// [lock]
/// timeout_ms = 10000
/// expire_ms = 30000
///
/// [checker]
/// period_ms = 1000
/// batch_size = 30
///
/// [engine]
/// max_depth = 3
/// executor = "pooled"
/// pool_size = 8
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub lock: LockSection,

    #[serde(default)]
    pub checker: CheckerSection,

    #[serde(default)]
    pub engine: EngineSection,
}

/// Validated configuration. Built only through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub lock: LockSection,
    pub checker: CheckerSection,
    pub engine: EngineSection,
}

impl FlowConfig {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            lock: raw.lock,
            checker: raw.checker,
            engine: raw.engine,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[lock]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LockSection {
    /// Give up acquiring after this long.
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,

    /// Expiry of a held lock; bounds the hold time after a crash.
    #[serde(default = "default_lock_expire_ms")]
    pub expire_ms: u64,

    /// Sleep between acquisition attempts.
    #[serde(default = "default_lock_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    10_000
}

fn default_lock_expire_ms() -> u64 {
    30_000
}

fn default_lock_retry_interval_ms() -> u64 {
    50
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
            expire_ms: default_lock_expire_ms(),
            retry_interval_ms: default_lock_retry_interval_ms(),
        }
    }
}

/// `[checker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckerSection {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Members popped per atomic read-and-remove.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of bucket sorted sets executions are spread over.
    #[serde(default = "default_bucket_count")]
    pub bucket_count: u64,
}

fn default_period_ms() -> u64 {
    1_000
}

fn default_batch_size() -> usize {
    30
}

fn default_bucket_count() -> u64 {
    16
}

impl Default for CheckerSection {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            batch_size: default_batch_size(),
            bucket_count: default_bucket_count(),
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Maximum nesting depth of submitted DAGs.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Retention of a finished execution's records.
    #[serde(default = "default_finished_ttl_seconds")]
    pub finished_ttl_seconds: u64,

    /// Retention of a running execution's records.
    #[serde(default = "default_unfinished_ttl_seconds")]
    pub unfinished_ttl_seconds: u64,

    #[serde(default)]
    pub executor: ExecutorMode,

    /// Concurrent jobs for the pooled executor.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Keep dispatch input and output in the invoke history.
    #[serde(default)]
    pub record_invoke_io: bool,
}

fn default_max_depth() -> usize {
    3
}

fn default_finished_ttl_seconds() -> u64 {
    86_400
}

fn default_unfinished_ttl_seconds() -> u64 {
    604_800
}

fn default_pool_size() -> usize {
    16
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            finished_ttl_seconds: default_finished_ttl_seconds(),
            unfinished_ttl_seconds: default_unfinished_ttl_seconds(),
            executor: ExecutorMode::default(),
            pool_size: default_pool_size(),
            record_invoke_io: false,
        }
    }
}
