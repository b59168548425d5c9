// src/config/validate.rs

use crate::config::model::{FlowConfig, RawConfigFile};
use crate::errors::{FlowError, Result};

impl TryFrom<RawConfigFile> for FlowConfig {
    type Error = crate::errors::FlowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(FlowConfig::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_lock(cfg)?;
    validate_checker(cfg)?;
    validate_engine(cfg)?;
    Ok(())
}

fn non_zero(value: u64, field: &str) -> Result<()> {
    if value == 0 {
        return Err(FlowError::ConfigError(format!(
            "{field} must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

fn validate_lock(cfg: &RawConfigFile) -> Result<()> {
    non_zero(cfg.lock.timeout_ms, "[lock].timeout_ms")?;
    non_zero(cfg.lock.expire_ms, "[lock].expire_ms")?;
    non_zero(cfg.lock.retry_interval_ms, "[lock].retry_interval_ms")?;
    Ok(())
}

fn validate_checker(cfg: &RawConfigFile) -> Result<()> {
    non_zero(cfg.checker.period_ms, "[checker].period_ms")?;
    non_zero(cfg.checker.batch_size as u64, "[checker].batch_size")?;
    non_zero(cfg.checker.bucket_count, "[checker].bucket_count")?;
    Ok(())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    non_zero(cfg.engine.max_depth as u64, "[engine].max_depth")?;
    non_zero(cfg.engine.pool_size as u64, "[engine].pool_size")?;
    if cfg.engine.finished_ttl_seconds > cfg.engine.unfinished_ttl_seconds {
        return Err(FlowError::ConfigError(format!(
            "[engine].finished_ttl_seconds ({}) must not exceed unfinished_ttl_seconds ({})",
            cfg.engine.finished_ttl_seconds, cfg.engine.unfinished_ttl_seconds
        )));
    }
    Ok(())
}
