//! Shared fixtures for the `flowdag` integration tests: DAG builders,
//! in-memory fakes for the engine's seams, and the two helpers below.

pub mod builders;
pub mod fakes;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for anything a test awaits on the engine.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Route engine logs into the test harness capture. `RUST_LOG` narrows them,
/// e.g. `RUST_LOG=flowdag::engine=debug`; by default only warnings from
/// `flowdag` and errors elsewhere are kept.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("error,flowdag=warn"));
        // Another harness may have installed a subscriber first.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, failing the test if the engine has not settled within
/// [`SETTLE_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(SETTLE_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("engine did not settle within {SETTLE_TIMEOUT:?}"),
    }
}
