//! Background expiry sweep
//!
//! Expired codes and dead token records are never served (every read checks
//! expiry) but they still occupy storage. A periodic task deletes them in
//! batches. The sweep runs independently of the request path.

use std::sync::Arc;
use std::time::Duration;

use openauth_core::{CodeStore, GrantStore, StoreError, TokenStore, unix_now};
use tracing::{debug, info, warn};

use crate::metrics;

/// Records removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub codes: usize,
    pub tokens: usize,
}

/// Spawn a background task that sweeps expired records every `interval`.
///
/// Storage errors are logged and the next cycle tries again.
pub fn spawn_sweep_task(
    store: Arc<dyn GrantStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Nothing can have expired at startup
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(store.as_ref(), unix_now()).await {
                warn!(error = %e, "expiry sweep failed");
            }
        }
    })
}

/// Delete codes and tokens that can no longer be used at `now`.
pub async fn sweep_once(store: &dyn GrantStore, now: i64) -> Result<SweepReport, StoreError> {
    let codes = store.sweep_expired_codes(now).await?;
    let tokens = store.sweep_expired_tokens(now).await?;
    let report = SweepReport { codes, tokens };

    metrics::record_swept("code", codes);
    metrics::record_swept("token", tokens);
    if codes + tokens > 0 {
        info!(codes, tokens, "swept expired records");
    } else {
        debug!("expiry sweep found nothing to remove");
    }
    Ok(report)
}
