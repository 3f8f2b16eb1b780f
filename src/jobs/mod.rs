//! Background jobs multiplexed by the orchestrator.
//!
//! Each job is a perpetual loop of passes. A pass that hits a transport error
//! or remote rejection records the failure on the shared breaker and aborts;
//! the next pass retries from persisted progress. Cancellation is cooperative
//! via task abort, which lands on the next await point.

pub mod discovery;
pub mod purge;
pub mod target_sync;

use crate::api::ApiResponse;
use crate::context::AppContext;
use crate::model::{Credential, FollowerEntry};
use rand::Rng;
use reqwest::Method;
use std::ops::RangeInclusive;
use std::time::Duration;
use tracing::warn;

/// One round trip against the remote API with breaker accounting applied.
///
/// Returns `Some` only for a 2xx response (which resets the fail count).
/// Transport failures and remote rejections are logged, counted against the
/// breaker with freshly read thresholds, and collapse to `None`; the caller
/// aborts its pass.
pub(crate) async fn checked_call(
    ctx: &AppContext,
    method: Method,
    path: &str,
    credential: Option<&Credential>,
) -> Option<ApiResponse> {
    let outcome = ctx.api.send(method.clone(), path, credential).await;
    match outcome {
        Ok(resp) if resp.is_success() => {
            ctx.breaker.record_success();
            Some(resp)
        }
        Ok(resp) => {
            warn!(%method, path, status = resp.status, "remote rejected request");
            record_failure(ctx).await;
            None
        }
        Err(err) => {
            warn!(%method, path, %err, "transport failure");
            record_failure(ctx).await;
            None
        }
    }
}

async fn record_failure(ctx: &AppContext) {
    let max_fails = ctx.settings.max_api_fails().await;
    let lockout = ctx.settings.lockout_minutes().await;
    ctx.breaker.record_failure(max_fails, lockout);
}

/// Politeness delay: a uniform draw from the configured bounds, in seconds.
pub(crate) async fn sleep_jitter(range: RangeInclusive<i64>) {
    let min = (*range.start()).max(0);
    let max = (*range.end()).max(min);
    let secs = if min >= max {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    };
    tokio::time::sleep(Duration::from_secs(secs as u64)).await;
}

/// Decode one page of a follower listing. A malformed body is a local parse
/// problem, not remote-health signal; callers drop the page without touching
/// the breaker.
pub(crate) fn decode_entries(body: &str) -> Result<Vec<FollowerEntry>, serde_json::Error> {
    serde_json::from_str(body)
}
