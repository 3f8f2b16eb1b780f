//! Purge scheduler: age-based unfollow of stale following edges.
//!
//! Purely time-driven; never consults the mutual-follow condition the
//! reconciliation path uses.

use super::{checked_call, sleep_jitter};
use crate::api;
use crate::context::AppContext;
use crate::db;
use crate::model::TargetAccount;
use anyhow::Result;
use chrono::{Duration, Utc};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn run(ctx: Arc<AppContext>) {
    loop {
        if !ctx.breaker.is_locked() {
            if let Err(err) = run_pass(&ctx).await {
                warn!(%err, "purge pass failed");
            }
        }
        sleep_jitter(ctx.settings.scan_delay_secs().await).await;
    }
}

pub async fn run_pass(ctx: &AppContext) -> Result<()> {
    for target in db::list_targets(&ctx.pool).await? {
        if ctx.breaker.is_locked() {
            return Ok(());
        }
        // cleanup_days < 1 disables purge for the target.
        if target.cleanup_days < 1 {
            continue;
        }
        purge_target(ctx, &target).await?;
    }
    Ok(())
}

/// Unfollow every live edge older than the target's retention window, oldest
/// first. A failed unfollow abandons the rest of this target's scan for the
/// tick; the next pass resumes from the same (still live) edges.
pub async fn purge_target(ctx: &AppContext, target: &TargetAccount) -> Result<()> {
    if !target.allow_unfollow {
        debug!(target = %target.handle, "unfollow disabled by policy, skipping purge");
        return Ok(());
    }

    let cutoff = Utc::now() - Duration::days(target.cleanup_days);
    let expired = db::expired_following_edges(&ctx.pool, target.account_id, cutoff).await?;
    let credential = target.credential();

    for (edge_id, handle) in expired {
        if ctx.breaker.is_locked() {
            return Ok(());
        }
        let path = api::following_path(&handle);
        if checked_call(ctx, Method::DELETE, &path, Some(&credential))
            .await
            .is_none()
        {
            return Ok(());
        }
        db::mark_following_purged(&ctx.pool, edge_id).await?;
        if ctx.settings.verbose().await {
            info!(target = %target.handle, account = %handle, "purged aged follow");
        } else {
            debug!(target = %target.handle, account = %handle, "purged aged follow");
        }
        sleep_jitter(ctx.settings.follow_delay_secs().await).await;
    }
    Ok(())
}
