//! Target synchronization: outreach follows plus follower-list reconciliation
//! for every target account.

use super::{checked_call, decode_entries, sleep_jitter};
use crate::api;
use crate::context::AppContext;
use crate::db;
use crate::model::TargetAccount;
use anyhow::Result;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn run(ctx: Arc<AppContext>) {
    loop {
        if !ctx.breaker.is_locked() {
            if let Err(err) = run_pass(&ctx).await {
                warn!(%err, "target sync pass failed");
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
        if !follow_outreach(ctx, &target).await? {
            return Ok(());
        }
        if !reconcile_followers(ctx, &target).await? {
            return Ok(());
        }
    }
    Ok(())
}

/// Ensure the target follows every account flagged for outreach. Fail fast:
/// the first failed follow aborts the pass and retries next tick. Returns
/// whether the pass may continue.
pub async fn follow_outreach(ctx: &AppContext, target: &TargetAccount) -> Result<bool> {
    let candidates = db::outreach_candidates(&ctx.pool, target.account_id).await?;
    if candidates.is_empty() {
        return Ok(true);
    }
    if !target.allow_follow {
        debug!(target = %target.handle, "follow disabled by policy, skipping outreach");
        return Ok(true);
    }

    let credential = target.credential();
    for account in candidates {
        if ctx.breaker.is_locked() {
            return Ok(false);
        }
        let path = api::following_path(&account.handle);
        if checked_call(ctx, Method::PUT, &path, Some(&credential))
            .await
            .is_none()
        {
            return Ok(false);
        }
        db::ensure_following_edge(&ctx.pool, target.account_id, account.id).await?;
        if ctx.settings.verbose().await {
            info!(target = %target.handle, account = %account.handle, "followed account");
        } else {
            debug!(target = %target.handle, account = %account.handle, "followed account");
        }
        sleep_jitter(ctx.settings.follow_delay_secs().await).await;
    }
    Ok(true)
}

/// Paginate the target's own follower list, record observed edges, and apply
/// the mutual-follow churn policy. Returns whether the pass may continue.
pub async fn reconcile_followers(ctx: &AppContext, target: &TargetAccount) -> Result<bool> {
    let credential = target.credential();
    let mut page = 1;

    loop {
        if ctx.breaker.is_locked() {
            return Ok(false);
        }

        let path = api::self_followers_path(page);
        let Some(resp) = checked_call(ctx, Method::GET, &path, Some(&credential)).await else {
            return Ok(false);
        };

        let entries = match decode_entries(&resp.body) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(target = %target.handle, page, %err, "malformed follower listing, dropping page");
                return Ok(true);
            }
        };
        if entries.is_empty() {
            return Ok(true);
        }

        for entry in entries {
            let Some(login) = entry.login.filter(|l| !l.is_empty()) else {
                warn!(target = %target.handle, page, "follower entry missing login, skipping");
                continue;
            };
            // Observed passively, not a seed.
            let (account_id, _) =
                db::get_or_create_account(&ctx.pool, &login, None, false, false).await?;
            db::ensure_follower_edge(&ctx.pool, target.account_id, account_id).await?;

            let Some(edge) =
                db::live_following_edge(&ctx.pool, target.account_id, account_id).await?
            else {
                continue;
            };
            // Mutual follow: this account already follows back.
            if !target.remove_following {
                continue;
            }
            if !target.allow_unfollow {
                debug!(target = %target.handle, account = %login, "unfollow disabled by policy, keeping mutual follow");
                continue;
            }
            let path = api::following_path(&login);
            if checked_call(ctx, Method::DELETE, &path, Some(&credential))
                .await
                .is_none()
            {
                return Ok(false);
            }
            db::mark_following_purged(&ctx.pool, edge.id).await?;
            if ctx.settings.verbose().await {
                info!(target = %target.handle, account = %login, "unfollowed follow-back");
            } else {
                debug!(target = %target.handle, account = %login, "unfollowed follow-back");
            }
            sleep_jitter(ctx.settings.follow_delay_secs().await).await;
        }

        page += 1;
        sleep_jitter(ctx.settings.list_delay_secs().await).await;
    }
}
