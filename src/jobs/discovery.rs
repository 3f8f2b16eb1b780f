//! Discovery ingestion: walks followers-of-followers to grow the account pool.

use super::{checked_call, decode_entries, sleep_jitter};
use crate::api;
use crate::context::AppContext;
use crate::db;
use crate::model::Account;
use anyhow::Result;
use chrono::Utc;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn run(ctx: Arc<AppContext>) {
    loop {
        if !ctx.breaker.is_locked() {
            if let Err(err) = run_pass(&ctx).await {
                warn!(%err, "discovery pass failed");
            }
        }
        sleep_jitter(ctx.settings.scan_delay_secs().await).await;
    }
}

/// One discovery pass: pick the next batch of accounts and crawl each one's
/// follower list from its persisted cursor.
pub async fn run_pass(ctx: &AppContext) -> Result<()> {
    if !ctx.settings.seeding_enabled().await {
        return Ok(());
    }

    // Back-pressure: don't grow the pool faster than outreach consumes it.
    let min_free = ctx.settings.seed_min_free().await;
    if min_free > 0 && db::free_account_count(&ctx.pool).await? >= min_free {
        debug!(min_free, "enough free accounts pooled, skipping discovery");
        return Ok(());
    }

    let limit = ctx.settings.max_scan_users().await;
    for account in db::list_scan_accounts(&ctx.pool, limit).await? {
        if ctx.breaker.is_locked() {
            return Ok(());
        }
        db::mark_parsed(&ctx.pool, account.id, Utc::now()).await?;
        crawl_followers(ctx, &account).await?;
    }
    Ok(())
}

/// Crawl one account's follower list, resuming from `current_page`. The
/// cursor is persisted only after a page's work completes, so an abort never
/// loses progress past the last finished page.
pub async fn crawl_followers(ctx: &AppContext, account: &Account) -> Result<()> {
    let mut page = account.current_page.max(1);
    let max_pages = ctx.settings.seed_max_pages().await;

    loop {
        if ctx.breaker.is_locked() {
            return Ok(());
        }

        let path = api::followers_path(&account.handle, page);
        let Some(resp) =
            checked_call(ctx, Method::GET, &path, ctx.global_credential.as_ref()).await
        else {
            // Failure recorded; next pass resumes from the persisted cursor.
            return Ok(());
        };

        let entries = match decode_entries(&resp.body) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(handle = %account.handle, page, %err, "malformed follower listing, dropping page");
                return Ok(());
            }
        };

        if entries.is_empty() || page >= max_pages {
            db::advance_current_page(&ctx.pool, account.id, page).await?;
            return Ok(());
        }

        for entry in entries {
            let Some(login) = entry.login.filter(|l| !l.is_empty()) else {
                warn!(handle = %account.handle, page, "follower entry missing login, skipping");
                continue;
            };
            match db::get_or_create_account(&ctx.pool, &login, Some(&account.handle), true, true)
                .await
            {
                Ok((_, true)) => {
                    if ctx.settings.verbose().await {
                        info!(%login, parent = %account.handle, "discovered account");
                    } else {
                        debug!(%login, parent = %account.handle, "discovered account");
                    }
                }
                Ok((_, false)) => {}
                Err(err) => {
                    warn!(%login, %err, "failed to persist discovered account");
                }
            }
        }

        db::advance_current_page(&ctx.pool, account.id, page).await?;
        page += 1;
        sleep_jitter(ctx.settings.list_delay_secs().await).await;
    }
}
