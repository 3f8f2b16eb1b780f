use crate::model::{Account, Credential, FollowingEdge, TargetAccount};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(tail) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), tail),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert an account if its handle is unknown. Returns (id, created).
/// Rediscovery of a known handle is a no-op.
#[instrument(skip_all, fields(handle))]
pub async fn get_or_create_account(
    pool: &Pool,
    handle: &str,
    parent_handle: Option<&str>,
    auto_added: bool,
    needs_parsing: bool,
) -> Result<(i64, bool)> {
    if let Some(id) = sqlx::query_scalar::<_, i64>("SELECT id FROM accounts WHERE handle = ?")
        .bind(handle)
        .fetch_optional(pool)
        .await?
    {
        return Ok((id, false));
    }

    let rec = sqlx::query(
        "INSERT INTO accounts (handle, parent_handle, auto_added, needs_parsing) VALUES (?, ?, ?, ?) \
         ON CONFLICT (handle) DO UPDATE SET handle = handle RETURNING id",
    )
    .bind(handle)
    .bind(parent_handle)
    .bind(auto_added)
    .bind(needs_parsing)
    .fetch_one(pool)
    .await?;
    Ok((rec.get::<i64, _>("id"), true))
}

pub async fn get_account_by_handle(pool: &Pool, handle: &str) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE handle = ?")
        .bind(handle)
        .fetch_optional(pool)
        .await?;
    Ok(account)
}

/// Accounts eligible for a discovery pass: never a target, seed-marked first,
/// then least recently parsed.
#[instrument(skip_all)]
pub async fn list_scan_accounts(pool: &Pool, limit: i64) -> Result<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>(
        "SELECT a.* FROM accounts a \
         WHERE a.id NOT IN (SELECT account_id FROM target_accounts) \
         ORDER BY (a.id IN (SELECT account_id FROM seed_markers)) DESC, \
                  a.last_parsed_at ASC NULLS FIRST \
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(accounts)
}

/// Stamp an account as parsed and consume any pending seed marker.
#[instrument(skip_all)]
pub async fn mark_parsed(pool: &Pool, account_id: i64, at: DateTime<Utc>) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE accounts SET last_parsed_at = ?, needs_to_seed = 0 WHERE id = ?")
        .bind(at)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM seed_markers WHERE account_id = ?")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Persist a pagination cursor. The cursor only ever moves forward; stale
/// writes from a re-run pass are ignored.
#[instrument(skip_all)]
pub async fn advance_current_page(pool: &Pool, account_id: i64, page: i64) -> Result<()> {
    sqlx::query("UPDATE accounts SET current_page = ? WHERE id = ? AND current_page < ?")
        .bind(page)
        .bind(account_id)
        .bind(page)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_needs_to_seed(pool: &Pool, account_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE accounts SET needs_to_seed = 1 WHERE id = ?")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO seed_markers (account_id) VALUES (?) ON CONFLICT DO NOTHING")
        .bind(account_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_targets(pool: &Pool) -> Result<Vec<TargetAccount>> {
    let targets = sqlx::query_as::<_, TargetAccount>(
        "SELECT t.account_id, a.handle, t.secret, t.remove_following, t.cleanup_days, \
                t.is_global_credential, t.allow_follow, t.allow_unfollow \
         FROM target_accounts t JOIN accounts a ON a.id = t.account_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(targets)
}

/// Credential of the target flagged as the global credential source, if any.
pub async fn global_credential(pool: &Pool) -> Result<Option<Credential>> {
    let row = sqlx::query(
        "SELECT a.handle, t.secret FROM target_accounts t \
         JOIN accounts a ON a.id = t.account_id \
         WHERE t.is_global_credential = 1 LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| Credential {
        username: r.get("handle"),
        secret: r.get("secret"),
    }))
}

/// Accounts flagged for outreach that `target_id` has no live following edge to.
#[instrument(skip_all)]
pub async fn outreach_candidates(pool: &Pool, target_id: i64) -> Result<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>(
        "SELECT a.* FROM accounts a \
         WHERE a.needs_parsing = 1 AND a.id != ? \
           AND a.id NOT IN (SELECT account_id FROM target_accounts) \
           AND NOT EXISTS (SELECT 1 FROM following_edges f \
                           WHERE f.target_id = ? AND f.account_id = a.id AND f.purged = 0) \
         ORDER BY a.id",
    )
    .bind(target_id)
    .bind(target_id)
    .fetch_all(pool)
    .await?;
    Ok(accounts)
}

/// Record that `account_id` follows the target. Append-only; repeats are no-ops.
#[instrument(skip_all)]
pub async fn ensure_follower_edge(pool: &Pool, target_id: i64, account_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO follower_edges (target_id, account_id) VALUES (?, ?) \
         ON CONFLICT (target_id, account_id) DO NOTHING",
    )
    .bind(target_id)
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record that the target follows `account_id`. "Already exists" is success.
#[instrument(skip_all)]
pub async fn ensure_following_edge(pool: &Pool, target_id: i64, account_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO following_edges (target_id, account_id) VALUES (?, ?) \
         ON CONFLICT (target_id, account_id) DO NOTHING",
    )
    .bind(target_id)
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn live_following_edge(
    pool: &Pool,
    target_id: i64,
    account_id: i64,
) -> Result<Option<FollowingEdge>> {
    let edge = sqlx::query_as::<_, FollowingEdge>(
        "SELECT * FROM following_edges WHERE target_id = ? AND account_id = ? AND purged = 0",
    )
    .bind(target_id)
    .bind(account_id)
    .fetch_optional(pool)
    .await?;
    Ok(edge)
}

/// Soft-delete a following edge. The row stays behind as an audit trail.
#[instrument(skip_all)]
pub async fn mark_following_purged(pool: &Pool, edge_id: i64) -> Result<()> {
    sqlx::query("UPDATE following_edges SET purged = 1 WHERE id = ?")
        .bind(edge_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Live following edges for a target created before `cutoff`, oldest first,
/// paired with the followed account's handle.
#[instrument(skip_all)]
pub async fn expired_following_edges(
    pool: &Pool,
    target_id: i64,
    cutoff: DateTime<Utc>,
) -> Result<Vec<(i64, String)>> {
    let rows = sqlx::query(
        "SELECT f.id, a.handle FROM following_edges f \
         JOIN accounts a ON a.id = f.account_id \
         WHERE f.target_id = ? AND f.purged = 0 AND f.created_at < ? \
         ORDER BY f.created_at ASC",
    )
    .bind(target_id)
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| (r.get::<i64, _>("id"), r.get::<String, _>("handle")))
        .collect())
}

/// Accounts no target currently follows. Feeds the discovery back-pressure gate.
pub async fn free_account_count(pool: &Pool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM accounts a \
         WHERE a.id NOT IN (SELECT account_id FROM target_accounts) \
           AND NOT EXISTS (SELECT 1 FROM following_edges f \
                           WHERE f.account_id = a.id AND f.purged = 0)",
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Administrative entry point: promote a handle to a target account. The
/// engine itself only ever reads targets.
pub async fn create_target(
    pool: &Pool,
    handle: &str,
    secret: &str,
    remove_following: bool,
    cleanup_days: i64,
    is_global_credential: bool,
) -> Result<i64> {
    let (account_id, _) = get_or_create_account(pool, handle, None, false, false).await?;
    sqlx::query(
        "INSERT INTO target_accounts \
         (account_id, secret, remove_following, cleanup_days, is_global_credential) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(account_id)
    .bind(secret)
    .bind(remove_following)
    .bind(cleanup_days)
    .bind(is_global_credential)
    .execute(pool)
    .await?;
    Ok(account_id)
}
