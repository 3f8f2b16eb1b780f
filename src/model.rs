use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A remote account observed by the crawler or seeded manually.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub handle: String,
    /// Handle of the account whose follower list first surfaced this one.
    pub parent_handle: Option<String>,
    pub needs_parsing: bool,
    pub needs_to_seed: bool,
    pub auto_added: bool,
    pub last_parsed_at: Option<DateTime<Utc>>,
    /// Resumable pagination cursor, >= 1. Only ever advances.
    pub current_page: i64,
    pub created_at: DateTime<Utc>,
}

/// Policy wrapper around exactly one [`Account`] the system holds credentials for.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TargetAccount {
    pub account_id: i64,
    pub handle: String,
    pub secret: String,
    /// Unfollow anyone who already follows back (churn control).
    pub remove_following: bool,
    /// Auto-unfollow after this many days; < 1 disables purge.
    pub cleanup_days: i64,
    /// Whether this target's credential backs unauthenticated/global calls.
    pub is_global_credential: bool,
    pub allow_follow: bool,
    pub allow_unfollow: bool,
}

impl TargetAccount {
    pub fn credential(&self) -> Credential {
        Credential {
            username: self.handle.clone(),
            secret: self.secret.clone(),
        }
    }
}

/// Basic-auth material for authenticated API calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

/// Observed fact: `account` follows `target`. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FollowerEdge {
    pub id: i64,
    pub target_id: i64,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Action record: `target` follows `account`. Soft-deleted via `purged`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FollowingEdge {
    pub id: i64,
    pub target_id: i64,
    pub account_id: i64,
    pub purged: bool,
    pub created_at: DateTime<Utc>,
}

/// One entry of a remote follower listing.
#[derive(Debug, Clone, Deserialize)]
pub struct FollowerEntry {
    pub id: Option<i64>,
    pub login: Option<String>,
}
