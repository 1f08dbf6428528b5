//! Data models
//!
//! Rust structs representing database rows.
//! All entity IDs are ULIDs, so lexical order is creation order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
/// Largest timestamp a ULID can encode
const MAX_ULID_MILLIS: u64 = (1 << 48) - 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Generate a ULID for a given timestamp
    ///
    /// Used when a post arrives from federation with its own publish time.
    /// Timestamps outside the 48-bit ULID range are clamped to its bounds.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        let millis = (timestamp.timestamp_millis().max(0) as u64).min(MAX_ULID_MILLIS);
        let random = ulid::Ulid::new().random();
        Self(ulid::Ulid::from_parts(millis, random).to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Post visibility level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
            Self::Direct => "direct",
        }
    }
}

impl FromStr for Visibility {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            "private" => Ok(Self::Private),
            "direct" => Ok(Self::Direct),
            other => Err(AppError::Validation(format!(
                "unknown post visibility: {other}"
            ))),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which replies a list shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepliesPolicy {
    /// Replies to any account the list owner follows
    Followed,
    /// Replies to members of the list
    #[default]
    List,
    /// No replies
    None,
}

impl RepliesPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Followed => "followed",
            Self::List => "list",
            Self::None => "none",
        }
    }
}

impl FromStr for RepliesPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "followed" => Ok(Self::Followed),
            "list" => Ok(Self::List),
            "none" => Ok(Self::None),
            other => Err(AppError::Validation(format!(
                "unknown list replies policy: {other}"
            ))),
        }
    }
}

// =============================================================================
// Accounts and relationships
// =============================================================================

/// Any actor, local or remote
///
/// Local accounts additionally have a row in `account_owners`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    /// Fediverse handle (e.g. "@alice@example.com")
    pub handle: String,
    pub created_at: DateTime<Utc>,
}

/// Follow edge
///
/// `approved_at` is NULL while the follow request is pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub following_id: String,
    pub follower_id: String,
    /// Whether shares by the followed account are delivered
    pub shares: bool,
    /// Whether to notify on new posts
    pub notify: bool,
    /// Language filter (ISO 639-1), None for all languages
    pub languages: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Follow {
    /// Build an approved follow with default delivery preferences
    pub fn approved(follower_id: &str, following_id: &str) -> Self {
        let now = Utc::now();
        Self {
            following_id: following_id.to_string(),
            follower_id: follower_id.to_string(),
            shares: true,
            notify: false,
            languages: None,
            created_at: now,
            approved_at: Some(now),
        }
    }

    /// Build a pending follow request
    pub fn pending(follower_id: &str, following_id: &str) -> Self {
        Self {
            approved_at: None,
            ..Self::approved(follower_id, following_id)
        }
    }
}

/// Block edge: `account_id` blocks `blocked_account_id`
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Block {
    pub account_id: String,
    pub blocked_account_id: String,
    pub created_at: DateTime<Utc>,
}

/// Mute edge: `account_id` mutes `muted_account_id`
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Mute {
    pub account_id: String,
    pub muted_account_id: String,
    /// Also hide notifications from the muted account
    pub notifications: bool,
    /// ISO-8601 duration, None for a permanent mute
    pub duration: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Lists
// =============================================================================

/// A list owned by a local account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List {
    pub id: String,
    pub account_owner_id: String,
    pub title: String,
    pub replies_policy: RepliesPolicy,
    pub exclusive: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Posts
// =============================================================================

/// A post, authored or shared
///
/// `sharing_id` is set when this post is a share (reblog) of another post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub account_id: String,
    pub visibility: Visibility,
    pub reply_target_id: Option<String>,
    pub sharing_id: Option<String>,
    /// Mentioned account IDs
    pub mentions: Vec<String>,
    /// Hashtags, normalized by [`normalize_tag`] on insert
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl Post {
    /// Build a post with a fresh ULID and no edges
    pub fn new(account_id: &str, visibility: Visibility) -> Self {
        Self {
            id: EntityId::new().0,
            account_id: account_id.to_string(),
            visibility,
            reply_target_id: None,
            sharing_id: None,
            mentions: Vec::new(),
            tags: Vec::new(),
            language: None,
            published_at: Utc::now(),
        }
    }
}

/// Normalize a hashtag: strip leading `#`, lowercase
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}

// =============================================================================
// Membership rows
// =============================================================================

/// Post `post_id` appears in the home timeline of `account_id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimelinePost {
    pub account_id: String,
    pub post_id: String,
}

/// Post `post_id` appears in the feed of list `list_id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct ListPost {
    pub list_id: String,
    pub post_id: String,
}
