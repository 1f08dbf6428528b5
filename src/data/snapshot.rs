//! Relationship snapshots for fan-out
//!
//! Plain value structs assembled once per fan-out or rebuild pass.
//! The predicates in `service::visibility` work only on these types,
//! never on database handles.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use super::duration::IsoDuration;
use super::models::{RepliesPolicy, Visibility, normalize_tag};

// =============================================================================
// Posts
// =============================================================================

/// A post with the edges fan-out needs
///
/// `sharing` is loaded one level deep: the shared post carries its
/// mentions but never a sharing target of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutPost {
    pub id: String,
    pub account_id: String,
    pub visibility: Visibility,
    /// None when the post is not a reply or the target no longer exists
    pub reply_target: Option<ReplyTarget>,
    pub sharing: Option<Box<FanoutPost>>,
    pub mentions: HashSet<String>,
    /// Normalized hashtags
    pub tags: HashSet<String>,
}

impl FanoutPost {
    pub fn new(id: &str, account_id: &str, visibility: Visibility) -> Self {
        Self {
            id: id.to_string(),
            account_id: account_id.to_string(),
            visibility,
            reply_target: None,
            sharing: None,
            mentions: HashSet::new(),
            tags: HashSet::new(),
        }
    }

    pub fn with_mentions<I, S>(mut self, mentions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mentions.extend(mentions.into_iter().map(Into::into));
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags
            .extend(tags.into_iter().map(|tag| normalize_tag(tag.as_ref())));
        self
    }

    pub fn replying_to(mut self, post_id: &str, account_id: &str) -> Self {
        self.reply_target = Some(ReplyTarget {
            id: post_id.to_string(),
            account_id: account_id.to_string(),
        });
        self
    }

    pub fn sharing(mut self, shared: FanoutPost) -> Self {
        self.sharing = Some(Box::new(shared));
        self
    }
}

/// Reply target reduced to what reply gating needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub id: String,
    pub account_id: String,
}

// =============================================================================
// Owners
// =============================================================================

/// Outgoing follow edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowEdge {
    pub following_id: String,
    pub approved_at: Option<DateTime<Utc>>,
}

impl FollowEdge {
    /// Only approved follows count
    pub fn is_active(&self) -> bool {
        self.approved_at.is_some()
    }
}

/// When a mute stops applying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteExpiry {
    Never,
    At(DateTime<Utc>),
    /// Duration could not be parsed; the mute is treated as inactive
    Invalid,
}

/// Outgoing mute edge with its expiry resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteEdge {
    pub muted_account_id: String,
    pub expiry: MuteExpiry,
}

impl MuteEdge {
    /// Resolve a stored mute into an edge
    ///
    /// A malformed or out-of-range duration is a data error: it is logged
    /// and counted, and the mute becomes inactive.
    pub fn new(muted_account_id: &str, duration: Option<&str>, created_at: DateTime<Utc>) -> Self {
        let expiry = match duration {
            None => MuteExpiry::Never,
            Some(raw) => match IsoDuration::parse(raw) {
                Ok(parsed) => match parsed.after(created_at) {
                    Some(expires_at) => MuteExpiry::At(expires_at),
                    None => {
                        record_invalid_mute(muted_account_id, raw, "expiry out of range");
                        MuteExpiry::Invalid
                    }
                },
                Err(error) => {
                    record_invalid_mute(muted_account_id, raw, &error.to_string());
                    MuteExpiry::Invalid
                }
            },
        };

        Self {
            muted_account_id: muted_account_id.to_string(),
            expiry,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            MuteExpiry::Never => true,
            MuteExpiry::At(expires_at) => now < expires_at,
            MuteExpiry::Invalid => false,
        }
    }
}

/// Snapshots are rebuilt on every pass, so one bad row is reported once per pass
fn record_invalid_mute(muted_account_id: &str, duration: &str, reason: &str) {
    tracing::debug!(
        muted_account_id,
        duration,
        reason,
        "Ignoring mute with malformed duration"
    );
    crate::metrics::DATA_ERRORS_TOTAL
        .with_label_values(&["mute_duration"])
        .inc();
}

/// A local account with every relationship edge fan-out consults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineOwner {
    pub account_id: String,
    pub following: Vec<FollowEdge>,
    /// Accounts this owner blocks
    pub blocks: HashSet<String>,
    /// Accounts blocking this owner
    pub blocked_by: HashSet<String>,
    pub mutes: Vec<MuteEdge>,
    /// Normalized followed hashtags
    pub followed_tags: HashSet<String>,
}

impl TimelineOwner {
    pub fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            ..Self::default()
        }
    }

    /// Active follow edges pointing at `account_id`
    pub fn follow_edges_to<'a>(
        &'a self,
        account_id: &'a str,
    ) -> impl Iterator<Item = &'a FollowEdge> + 'a {
        self.following
            .iter()
            .filter(move |edge| edge.is_active() && edge.following_id == account_id)
    }

    pub fn follows(&self, account_id: &str) -> bool {
        self.follow_edges_to(account_id).next().is_some()
    }

    /// Block in either direction
    pub fn is_blocking_or_blocked(&self, account_id: &str) -> bool {
        self.blocks.contains(account_id) || self.blocked_by.contains(account_id)
    }

    pub fn mutes(&self, account_id: &str, now: DateTime<Utc>) -> bool {
        self.mutes
            .iter()
            .any(|mute| mute.muted_account_id == account_id && mute.is_active(now))
    }
}

// =============================================================================
// Lists
// =============================================================================

/// A list with its owner's relationships and its members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineList {
    pub id: String,
    pub owner: Arc<TimelineOwner>,
    pub replies_policy: RepliesPolicy,
    /// Stored for API compatibility; not applied to home timelines
    pub exclusive: bool,
    pub members: HashSet<String>,
}
