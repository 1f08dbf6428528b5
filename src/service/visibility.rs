//! Visibility and inclusion predicates
//!
//! Pure functions over relationship snapshots. `is_visible` answers
//! whether an account may see a post at all; `includes_in_timeline` and
//! `includes_in_list` decide whether a post enters a particular feed.

use chrono::{DateTime, Utc};

use crate::data::{FanoutPost, RepliesPolicy, TimelineList, TimelineOwner, Visibility};

/// Whether `viewer` may see `post`
pub fn is_visible(post: &FanoutPost, viewer: &TimelineOwner) -> bool {
    if post.account_id == viewer.account_id {
        return true;
    }
    if viewer.blocked_by.contains(&post.account_id) {
        return false;
    }

    match post.visibility {
        Visibility::Public | Visibility::Unlisted => true,
        Visibility::Private => {
            post.mentions.contains(&viewer.account_id) || viewer.follows(&post.account_id)
        }
        Visibility::Direct => post.mentions.contains(&viewer.account_id),
    }
}

/// Block, mute and visibility exclusion shared by timelines and lists
///
/// Checks the post's author and, for shares, the shared post's author.
pub fn is_excluded(post: &FanoutPost, owner: &TimelineOwner, now: DateTime<Utc>) -> bool {
    if !is_visible(post, owner) {
        return true;
    }
    if owner.is_blocking_or_blocked(&post.account_id) || owner.mutes(&post.account_id, now) {
        return true;
    }

    match &post.sharing {
        Some(shared) => {
            !is_visible(shared, owner)
                || owner.is_blocking_or_blocked(&shared.account_id)
                || owner.mutes(&shared.account_id, now)
        }
        None => false,
    }
}

/// Whether `post` belongs in the home timeline of `owner`
pub fn includes_in_timeline(post: &FanoutPost, owner: &TimelineOwner, now: DateTime<Utc>) -> bool {
    if post.account_id == owner.account_id {
        return true;
    }
    if is_excluded(post, owner, now) {
        return false;
    }

    let mentioned = post.mentions.contains(&owner.account_id)
        || post
            .sharing
            .as_ref()
            .is_some_and(|shared| shared.mentions.contains(&owner.account_id));
    if mentioned {
        return true;
    }

    // Every matching edge gates the reply the same way, so one check suffices.
    if owner.follows(&post.account_id) && reply_is_followable(post, owner, now) {
        return true;
    }

    post.tags.iter().any(|tag| owner.followed_tags.contains(tag))
}

/// Reply gating for posts reaching a timeline through a follow
///
/// Non-replies pass. Replies pass when addressed to the owner, or to an
/// account the owner follows and neither blocks nor mutes.
fn reply_is_followable(post: &FanoutPost, owner: &TimelineOwner, now: DateTime<Utc>) -> bool {
    let Some(reply_target) = &post.reply_target else {
        return true;
    };

    reply_target.account_id == owner.account_id
        || (owner.follows(&reply_target.account_id)
            && !owner.blocks.contains(&reply_target.account_id)
            && !owner.mutes(&reply_target.account_id, now))
}

/// Whether `post` belongs in the feed of `list`
pub fn includes_in_list(post: &FanoutPost, list: &TimelineList, now: DateTime<Utc>) -> bool {
    if is_excluded(post, &list.owner, now) {
        return false;
    }
    if !list.members.contains(&post.account_id) {
        return false;
    }

    match &post.reply_target {
        None => true,
        Some(reply_target) => match list.replies_policy {
            RepliesPolicy::Followed => list.owner.follows(&reply_target.account_id),
            RepliesPolicy::List => list.members.contains(&reply_target.account_id),
            RepliesPolicy::None => false,
        },
    }
}
