//! Timeline service
//!
//! Maintains home timeline and list membership:
//! - incremental fan-out of a single new post
//! - retention pruning to a bounded size
//! - full rebuild from post history

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use super::visibility::{includes_in_list, includes_in_timeline};
use crate::config::TimelineConfig;
use crate::data::{Database, FanoutPost, ListPost, TimelineList, TimelineOwner, TimelinePost};
use crate::error::AppError;
use crate::metrics;

/// Membership rows one post qualifies for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutTargets {
    pub timeline_posts: Vec<TimelinePost>,
    pub list_posts: Vec<ListPost>,
}

/// Evaluate one post against every owner and list
pub fn fan_out(
    post: &FanoutPost,
    owners: &[Arc<TimelineOwner>],
    lists: &[TimelineList],
    now: DateTime<Utc>,
) -> FanoutTargets {
    let timeline_posts = owners
        .iter()
        .filter(|owner| includes_in_timeline(post, owner, now))
        .map(|owner| TimelinePost {
            account_id: owner.account_id.clone(),
            post_id: post.id.clone(),
        })
        .collect();

    let list_posts = lists
        .iter()
        .filter(|list| includes_in_list(post, list, now))
        .map(|list| ListPost {
            list_id: list.id.clone(),
            post_id: post.id.clone(),
        })
        .collect();

    FanoutTargets {
        timeline_posts,
        list_posts,
    }
}

/// Result of fanning out one post
#[derive(Debug, Clone, Serialize)]
pub struct FanoutOutcome {
    pub post_id: String,
    /// Timelines the post qualifies for
    pub timelines: usize,
    /// Lists the post qualifies for
    pub lists: usize,
    /// Rows newly written (existing rows are left alone)
    pub inserted_timeline_rows: u64,
    pub inserted_list_rows: u64,
}

/// Result of a retention prune
#[derive(Debug, Clone, Serialize)]
pub struct PruneOutcome {
    pub timeline_rows_deleted: u64,
    pub list_rows_deleted: u64,
}

/// Result of a full rebuild
#[derive(Debug, Clone, Serialize)]
pub struct RebuildOutcome {
    pub posts_scanned: usize,
    pub batches: usize,
    pub timeline_rows: usize,
    pub list_rows: usize,
    /// Every timeline and list reached the retention limit
    pub saturated: bool,
}

/// Insertion-ordered set of post IDs capped at the retention limit
#[derive(Debug, Clone)]
struct CandidateSet {
    ids: Vec<String>,
    seen: HashSet<String>,
    limit: usize,
}

impl CandidateSet {
    fn new(limit: usize) -> Self {
        Self {
            ids: Vec::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    fn is_full(&self) -> bool {
        self.ids.len() >= self.limit
    }

    fn insert(&mut self, id: &str) -> bool {
        if self.is_full() || !self.seen.insert(id.to_string()) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }
}

/// Timeline service
pub struct TimelineService {
    db: Arc<Database>,
    config: TimelineConfig,
    /// Serializes rebuilds
    rebuild_lock: Mutex<()>,
}

impl TimelineService {
    /// Create new timeline service
    pub fn new(db: Arc<Database>, config: TimelineConfig) -> Self {
        Self {
            db,
            config,
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Retention limit per timeline and per list
    pub fn retention_limit(&self) -> usize {
        self.config.retention_limit
    }

    /// Fan out a persisted post to every matching timeline and list
    ///
    /// Idempotent: rows that already exist are ignored and nothing is ever
    /// removed here.
    ///
    /// # Errors
    /// `NotFound` if the post does not exist; database errors are surfaced.
    pub async fn append_post_to_timelines(&self, post_id: &str) -> Result<FanoutOutcome, AppError> {
        let post = self
            .db
            .load_fanout_post(post_id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.append_loaded_post(&post).await
    }

    /// Fan out a post whose read model is already loaded
    pub async fn append_loaded_post(&self, post: &FanoutPost) -> Result<FanoutOutcome, AppError> {
        let owners = self.db.load_timeline_owners().await?;
        let lists = self.db.load_timeline_lists(&owners).await?;

        let targets = fan_out(post, &owners, &lists, Utc::now());
        let (inserted_timeline_rows, inserted_list_rows) = self
            .db
            .insert_memberships(&targets.timeline_posts, &targets.list_posts)
            .await?;

        metrics::FANOUT_POSTS_TOTAL.inc();
        metrics::MEMBERSHIP_ROWS_INSERTED_TOTAL
            .with_label_values(&["timeline"])
            .inc_by(inserted_timeline_rows);
        metrics::MEMBERSHIP_ROWS_INSERTED_TOTAL
            .with_label_values(&["list"])
            .inc_by(inserted_list_rows);

        tracing::debug!(
            post_id = %post.id,
            timelines = targets.timeline_posts.len(),
            lists = targets.list_posts.len(),
            inserted_timeline_rows,
            inserted_list_rows,
            "Post fanned out"
        );

        Ok(FanoutOutcome {
            post_id: post.id.clone(),
            timelines: targets.timeline_posts.len(),
            lists: targets.list_posts.len(),
            inserted_timeline_rows,
            inserted_list_rows,
        })
    }

    /// Trim every timeline and list to the newest `retention_limit` posts
    pub async fn prune_old_posts_from_timelines(&self) -> Result<PruneOutcome, AppError> {
        let limit = self.config.retention_limit;
        let timeline_rows_deleted = self.db.prune_timeline_posts(limit).await?;
        let list_rows_deleted = self.db.prune_list_posts(limit).await?;

        metrics::MEMBERSHIP_ROWS_PRUNED_TOTAL
            .with_label_values(&["timeline"])
            .inc_by(timeline_rows_deleted);
        metrics::MEMBERSHIP_ROWS_PRUNED_TOTAL
            .with_label_values(&["list"])
            .inc_by(list_rows_deleted);

        if timeline_rows_deleted > 0 || list_rows_deleted > 0 {
            tracing::info!(
                timeline_rows_deleted,
                list_rows_deleted,
                limit,
                "Pruned old timeline entries"
            );
        }

        Ok(PruneOutcome {
            timeline_rows_deleted,
            list_rows_deleted,
        })
    }

    /// Recompute all timeline and list membership from post history
    ///
    /// Scans posts newest first in batches of `window` (default from
    /// configuration) until every timeline and list holds
    /// `retention_limit` posts or history runs out, then swaps both
    /// membership tables in one transaction.
    ///
    /// Concurrent calls wait for the running rebuild to finish.
    pub async fn rebuild_timelines(
        &self,
        window: Option<usize>,
    ) -> Result<RebuildOutcome, AppError> {
        let _guard = self.rebuild_lock.lock().await;
        let started = Instant::now();
        let result = self.rebuild(window).await;

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::observe_rebuild(status, started.elapsed());

        match &result {
            Ok(outcome) => tracing::info!(
                posts_scanned = outcome.posts_scanned,
                batches = outcome.batches,
                timeline_rows = outcome.timeline_rows,
                list_rows = outcome.list_rows,
                saturated = outcome.saturated,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Timelines rebuilt"
            ),
            Err(error) => tracing::error!(%error, "Timeline rebuild failed"),
        }

        result
    }

    async fn rebuild(&self, window: Option<usize>) -> Result<RebuildOutcome, AppError> {
        let window = window.unwrap_or_else(|| self.config.default_rebuild_window());
        if window == 0 {
            return Err(AppError::Validation(
                "rebuild window must be greater than 0".to_string(),
            ));
        }

        let limit = self.config.retention_limit;
        let now = Utc::now();

        let owners = self.db.load_timeline_owners().await?;
        let lists = self.db.load_timeline_lists(&owners).await?;

        let mut owner_sets: Vec<CandidateSet> =
            owners.iter().map(|_| CandidateSet::new(limit)).collect();
        let mut list_sets: Vec<CandidateSet> =
            lists.iter().map(|_| CandidateSet::new(limit)).collect();

        let mut cursor: Option<String> = None;
        let mut batches = 0usize;
        let mut posts_scanned = 0usize;

        loop {
            let saturated = owner_sets.iter().all(CandidateSet::is_full)
                && list_sets.iter().all(CandidateSet::is_full);
            if saturated {
                break;
            }
            if self
                .config
                .max_rebuild_batches
                .is_some_and(|max| batches >= max)
            {
                tracing::warn!(batches, "Rebuild stopped at the batch cap");
                break;
            }

            let (posts, last_id) = self
                .db
                .load_fanout_posts_before(cursor.as_deref(), window)
                .await?;
            let Some(last_id) = last_id else {
                break;
            };
            batches += 1;
            posts_scanned += posts.len();

            for post in &posts {
                for (owner, set) in owners.iter().zip(owner_sets.iter_mut()) {
                    if !set.is_full() && includes_in_timeline(post, owner, now) {
                        set.insert(&post.id);
                    }
                }
                for (list, set) in lists.iter().zip(list_sets.iter_mut()) {
                    if !set.is_full() && includes_in_list(post, list, now) {
                        set.insert(&post.id);
                    }
                }
            }

            tracing::debug!(batch = batches, posts = posts.len(), "Rebuild batch scanned");
            cursor = Some(last_id);
        }

        let saturated = owner_sets.iter().all(CandidateSet::is_full)
            && list_sets.iter().all(CandidateSet::is_full);

        let timeline_posts: Vec<TimelinePost> = owners
            .iter()
            .zip(owner_sets)
            .flat_map(|(owner, set)| {
                set.ids.into_iter().map(move |post_id| TimelinePost {
                    account_id: owner.account_id.clone(),
                    post_id,
                })
            })
            .collect();
        let list_posts: Vec<ListPost> = lists
            .iter()
            .zip(list_sets)
            .flat_map(|(list, set)| {
                set.ids.into_iter().map(move |post_id| ListPost {
                    list_id: list.id.clone(),
                    post_id,
                })
            })
            .collect();

        self.db
            .replace_memberships(&timeline_posts, &list_posts)
            .await?;

        metrics::MEMBERSHIP_ROWS
            .with_label_values(&["timeline"])
            .set(timeline_posts.len() as i64);
        metrics::MEMBERSHIP_ROWS
            .with_label_values(&["list"])
            .set(list_posts.len() as i64);

        Ok(RebuildOutcome {
            posts_scanned,
            batches,
            timeline_rows: timeline_posts.len(),
            list_rows: list_posts.len(),
            saturated,
        })
    }
}
