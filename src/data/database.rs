//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx runtime queries; the schema lives in `migrations/`.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use super::models::*;
use super::snapshot::{FanoutPost, FollowEdge, MuteEdge, ReplyTarget, TimelineList, TimelineOwner};
use crate::error::AppError;

/// Maximum number of bound IDs per `IN (...)` clause
const IN_CLAUSE_CHUNK: usize = 500;

/// Maximum rows per multi-row INSERT (two binds per row)
const INSERT_CHUNK: usize = 400;

/// Raw `posts` row
#[derive(Debug, Clone, sqlx::FromRow)]
struct PostRow {
    id: String,
    account_id: String,
    visibility: String,
    reply_target_id: Option<String>,
    sharing_id: Option<String>,
    tags: String,
}

fn parse_tags(post_id: &str, raw: &str) -> HashSet<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tags) => tags.iter().map(|tag| normalize_tag(tag)).collect(),
        Err(error) => {
            tracing::warn!(post_id, %error, "Ignoring malformed post tags");
            crate::metrics::DATA_ERRORS_TOTAL
                .with_label_values(&["post_tags"])
                .inc();
            HashSet::new()
        }
    }
}

/// Edges loaded alongside a page of posts
#[derive(Default)]
struct PostEdges {
    mentions: HashMap<String, HashSet<String>>,
    shared: HashMap<String, PostRow>,
    reply_authors: HashMap<String, String>,
}

impl PostEdges {
    fn assemble(&self, row: &PostRow) -> Result<FanoutPost, AppError> {
        let mut post = self.assemble_flat(row)?;

        post.reply_target = row.reply_target_id.as_ref().and_then(|target_id| {
            self.reply_authors.get(target_id).map(|account_id| ReplyTarget {
                id: target_id.clone(),
                account_id: account_id.clone(),
            })
        });

        if let Some(shared_row) = row.sharing_id.as_ref().and_then(|id| self.shared.get(id)) {
            post.sharing = Some(Box::new(self.assemble_flat(shared_row)?));
        }

        Ok(post)
    }

    fn assemble_flat(&self, row: &PostRow) -> Result<FanoutPost, AppError> {
        Ok(FanoutPost {
            id: row.id.clone(),
            account_id: row.account_id.clone(),
            visibility: row.visibility.parse()?,
            reply_target: None,
            sharing: None,
            mentions: self.mentions.get(&row.id).cloned().unwrap_or_default(),
            tags: parse_tags(&row.id, &row.tags),
        })
    }
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        // Create connection string
        let connection_string = format!("sqlite:{}?mode=rwc", path.display());

        // Create connection pool
        let pool = SqlitePool::connect(&connection_string).await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Migration(e)
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Insert or update an account
    pub async fn upsert_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, handle, created_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET handle = excluded.handle
            "#,
        )
        .bind(&account.id)
        .bind(&account.handle)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark an account as local (gives it a home timeline)
    pub async fn insert_account_owner(&self, account_id: &str) -> Result<(), AppError> {
        sqlx::query("INSERT OR IGNORE INTO account_owners (id, created_at) VALUES (?, ?)")
            .bind(account_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete an account; relationships and memberships cascade
    pub async fn delete_account(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Relationships
    // =========================================================================

    /// Insert or replace a follow edge
    pub async fn upsert_follow(&self, follow: &Follow) -> Result<(), AppError> {
        if follow.follower_id == follow.following_id {
            return Err(AppError::Validation(
                "an account cannot follow itself".to_string(),
            ));
        }

        let languages = follow
            .languages
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query(
            r#"
            INSERT INTO follows (following_id, follower_id, shares, notify, languages, created_at, approved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(following_id, follower_id) DO UPDATE SET
                shares = excluded.shares,
                notify = excluded.notify,
                languages = excluded.languages,
                approved_at = excluded.approved_at
            "#,
        )
        .bind(&follow.following_id)
        .bind(&follow.follower_id)
        .bind(follow.shares)
        .bind(follow.notify)
        .bind(languages)
        .bind(follow.created_at)
        .bind(follow.approved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Approve a pending follow request
    pub async fn approve_follow(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE follows SET approved_at = ? WHERE follower_id = ? AND following_id = ? AND approved_at IS NULL",
        )
        .bind(Utc::now())
        .bind(follower_id)
        .bind(following_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a follow edge
    pub async fn delete_follow(
        &self,
        follower_id: &str,
        following_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND following_id = ?")
            .bind(follower_id)
            .bind(following_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Block an account
    ///
    /// Also removes follows in both directions.
    pub async fn block_account(
        &self,
        account_id: &str,
        blocked_account_id: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT OR IGNORE INTO blocks (account_id, blocked_account_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(account_id)
        .bind(blocked_account_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM follows
            WHERE (follower_id = ? AND following_id = ?)
               OR (follower_id = ? AND following_id = ?)
            "#,
        )
        .bind(account_id)
        .bind(blocked_account_id)
        .bind(blocked_account_id)
        .bind(account_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Unblock an account
    pub async fn unblock_account(
        &self,
        account_id: &str,
        blocked_account_id: &str,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM blocks WHERE account_id = ? AND blocked_account_id = ?")
                .bind(account_id)
                .bind(blocked_account_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mute an account (replaces an existing mute)
    pub async fn mute_account(&self, mute: &Mute) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO mutes (account_id, muted_account_id, notifications, duration, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&mute.account_id)
        .bind(&mute.muted_account_id)
        .bind(mute.notifications)
        .bind(&mute.duration)
        .bind(mute.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Unmute an account
    pub async fn unmute_account(
        &self,
        account_id: &str,
        muted_account_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM mutes WHERE account_id = ? AND muted_account_id = ?")
            .bind(account_id)
            .bind(muted_account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Follow a hashtag
    pub async fn follow_tag(&self, account_owner_id: &str, tag: &str) -> Result<(), AppError> {
        let tag = normalize_tag(tag);
        if tag.is_empty() {
            return Err(AppError::Validation("tag must not be empty".to_string()));
        }

        sqlx::query(
            "INSERT OR IGNORE INTO followed_tags (account_owner_id, tag, created_at) VALUES (?, ?, ?)",
        )
        .bind(account_owner_id)
        .bind(tag)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Unfollow a hashtag
    pub async fn unfollow_tag(&self, account_owner_id: &str, tag: &str) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM followed_tags WHERE account_owner_id = ? AND tag = ?")
                .bind(account_owner_id)
                .bind(normalize_tag(tag))
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Lists
    // =========================================================================

    /// Create a list
    pub async fn insert_list(&self, list: &List) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO lists (id, account_owner_id, title, replies_policy, exclusive, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&list.id)
        .bind(&list.account_owner_id)
        .bind(&list.title)
        .bind(list.replies_policy.as_str())
        .bind(list.exclusive)
        .bind(list.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a list; its feed rows cascade
    pub async fn delete_list(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM lists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Add account to list
    pub async fn add_list_member(&self, list_id: &str, account_id: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT OR IGNORE INTO list_members (list_id, account_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(list_id)
        .bind(account_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove account from list
    pub async fn remove_list_member(
        &self,
        list_id: &str,
        account_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM list_members WHERE list_id = ? AND account_id = ?")
            .bind(list_id)
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Insert a post with its mentions atomically
    pub async fn insert_post(&self, post: &Post) -> Result<(), AppError> {
        let tags: Vec<String> = post.tags.iter().map(|tag| normalize_tag(tag)).collect();
        let tags = serde_json::to_string(&tags).map_err(|e| AppError::Internal(e.into()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, account_id, visibility, reply_target_id, sharing_id, tags, language, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.account_id)
        .bind(post.visibility.as_str())
        .bind(&post.reply_target_id)
        .bind(&post.sharing_id)
        .bind(tags)
        .bind(&post.language)
        .bind(post.published_at)
        .execute(&mut *tx)
        .await?;

        for account_id in &post.mentions {
            sqlx::query("INSERT OR IGNORE INTO mentions (post_id, account_id) VALUES (?, ?)")
                .bind(&post.id)
                .bind(account_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete a post; shares of it and membership rows cascade
    pub async fn delete_post(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Fan-out read model
    // =========================================================================

    /// Load every local account with its relationship edges
    ///
    /// Ordered by account ID.
    pub async fn load_timeline_owners(&self) -> Result<Vec<Arc<TimelineOwner>>, AppError> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM account_owners ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut owners: BTreeMap<String, TimelineOwner> = ids
            .into_iter()
            .map(|id| {
                let owner = TimelineOwner::new(&id);
                (id, owner)
            })
            .collect();

        let follows = sqlx::query_as::<_, (String, String, Option<DateTime<Utc>>)>(
            r#"
            SELECT f.follower_id, f.following_id, f.approved_at
            FROM follows f JOIN account_owners o ON o.id = f.follower_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        for (follower_id, following_id, approved_at) in follows {
            if let Some(owner) = owners.get_mut(&follower_id) {
                owner.following.push(FollowEdge {
                    following_id,
                    approved_at,
                });
            }
        }

        let blocks = sqlx::query_as::<_, (String, String)>(
            "SELECT account_id, blocked_account_id FROM blocks",
        )
        .fetch_all(&self.pool)
        .await?;
        for (account_id, blocked_account_id) in blocks {
            if let Some(owner) = owners.get_mut(&account_id) {
                owner.blocks.insert(blocked_account_id.clone());
            }
            if let Some(owner) = owners.get_mut(&blocked_account_id) {
                owner.blocked_by.insert(account_id);
            }
        }

        let mutes = sqlx::query_as::<_, (String, String, Option<String>, DateTime<Utc>)>(
            r#"
            SELECT m.account_id, m.muted_account_id, m.duration, m.created_at
            FROM mutes m JOIN account_owners o ON o.id = m.account_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        for (account_id, muted_account_id, duration, created_at) in mutes {
            if let Some(owner) = owners.get_mut(&account_id) {
                owner.mutes.push(MuteEdge::new(
                    &muted_account_id,
                    duration.as_deref(),
                    created_at,
                ));
            }
        }

        let tags = sqlx::query_as::<_, (String, String)>(
            "SELECT account_owner_id, tag FROM followed_tags",
        )
        .fetch_all(&self.pool)
        .await?;
        for (account_owner_id, tag) in tags {
            if let Some(owner) = owners.get_mut(&account_owner_id) {
                owner.followed_tags.insert(normalize_tag(&tag));
            }
        }

        Ok(owners.into_values().map(Arc::new).collect())
    }

    /// Load every list with its members
    ///
    /// Lists share the `Arc` of their owner from `owners`. Lists whose owner
    /// is missing from `owners` are skipped.
    pub async fn load_timeline_lists(
        &self,
        owners: &[Arc<TimelineOwner>],
    ) -> Result<Vec<TimelineList>, AppError> {
        let owners_by_id: HashMap<&str, &Arc<TimelineOwner>> = owners
            .iter()
            .map(|owner| (owner.account_id.as_str(), owner))
            .collect();

        let rows = sqlx::query_as::<_, (String, String, String, bool)>(
            "SELECT id, account_owner_id, replies_policy, exclusive FROM lists ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut members: HashMap<String, HashSet<String>> = HashMap::new();
        let member_rows =
            sqlx::query_as::<_, (String, String)>("SELECT list_id, account_id FROM list_members")
                .fetch_all(&self.pool)
                .await?;
        for (list_id, account_id) in member_rows {
            members.entry(list_id).or_default().insert(account_id);
        }

        let mut lists = Vec::with_capacity(rows.len());
        for (id, account_owner_id, replies_policy, exclusive) in rows {
            let Some(owner) = owners_by_id.get(account_owner_id.as_str()) else {
                tracing::debug!(list_id = %id, "Skipping list without a loaded owner");
                continue;
            };
            let replies_policy = match replies_policy.parse::<RepliesPolicy>() {
                Ok(policy) => policy,
                Err(error) => {
                    tracing::warn!(list_id = %id, %error, "Skipping list with malformed replies policy");
                    crate::metrics::DATA_ERRORS_TOTAL
                        .with_label_values(&["list_replies_policy"])
                        .inc();
                    continue;
                }
            };

            lists.push(TimelineList {
                members: members.remove(&id).unwrap_or_default(),
                id,
                owner: Arc::clone(owner),
                replies_policy,
                exclusive,
            });
        }

        Ok(lists)
    }

    /// Load one post with its sharing, mention and reply-target edges
    pub async fn load_fanout_post(&self, id: &str) -> Result<Option<FanoutPost>, AppError> {
        let row = sqlx::query_as::<_, PostRow>(
            "SELECT id, account_id, visibility, reply_target_id, sharing_id, tags FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let edges = self.load_post_edges(std::slice::from_ref(&row)).await?;
        edges.assemble(&row).map(Some)
    }

    /// Load a page of posts in descending ID order
    ///
    /// Returns posts with IDs strictly below `before` (all posts when None),
    /// at most `limit`, plus the ID of the last row scanned so the caller can
    /// continue even when some rows were skipped as malformed.
    pub async fn load_fanout_posts_before(
        &self,
        before: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<FanoutPost>, Option<String>), AppError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, account_id, visibility, reply_target_id, sharing_id, tags
            FROM posts
            WHERE ? IS NULL OR id < ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(before)
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let last_id = rows.last().map(|row| row.id.clone());
        let edges = self.load_post_edges(&rows).await?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            match edges.assemble(row) {
                Ok(post) => posts.push(post),
                Err(error) => {
                    tracing::warn!(post_id = %row.id, %error, "Skipping malformed post");
                    crate::metrics::DATA_ERRORS_TOTAL
                        .with_label_values(&["post"])
                        .inc();
                }
            }
        }

        Ok((posts, last_id))
    }

    async fn load_post_edges(&self, rows: &[PostRow]) -> Result<PostEdges, AppError> {
        let sharing_ids: Vec<String> = rows.iter().filter_map(|row| row.sharing_id.clone()).collect();
        let reply_ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.reply_target_id.clone())
            .collect();

        let shared: HashMap<String, PostRow> = self
            .load_post_rows(&sharing_ids)
            .await?
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();

        let mut mention_ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        mention_ids.extend(shared.keys().cloned());
        let mentions = self.load_mentions(&mention_ids).await?;

        let reply_authors = self.load_post_authors(&reply_ids).await?;

        Ok(PostEdges {
            mentions,
            shared,
            reply_authors,
        })
    }

    async fn load_post_rows(&self, ids: &[String]) -> Result<Vec<PostRow>, AppError> {
        let mut rows = Vec::new();
        for chunk in ids.chunks(IN_CLAUSE_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new(
                "SELECT id, account_id, visibility, reply_target_id, sharing_id, tags FROM posts WHERE id IN (",
            );
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            rows.extend(
                query
                    .build_query_as::<PostRow>()
                    .fetch_all(&self.pool)
                    .await?,
            );
        }
        Ok(rows)
    }

    async fn load_post_authors(&self, ids: &[String]) -> Result<HashMap<String, String>, AppError> {
        let mut authors = HashMap::new();
        for chunk in ids.chunks(IN_CLAUSE_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new("SELECT id, account_id FROM posts WHERE id IN (");
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            let rows = query
                .build_query_as::<(String, String)>()
                .fetch_all(&self.pool)
                .await?;
            authors.extend(rows);
        }
        Ok(authors)
    }

    async fn load_mentions(
        &self,
        post_ids: &[String],
    ) -> Result<HashMap<String, HashSet<String>>, AppError> {
        let mut mentions: HashMap<String, HashSet<String>> = HashMap::new();
        for chunk in post_ids.chunks(IN_CLAUSE_CHUNK) {
            let mut query =
                QueryBuilder::<Sqlite>::new("SELECT post_id, account_id FROM mentions WHERE post_id IN (");
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            let rows = query
                .build_query_as::<(String, String)>()
                .fetch_all(&self.pool)
                .await?;
            for (post_id, account_id) in rows {
                mentions.entry(post_id).or_default().insert(account_id);
            }
        }
        Ok(mentions)
    }

    // =========================================================================
    // Membership tables
    // =========================================================================

    /// Insert membership rows, ignoring rows that already exist
    ///
    /// Both tables are written in one transaction.
    ///
    /// # Returns
    /// Newly inserted (timeline, list) row counts
    pub async fn insert_memberships(
        &self,
        timeline_posts: &[TimelinePost],
        list_posts: &[ListPost],
    ) -> Result<(u64, u64), AppError> {
        let mut tx = self.pool.begin().await?;
        let timeline_inserted = insert_timeline_rows(&mut tx, timeline_posts).await?;
        let list_inserted = insert_list_rows(&mut tx, list_posts).await?;
        tx.commit().await?;

        Ok((timeline_inserted, list_inserted))
    }

    /// Replace both membership tables wholesale
    ///
    /// All-or-nothing: on error the transaction rolls back and the previous
    /// rows stay in place.
    pub async fn replace_memberships(
        &self,
        timeline_posts: &[TimelinePost],
        list_posts: &[ListPost],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM timeline_posts")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM list_posts").execute(&mut *tx).await?;

        insert_timeline_rows(&mut tx, timeline_posts).await?;
        insert_list_rows(&mut tx, list_posts).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Keep the newest `limit` rows of every home timeline
    ///
    /// # Returns
    /// Number of rows deleted
    pub async fn prune_timeline_posts(&self, limit: usize) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM timeline_posts
            WHERE (account_id, post_id) IN (
                SELECT account_id, post_id FROM (
                    SELECT account_id, post_id,
                           ROW_NUMBER() OVER (PARTITION BY account_id ORDER BY post_id DESC) AS position
                    FROM timeline_posts
                )
                WHERE position > ?
            )
            "#,
        )
        .bind(limit as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Keep the newest `limit` rows of every list feed
    ///
    /// # Returns
    /// Number of rows deleted
    pub async fn prune_list_posts(&self, limit: usize) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM list_posts
            WHERE (list_id, post_id) IN (
                SELECT list_id, post_id FROM (
                    SELECT list_id, post_id,
                           ROW_NUMBER() OVER (PARTITION BY list_id ORDER BY post_id DESC) AS position
                    FROM list_posts
                )
                WHERE position > ?
            )
            "#,
        )
        .bind(limit as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Post IDs in a home timeline, newest first
    pub async fn get_timeline_post_ids(&self, account_id: &str) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT post_id FROM timeline_posts WHERE account_id = ? ORDER BY post_id DESC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Post IDs in a list feed, newest first
    pub async fn get_list_post_ids(&self, list_id: &str) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT post_id FROM list_posts WHERE list_id = ? ORDER BY post_id DESC",
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Count all membership rows as (timeline, list)
    pub async fn count_memberships(&self) -> Result<(i64, i64), AppError> {
        let timeline: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM timeline_posts")
            .fetch_one(&self.pool)
            .await?;
        let list: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM list_posts")
            .fetch_one(&self.pool)
            .await?;

        Ok((timeline, list))
    }
}

async fn insert_timeline_rows(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    rows: &[TimelinePost],
) -> Result<u64, AppError> {
    let mut inserted = 0;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut query =
            QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO timeline_posts (account_id, post_id) ");
        query.push_values(chunk, |mut row, membership| {
            row.push_bind(&membership.account_id)
                .push_bind(&membership.post_id);
        });
        inserted += query.build().execute(&mut **tx).await?.rows_affected();
    }
    Ok(inserted)
}

async fn insert_list_rows(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    rows: &[ListPost],
) -> Result<u64, AppError> {
    let mut inserted = 0;
    for chunk in rows.chunks(INSERT_CHUNK) {
        let mut query =
            QueryBuilder::<Sqlite>::new("INSERT OR IGNORE INTO list_posts (list_id, post_id) ");
        query.push_values(chunk, |mut row, membership| {
            row.push_bind(&membership.list_id)
                .push_bind(&membership.post_id);
        });
        inserted += query.build().execute(&mut **tx).await?.rows_affected();
    }
    Ok(inserted)
}
