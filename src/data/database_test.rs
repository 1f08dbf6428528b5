//! Database tests

use super::*;
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

async fn create_account(db: &Database, handle: &str) -> String {
    let account = Account {
        id: EntityId::new().0,
        handle: handle.to_string(),
        created_at: Utc::now(),
    };
    db.upsert_account(&account).await.unwrap();
    account.id
}

async fn create_owner(db: &Database, handle: &str) -> String {
    let id = create_account(db, handle).await;
    db.insert_account_owner(&id).await.unwrap();
    id
}

/// Post whose ULID sorts at `base + offset_secs`
fn post_at(author: &str, visibility: Visibility, base: DateTime<Utc>, offset_secs: i64) -> Post {
    let published_at = base + Duration::seconds(offset_secs);
    Post {
        id: EntityId::at(published_at).0,
        published_at,
        ..Post::new(author, visibility)
    }
}

fn list_for(owner_id: &str, replies_policy: RepliesPolicy) -> List {
    List {
        id: EntityId::new().0,
        account_owner_id: owner_id.to_string(),
        title: "Friends".to_string(),
        replies_policy,
        exclusive: false,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_database_connection() {
    let (db, _temp_dir) = create_test_db().await;
    assert_eq!(db.count_memberships().await.unwrap(), (0, 0));
}

#[tokio::test]
async fn test_owner_snapshot_loads_relationships() {
    let (db, _temp_dir) = create_test_db().await;

    let owner = create_owner(&db, "@owner@local").await;
    let friend = create_account(&db, "@friend@remote").await;
    let pending = create_account(&db, "@pending@remote").await;
    let troll = create_account(&db, "@troll@remote").await;
    let blocker = create_account(&db, "@blocker@remote").await;
    let noisy = create_account(&db, "@noisy@remote").await;

    db.upsert_follow(&Follow::approved(&owner, &friend))
        .await
        .unwrap();
    db.upsert_follow(&Follow::pending(&owner, &pending))
        .await
        .unwrap();
    db.block_account(&owner, &troll).await.unwrap();
    db.block_account(&blocker, &owner).await.unwrap();
    db.mute_account(&Mute {
        account_id: owner.clone(),
        muted_account_id: noisy.clone(),
        notifications: true,
        duration: Some("PT1H".to_string()),
        created_at: Utc::now(),
    })
    .await
    .unwrap();
    db.follow_tag(&owner, "#Rust").await.unwrap();

    let owners = db.load_timeline_owners().await.unwrap();
    assert_eq!(owners.len(), 1);
    let snapshot = &owners[0];

    assert_eq!(snapshot.account_id, owner);
    assert!(snapshot.follows(&friend));
    assert!(!snapshot.follows(&pending), "pending follows are inactive");
    assert_eq!(snapshot.following.len(), 2);
    assert!(snapshot.blocks.contains(&troll));
    assert!(snapshot.blocked_by.contains(&blocker));
    assert!(snapshot.mutes(&noisy, Utc::now()));
    assert!(!snapshot.mutes(&noisy, Utc::now() + Duration::hours(2)));
    assert!(snapshot.followed_tags.contains("rust"));
}

#[tokio::test]
async fn test_remote_accounts_have_no_timeline() {
    let (db, _temp_dir) = create_test_db().await;

    create_owner(&db, "@owner@local").await;
    create_account(&db, "@remote@remote").await;

    let owners = db.load_timeline_owners().await.unwrap();
    assert_eq!(owners.len(), 1);
}

#[tokio::test]
async fn test_self_follow_rejected() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = create_owner(&db, "@owner@local").await;

    let result = db.upsert_follow(&Follow::approved(&owner, &owner)).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_approve_follow() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = create_owner(&db, "@owner@local").await;
    let friend = create_account(&db, "@friend@remote").await;

    db.upsert_follow(&Follow::pending(&owner, &friend))
        .await
        .unwrap();
    assert!(db.approve_follow(&owner, &friend).await.unwrap());
    assert!(!db.approve_follow(&owner, &friend).await.unwrap());

    let owners = db.load_timeline_owners().await.unwrap();
    assert!(owners[0].follows(&friend));

    assert!(db.delete_follow(&owner, &friend).await.unwrap());
    let owners = db.load_timeline_owners().await.unwrap();
    assert!(owners[0].following.is_empty());
}

#[tokio::test]
async fn test_block_removes_follows_both_ways() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = create_owner(&db, "@owner@local").await;
    let other = create_owner(&db, "@other@local").await;

    db.upsert_follow(&Follow::approved(&owner, &other))
        .await
        .unwrap();
    db.upsert_follow(&Follow::approved(&other, &owner))
        .await
        .unwrap();
    db.block_account(&owner, &other).await.unwrap();

    let owners = db.load_timeline_owners().await.unwrap();
    assert!(owners.iter().all(|owner| owner.following.is_empty()));

    assert!(db.unblock_account(&owner, &other).await.unwrap());
    let owners = db.load_timeline_owners().await.unwrap();
    assert!(owners.iter().all(|owner| owner.blocks.is_empty()));
}

#[tokio::test]
async fn test_lists_share_owner_snapshot() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = create_owner(&db, "@owner@local").await;
    let member = create_account(&db, "@member@remote").await;

    let list = list_for(&owner, RepliesPolicy::Followed);
    db.insert_list(&list).await.unwrap();
    db.add_list_member(&list.id, &member).await.unwrap();

    let owners = db.load_timeline_owners().await.unwrap();
    let lists = db.load_timeline_lists(&owners).await.unwrap();

    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].replies_policy, RepliesPolicy::Followed);
    assert!(lists[0].members.contains(&member));
    assert!(std::sync::Arc::ptr_eq(&lists[0].owner, &owners[0]));

    assert!(db.remove_list_member(&list.id, &member).await.unwrap());
    let lists = db.load_timeline_lists(&owners).await.unwrap();
    assert!(lists[0].members.is_empty());
}

#[tokio::test]
async fn test_load_fanout_post_with_edges() {
    let (db, _temp_dir) = create_test_db().await;
    let base = Utc::now() - Duration::hours(1);

    let alice = create_owner(&db, "@alice@local").await;
    let bob = create_account(&db, "@bob@remote").await;
    let carol = create_account(&db, "@carol@remote").await;

    let original = Post {
        mentions: vec![alice.clone()],
        tags: vec!["#Fediverse".to_string()],
        ..post_at(&bob, Visibility::Public, base, 0)
    };
    db.insert_post(&original).await.unwrap();

    let reply = Post {
        reply_target_id: Some(original.id.clone()),
        ..post_at(&carol, Visibility::Public, base, 1)
    };
    db.insert_post(&reply).await.unwrap();

    let share = Post {
        sharing_id: Some(original.id.clone()),
        ..post_at(&carol, Visibility::Public, base, 2)
    };
    db.insert_post(&share).await.unwrap();

    let loaded = db.load_fanout_post(&original.id).await.unwrap().unwrap();
    assert!(loaded.mentions.contains(&alice));
    assert!(loaded.tags.contains("fediverse"));
    assert!(loaded.reply_target.is_none());

    let loaded = db.load_fanout_post(&reply.id).await.unwrap().unwrap();
    let target = loaded.reply_target.unwrap();
    assert_eq!(target.id, original.id);
    assert_eq!(target.account_id, bob);

    let loaded = db.load_fanout_post(&share.id).await.unwrap().unwrap();
    let shared = loaded.sharing.unwrap();
    assert_eq!(shared.account_id, bob);
    assert!(shared.mentions.contains(&alice), "shared post carries mentions");

    assert!(db.load_fanout_post("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_deleted_reply_target_becomes_non_reply() {
    let (db, _temp_dir) = create_test_db().await;
    let base = Utc::now() - Duration::hours(1);

    let bob = create_account(&db, "@bob@remote").await;
    let carol = create_account(&db, "@carol@remote").await;

    let original = post_at(&bob, Visibility::Public, base, 0);
    db.insert_post(&original).await.unwrap();
    let reply = Post {
        reply_target_id: Some(original.id.clone()),
        ..post_at(&carol, Visibility::Public, base, 1)
    };
    db.insert_post(&reply).await.unwrap();

    assert!(db.delete_post(&original.id).await.unwrap());

    let loaded = db.load_fanout_post(&reply.id).await.unwrap().unwrap();
    assert!(loaded.reply_target.is_none());
}

#[tokio::test]
async fn test_load_fanout_posts_before_pages_newest_first() {
    let (db, _temp_dir) = create_test_db().await;
    let base = Utc::now() - Duration::hours(1);
    let bob = create_account(&db, "@bob@remote").await;

    let mut ids = Vec::new();
    for offset in 0..5 {
        let post = post_at(&bob, Visibility::Public, base, offset);
        db.insert_post(&post).await.unwrap();
        ids.push(post.id);
    }
    ids.reverse();

    let (page, last) = db.load_fanout_posts_before(None, 2).await.unwrap();
    let page_ids: Vec<&str> = page.iter().map(|post| post.id.as_str()).collect();
    assert_eq!(page_ids, vec![ids[0].as_str(), ids[1].as_str()]);
    assert_eq!(last.as_deref(), Some(ids[1].as_str()));

    let (page, last) = db
        .load_fanout_posts_before(last.as_deref(), 10)
        .await
        .unwrap();
    assert_eq!(page.len(), 3);
    assert_eq!(last.as_deref(), Some(ids[4].as_str()));

    let (page, last) = db
        .load_fanout_posts_before(last.as_deref(), 10)
        .await
        .unwrap();
    assert!(page.is_empty());
    assert!(last.is_none());
}

#[tokio::test]
async fn test_insert_memberships_is_idempotent() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = create_owner(&db, "@owner@local").await;
    let list = list_for(&owner, RepliesPolicy::List);
    db.insert_list(&list).await.unwrap();

    let post = Post::new(&owner, Visibility::Public);
    db.insert_post(&post).await.unwrap();

    let timeline_rows = vec![TimelinePost {
        account_id: owner.clone(),
        post_id: post.id.clone(),
    }];
    let list_rows = vec![ListPost {
        list_id: list.id.clone(),
        post_id: post.id.clone(),
    }];

    let first = db
        .insert_memberships(&timeline_rows, &list_rows)
        .await
        .unwrap();
    let second = db
        .insert_memberships(&timeline_rows, &list_rows)
        .await
        .unwrap();

    assert_eq!(first, (1, 1));
    assert_eq!(second, (0, 0));
    assert_eq!(db.count_memberships().await.unwrap(), (1, 1));
}

#[tokio::test]
async fn test_prune_keeps_newest_per_owner_and_list() {
    let (db, _temp_dir) = create_test_db().await;
    let base = Utc::now() - Duration::hours(1);

    let alice = create_owner(&db, "@alice@local").await;
    let dave = create_owner(&db, "@dave@local").await;
    let list = list_for(&alice, RepliesPolicy::List);
    db.insert_list(&list).await.unwrap();

    let mut post_ids = Vec::new();
    for offset in 0..5 {
        let post = post_at(&alice, Visibility::Public, base, offset);
        db.insert_post(&post).await.unwrap();
        post_ids.push(post.id);
    }

    let mut timeline_rows = Vec::new();
    for post_id in &post_ids {
        for account_id in [&alice, &dave] {
            timeline_rows.push(TimelinePost {
                account_id: account_id.clone(),
                post_id: post_id.clone(),
            });
        }
    }
    // Dave only has the two oldest posts
    timeline_rows.retain(|row| row.account_id == alice || post_ids[..2].contains(&row.post_id));
    let list_rows: Vec<ListPost> = post_ids
        .iter()
        .map(|post_id| ListPost {
            list_id: list.id.clone(),
            post_id: post_id.clone(),
        })
        .collect();
    db.insert_memberships(&timeline_rows, &list_rows)
        .await
        .unwrap();

    assert_eq!(db.prune_timeline_posts(3).await.unwrap(), 2);
    assert_eq!(db.prune_list_posts(3).await.unwrap(), 2);

    let newest: Vec<String> = post_ids.iter().rev().take(3).cloned().collect();
    assert_eq!(db.get_timeline_post_ids(&alice).await.unwrap(), newest);
    assert_eq!(db.get_list_post_ids(&list.id).await.unwrap(), newest);
    assert_eq!(db.get_timeline_post_ids(&dave).await.unwrap().len(), 2);

    assert_eq!(db.prune_timeline_posts(3).await.unwrap(), 0);
}

#[tokio::test]
async fn test_replace_memberships_swaps_tables() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = create_owner(&db, "@owner@local").await;

    let old_post = Post::new(&owner, Visibility::Public);
    let new_post = Post::new(&owner, Visibility::Public);
    db.insert_post(&old_post).await.unwrap();
    db.insert_post(&new_post).await.unwrap();

    db.insert_memberships(
        &[TimelinePost {
            account_id: owner.clone(),
            post_id: old_post.id.clone(),
        }],
        &[],
    )
    .await
    .unwrap();

    db.replace_memberships(
        &[TimelinePost {
            account_id: owner.clone(),
            post_id: new_post.id.clone(),
        }],
        &[],
    )
    .await
    .unwrap();

    assert_eq!(
        db.get_timeline_post_ids(&owner).await.unwrap(),
        vec![new_post.id]
    );
}

#[tokio::test]
async fn test_replace_memberships_rolls_back_on_error() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = create_owner(&db, "@owner@local").await;

    let post = Post::new(&owner, Visibility::Public);
    db.insert_post(&post).await.unwrap();
    db.insert_memberships(
        &[TimelinePost {
            account_id: owner.clone(),
            post_id: post.id.clone(),
        }],
        &[],
    )
    .await
    .unwrap();

    // Unknown post violates the foreign key
    let result = db
        .replace_memberships(
            &[TimelinePost {
                account_id: owner.clone(),
                post_id: "no-such-post".to_string(),
            }],
            &[],
        )
        .await;

    assert!(matches!(result, Err(AppError::Database(_))));
    assert_eq!(db.get_timeline_post_ids(&owner).await.unwrap(), vec![post.id]);
}

#[tokio::test]
async fn test_deletes_cascade_to_memberships() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = create_owner(&db, "@owner@local").await;
    let bob = create_account(&db, "@bob@remote").await;
    let list = list_for(&owner, RepliesPolicy::List);
    db.insert_list(&list).await.unwrap();

    let post = Post::new(&bob, Visibility::Public);
    let share = Post {
        sharing_id: Some(post.id.clone()),
        ..Post::new(&owner, Visibility::Public)
    };
    db.insert_post(&post).await.unwrap();
    db.insert_post(&share).await.unwrap();

    db.insert_memberships(
        &[
            TimelinePost {
                account_id: owner.clone(),
                post_id: post.id.clone(),
            },
            TimelinePost {
                account_id: owner.clone(),
                post_id: share.id.clone(),
            },
        ],
        &[ListPost {
            list_id: list.id.clone(),
            post_id: post.id.clone(),
        }],
    )
    .await
    .unwrap();

    // Deleting the original removes its shares too
    assert!(db.delete_post(&post.id).await.unwrap());
    assert_eq!(db.count_memberships().await.unwrap(), (0, 0));
    assert!(db.load_fanout_post(&share.id).await.unwrap().is_none());

    assert!(db.delete_list(&list.id).await.unwrap());
    assert!(db.delete_account(&owner).await.unwrap());
    assert!(db.load_timeline_owners().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unfollow_tag_and_unmute() {
    let (db, _temp_dir) = create_test_db().await;
    let owner = create_owner(&db, "@owner@local").await;
    let noisy = create_account(&db, "@noisy@remote").await;

    db.follow_tag(&owner, "Rust").await.unwrap();
    db.follow_tag(&owner, "#rust").await.unwrap();
    db.mute_account(&Mute {
        account_id: owner.clone(),
        muted_account_id: noisy.clone(),
        notifications: false,
        duration: None,
        created_at: Utc::now(),
    })
    .await
    .unwrap();

    let owners = db.load_timeline_owners().await.unwrap();
    assert_eq!(owners[0].followed_tags.len(), 1);
    assert!(owners[0].mutes(&noisy, Utc::now() + Duration::days(365)));

    assert!(db.unfollow_tag(&owner, "#RUST").await.unwrap());
    assert!(db.unmute_account(&owner, &noisy).await.unwrap());

    let owners = db.load_timeline_owners().await.unwrap();
    assert!(owners[0].followed_tags.is_empty());
    assert!(owners[0].mutes.is_empty());
}
