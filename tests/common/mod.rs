//! Common test utilities for E2E tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use feedwright::data::{Account, EntityId, Follow, List, Post, RepliesPolicy, Visibility};
use feedwright::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Admin token used by [`TestServer::with_admin_token`]
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
    /// Base time for [`TestServer::create_post`] IDs
    pub epoch: DateTime<Utc>,
}

impl TestServer {
    /// Create a new test server instance with open admin routes
    pub async fn new() -> Self {
        Self::with_options(config::DEFAULT_RETENTION_LIMIT, None).await
    }

    /// Create a test server with a custom retention limit
    pub async fn with_retention_limit(retention_limit: usize) -> Self {
        Self::with_options(retention_limit, None).await
    }

    /// Create a test server whose admin routes require [`ADMIN_TOKEN`]
    pub async fn with_admin_token() -> Self {
        Self::with_options(config::DEFAULT_RETENTION_LIMIT, Some(ADMIN_TOKEN.to_string())).await
    }

    async fn with_options(retention_limit: usize, admin_token: Option<String>) -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                admin_token,
            },
            database: config::DatabaseConfig { path: db_path },
            timeline: config::TimelineConfig {
                retention_limit,
                ..config::TimelineConfig::default()
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = feedwright::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
            epoch: Utc::now() - Duration::days(1),
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Create a remote account
    pub async fn create_account(&self, handle: &str) -> String {
        let account = Account {
            id: EntityId::new().0,
            handle: handle.to_string(),
            created_at: Utc::now(),
        };
        self.state.db.upsert_account(&account).await.unwrap();
        account.id
    }

    /// Create a local account (has a home timeline)
    pub async fn create_owner(&self, handle: &str) -> String {
        let id = self.create_account(handle).await;
        self.state.db.insert_account_owner(&id).await.unwrap();
        id
    }

    /// Approved follow from `follower` to `following`
    pub async fn follow(&self, follower: &str, following: &str) {
        self.state
            .db
            .upsert_follow(&Follow::approved(follower, following))
            .await
            .unwrap();
    }

    /// Create a list owned by `owner` containing `members`
    pub async fn create_list(
        &self,
        owner: &str,
        replies_policy: RepliesPolicy,
        members: &[&str],
    ) -> String {
        let list = List {
            id: EntityId::new().0,
            account_owner_id: owner.to_string(),
            title: "Test list".to_string(),
            replies_policy,
            exclusive: false,
            created_at: Utc::now(),
        };
        self.state.db.insert_list(&list).await.unwrap();
        for member in members {
            self.state.db.add_list_member(&list.id, member).await.unwrap();
        }
        list.id
    }

    /// Build a post whose ID sorts `seq` seconds after [`TestServer::epoch`]
    pub fn post(&self, author: &str, visibility: Visibility, seq: i64) -> Post {
        let published_at = self.epoch + Duration::seconds(seq);
        Post {
            id: EntityId::at(published_at).0,
            published_at,
            ..Post::new(author, visibility)
        }
    }

    /// Persist a post built with [`TestServer::post`] or by hand
    pub async fn insert_post(&self, post: &Post) -> String {
        self.state.db.insert_post(post).await.unwrap();
        post.id.clone()
    }

    /// Persist a plain post and return its ID
    pub async fn create_post(&self, author: &str, visibility: Visibility, seq: i64) -> String {
        let post = self.post(author, visibility, seq);
        self.insert_post(&post).await
    }

    /// Home timeline post IDs, newest first
    pub async fn timeline(&self, owner: &str) -> Vec<String> {
        self.state.db.get_timeline_post_ids(owner).await.unwrap()
    }

    /// List feed post IDs, newest first
    pub async fn list_feed(&self, list_id: &str) -> Vec<String> {
        self.state.db.get_list_post_ids(list_id).await.unwrap()
    }
}
