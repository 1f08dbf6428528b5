//! Data layer module
//!
//! Handles all data persistence and the fan-out read model:
//! - SQLite database operations
//! - Relationship snapshots consumed by the visibility predicates
//! - ISO-8601 mute durations

mod database;
mod duration;
mod models;
mod snapshot;

pub use database::Database;
pub use duration::{DurationError, IsoDuration};
pub use models::*;
pub use snapshot::{
    FanoutPost, FollowEdge, MuteEdge, MuteExpiry, ReplyTarget, TimelineList, TimelineOwner,
};

#[cfg(test)]
mod database_test;
