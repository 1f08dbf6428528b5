//! Service layer
//!
//! Contains the timeline fan-out logic separated from HTTP handlers.
//! `visibility` holds the pure inclusion predicates, `timeline`
//! orchestrates them against the database.

pub mod visibility;
mod timeline;

pub use timeline::{
    FanoutOutcome, FanoutTargets, PruneOutcome, RebuildOutcome, TimelineService, fan_out,
};
