//! dayopt-core - Core library for Dayopt
//!
//! This crate contains the plan/tag models, the local key-value store and
//! the offline sync engine shared by every Dayopt interface.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod offline;
pub mod state;
pub mod util;

pub use config::OfflineConfig;
pub use error::{Error, Result};
pub use models::{EntityKind, Plan, PlanId, SyncEntity, Tag, TagGroup, TagGroupId, TagId};
pub use offline::{
    ActionDraft, ActionId, ConflictResolution, OfflineAction, OfflineManager, OfflineManagerStatus,
    Operation, SyncEvent, SyncStatus,
};
pub use state::SyncState;
