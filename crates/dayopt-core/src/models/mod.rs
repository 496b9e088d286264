//! Data models for Dayopt

mod entity;
mod id;
mod plan;
mod tag;
mod tag_group;

pub(crate) use id::uuid_id;

pub use entity::{EntityKind, SyncEntity};
pub use plan::{Plan, PlanId, PlanStatus};
pub use tag::{Tag, TagId};
pub use tag_group::{TagGroup, TagGroupId};
