pub mod actions;
pub mod common;
pub mod config;
pub mod conflicts;
pub mod quarantine;
pub mod queue;
pub mod status;
pub mod sync;
