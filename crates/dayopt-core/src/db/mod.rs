//! Database layer for Dayopt offline state

mod connection;
mod kv_store;
mod migrations;

pub use connection::Database;
pub use kv_store::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
