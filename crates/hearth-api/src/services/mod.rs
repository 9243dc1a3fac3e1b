//! Background services and external backends wired up by the server.

pub mod fanout;
pub mod retention;
pub mod revocation;

pub use fanout::{deliver_raw, Fanout, LocalFanout, RedisFanout};
pub use retention::{purge_once, spawn_retention, RetentionConfig};
pub use revocation::{
    blacklist_key, revocation_store_from_env, MemoryRevocationStore, RedisRevocationStore,
};
