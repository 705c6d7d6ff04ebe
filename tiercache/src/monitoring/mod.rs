//! Observability for the cache engine
//!
//! - EVENTS: bounded log of hits, misses, writes, evictions, sync and errors

mod events;

pub use events::{CacheEvent, EventKind, EventLog};
