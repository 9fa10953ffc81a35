//! Rate limiting and deduplication applied before dispatch

mod cooldown;
mod dedup;

pub use cooldown::CooldownRegistry;
pub use dedup::SessionDeduplicator;
