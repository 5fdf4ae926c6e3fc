mod lru;
mod timestamp;

pub use lru::LruCache;
pub use timestamp::{TimestampCache, DEFAULT_TIMESTAMP_CAPACITY};
