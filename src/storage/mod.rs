pub mod cached;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{ClickSink, Storage, StorageError, StorageResult};
