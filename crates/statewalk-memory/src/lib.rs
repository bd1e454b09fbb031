pub mod memstore;
pub mod store;

pub use memstore::MemoryCheckpointStore;
pub use store::SqliteCheckpointStore;
