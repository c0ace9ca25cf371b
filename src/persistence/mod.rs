//! State persistence: storage backends and the debounced manager

pub mod manager;
pub mod storage;

pub use manager::{PersistField, PersistedState, PersistenceConfig, PersistenceManager};
pub use storage::{FileStorage, MemoryStorage, NullStorage, StorageBackend};
