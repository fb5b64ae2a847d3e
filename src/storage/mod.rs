//! Trait-based storage abstractions with an in-memory backend.

pub mod inmemory;
pub mod traits;

pub use inmemory::MemoryDataStore;
pub use traits::*;
