//! In-memory storage implementations
//!
//! These implementations are suitable for development and testing.

mod memory;

pub use memory::MemoryDataStore;
