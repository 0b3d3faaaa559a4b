//! Session stores for Blockmind.
//!
//! - [`FileSessionStore`]: one JSON file per agent, rewritten at every save point
//! - [`InMemorySessionStore`]: for tests and throwaway runs

pub mod file_store;
pub mod in_memory;

pub use file_store::FileSessionStore;
pub use in_memory::InMemorySessionStore;
