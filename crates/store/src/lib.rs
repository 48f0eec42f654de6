//! Persistence: the `EntityStore` seam, its PostgreSQL and in-memory
//! backends, and the `EntityResolver` that walks the dependency graph.

pub mod db;
pub mod error;
pub mod memory;
pub mod pg;
pub mod resolver;
pub mod store;

pub use db::init_pg_pool;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use resolver::EntityResolver;
pub use store::{EntityStore, Resolved, StintRange};
