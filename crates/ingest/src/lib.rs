//! Ingestion pipeline: rate-limited fetching, source adapters, and the
//! staged orchestrator that walks the entity dependency graph.

pub mod adapter;
pub mod adapters;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod orchestrator;

pub use adapter::SourceAdapter;
pub use adapters::create_adapter;
pub use error::{FetchError, IngestError};
pub use fetch::{HttpSource, RateLimitedFetcher, RemoteSource, ResourceKey};
pub use orchestrator::StagedOrchestrator;
