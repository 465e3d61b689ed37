//! Snapshot loading: payload model and the asynchronous fetcher.

pub mod fetcher;
pub mod model;

pub use fetcher::{CommandSource, FetchCompleted, GenerationGate, SnapshotFetcher, SnapshotSource};
pub use model::{Item, Snapshot, parse_payload};
