//! Raster retrieval orchestration
//!
//! Sequences the pipeline for one request:
//!
//! ```text
//! zoom check → API key → expand → tile index → size guard
//!            → fetch (async) → decode (blocking pool) → mosaic
//! ```

mod retriever;
mod types;

pub use retriever::ElevationRetriever;
pub use types::{FailurePolicy, RetrievalError, RetrievalOptions};
