//! Terrain tile provider abstraction
//!
//! This module describes where terrain tiles come from ([`TileSource`],
//! [`TileEndpoint`]) and how they are requested ([`AsyncHttpClient`]).
//!
//! ```ignore
//! use terratiles::provider::{AsyncReqwestClient, TileEndpoint, TileSource};
//!
//! let client = AsyncReqwestClient::new()?;
//! let endpoint = TileEndpoint::new(TileSource::Aws);
//! let url = endpoint.tile_url(&tile);
//! ```

mod http;
mod source;
mod types;

pub use http::{AsyncHttpClient, AsyncReqwestClient};
pub use source::{KeyPolicy, TileEndpoint, TileSource, TILE_SIZE};
pub use types::ProviderError;

#[cfg(test)]
pub use http::tests::MockAsyncHttpClient;
