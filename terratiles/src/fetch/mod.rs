//! Concurrent tile fetching
//!
//! [`TileFetcher`] downloads a set of tiles with a bounded number of requests
//! in flight. Every requested coordinate yields exactly one [`FetchedTile`]:
//! either the raw response body or a [`TileFailure`]. A failing tile never
//! aborts its siblings.
//!
//! ```text
//! coords ──► JoinSet (one task per tile) ──► join barrier ──► Vec<FetchedTile>
//!                 │
//!            Semaphore(concurrency)
//! ```
//!
//! Cancellation is all-or-nothing: once the token fires, outstanding tasks
//! are aborted and the call returns [`FetchCancelled`].

mod types;

pub use types::{FetchCancelled, FetchStats, FetchedTile, TileErrorKind, TileFailure};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::DEFAULT_CONCURRENCY;
use crate::coord::TileCoord;
use crate::provider::{AsyncHttpClient, TileEndpoint};

/// Fetches terrain tiles from one endpoint.
pub struct TileFetcher<C: AsyncHttpClient> {
    client: Arc<C>,
    endpoint: TileEndpoint,
    concurrency: usize,
}

impl<C: AsyncHttpClient> TileFetcher<C> {
    pub fn new(client: Arc<C>, endpoint: TileEndpoint) -> Self {
        Self {
            client,
            endpoint,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets the maximum number of requests in flight (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn endpoint(&self) -> &TileEndpoint {
        &self.endpoint
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetches every coordinate in `coords`.
    ///
    /// Results arrive in completion order, one per input coordinate.
    pub async fn fetch_all(
        &self,
        coords: &[TileCoord],
        cancel: &CancellationToken,
    ) -> Result<Vec<FetchedTile>, FetchCancelled> {
        if cancel.is_cancelled() {
            return Err(FetchCancelled);
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<TileCoord, usize> = HashMap::with_capacity(coords.len());

        for &coord in coords {
            *pending.entry(coord).or_insert(0) += 1;

            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let url = self.endpoint.tile_url(&coord);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return FetchedTile {
                        coord,
                        body: Err(TileFailure::new(
                            coord,
                            TileErrorKind::NetworkError,
                            "request limiter closed",
                        )),
                    };
                };
                fetch_one(client.as_ref(), coord, &url).await
            });
        }

        let mut results = Vec::with_capacity(coords.len());
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(outstanding = tasks.len(), "Cancelling tile fetch");
                    tasks.abort_all();
                    return Err(FetchCancelled);
                }

                next = tasks.join_next() => match next {
                    None => break,
                    Some(Ok(tile)) => {
                        if let Some(count) = pending.get_mut(&tile.coord) {
                            *count -= 1;
                            if *count == 0 {
                                pending.remove(&tile.coord);
                            }
                        }
                        results.push(tile);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Tile fetch task failed");
                    }
                },
            }
        }

        // A task that panicked never reported its coordinate.
        for (coord, count) in pending {
            for _ in 0..count {
                results.push(FetchedTile {
                    coord,
                    body: Err(TileFailure::new(
                        coord,
                        TileErrorKind::NetworkError,
                        "fetch task failed",
                    )),
                });
            }
        }

        Ok(results)
    }
}

async fn fetch_one<C: AsyncHttpClient>(client: &C, coord: TileCoord, url: &str) -> FetchedTile {
    debug!(tile = %coord, "Fetching tile");

    let body = match client.get(url).await {
        Ok(bytes) if bytes.is_empty() => {
            warn!(tile = %coord, "Empty tile response");
            Err(TileFailure::new(
                coord,
                TileErrorKind::DecodeError,
                "empty response body",
            ))
        }
        Ok(bytes) => {
            debug!(tile = %coord, bytes = bytes.len(), "Tile fetched");
            Ok(bytes)
        }
        Err(e) => {
            let failure = TileFailure::from_provider_error(coord, &e);
            warn!(tile = %coord, kind = %failure.kind, error = %e, "Tile fetch failed");
            Err(failure)
        }
    };

    FetchedTile { coord, body }
}
