//! End-to-end raster retrieval

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::types::{FailurePolicy, RetrievalError, RetrievalOptions};
use crate::config::{resolve_api_key, RetrievalConfig};
use crate::coord::{compute_tiles, tile_count, BoundingBox, CoordError, MAX_ZOOM};
use crate::decode::{TileDecoder, TileResult};
use crate::fetch::{FetchStats, FetchedTile, TileErrorKind, TileFailure, TileFetcher};
use crate::mosaic::{MosaicRaster, Mosaicker};
use crate::provider::{AsyncHttpClient, AsyncReqwestClient, KeyPolicy, TileSource};

/// Retrieves elevation rasters for arbitrary regions.
///
/// The retriever holds an immutable client and configuration; concurrent
/// calls share nothing else.
///
/// # Example
///
/// ```ignore
/// let retriever = ElevationRetriever::new(RetrievalConfig::default())?;
/// let region = BoundingBox::wgs84(-105.0, 39.0, -103.0, 41.0)?;
/// let raster = retriever
///     .get_elevation_raster(&region, 9, TileSource::Aws, &RetrievalOptions::default())
///     .await?;
/// ```
pub struct ElevationRetriever<C: AsyncHttpClient = AsyncReqwestClient> {
    client: Arc<C>,
    config: RetrievalConfig,
}

impl ElevationRetriever<AsyncReqwestClient> {
    /// Creates a retriever backed by reqwest, configured from `config.transport`.
    pub fn new(config: RetrievalConfig) -> Result<Self, RetrievalError> {
        let client = AsyncReqwestClient::from_transport(&config.transport)?;
        Ok(Self::with_client(Arc::new(client), config))
    }
}

impl<C: AsyncHttpClient> ElevationRetriever<C> {
    pub fn with_client(client: Arc<C>, config: RetrievalConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Fetches and merges the tiles covering `region` at `zoom`.
    pub async fn get_elevation_raster(
        &self,
        region: &BoundingBox,
        zoom: u8,
        source: TileSource,
        options: &RetrievalOptions,
    ) -> Result<MosaicRaster, RetrievalError> {
        self.get_elevation_raster_with_cancel(
            region,
            zoom,
            source,
            options,
            &CancellationToken::new(),
        )
        .await
    }

    /// Like [`get_elevation_raster`](Self::get_elevation_raster), aborting
    /// with [`RetrievalError::Cancelled`] once `cancel` fires.
    pub async fn get_elevation_raster_with_cancel(
        &self,
        region: &BoundingBox,
        zoom: u8,
        source: TileSource,
        options: &RetrievalOptions,
        cancel: &CancellationToken,
    ) -> Result<MosaicRaster, RetrievalError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom).into());
        }

        let api_key = resolve_api_key(
            options
                .api_key
                .as_deref()
                .or(self.config.api_key.as_deref()),
        );
        if api_key.is_none() && source.key_policy() != KeyPolicy::None {
            warn!(source = %source, "No API key; requests may be throttled");
        }

        let search = match options.expand {
            Some(margin) => region.expand(margin)?,
            None => *region,
        };

        let requested = tile_count(&search, zoom)?;
        if requested > self.config.max_tiles && !options.override_size_check {
            return Err(RetrievalError::TooManyTiles {
                requested,
                limit: self.config.max_tiles,
            });
        }
        let coords = compute_tiles(&search, zoom)?;

        info!(
            region = %region,
            zoom,
            source = %source,
            tiles = coords.len(),
            "Retrieving elevation raster"
        );

        let fetcher = TileFetcher::new(
            Arc::clone(&self.client),
            self.config.endpoint_for(source, api_key),
        )
        .with_concurrency(self.config.concurrency);

        let started = Instant::now();
        let fetched = fetcher
            .fetch_all(&coords, cancel)
            .await
            .map_err(|_| RetrievalError::Cancelled)?;
        let elapsed = started.elapsed();
        let bytes: u64 = fetched
            .iter()
            .filter_map(|tile| tile.body.as_ref().ok())
            .map(|body| body.len() as u64)
            .sum();

        let decoder = TileDecoder::new(source.tile_size()).with_neg_to_nodata(options.neg_to_nodata);
        let results = tokio::task::spawn_blocking(move || decode_all(&decoder, fetched))
            .await
            .map_err(|e| RetrievalError::TaskFailed(e.to_string()))?;

        if cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }

        let failed = results.iter().filter(|r| !r.is_decoded()).count();
        if options.policy == FailurePolicy::FailFast && failed > 0 && failed < results.len() {
            let mut failures: Vec<TileFailure> = results
                .into_iter()
                .filter_map(|r| match r {
                    TileResult::Failed(failure) => Some(failure),
                    TileResult::Decoded(_) => None,
                })
                .collect();
            failures.sort_by_key(|f| f.coord);
            warn!(failed = failures.len(), "Failing request on tile errors");
            return Err(RetrievalError::TilesFailed { failures });
        }

        let mut raster = Mosaicker::merge(results, region, options.clip).map_err(|e| {
            warn!(error = %e, "Mosaic failed");
            RetrievalError::from(e)
        })?;

        raster.stats = FetchStats {
            requested: coords.len(),
            succeeded: raster.tiles.len(),
            failed: raster.failures.len(),
            bytes,
            elapsed,
        };

        info!(
            width = raster.width(),
            height = raster.height(),
            succeeded = raster.stats.succeeded,
            failed = raster.stats.failed,
            bytes = raster.stats.bytes,
            elapsed_ms = raster.stats.elapsed.as_millis() as u64,
            "Elevation raster ready"
        );
        for failure in &raster.failures {
            warn!(tile = %failure.coord, kind = %failure.kind, detail = %failure.detail, "Tile missing from raster");
        }

        Ok(raster)
    }
}

fn decode_all(decoder: &TileDecoder, fetched: Vec<FetchedTile>) -> Vec<TileResult> {
    fetched
        .into_iter()
        .map(|tile| match tile.body {
            Ok(bytes) => match decoder.decode(&bytes, tile.coord) {
                Ok(decoded) => TileResult::Decoded(decoded),
                Err(e) => {
                    warn!(tile = %tile.coord, error = %e, "Tile decode failed");
                    TileResult::Failed(TileFailure::new(
                        tile.coord,
                        TileErrorKind::DecodeError,
                        e.to_string(),
                    ))
                }
            },
            Err(failure) => TileResult::Failed(failure),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{TileCoord, ORIGIN_SHIFT};
    use crate::decode::tests::f32_tiff;
    use crate::mosaic::Clip;
    use crate::provider::{MockAsyncHttpClient, ProviderError, TILE_SIZE};
    use crate::raster::NO_DATA;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Duration;

    fn not_found() -> Result<Bytes, ProviderError> {
        Err(ProviderError::Status {
            status: 404,
            url: "u".to_string(),
        })
    }

    fn flat_tile(value: f32) -> Result<Bytes, ProviderError> {
        Ok(Bytes::from(f32_tiff(TILE_SIZE, |_, _| value)))
    }

    fn world() -> BoundingBox {
        BoundingBox::web_mercator(-ORIGIN_SHIFT, -ORIGIN_SHIFT, ORIGIN_SHIFT, ORIGIN_SHIFT)
            .unwrap()
    }

    fn retriever<C: AsyncHttpClient>(client: C, config: RetrievalConfig) -> ElevationRetriever<C> {
        ElevationRetriever::with_client(Arc::new(client), config)
    }

    #[tokio::test]
    async fn test_partial_failure_leaves_hole() {
        let client = MockAsyncHttpClient::always(flat_tile(100.0)).with_response("1/1/1.tif", not_found());
        let options = RetrievalOptions::new().with_clip(Clip::Tile);

        let raster = retriever(client, RetrievalConfig::default())
            .get_elevation_raster(&world(), 1, TileSource::Aws, &options)
            .await
            .unwrap();

        let size = TILE_SIZE as usize;
        assert_eq!(raster.width(), 2 * size);
        assert_eq!(raster.grid.get(0, 0), Some(100.0));
        assert_eq!(raster.grid.get(size, size), Some(NO_DATA));
        assert_eq!(raster.failures.len(), 1);
        assert_eq!(raster.failures[0].kind, TileErrorKind::NotFound);
        assert_eq!(raster.stats.requested, 4);
        assert_eq!(raster.stats.succeeded, 3);
        assert_eq!(raster.stats.failed, 1);
        assert!(raster.stats.bytes > 0);
    }

    #[tokio::test]
    async fn test_failed_edge_tile_stays_in_raster() {
        // Top row of zoom 1: 1/0/0 and 1/1/0, the eastern one missing.
        let region =
            BoundingBox::web_mercator(-ORIGIN_SHIFT, 1.0, ORIGIN_SHIFT, ORIGIN_SHIFT).unwrap();
        let client = MockAsyncHttpClient::always(flat_tile(100.0)).with_response("1/1/0.tif", not_found());

        let raster = retriever(client, RetrievalConfig::default())
            .get_elevation_raster(&region, 1, TileSource::Aws, &RetrievalOptions::default())
            .await
            .unwrap();

        let size = TILE_SIZE as usize;
        assert_eq!((raster.width(), raster.height()), (2 * size, size));
        assert_eq!(raster.grid.get(0, 0), Some(100.0));
        assert_eq!(raster.grid.get(0, 2 * size - 1), Some(NO_DATA));
        assert_eq!(raster.failures[0].coord, TileCoord { z: 1, x: 1, y: 0 });
        let (_, _, max_x, _) = raster.extent();
        assert!((max_x - ORIGIN_SHIFT).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_all_failed() {
        let client = MockAsyncHttpClient::always(not_found());
        let result = retriever(client, RetrievalConfig::default())
            .get_elevation_raster(&world(), 1, TileSource::Aws, &RetrievalOptions::default())
            .await;

        match result {
            Err(RetrievalError::AllTilesFailed { failures }) => assert_eq!(failures.len(), 4),
            other => panic!("expected AllTilesFailed, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_fail_fast_policy() {
        let client = MockAsyncHttpClient::always(flat_tile(1.0)).with_response("1/0/0.tif", not_found());
        let options = RetrievalOptions::new().with_policy(FailurePolicy::FailFast);

        let result = retriever(client, RetrievalConfig::default())
            .get_elevation_raster(&world(), 1, TileSource::Aws, &options)
            .await;

        match result {
            Err(RetrievalError::TilesFailed { failures }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].coord, TileCoord { z: 1, x: 0, y: 0 });
            }
            other => panic!("expected TilesFailed, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_failure() {
        let client = MockAsyncHttpClient::always(flat_tile(1.0))
            .with_response("1/1/0.tif", Ok(Bytes::from_static(b"<html>oops</html>")));
        let options = RetrievalOptions::new().with_clip(Clip::Tile);

        let raster = retriever(client, RetrievalConfig::default())
            .get_elevation_raster(&world(), 1, TileSource::Aws, &options)
            .await
            .unwrap();

        assert_eq!(raster.failures.len(), 1);
        assert_eq!(raster.failures[0].kind, TileErrorKind::DecodeError);
    }

    #[tokio::test]
    async fn test_tile_count_guard() {
        let config = RetrievalConfig::default().with_max_tiles(3);
        let client = Arc::new(MockAsyncHttpClient::always(not_found()));
        let retriever = ElevationRetriever::with_client(Arc::clone(&client), config);

        let result = retriever
            .get_elevation_raster(&world(), 2, TileSource::Aws, &RetrievalOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(RetrievalError::TooManyTiles {
                requested: 16,
                limit: 3
            })
        ));
        assert_eq!(client.call_count(), 0);

        let options = RetrievalOptions::new().with_override_size_check(true);
        let result = retriever
            .get_elevation_raster(&world(), 2, TileSource::Aws, &options)
            .await;
        assert_eq!(result.unwrap_err().failures().len(), 16);
        assert_eq!(client.call_count(), 16);
    }

    #[tokio::test]
    async fn test_invalid_zoom_rejected_before_fetch() {
        let client = Arc::new(MockAsyncHttpClient::always(not_found()));
        let retriever = ElevationRetriever::with_client(Arc::clone(&client), RetrievalConfig::default());

        let result = retriever
            .get_elevation_raster(&world(), 16, TileSource::Aws, &RetrievalOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(RetrievalError::Coord(CoordError::InvalidZoom(16)))
        ));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_expand_selects_neighbours() {
        // Inside tile 2/1/1, 1 km from its east edge (x = 0).
        let region =
            BoundingBox::web_mercator(-5_000.0, 1_000_000.0, -1_000.0, 2_000_000.0).unwrap();
        let client = Arc::new(MockAsyncHttpClient::always(not_found()));
        let retriever = ElevationRetriever::with_client(Arc::clone(&client), RetrievalConfig::default());

        let plain = retriever
            .get_elevation_raster(&region, 2, TileSource::Aws, &RetrievalOptions::default())
            .await
            .unwrap_err();
        assert_eq!(plain.failures().len(), 1);

        let expanded = retriever
            .get_elevation_raster(
                &region,
                2,
                TileSource::Aws,
                &RetrievalOptions::new().with_expand(2_000.0),
            )
            .await
            .unwrap_err();
        assert_eq!(expanded.failures().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let client = MockAsyncHttpClient::always(not_found()).with_delay(Duration::from_secs(30));
        let retriever = retriever(client, RetrievalConfig::default());
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = retriever
            .get_elevation_raster_with_cancel(
                &world(),
                1,
                TileSource::Aws,
                &RetrievalOptions::default(),
                &token,
            )
            .await;
        assert!(matches!(result, Err(RetrievalError::Cancelled)));
    }

    struct RecordingClient {
        urls: Mutex<Vec<String>>,
    }

    impl AsyncHttpClient for RecordingClient {
        async fn get(&self, url: &str) -> Result<Bytes, ProviderError> {
            if let Ok(mut urls) = self.urls.lock() {
                urls.push(url.to_string());
            }
            not_found()
        }
    }

    #[tokio::test]
    async fn test_api_key_precedence() {
        let client = Arc::new(RecordingClient {
            urls: Mutex::new(Vec::new()),
        });
        let config = RetrievalConfig::default()
            .with_api_key("from-config")
            .with_endpoint(TileSource::Nextzen, "http://mirror.test");
        let retriever = ElevationRetriever::with_client(Arc::clone(&client), config);
        let region = BoundingBox::web_mercator(1.0, 1.0, 2.0, 2.0).unwrap();

        let _ = retriever
            .get_elevation_raster(
                &region,
                0,
                TileSource::Nextzen,
                &RetrievalOptions::new().with_api_key("from-options"),
            )
            .await;
        let _ = retriever
            .get_elevation_raster(&region, 0, TileSource::Nextzen, &RetrievalOptions::default())
            .await;

        let urls = client.urls.lock().unwrap().clone();
        assert_eq!(
            urls,
            vec![
                "http://mirror.test/0/0/0.tif?api_key=from-options".to_string(),
                "http://mirror.test/0/0/0.tif?api_key=from-config".to_string(),
            ]
        );
    }
}
