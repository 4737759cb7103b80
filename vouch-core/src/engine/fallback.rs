//! Memoized loading of the fallback decoding library.
//!
//! The load is attempted at most once per loader (the embedder constructs
//! one loader per process and shares it): concurrent requesters await the
//! same resolution, and a failure is memoized exactly like a success. The
//! asynchronous "ready" signal is bounded by a grace window.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::engine::backend::ContinuousDecoder;
use crate::error::{Result, VouchError};

/// Default wait for the library's ready signal.
pub const DEFAULT_READY_GRACE: Duration = Duration::from_millis(2000);

type DecoderFactory =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn ContinuousDecoder>>> + Send + Sync>;

/// One-shot, process-scoped loader for the fallback decoder.
pub struct FallbackLoader {
    factory: DecoderFactory,
    ready_grace: Duration,
    cell: OnceCell<std::result::Result<Arc<dyn ContinuousDecoder>, String>>,
}

impl std::fmt::Debug for FallbackLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackLoader")
            .field("ready_grace", &self.ready_grace)
            .field("resolved", &self.cell.initialized())
            .finish()
    }
}

impl FallbackLoader {
    pub fn new(factory: DecoderFactory) -> Self {
        Self::with_ready_grace(factory, DEFAULT_READY_GRACE)
    }

    pub fn with_ready_grace(factory: DecoderFactory, ready_grace: Duration) -> Self {
        Self {
            factory,
            ready_grace,
            cell: OnceCell::new(),
        }
    }

    /// Resolve the decoder, loading it on first use. Every caller observes
    /// the single memoized resolution; the grace window bounds the load.
    pub async fn get(&self) -> Result<Arc<dyn ContinuousDecoder>> {
        let resolved = self
            .cell
            .get_or_init(|| async {
                info!("loading fallback decoder");
                match tokio::time::timeout(self.ready_grace, (self.factory)()).await {
                    Ok(Ok(decoder)) => Ok(decoder),
                    Ok(Err(err)) => {
                        warn!(error = %err, "fallback decoder load failed");
                        Err(err.to_string())
                    }
                    Err(_) => {
                        warn!(
                            grace_ms = self.ready_grace.as_millis() as u64,
                            "fallback decoder not ready within grace window"
                        );
                        Err("not ready within grace window".to_owned())
                    }
                }
            })
            .await;

        resolved.clone().map_err(VouchError::Decoder)
    }
}
