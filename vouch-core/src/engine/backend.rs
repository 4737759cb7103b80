//! Decoding backends. A backend turns frames into raw text; token
//! extraction stays with the engine so every backend feeds one contract.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::camera::{CameraStream, Frame};
use crate::error::Result;

/// Decodes one frame at a time. The native platform detector works this
/// way: the engine owns the sampling cadence and hands over each frame.
pub trait FrameDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attempt to decode a single frame. `Ok(None)` means no code in view;
    /// an error is a per-frame failure the caller may swallow.
    fn decode(&self, frame: &Frame) -> Result<Option<String>>;
}

/// Decodes by driving its own polling loop over the live stream, the way a
/// lazily-loaded decoding library does. Still images go through the
/// inherited per-frame contract.
#[async_trait]
pub trait ContinuousDecoder: FrameDecoder {
    /// Poll `stream` at the decoder's own cadence, pushing every decoded
    /// payload into `sink` until `cancel` fires or the sink closes.
    async fn run(
        &self,
        stream: Arc<dyn CameraStream>,
        sink: mpsc::Sender<String>,
        cancel: CancellationToken,
    );
}

/// Backend running for the current engine activation.
#[derive(Clone)]
pub(crate) enum ActiveBackend {
    /// Native detector sampled by the engine's rate-limited loop.
    Sampled(Arc<dyn FrameDecoder>),
    /// Fallback library polling the stream itself.
    Continuous(Arc<dyn ContinuousDecoder>),
}

impl ActiveBackend {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Sampled(decoder) => decoder.name(),
            Self::Continuous(decoder) => decoder.name(),
        }
    }
}
