//! Camera seams. The platform supplies concrete devices; the engine only
//! cares that acquisition is fallible and that a held stream can be paused
//! without releasing its tracks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Which way the camera should face. Rear-facing is preferred for scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    Environment,
    User,
}

/// Acquisition constraints passed to [`CameraDevice::open`].
#[derive(Debug, Clone)]
pub struct CameraConstraints {
    pub facing: FacingMode,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            width: 1280,
            height: 720,
        }
    }
}

/// A single luma frame grabbed from a live stream or decoded from an
/// uploaded image.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub luma: Vec<u8>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("luma_len", &self.luma.len())
            .finish()
    }
}

/// Camera hardware access. Opening may fail on permission or device grounds;
/// a failed open must not leave tracks held.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn open(&self, constraints: CameraConstraints) -> Result<Arc<dyn CameraStream>>;
}

/// Live device stream. `pause` stops frame delivery but keeps the underlying
/// tracks open for fast resume; `close` releases every track and is terminal.
pub trait CameraStream: Send + Sync {
    /// Grab the current frame, or `None` when the stream is paused or has
    /// nothing new to offer.
    fn grab(&self) -> Option<Frame>;
    fn pause(&self);
    fn resume(&self);
    fn close(&self);
}
