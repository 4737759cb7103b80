//! Scan-to-validation pipeline for the Vouch redemption widget.
//!
//! The pipeline runs from raw input to a display state: the scan engine
//! (or a manual/upload path) produces raw text, [`extract`] normalizes it
//! into a token, and the session controller drives the validation round
//! trip and exposes the resulting state to the view layer.

pub mod client;
pub mod engine;
pub mod error;
pub mod extract;
pub mod session;

pub use client::{TokenValidator, ValidationClient};
pub use engine::{
    CameraConstraints, CameraDevice, CameraStream, ContinuousDecoder, EngineEvent, EngineOptions,
    EnginePhase, FallbackLoader, FacingMode, Frame, FrameDecoder, ScanEngine,
};
pub use error::{Result, VouchError};
pub use extract::extract;
pub use session::SessionController;
