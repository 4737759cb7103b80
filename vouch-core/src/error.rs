use thiserror::Error;

/// Failure taxonomy for the scan-to-validation pipeline. Every variant is
/// recoverable: the session can always return to scanning or idle and offer
/// the user a next action.
#[derive(Error, Debug)]
pub enum VouchError {
    /// Malformed token or URL. No network call is attempted.
    #[error("invalid input: {0}")]
    Input(String),

    /// Camera permission or device failure.
    #[error("camera unavailable: {0}")]
    Device(String),

    /// No native detector and the fallback decoder could not be loaded or
    /// did not become ready in time.
    #[error("decoder unavailable: {0}")]
    Decoder(String),

    /// Timeout, abort, bad status, or transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// The response parsed but its shape is not one we recognize.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, VouchError>;
