//! Scan engine: owns the camera resource and the frame-sampling loop,
//! delegates decoding to one of two backends, and emits extracted tokens.
//!
//! Lifecycle: `Idle → Active (stream held, one backend running) → Paused
//! (stream held, loop stopped) → Released`. Pausing keeps the device stream
//! open for fast resume; stopping releases every track.

pub mod backend;
pub mod camera;
pub mod fallback;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vouch_model::Token;

use crate::error::{Result, VouchError};
use crate::extract::extract;
use backend::ActiveBackend;
pub use backend::{ContinuousDecoder, FrameDecoder};
pub use camera::{CameraConstraints, CameraDevice, CameraStream, FacingMode, Frame};
pub use fallback::{DEFAULT_READY_GRACE, FallbackLoader};

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Active,
    Paused,
    Released,
}

/// Events surfaced to the session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A frame decoded to a valid token. At most one per activation; the
    /// engine has already paused itself when this arrives.
    TokenDetected(Token),
    /// Nothing detected for a while — advisory only, no state change.
    IdleHint,
}

/// Engine tunables. Defaults match production cadence; tests shrink them.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub constraints: CameraConstraints,
    /// Minimum spacing between detection attempts, bounding decoder load.
    pub sample_interval: Duration,
    /// How long Active may run without a detection before the steady-hint.
    pub idle_hint_after: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            constraints: CameraConstraints::default(),
            sample_interval: Duration::from_millis(66),
            idle_hint_after: Duration::from_secs(10),
        }
    }
}

/// Dual-backend scan engine. Owned by the session driver; not shared.
pub struct ScanEngine {
    camera: Arc<dyn CameraDevice>,
    native: Option<Arc<dyn FrameDecoder>>,
    fallback: Arc<FallbackLoader>,
    options: EngineOptions,
    events: mpsc::Sender<EngineEvent>,
    stream: Option<Arc<dyn CameraStream>>,
    backend: Option<ActiveBackend>,
    phase: EnginePhase,
    loop_cancel: Option<CancellationToken>,
}

impl fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanEngine")
            .field("phase", &self.phase)
            .field("backend", &self.backend.as_ref().map(ActiveBackend::name))
            .field("holds_stream", &self.stream.is_some())
            .finish()
    }
}

impl ScanEngine {
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        native: Option<Arc<dyn FrameDecoder>>,
        fallback: Arc<FallbackLoader>,
        events: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self::with_options(camera, native, fallback, events, EngineOptions::default())
    }

    pub fn with_options(
        camera: Arc<dyn CameraDevice>,
        native: Option<Arc<dyn FrameDecoder>>,
        fallback: Arc<FallbackLoader>,
        events: mpsc::Sender<EngineEvent>,
        options: EngineOptions,
    ) -> Self {
        Self {
            camera,
            native,
            fallback,
            options,
            events,
            stream: None,
            backend: None,
            phase: EnginePhase::Idle,
            loop_cancel: None,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Whether a device stream is currently held (Active or Paused).
    pub fn holds_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Acquire the camera, select a backend, and begin sampling. On any
    /// failure the just-acquired tracks are released before returning.
    pub async fn start(&mut self) -> Result<()> {
        let stream = self.camera.open(self.options.constraints.clone()).await?;
        let backend = match self.select_backend().await {
            Ok(backend) => backend,
            Err(err) => {
                stream.close();
                return Err(err);
            }
        };
        info!(backend = backend.name(), "scan engine started");
        self.stream = Some(Arc::clone(&stream));
        self.backend = Some(backend.clone());
        self.spawn_loop(stream, backend);
        self.phase = EnginePhase::Active;
        Ok(())
    }

    /// Stop sampling but keep the device stream for fast resume. Idempotent.
    pub fn pause(&mut self) {
        if let Some(cancel) = self.loop_cancel.take() {
            cancel.cancel();
        }
        if let Some(stream) = &self.stream {
            stream.pause();
        }
        if self.phase == EnginePhase::Active {
            self.phase = EnginePhase::Paused;
            debug!("scan engine paused");
        }
    }

    /// Restart sampling on the held stream without re-requesting camera
    /// permission; with no stream held this behaves like [`Self::start`].
    pub async fn resume(&mut self) -> Result<()> {
        let (Some(stream), Some(backend)) = (self.stream.clone(), self.backend.clone()) else {
            return self.start().await;
        };
        stream.resume();
        self.spawn_loop(stream, backend);
        self.phase = EnginePhase::Active;
        debug!("scan engine resumed");
        Ok(())
    }

    /// Stop sampling and release the stream and all its tracks. Terminal
    /// for this activation; a new [`Self::start`] is required afterward.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.loop_cancel.take() {
            cancel.cancel();
        }
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
        self.backend = None;
        if self.phase != EnginePhase::Idle {
            self.phase = EnginePhase::Released;
            info!("scan engine stopped");
        }
    }

    /// Decode an uploaded still image through the same backend cascade as
    /// the live path: native first, then the fallback library.
    pub async fn decode_still(&self, bytes: &[u8]) -> Result<Option<String>> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|err| VouchError::Input(format!("undecodable image: {err}")))?;
        let luma = decoded.to_luma8();
        let (width, height) = luma.dimensions();
        let frame = Frame {
            width,
            height,
            luma: luma.into_raw(),
        };

        if let Some(native) = &self.native {
            match native.decode(&frame) {
                Ok(Some(raw)) => return Ok(Some(raw)),
                Ok(None) => {}
                Err(err) => debug!(error = %err, "native still decode failed"),
            }
        }
        let fallback = self.fallback.get().await?;
        fallback.decode(&frame)
    }

    async fn select_backend(&self) -> Result<ActiveBackend> {
        if let Some(native) = &self.native {
            return Ok(ActiveBackend::Sampled(Arc::clone(native)));
        }
        let decoder = self.fallback.get().await?;
        Ok(ActiveBackend::Continuous(decoder))
    }

    fn spawn_loop(&mut self, stream: Arc<dyn CameraStream>, backend: ActiveBackend) {
        let cancel = CancellationToken::new();
        self.loop_cancel = Some(cancel.clone());
        let events = self.events.clone();
        let sample_interval = self.options.sample_interval;
        let idle_hint_after = self.options.idle_hint_after;
        tokio::spawn(async move {
            match backend {
                ActiveBackend::Sampled(decoder) => {
                    sampled_loop(
                        decoder,
                        stream,
                        events,
                        cancel,
                        sample_interval,
                        idle_hint_after,
                    )
                    .await;
                }
                ActiveBackend::Continuous(decoder) => {
                    continuous_loop(decoder, stream, events, cancel, idle_hint_after).await;
                }
            }
        });
    }
}

/// Engine-owned sampling loop for the native detector: one detection
/// attempt per tick, liveness checked every iteration.
async fn sampled_loop(
    decoder: Arc<dyn FrameDecoder>,
    stream: Arc<dyn CameraStream>,
    events: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
    sample_interval: Duration,
    idle_hint_after: Duration,
) {
    let mut ticker = tokio::time::interval(sample_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let hint = tokio::time::sleep(idle_hint_after);
    tokio::pin!(hint);
    let mut hinted = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut hint, if !hinted => {
                hinted = true;
                let _ = events.send(EngineEvent::IdleHint).await;
            }
            _ = ticker.tick() => {
                let Some(frame) = stream.grab() else { continue };
                match decoder.decode(&frame) {
                    Ok(Some(raw)) => {
                        if let Some(token) = extract(&raw) {
                            finish_detection(&stream, &cancel, &events, token).await;
                            break;
                        }
                    }
                    Ok(None) => {}
                    // Per-frame failures are expected noise; keep sampling.
                    Err(err) => debug!(error = %err, "frame decode failed"),
                }
            }
        }
    }
}

/// Consumer side of a continuous backend: the decoder polls the stream at
/// its own cadence and this loop screens its payloads for tokens.
async fn continuous_loop(
    decoder: Arc<dyn ContinuousDecoder>,
    stream: Arc<dyn CameraStream>,
    events: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
    idle_hint_after: Duration,
) {
    let (raw_tx, mut raw_rx) = mpsc::channel::<String>(8);
    let driver = decoder.run(Arc::clone(&stream), raw_tx, cancel.clone());
    tokio::pin!(driver);
    let hint = tokio::time::sleep(idle_hint_after);
    tokio::pin!(hint);
    let mut hinted = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut driver => break,
            _ = &mut hint, if !hinted => {
                hinted = true;
                let _ = events.send(EngineEvent::IdleHint).await;
            }
            maybe_raw = raw_rx.recv() => {
                let Some(raw) = maybe_raw else { break };
                if let Some(token) = extract(&raw) {
                    finish_detection(&stream, &cancel, &events, token).await;
                    break;
                }
            }
        }
    }
}

/// Pause before announcing so in-flight frames cannot trigger a second
/// callback for the same activation.
async fn finish_detection(
    stream: &Arc<dyn CameraStream>,
    cancel: &CancellationToken,
    events: &mpsc::Sender<EngineEvent>,
    token: Token,
) {
    stream.pause();
    cancel.cancel();
    info!(token = %token, "token detected");
    let _ = events.send(EngineEvent::TokenDetected(token)).await;
}
