//! Session controller: finite-state orchestrator driving the scan engine
//! and the validation client.
//!
//! The public handle owns a command mailbox and a watch-broadcast state;
//! an internal driver task selects over commands, engine events, and
//! validation settlements. Exactly one validation call may be outstanding
//! per session, gated by the `Validating` state; a per-attempt generation
//! counter discards settlements that arrive after a cancel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;
use vouch_config::WidgetConfig;
use vouch_model::{SessionState, Token, ValidationOutcome};

use crate::client::TokenValidator;
use crate::engine::{
    CameraDevice, EngineEvent, EngineOptions, FallbackLoader, FrameDecoder, ScanEngine,
};
use crate::extract::extract;

#[derive(Debug)]
enum SessionCommand {
    Start,
    SubmitManual(String),
    SubmitUpload(Vec<u8>),
    ScanAnother,
    OpenManual,
    Stop,
    Cancel,
}

/// Handle to a running widget session. Cheap to clone; dropping every
/// handle shuts the driver down and releases the camera.
#[derive(Debug, Clone)]
pub struct SessionController {
    commands: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<SessionState>,
    hint_rx: watch::Receiver<Option<String>>,
}

impl SessionController {
    /// Spawn a session with default engine tunables.
    pub fn spawn(
        config: Arc<WidgetConfig>,
        camera: Arc<dyn CameraDevice>,
        native: Option<Arc<dyn FrameDecoder>>,
        fallback: Arc<FallbackLoader>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        Self::spawn_with_options(
            config,
            camera,
            native,
            fallback,
            validator,
            EngineOptions::default(),
        )
    }

    pub fn spawn_with_options(
        config: Arc<WidgetConfig>,
        camera: Arc<dyn CameraDevice>,
        native: Option<Arc<dyn FrameDecoder>>,
        fallback: Arc<FallbackLoader>,
        validator: Arc<dyn TokenValidator>,
        options: EngineOptions,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (engine_tx, engine_rx) = mpsc::channel(16);
        let (settle_tx, settle_rx) = mpsc::channel(4);
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let (hint_tx, hint_rx) = watch::channel(None);

        let engine = ScanEngine::with_options(camera, native, fallback, engine_tx, options);
        let session_id = Uuid::new_v4();
        let driver = SessionDriver {
            config,
            engine,
            validator,
            state_tx,
            hint_tx,
            engine_events: engine_rx,
            settlements: settle_rx,
            settle_tx,
            generation: 0,
            attempt_cancel: None,
        };
        tokio::spawn(
            driver
                .run(commands_rx)
                .instrument(info_span!("session", id = %session_id)),
        );

        Self {
            commands: commands_tx,
            state_rx,
            hint_rx,
        }
    }

    /// Subscribe to session state. The receiver always holds the latest
    /// state; the view layer renders from it.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn current_state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Advisory hints (steady the code / use upload). Cleared on every
    /// state transition.
    pub fn hints(&self) -> watch::Receiver<Option<String>> {
        self.hint_rx.clone()
    }

    /// Begin camera scanning from idle.
    pub async fn start(&self) {
        self.send(SessionCommand::Start).await;
    }

    /// Submit manually typed text. Same extraction contract as the camera.
    pub async fn submit_manual(&self, input: impl Into<String>) {
        self.send(SessionCommand::SubmitManual(input.into())).await;
    }

    /// Submit an uploaded PNG/JPEG image to decode.
    pub async fn submit_upload(&self, bytes: Vec<u8>) {
        self.send(SessionCommand::SubmitUpload(bytes)).await;
    }

    /// Resume scanning after a terminal display state.
    pub async fn scan_another(&self) {
        self.send(SessionCommand::ScanAnother).await;
    }

    /// Programmatically open the manual-entry surface.
    pub async fn open_manual(&self) {
        self.send(SessionCommand::OpenManual).await;
    }

    /// Stop scanning and release the camera.
    pub async fn stop(&self) {
        self.send(SessionCommand::Stop).await;
    }

    /// Abandon an in-flight validation.
    pub async fn cancel(&self) {
        self.send(SessionCommand::Cancel).await;
    }

    async fn send(&self, command: SessionCommand) {
        if self.commands.send(command).await.is_err() {
            warn!("session driver is gone; command dropped");
        }
    }
}

struct SessionDriver {
    config: Arc<WidgetConfig>,
    engine: ScanEngine,
    validator: Arc<dyn TokenValidator>,
    state_tx: watch::Sender<SessionState>,
    hint_tx: watch::Sender<Option<String>>,
    engine_events: mpsc::Receiver<EngineEvent>,
    settlements: mpsc::Receiver<(u64, ValidationOutcome)>,
    settle_tx: mpsc::Sender<(u64, ValidationOutcome)>,
    /// Bumped on every new attempt and on cancel; settlements carrying an
    /// older generation are stale and dropped.
    generation: u64,
    attempt_cancel: Option<CancellationToken>,
}

impl SessionDriver {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        loop {
            tokio::select! {
                maybe_command = commands.recv() => {
                    let Some(command) = maybe_command else { break };
                    self.handle_command(command).await;
                }
                Some(event) = self.engine_events.recv() => {
                    self.handle_engine_event(event).await;
                }
                Some((generation, outcome)) = self.settlements.recv() => {
                    self.handle_settlement(generation, outcome);
                }
            }
        }
        // Every handle is gone; do not leave the camera open.
        self.engine.stop();
    }

    fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&mut self, next: SessionState) {
        self.hint_tx.send_replace(None);
        info!(state = next.label(), "session transition");
        self.state_tx.send_replace(next);
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => self.start_scanning().await,
            SessionCommand::SubmitManual(input) => self.submit_text(&input).await,
            SessionCommand::SubmitUpload(bytes) => self.submit_upload(bytes).await,
            SessionCommand::ScanAnother => self.scan_another().await,
            SessionCommand::OpenManual => self.open_manual(),
            SessionCommand::Stop => self.stop(),
            SessionCommand::Cancel => self.cancel(),
        }
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::TokenDetected(token) => {
                if self.state() != SessionState::Scanning {
                    debug!("detection ignored outside scanning");
                    return;
                }
                // The loop already paused itself; sync the engine phase.
                self.engine.pause();
                self.begin_validation(token);
            }
            EngineEvent::IdleHint => {
                if self.state() == SessionState::Scanning {
                    self.hint_tx
                        .send_replace(Some("Try steadying the code or use Upload".to_owned()));
                }
            }
        }
    }

    async fn start_scanning(&mut self) {
        if !matches!(self.state(), SessionState::Idle { .. }) {
            debug!("start ignored outside idle");
            return;
        }
        match self.engine.start().await {
            Ok(()) => self.set_state(SessionState::Scanning),
            Err(err) => {
                warn!(error = %err, "camera acquisition failed; offering fallback entry");
                self.set_state(SessionState::Idle {
                    offer_fallback: true,
                });
            }
        }
    }

    async fn submit_text(&mut self, input: &str) {
        if self.state().is_validating() {
            debug!("manual entry ignored while validating");
            return;
        }
        self.engine.pause();
        match extract(input) {
            Some(token) => self.begin_validation(token),
            None => self.set_state(SessionState::Error {
                message: "Invalid token".to_owned(),
            }),
        }
    }

    async fn submit_upload(&mut self, bytes: Vec<u8>) {
        if self.state().is_validating() {
            debug!("upload ignored while validating");
            return;
        }
        if !self.config.allow_upload_fallback {
            warn!("upload submitted while the fallback is disabled");
            self.set_state(SessionState::Error {
                message: "Upload unavailable".to_owned(),
            });
            return;
        }
        self.engine.pause();
        match self.engine.decode_still(&bytes).await {
            Ok(Some(raw)) => match extract(&raw) {
                Some(token) => self.begin_validation(token),
                None => self.set_state(SessionState::Error {
                    message: "No code found in image".to_owned(),
                }),
            },
            Ok(None) => self.set_state(SessionState::Error {
                message: "No code found in image".to_owned(),
            }),
            Err(err) => {
                warn!(error = %err, "upload decode failed");
                self.set_state(SessionState::Error {
                    message: "Could not decode image".to_owned(),
                });
            }
        }
    }

    async fn scan_another(&mut self) {
        if !matches!(
            self.state(),
            SessionState::Confirmed(_) | SessionState::Denied { .. } | SessionState::Error { .. }
        ) {
            debug!("scan-another ignored outside a terminal display state");
            return;
        }
        // Resume keeps the held stream; no new permission prompt.
        match self.engine.resume().await {
            Ok(()) => self.set_state(SessionState::Scanning),
            Err(err) => {
                warn!(error = %err, "resume failed; offering fallback entry");
                self.set_state(SessionState::Idle {
                    offer_fallback: true,
                });
            }
        }
    }

    fn open_manual(&mut self) {
        self.invalidate_attempt();
        self.engine.pause();
        self.set_state(SessionState::Idle {
            offer_fallback: true,
        });
    }

    fn stop(&mut self) {
        self.invalidate_attempt();
        self.engine.stop();
        self.set_state(SessionState::Idle {
            offer_fallback: false,
        });
    }

    fn cancel(&mut self) {
        if !self.state().is_validating() {
            debug!("cancel ignored outside validating");
            return;
        }
        self.invalidate_attempt();
        self.engine.stop();
        self.set_state(SessionState::Idle {
            offer_fallback: false,
        });
    }

    /// Abort the current attempt (if any) and make every settlement issued
    /// under it stale.
    fn invalidate_attempt(&mut self) {
        if let Some(cancel) = self.attempt_cancel.take() {
            cancel.cancel();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    fn begin_validation(&mut self, token: Token) {
        self.invalidate_attempt();
        let generation = self.generation;
        let cancel = CancellationToken::new();
        self.attempt_cancel = Some(cancel.clone());
        self.set_state(SessionState::Validating);

        let validator = Arc::clone(&self.validator);
        let settle = self.settle_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                // Dropping the call on cancel releases the connection; the
                // generation check on arrival is the correctness gate.
                _ = cancel.cancelled() => {}
                outcome = validator.validate(token) => {
                    let _ = settle.send((generation, outcome)).await;
                }
            }
        });
    }

    fn handle_settlement(&mut self, generation: u64, outcome: ValidationOutcome) {
        if generation != self.generation || !self.state().is_validating() {
            debug!("stale validation settlement discarded");
            return;
        }
        self.attempt_cancel = None;
        match outcome {
            ValidationOutcome::Confirmed(response) => {
                self.set_state(SessionState::Confirmed(response));
            }
            ValidationOutcome::Denied { reason } => {
                self.set_state(SessionState::Denied { reason });
            }
            ValidationOutcome::Malformed => self.set_state(SessionState::Error {
                message: "Unexpected response".to_owned(),
            }),
            ValidationOutcome::NetworkFailure(detail) => {
                self.set_state(SessionState::Error { message: detail });
            }
        }
    }
}
