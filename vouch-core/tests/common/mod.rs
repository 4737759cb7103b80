//! Shared fixtures for the integration tests: scripted camera, decoders,
//! and validator standing in for the platform seams.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;
use vouch_config::WidgetConfig;
use vouch_core::{
    CameraConstraints, CameraDevice, CameraStream, ContinuousDecoder, FallbackLoader, Frame,
    FrameDecoder, Result, TokenValidator, VouchError,
};
use vouch_model::{Token, ValidationOutcome};

/// Opt into log output with `RUST_LOG=debug cargo test`. Safe to call from
/// every test; only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn test_config() -> Arc<WidgetConfig> {
    init_tracing();
    Arc::new(WidgetConfig::new(
        Url::parse("https://hooks.example.test/redeem").expect("url"),
    ))
}

/// Scripted stream: serves queued frames until paused or closed.
pub struct FakeStream {
    frames: Mutex<VecDeque<Frame>>,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl FakeStream {
    pub fn new(frames: Vec<Frame>) -> Arc<Self> {
        Arc::new(Self {
            frames: Mutex::new(frames.into()),
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl CameraStream for FakeStream {
    fn grab(&self) -> Option<Frame> {
        if self.is_paused() || self.is_closed() {
            return None;
        }
        self.frames.lock().expect("frames lock").pop_front()
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Camera that hands out one prepared stream and counts acquisitions.
pub struct FakeCamera {
    stream: Arc<FakeStream>,
    opens: AtomicUsize,
    fail: bool,
}

impl FakeCamera {
    pub fn new(stream: Arc<FakeStream>) -> Arc<Self> {
        Arc::new(Self {
            stream,
            opens: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            stream: FakeStream::new(Vec::new()),
            opens: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(&self, _constraints: CameraConstraints) -> Result<Arc<dyn CameraStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VouchError::Device("permission denied".to_owned()));
        }
        Ok(Arc::clone(&self.stream) as Arc<dyn CameraStream>)
    }
}

/// Frames carrying their payload as UTF-8 bytes, decoded verbatim.
pub fn text_frame(text: &str) -> Frame {
    Frame {
        width: 4,
        height: 4,
        luma: text.as_bytes().to_vec(),
    }
}

pub fn blank_frame() -> Frame {
    Frame {
        width: 4,
        height: 4,
        luma: Vec::new(),
    }
}

/// Sampled decoder reading [`text_frame`] payloads back out.
pub struct TextFrameDecoder;

impl FrameDecoder for TextFrameDecoder {
    fn name(&self) -> &'static str {
        "text"
    }

    fn decode(&self, frame: &Frame) -> Result<Option<String>> {
        if frame.luma.is_empty() {
            return Ok(None);
        }
        match std::str::from_utf8(&frame.luma) {
            Ok(text) => Ok(Some(text.to_owned())),
            Err(_) => Err(VouchError::Input("frame is not text".to_owned())),
        }
    }
}

/// Decoder that reports the same payload for every frame.
pub struct StaticDecoder(pub &'static str);

impl FrameDecoder for StaticDecoder {
    fn name(&self) -> &'static str {
        "static"
    }

    fn decode(&self, _frame: &Frame) -> Result<Option<String>> {
        Ok(Some(self.0.to_owned()))
    }
}

/// Continuous decoder pushing scripted payloads at a fixed cadence, the way
/// the fallback library polls a live stream.
pub struct ScriptedContinuous {
    payloads: Mutex<VecDeque<String>>,
    cadence: Duration,
}

impl ScriptedContinuous {
    pub fn new(payloads: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(payloads.into_iter().map(str::to_owned).collect()),
            cadence: Duration::from_millis(5),
        })
    }
}

impl FrameDecoder for ScriptedContinuous {
    fn name(&self) -> &'static str {
        "scripted-continuous"
    }

    fn decode(&self, _frame: &Frame) -> Result<Option<String>> {
        Ok(self.payloads.lock().expect("payloads lock").pop_front())
    }
}

#[async_trait]
impl ContinuousDecoder for ScriptedContinuous {
    async fn run(
        &self,
        _stream: Arc<dyn CameraStream>,
        sink: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.cadence) => {
                    let next = self.payloads.lock().expect("payloads lock").pop_front();
                    if let Some(payload) = next
                        && sink.send(payload).await.is_err()
                    {
                        break;
                    }
                }
            }
        }
    }
}

/// Loader whose factory resolves to the given decoder.
pub fn ready_fallback(decoder: Arc<dyn ContinuousDecoder>) -> Arc<FallbackLoader> {
    Arc::new(FallbackLoader::new(Box::new(move || {
        let decoder = Arc::clone(&decoder);
        Box::pin(async move { Ok(decoder) })
    })))
}

/// Loader whose factory always fails, for paths that must not need it.
pub fn unavailable_fallback() -> Arc<FallbackLoader> {
    Arc::new(FallbackLoader::new(Box::new(|| {
        Box::pin(async { Err(VouchError::Decoder("library load failed".to_owned())) })
    })))
}

/// Validator serving scripted outcomes, optionally after a delay.
pub struct ScriptedValidator {
    outcomes: Mutex<VecDeque<ValidationOutcome>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedValidator {
    pub fn new(outcomes: Vec<ValidationOutcome>) -> Arc<Self> {
        Self::with_delay(outcomes, Duration::ZERO)
    }

    pub fn with_delay(outcomes: Vec<ValidationOutcome>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenValidator for ScriptedValidator {
    async fn validate(&self, _token: Token) -> ValidationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcomes
            .lock()
            .expect("outcomes lock")
            .pop_front()
            .unwrap_or(ValidationOutcome::Malformed)
    }
}

/// Valid one-color PNG for upload-path tests.
pub fn png_bytes() -> Vec<u8> {
    let gray = image::GrayImage::from_pixel(8, 8, image::Luma([128u8]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma8(gray)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encode");
    out.into_inner()
}
