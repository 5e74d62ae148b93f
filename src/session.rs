//! Session lifecycle and inbound frame routing.
//!
//! One controller per stream session. The network task feeds every inbound
//! frame through [`SessionController::handle_frame`]; control messages update
//! the waterfall and metrics, audio payloads are decoded and queued for the
//! audio-clock domain. Rendering and control handling stay on the network
//! domain, never on the audio callback.

use crate::pcm;
use crate::playback::PlaybackQueue;
use crate::protocol::{classify, ControlMessage, InboundFrame, WireFrame};
use crate::waterfall::WaterfallBuffer;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender as EventSender;
use tracing::{debug, info, warn};

/// Connection lifecycle of one stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Events surfaced to the host layer (status line, state changes).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    Status(String),
}

// Minimal f64 atomic wrapper (stable AtomicF64 not yet available everywhere)
#[derive(Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

/// Output volume plus mute, read by the audio callback.
pub struct OutputGain {
    volume: AtomicF64,
    muted: AtomicBool,
}

impl OutputGain {
    pub fn new(volume: f64) -> Self {
        Self {
            volume: AtomicF64::new(volume),
            muted: AtomicBool::new(false),
        }
    }

    pub fn set_volume(&self, volume: f64) {
        self.volume.store(volume.clamp(0.0, 1.0));
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Gain applied per sample; zero while muted.
    pub fn effective(&self) -> f32 {
        if self.muted() {
            0.0
        } else {
            self.volume.load() as f32
        }
    }
}

/// Metrics from the most recent spectrum update.
pub struct SpectrumMetrics {
    noise_floor: AtomicF64,
    signal_peak: AtomicF64,
    bandwidth: AtomicF64,
    updates: AtomicU64,
}

impl SpectrumMetrics {
    fn new() -> Self {
        Self {
            noise_floor: AtomicF64::new(0.0),
            signal_peak: AtomicF64::new(0.0),
            bandwidth: AtomicF64::new(0.0),
            updates: AtomicU64::new(0),
        }
    }

    pub fn noise_floor_db(&self) -> f64 {
        self.noise_floor.load()
    }

    pub fn signal_peak_db(&self) -> f64 {
        self.signal_peak.load()
    }

    pub fn bandwidth_hz(&self) -> f64 {
        self.bandwidth.load()
    }

    /// Spectrum updates applied so far.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn noise_floor_text(&self) -> String {
        format!("{:.1} dB", self.noise_floor.load())
    }

    pub fn signal_peak_text(&self) -> String {
        format!("{:.1} dB", self.signal_peak.load())
    }

    pub fn bandwidth_text(&self) -> String {
        format!("{} Hz", self.bandwidth.load().round() as i64)
    }
}

/// Construction parameters for a session.
pub struct SessionConfig {
    pub waterfall_width: usize,
    pub waterfall_height: usize,
    pub queue_chunks: usize,
    pub volume: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            waterfall_width: 1024,
            waterfall_height: 256,
            queue_chunks: 64,
            volume: 1.0,
        }
    }
}

/// Owns the per-session state and routes inbound frames.
pub struct SessionController {
    state: Mutex<ConnectionState>,
    queue: Arc<PlaybackQueue>,
    waterfall: Mutex<WaterfallBuffer>,
    metrics: SpectrumMetrics,
    gain: Arc<OutputGain>,
    last_status: Mutex<Option<String>>,
    output_running: Arc<AtomicBool>,
    events: Mutex<Option<EventSender<SessionEvent>>>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Idle),
            queue: Arc::new(PlaybackQueue::new(config.queue_chunks)),
            waterfall: Mutex::new(WaterfallBuffer::new(
                config.waterfall_width,
                config.waterfall_height,
            )),
            metrics: SpectrumMetrics::new(),
            gain: Arc::new(OutputGain::new(config.volume)),
            last_status: Mutex::new(None),
            output_running: Arc::new(AtomicBool::new(true)),
            events: Mutex::new(None),
        }
    }

    /// Register the event channel used to notify the host layer.
    pub fn set_event_sender(&self, sender: EventSender<SessionEvent>) {
        *self.events.lock() = Some(sender);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn queue(&self) -> Arc<PlaybackQueue> {
        self.queue.clone()
    }

    pub fn gain(&self) -> Arc<OutputGain> {
        self.gain.clone()
    }

    pub fn metrics(&self) -> &SpectrumMetrics {
        &self.metrics
    }

    pub fn output_running(&self) -> Arc<AtomicBool> {
        self.output_running.clone()
    }

    /// Most recent status line from the server, if any.
    pub fn last_status(&self) -> Option<String> {
        self.last_status.lock().clone()
    }

    /// Run `f` against the current waterfall contents.
    pub fn with_waterfall<R>(&self, f: impl FnOnce(&WaterfallBuffer) -> R) -> R {
        f(&self.waterfall.lock())
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// `Idle`/`Closed` → `Connecting`. Returns false if a connection is
    /// already in progress; two connections never run concurrently.
    pub fn begin_connect(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Idle | ConnectionState::Closed => {
                *state = ConnectionState::Connecting;
                drop(state);
                info!("session connecting");
                self.emit(SessionEvent::StateChanged(ConnectionState::Connecting));
                true
            }
            current => {
                warn!(?current, "start requested while session active");
                false
            }
        }
    }

    /// `Connecting` → `Open`. Clears the playback queue so audio buffered
    /// before the transition is never played.
    pub fn mark_open(&self) {
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Connecting {
                warn!(current = ?*state, "transport ready in unexpected state");
                return;
            }
            *state = ConnectionState::Open;
        }
        self.queue.clear();
        info!("session open");
        self.emit(SessionEvent::StateChanged(ConnectionState::Open));
    }

    /// Any active state → `Closed`: explicit stop, transport error, or remote
    /// close. Drains the playback queue; the waterfall keeps its last frame.
    pub fn mark_closed(&self, reason: &str) {
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }
        self.queue.clear();
        info!(reason, "session closed");
        self.emit(SessionEvent::StateChanged(ConnectionState::Closed));
        self.emit(SessionEvent::Status(format!("Stream stopped: {reason}")));
    }

    /// Route one inbound frame. All failure modes degrade locally; nothing
    /// raised here closes the connection.
    pub fn handle_frame(&self, frame: WireFrame) {
        if self.state() != ConnectionState::Open {
            debug!("dropping frame outside open state");
            return;
        }
        match classify(frame) {
            Some(InboundFrame::Control(msg)) => self.apply_control(msg),
            Some(InboundFrame::Audio(payload)) => match pcm::decode_i16_le(&payload) {
                Ok(chunk) => self.queue.push(chunk),
                Err(err) => warn!(%err, "dropping malformed audio frame"),
            },
            None => {}
        }
    }

    fn apply_control(&self, msg: ControlMessage) {
        match msg {
            ControlMessage::SpectrumUpdate {
                bins,
                noise_floor,
                signal_peak,
                bandwidth,
            } => {
                self.waterfall.lock().push_row(&bins);
                self.metrics.noise_floor.store(noise_floor);
                self.metrics.signal_peak.store(signal_peak);
                self.metrics.bandwidth.store(bandwidth);
                self.metrics.updates.fetch_add(1, Ordering::Relaxed);
            }
            ControlMessage::StatusUpdate { message } => {
                debug!(%message, "status update");
                *self.last_status.lock() = Some(message.clone());
                self.emit(SessionEvent::Status(message));
            }
        }
    }
}
