//! SDR stream scope: consumes a live SDR feed over one WebSocket connection,
//! plays the audio stream, and keeps a scrolling waterfall of the spectrum.

mod error;
mod pcm;
mod playback;
mod protocol;
mod session;
mod transport;
mod waterfall;

use anyhow::Result;
use clap::Parser;
use session::{SessionConfig, SessionController, SessionEvent};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

/// SDR stream client: waterfall + live audio playback.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket endpoint of the SDR stream
    #[arg(long, default_value = "ws://127.0.0.1:8000/ws/stream")]
    endpoint: String,

    /// Waterfall width in pixels
    #[arg(long, default_value_t = 1024)]
    width: usize,

    /// Waterfall height (rows of history)
    #[arg(long, default_value_t = 256)]
    height: usize,

    /// Playback queue bound in chunks; oldest chunks are dropped on overflow
    #[arg(long, default_value_t = 64)]
    queue_chunks: usize,

    /// Output volume, 0.0..=1.0
    #[arg(long, default_value_t = 1.0)]
    volume: f64,

    /// Start with audio muted
    #[arg(long)]
    muted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let session = Arc::new(SessionController::new(SessionConfig {
        waterfall_width: args.width,
        waterfall_height: args.height,
        queue_chunks: args.queue_chunks,
        volume: args.volume,
    }));

    session.gain().set_muted(args.muted);

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    session.set_event_sender(event_tx);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SessionEvent::Status(text) => info!(%text, "status"),
                SessionEvent::StateChanged(state) => info!(?state, "connection state"),
            }
        }
    });

    let playback_stop =
        playback::spawn_output_thread(session.queue(), session.gain(), session.output_running());

    info!(endpoint = %args.endpoint, "starting stream session");
    let handle = transport::StreamHandle::spawn(args.endpoint, session.clone());

    tokio::signal::ctrl_c().await?;
    let metrics = session.metrics();
    info!(
        dropped_chunks = session.queue().dropped_chunks(),
        spectra = session.with_waterfall(|wf| wf.rows_pushed()),
        noise_floor = %metrics.noise_floor_text(),
        signal_peak = %metrics.signal_peak_text(),
        bandwidth = %metrics.bandwidth_text(),
        last_status = session.last_status().as_deref().unwrap_or("-"),
        "shutting down"
    );
    handle.stop().await?;
    session.output_running().store(false, Ordering::SeqCst);
    let _ = playback_stop.send(());
    Ok(())
}
