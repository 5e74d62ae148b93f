//! Playback queue and audio sink adapter.
//!
//! The queue is the only state shared between the network domain (producer)
//! and the audio-clock domain (consumer). The cpal callback drains it with a
//! short bounded critical section and must never block or error; running dry
//! plays silence.

use crate::session::OutputGain;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender as CbSender;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bounded FIFO of decoded audio chunks.
///
/// Single producer (the PCM decode path), single consumer (the audio sink
/// callback). Overflow drops the oldest chunks and counts them, so a stalled
/// audio device cannot grow the buffer without bound.
pub struct PlaybackQueue {
    chunks: Mutex<VecDeque<Vec<f32>>>,
    max_chunks: usize,
    dropped: AtomicU64,
}

impl PlaybackQueue {
    pub fn new(max_chunks: usize) -> Self {
        assert!(max_chunks > 0, "queue bound must be non-zero");
        Self {
            chunks: Mutex::new(VecDeque::with_capacity(max_chunks)),
            max_chunks,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append one chunk, evicting from the head if the bound is exceeded.
    pub fn push(&self, chunk: Vec<f32>) {
        let mut q = self.chunks.lock();
        q.push_back(chunk);
        while q.len() > self.max_chunks {
            q.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Discard all buffered audio.
    pub fn clear(&self) {
        self.chunks.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    /// Chunks evicted by the overflow policy since construction.
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Fill `out` with queued samples, whole chunks only, silence-padded.
    ///
    /// Chunks are never split across pulls: a chunk that does not fit in the
    /// remaining space stays queued, except that a chunk longer than the
    /// entire buffer is truncated to it (it could never be played otherwise).
    /// An empty queue yields a buffer of silence.
    pub fn fill(&self, out: &mut [f32]) {
        out.fill(0.0);
        let mut q = self.chunks.lock();
        let mut pos = 0;
        while pos < out.len() {
            let front_len = match q.front() {
                Some(chunk) => chunk.len(),
                None => break,
            };
            if front_len <= out.len() - pos {
                if let Some(chunk) = q.pop_front() {
                    out[pos..pos + chunk.len()].copy_from_slice(&chunk);
                    pos += chunk.len();
                }
            } else {
                if pos == 0 {
                    if let Some(chunk) = q.pop_front() {
                        out.copy_from_slice(&chunk[..out.len()]);
                    }
                }
                break;
            }
        }
    }
}

/// Spawn the audio output thread; returns a stop sender.
///
/// Owns the cpal stream for its whole lifetime (cpal streams are not Send).
/// The device callback pulls mono samples from the queue at the device clock
/// rate, applies the output gain, and fans the result out to every channel.
pub fn spawn_output_thread(
    queue: Arc<PlaybackQueue>,
    gain: Arc<OutputGain>,
    running: Arc<AtomicBool>,
) -> CbSender<()> {
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    thread::spawn(move || {
        let host = cpal::default_host();
        let device = match host.default_output_device() {
            Some(d) => d,
            None => {
                error!("no audio output device found");
                return;
            }
        };
        let cfg = match device.default_output_config() {
            Ok(c) => c,
            Err(err) => {
                error!(%err, "failed to query output config");
                return;
            }
        };
        if cfg.sample_format() != cpal::SampleFormat::F32 {
            warn!(format = ?cfg.sample_format(), "unsupported output sample format");
            return;
        }
        let config: cpal::StreamConfig = cfg.into();
        let out_channels = config.channels.max(1) as usize;
        info!(
            sample_rate = config.sample_rate.0,
            channels = out_channels,
            "output stream starting"
        );

        let running_cb = running.clone();
        let mut mono: Vec<f32> = Vec::new();
        let build_res = device.build_output_stream(
            &config,
            move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !running_cb.load(Ordering::Relaxed) {
                    out.fill(0.0);
                    return;
                }
                let frames = out.len() / out_channels;
                mono.resize(frames, 0.0);
                queue.fill(&mut mono);
                let g = gain.effective();
                for (frame_index, sample) in mono.iter().enumerate() {
                    let scaled = sample * g;
                    for ch in 0..out_channels {
                        out[frame_index * out_channels + ch] = scaled;
                    }
                }
                out[frames * out_channels..].fill(0.0);
            },
            move |err| error!(%err, "output stream error"),
            None,
        );
        let stream = match build_res {
            Ok(s) => s,
            Err(err) => {
                error!(%err, "failed to build output stream");
                return;
            }
        };
        if let Err(err) = stream.play() {
            error!(%err, "failed to start playback");
            return;
        }
        loop {
            if !running.load(Ordering::Relaxed) {
                break;
            }
            if stop_rx.recv_timeout(Duration::from_millis(200)).is_ok() {
                break;
            }
        }
        if let Err(err) = stream.pause() {
            warn!(%err, "pause failed on shutdown");
        }
        debug!("output thread exit");
    });
    stop_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_queue_fills_with_silence() {
        let queue = PlaybackQueue::new(8);
        for size in [1usize, 7, 4096] {
            let mut out = vec![1.0f32; size];
            queue.fill(&mut out);
            assert!(out.iter().all(|&s| s == 0.0), "size {size}");
        }
    }

    #[test]
    fn chunks_drain_in_fifo_order_with_silence_tail() {
        let queue = PlaybackQueue::new(8);
        queue.push(vec![0.1; 1000]);
        queue.push(vec![0.2; 1000]);
        let mut out = vec![9.9f32; 4096];
        queue.fill(&mut out);
        assert!(out[..1000].iter().all(|&s| s == 0.1));
        assert!(out[1000..2000].iter().all(|&s| s == 0.2));
        assert!(out[2000..].iter().all(|&s| s == 0.0));
        assert!(queue.is_empty());
    }

    #[test]
    fn chunk_that_does_not_fit_stays_queued() {
        let queue = PlaybackQueue::new(8);
        queue.push(vec![0.1; 3000]);
        queue.push(vec![0.2; 3000]);
        let mut out = vec![0.0f32; 4096];
        queue.fill(&mut out);
        assert!(out[..3000].iter().all(|&s| s == 0.1));
        assert!(out[3000..].iter().all(|&s| s == 0.0));
        assert_eq!(queue.len(), 1);
        // Next pull picks up the held-back chunk.
        queue.fill(&mut out);
        assert!(out[..3000].iter().all(|&s| s == 0.2));
        assert!(queue.is_empty());
    }

    #[test]
    fn oversized_chunk_is_truncated_to_buffer() {
        let queue = PlaybackQueue::new(8);
        let mut big = vec![0.5f32; 600];
        big[512..].fill(0.7);
        queue.push(big);
        let mut out = vec![0.0f32; 512];
        queue.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0.5));
        assert!(queue.is_empty());
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let queue = PlaybackQueue::new(2);
        queue.push(vec![0.1; 4]);
        queue.push(vec![0.2; 4]);
        queue.push(vec![0.3; 4]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_chunks(), 1);
        let mut out = vec![0.0f32; 8];
        queue.fill(&mut out);
        // The oldest chunk was evicted, playback resumes from the second.
        assert!(out[..4].iter().all(|&s| s == 0.2));
        assert!(out[4..].iter().all(|&s| s == 0.3));
    }

    #[test]
    fn clear_discards_everything() {
        let queue = PlaybackQueue::new(4);
        queue.push(vec![0.1; 16]);
        queue.push(vec![0.2; 16]);
        queue.clear();
        assert!(queue.is_empty());
        let mut out = vec![1.0f32; 32];
        queue.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
