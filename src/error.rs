//! Crate error types.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Binary payload whose length is not a multiple of the i16 sample size.
    #[error("odd PCM payload length: {0} bytes")]
    OddPcmLength(usize),
    #[error("websocket connect failed: {0}")]
    Connect(tungstenite::Error),
    #[error("websocket transport error: {0}")]
    Transport(tungstenite::Error),
}
