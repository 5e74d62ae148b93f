//! WebSocket transport: connects to the stream endpoint and pumps every
//! inbound frame into the session.
//!
//! One connection per session, no automatic reconnect: a failed or closed
//! connection transitions the session to `Closed` and restarting is left to
//! the operator.

use crate::error::StreamError;
use crate::protocol::WireFrame;
use crate::session::SessionController;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Map a websocket message to a protocol frame. Control frames (ping/pong,
/// close) are handled by the socket layer and carry no stream payload.
fn to_wire(msg: Message) -> Option<WireFrame> {
    match msg {
        Message::Text(text) => Some(WireFrame::Text(text)),
        Message::Binary(bytes) => Some(WireFrame::Binary(bytes)),
        _ => None,
    }
}

/// Connect and consume the stream until the server closes, the transport
/// fails, or `stop` fires.
pub async fn run_stream(
    endpoint: &str,
    session: &SessionController,
    mut stop: oneshot::Receiver<()>,
) -> Result<(), StreamError> {
    if !session.begin_connect() {
        return Ok(());
    }
    let (ws, _response) = match connect_async(endpoint).await {
        Ok(conn) => conn,
        Err(err) => {
            session.mark_closed("connect failed");
            return Err(StreamError::Connect(err));
        }
    };
    info!(endpoint, "stream connected");
    session.mark_open();

    let (_write, mut read) = ws.split();
    loop {
        tokio::select! {
            _ = &mut stop => {
                session.mark_closed("stopped");
                return Ok(());
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "server sent close");
                    session.mark_closed("remote close");
                    return Ok(());
                }
                Some(Ok(msg)) => {
                    if let Some(frame) = to_wire(msg) {
                        session.handle_frame(frame);
                    }
                }
                Some(Err(err)) => {
                    warn!(%err, "transport error");
                    session.mark_closed("transport error");
                    return Err(StreamError::Transport(err));
                }
                None => {
                    session.mark_closed("stream ended");
                    return Ok(());
                }
            }
        }
    }
}

/// A running stream task plus its stop signal.
pub struct StreamHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), StreamError>>,
}

impl StreamHandle {
    /// Spawn the stream consumer for `endpoint`.
    pub fn spawn(endpoint: String, session: Arc<SessionController>) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move { run_stream(&endpoint, &session, stop_rx).await });
        Self {
            stop_tx: Some(stop_tx),
            task,
        }
    }

    /// Request shutdown and wait for the task to finish.
    pub async fn stop(mut self) -> Result<(), StreamError> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => {
                warn!(%err, "stream task panicked or was cancelled");
                Ok(())
            }
        }
    }
}
