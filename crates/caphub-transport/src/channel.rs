//! Push channel — the write half of a session's listen connection.
//!
//! One channel per listen connection. Every frame goes through a single
//! unbounded queue, so events written to a channel reach the client in the
//! order they were sent. `close` queues an end-of-stream marker behind any
//! pending events.

use std::sync::atomic::{AtomicU64, Ordering};

use caphub_protocol::PushEvent;
use thiserror::Error;
use tokio::sync::mpsc;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to serialize push event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("push connection is closed")]
    Closed,
}

#[derive(Debug)]
enum Frame {
    Line(String),
    Close,
}

/// Sending handle for one listen connection.
#[derive(Debug, Clone)]
pub struct PushChannel {
    id: u64,
    tx: mpsc::UnboundedSender<Frame>,
}

impl PushChannel {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Serialize and queue one event.
    pub fn send(&self, event: &PushEvent) -> Result<(), ChannelError> {
        let line = event.to_line()?;
        self.tx.send(Frame::Line(line)).map_err(|_| ChannelError::Closed)
    }

    /// End the connection after everything already queued.
    pub fn close(&self) {
        let _ = self.tx.send(Frame::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, owned by the HTTP response body.
///
/// The optional close hook runs exactly once, when the receiver is dropped:
/// after an explicit close, after every sender is gone, or when the client
/// disconnects and the response body is discarded.
pub struct PushReceiver {
    id: u64,
    rx: mpsc::UnboundedReceiver<Frame>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl PushReceiver {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn on_close(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Next serialized event line, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<String> {
        match self.rx.recv().await {
            Some(Frame::Line(line)) => Some(line),
            Some(Frame::Close) | None => {
                self.rx.close();
                None
            }
        }
    }
}

impl Drop for PushReceiver {
    fn drop(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

/// Create a connected channel pair.
pub fn push_channel() -> (PushChannel, PushReceiver) {
    let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::unbounded_channel();
    (
        PushChannel { id, tx },
        PushReceiver {
            id,
            rx,
            on_close: None,
        },
    )
}
