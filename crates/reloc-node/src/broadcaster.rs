use std::io::Write;

use tokio::sync::mpsc;

use crate::messages::TransformStamped;

/// Errors raised while sending a transform.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    /// The receiving side is gone.
    #[error("Transform channel is closed")]
    Closed,

    /// The receiving side is not keeping up.
    #[error("Transform channel is full")]
    Full,

    /// Failed to write the message.
    #[error("Failed to write transform")]
    Io(#[from] std::io::Error),

    /// Failed to encode the message.
    #[error("Failed to serialize transform")]
    Serialize(#[from] serde_json::Error),
}

/// A sink for the published `map -> odom` transform.
pub trait TransformBroadcaster: Send {
    /// Send one transform.
    fn send(&mut self, transform: &TransformStamped) -> Result<(), BroadcastError>;
}

/// Forwards transforms into a bounded tokio channel without waiting.
pub struct ChannelBroadcaster {
    tx: mpsc::Sender<TransformStamped>,
}

impl ChannelBroadcaster {
    /// Create a broadcaster and the receiver of its messages.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransformStamped>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl TransformBroadcaster for ChannelBroadcaster {
    fn send(&mut self, transform: &TransformStamped) -> Result<(), BroadcastError> {
        self.tx
            .try_send(transform.clone())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => BroadcastError::Full,
                mpsc::error::TrySendError::Closed(_) => BroadcastError::Closed,
            })
    }
}

/// Writes every transform as one JSON object per line.
pub struct JsonLinesBroadcaster<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesBroadcaster<W> {
    /// Create a broadcaster writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consume the broadcaster and return the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TransformBroadcaster for JsonLinesBroadcaster<W> {
    fn send(&mut self, transform: &TransformStamped) -> Result<(), BroadcastError> {
        serde_json::to_writer(&mut self.writer, transform)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
