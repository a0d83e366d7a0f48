use std::error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::openflow::Message;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Outbound message queue for a single switch connection
///
/// Cloned freely by handlers; the connection task drains the queue and writes
/// each message to the switch with a fresh transaction id. Every connection
/// gets a distinct `id`, so a switch that reconnects can be told apart from
/// its previous connection.
#[derive(Clone, Debug)]
pub struct Channel {
    id: u64,
    tx: mpsc::UnboundedSender<Message>,
}

impl Channel {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, tx }, rx)
    }

    /// Identifies the connection this channel writes to
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a message for the switch, fails if the connection has ended
    pub fn send(&self, message: Message) -> Result<(), SendError> {
        let message_type = message.message_type();
        self.tx.send(message).map_err(|_| SendError(message_type))
    }
}

/// A message couldn't be queued because the switch connection is gone
#[derive(Debug, PartialEq)]
pub struct SendError(pub &'static str);

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Unable to send {}: connection closed", self.0)
    }
}

impl error::Error for SendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_close() {
        let (channel, mut rx) = Channel::new();
        channel.send(Message::FeaturesRequest).unwrap();
        assert_eq!(rx.recv().await, Some(Message::FeaturesRequest));

        drop(rx);
        let err = channel.send(Message::FeaturesRequest).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to send FEATURES_REQUEST: connection closed"
        );
    }

    #[test]
    fn test_distinct_ids() {
        let (first, _rx1) = Channel::new();
        let (second, _rx2) = Channel::new();
        assert_ne!(first.id(), second.id());
        assert_eq!(first.clone().id(), first.id());
    }
}
