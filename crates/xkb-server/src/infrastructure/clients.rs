//! Channel-backed client connections.
//!
//! The dispatcher must never block, so each client gets an unbounded Tokio
//! channel.  [`ChannelConnection`] is the sending half handed to the
//! dispatcher; the receiving half belongs to the task that writes the bytes
//! to the client's socket.
//!
//! When that task exits the channel closes and every further write fails
//! with [`DispatchError::Disconnected`].

use tokio::sync::mpsc;
use xkb_core::{changes::ClientId, protocol::codec::EventBytes};

use crate::application::dispatch_notifications::{ClientConnection, DispatchError};

/// Receiving half of a client's event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<EventBytes>;

/// Outbound event queue for one client.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    client: ClientId,
    sender: mpsc::UnboundedSender<EventBytes>,
}

impl ChannelConnection {
    /// Creates a connection and the receiver its writer task drains.
    pub fn new(client: ClientId) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { client, sender }, receiver)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl ClientConnection for ChannelConnection {
    fn write_event(&self, event: &EventBytes) -> Result<(), DispatchError> {
        self.sender
            .send(*event)
            .map_err(|_| DispatchError::Disconnected(self.client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_event_reaches_receiver() {
        // Arrange
        let (conn, mut rx) = ChannelConnection::new(ClientId(4));
        let mut event = [0u8; 32];
        event[1] = 2;

        // Act
        conn.write_event(&event).expect("channel open");

        // Assert
        assert_eq!(rx.try_recv().expect("event queued"), event);
    }

    #[test]
    fn test_write_after_receiver_dropped_reports_disconnect() {
        // Arrange
        let (conn, rx) = ChannelConnection::new(ClientId(4));
        drop(rx);

        // Act
        let result = conn.write_event(&[0u8; 32]);

        // Assert
        assert!(conn.is_closed());
        assert_eq!(result, Err(DispatchError::Disconnected(ClientId(4))));
    }
}
