//! In-process datagram link backed by tokio channels.

use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::shutdown::ShutdownSignal;
use crate::{Connection, ConnectionId, TransportError};

/// One end of an in-memory datagram link.
///
/// Created in pairs by [`MemoryConnection::pair`]. Closing (or dropping)
/// one end makes the other end's `recv` return `None`.
pub struct MemoryConnection {
    id: ConnectionId,
    tx: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    rx: Mutex<UnboundedReceiver<Vec<u8>>>,
    shutdown: ShutdownSignal,
}

impl MemoryConnection {
    /// Creates two connected endpoints.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(
        tx: UnboundedSender<Vec<u8>>,
        rx: UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            id: ConnectionId::next(),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            shutdown: ShutdownSignal::default(),
        }
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let tx = self.tx.lock().await;
        let Some(tx) = tx.as_ref() else {
            return Err(TransportError::ConnectionClosed(
                "local end closed".into(),
            ));
        };
        tx.send(data.to_vec()).map_err(|_| {
            TransportError::ConnectionClosed("peer dropped".into())
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => Ok(None),
            msg = rx.recv() => Ok(msg),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.tx.lock().await.take();
        self.shutdown.trigger();
        tracing::debug!(id = %self.id, "memory connection closed");
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
