//! Channel driver: an isolated Tokio task that pumps one channel over one
//! connection.
//!
//! The driver owns both the [`ReliableChannel`] and the [`Connection`];
//! the outside world talks to it through a [`DriverHandle`]. Every loop
//! iteration handles one event (a received datagram, a command or a
//! keep-alive tick) and then flushes whatever the channel queued.

use seqlink_channel::{
    ChannelError, ChannelStats, ReliableChannel, SessionState,
};
use seqlink_protocol::Checksum;
use seqlink_transport::{Connection, ConnectionId, TransportError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::SeqlinkError;

/// Commands sent to a driver task through its handle.
///
/// The `oneshot::Sender` in each variant is the reply channel.
enum DriverCommand {
    Send {
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
    Connect {
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
    RequestMaxTimeout {
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
    Stats {
        reply: oneshot::Sender<DriverStatus>,
    },
}

/// A snapshot of the driven channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverStatus {
    pub state: SessionState,
    pub stats: ChannelStats,
    /// Sent datagrams not yet acknowledged.
    pub outstanding: usize,
    /// Inbound datagrams buffered ahead of the cursor.
    pub pending_inbound: usize,
}

/// Spawns driver tasks.
pub struct ChannelDriver;

impl ChannelDriver {
    /// Spawns a task that drives `channel` over `conn` and returns the
    /// handle used to talk to it.
    ///
    /// The task keeps running until the connection closes, either side
    /// disconnects, or every handle is dropped.
    pub fn spawn<T, C>(conn: T, channel: ReliableChannel<C>) -> DriverHandle
    where
        T: Connection,
        C: Checksum,
    {
        let id = conn.id();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();

        let task = DriverTask {
            id,
            conn,
            channel,
            commands: command_rx,
            deliveries: delivery_tx,
        };
        let task = tokio::spawn(task.run());

        DriverHandle {
            id,
            commands: command_tx,
            deliveries: delivery_rx,
            task,
        }
    }
}

const COMMAND_CHANNEL_SIZE: usize = 64;

/// Handle to a running driver task.
pub struct DriverHandle {
    id: ConnectionId,
    commands: mpsc::Sender<DriverCommand>,
    deliveries: mpsc::UnboundedReceiver<Vec<u8>>,
    task: JoinHandle<Result<(), SeqlinkError>>,
}

impl DriverHandle {
    /// Identifier of the driven connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues `payload` for reliable, ordered delivery to the peer.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), SeqlinkError> {
        self.request(|reply| DriverCommand::Send { payload, reply })
            .await?
            .map_err(SeqlinkError::from)
    }

    /// Waits for the next in-order payload from the peer.
    ///
    /// Returns `None` once the driver has stopped and everything it
    /// delivered has been taken.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.deliveries.recv().await
    }

    /// Starts the session handshake.
    pub async fn connect(&self) -> Result<(), SeqlinkError> {
        self.request(|reply| DriverCommand::Connect { reply })
            .await?
            .map_err(SeqlinkError::from)
    }

    /// Tears the session down. The driver stops after telling the peer.
    pub async fn disconnect(&self) -> Result<(), SeqlinkError> {
        self.request(|reply| DriverCommand::Disconnect { reply })
            .await?
            .map_err(SeqlinkError::from)
    }

    /// Sends the configured ack-timeout and batching request to the peer.
    pub async fn request_max_timeout(&self) -> Result<(), SeqlinkError> {
        self.request(|reply| DriverCommand::RequestMaxTimeout { reply })
            .await?
            .map_err(SeqlinkError::from)
    }

    pub async fn status(&self) -> Result<DriverStatus, SeqlinkError> {
        self.request(|reply| DriverCommand::Stats { reply }).await
    }

    /// Releases the handle's command channel, which stops a driver that is
    /// still running, and waits for the task to report how it ended.
    pub async fn join(self) -> Result<(), SeqlinkError> {
        drop(self.commands);
        self.task.await.map_err(|_| SeqlinkError::DriverStopped)?
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> DriverCommand,
    ) -> Result<R, SeqlinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| SeqlinkError::DriverStopped)?;
        reply_rx.await.map_err(|_| SeqlinkError::DriverStopped)
    }
}

/// The state owned by a driver task.
struct DriverTask<T, C> {
    id: ConnectionId,
    conn: T,
    channel: ReliableChannel<C>,
    commands: mpsc::Receiver<DriverCommand>,
    deliveries: mpsc::UnboundedSender<Vec<u8>>,
}

impl<T: Connection, C: Checksum> DriverTask<T, C> {
    async fn run(mut self) -> Result<(), SeqlinkError> {
        let id = self.id;
        tracing::debug!(%id, "channel driver started");

        let mut keepalive =
            tokio::time::interval(self.channel.config().keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        keepalive.tick().await;

        let result = self.pump(&mut keepalive).await;
        if let Err(e) = self.conn.close().await {
            tracing::debug!(%id, error = %e, "close failed");
        }

        let stats = self.channel.stats();
        match &result {
            Ok(()) => tracing::info!(
                %id,
                delivered = stats.delivered,
                datagrams_sent = stats.datagrams_sent,
                "channel driver stopped"
            ),
            Err(e) => tracing::warn!(%id, error = %e, "channel driver failed"),
        }
        result
    }

    async fn pump(
        &mut self,
        keepalive: &mut tokio::time::Interval,
    ) -> Result<(), SeqlinkError> {
        let id = self.id;
        loop {
            tokio::select! {
                received = self.conn.recv() => match received? {
                    Some(datagram) => self.channel.handle_datagram(&datagram),
                    None => {
                        tracing::debug!(%id, "connection closed");
                        return Ok(());
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::debug!(%id, "all handles dropped");
                        return Ok(());
                    }
                },
                _ = keepalive.tick() => self.channel.send_keep_alive_ack(),
            }

            while let Some(payload) = self.channel.poll_delivery() {
                if self.deliveries.send(payload).is_err() {
                    tracing::trace!(%id, "receiver dropped, discarding delivery");
                }
            }
            match self.flush().await {
                Ok(()) => {}
                Err(TransportError::ConnectionClosed(reason)) => {
                    tracing::debug!(%id, %reason, "peer gone");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            if self.channel.state() == SessionState::Closed {
                tracing::debug!(%id, "session closed");
                return Ok(());
            }
        }
    }

    fn handle_command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::Send { payload, reply } => {
                let _ = reply.send(self.channel.send(&payload));
            }
            DriverCommand::Connect { reply } => {
                let _ = reply.send(self.channel.connect());
            }
            DriverCommand::Disconnect { reply } => {
                let _ = reply.send(self.channel.disconnect());
            }
            DriverCommand::RequestMaxTimeout { reply } => {
                let _ = reply.send(self.channel.request_max_timeout());
            }
            DriverCommand::Stats { reply } => {
                let _ = reply.send(DriverStatus {
                    state: self.channel.state(),
                    stats: self.channel.stats(),
                    outstanding: self.channel.outstanding(),
                    pending_inbound: self.channel.pending_inbound(),
                });
            }
        }
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        while let Some(datagram) = self.channel.poll_transmit() {
            self.conn.send(&datagram).await?;
        }
        Ok(())
    }
}
