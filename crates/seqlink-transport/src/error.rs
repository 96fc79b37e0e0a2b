/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or connecting the local socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// The datagram does not fit the transport's size limit.
    #[error("datagram of {len} bytes exceeds limit of {max}")]
    Oversized { len: usize, max: usize },
}
