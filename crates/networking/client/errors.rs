/// A single error type for failures of one RPC round trip.
#[derive(Debug, thiserror::Error)]
pub enum RpcRequestError {
    #[error("{method}: {source}")]
    SerdeJSONError {
        method: String,
        source: serde_json::Error,
    },
    #[error("{method}: {message} (data: {data:?})")]
    RPCError {
        method: String,
        message: String,
        data: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum NodeClientError {
    #[error("Connection is not open")]
    NotConnected,
    #[error("Connection is already open")]
    AlreadyOpen,
    #[error("Timed out opening socket to {0}")]
    OpenTimeout(String),
    #[error("Websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("RPC request error: {0}")]
    RpcRequest(#[from] RpcRequestError),
    #[error("Socket closed")]
    SocketClosed,
    #[error("Atom submission timed out")]
    SubmitTimeout,
    #[error("No subscription for address {0}")]
    UnknownSubscription(String),
    #[error("{0}")]
    Custom(String),
}

/// Terminal error delivered on a subscription or submission stream. Cloneable
/// so one failure can fan out to every affected stream.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Socket closed")]
    SocketClosed,
    /// A terminal submission failure reported by the node.
    #[error("{code}: {message}")]
    Rejected { code: String, message: String },
    #[error("Atom submission timed out")]
    SubmitTimeout,
}
