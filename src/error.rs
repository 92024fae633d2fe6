use thiserror::Error;

use crate::protocol::TransportError;

/// Failures surfaced to callers of a [`Connection`](crate::Connection).
///
/// None of these are retried internally.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket API error: {0}")]
    Transport(#[from] TransportError),

    /// The server dropped the connection while a statement was in flight. Whether the
    /// statement took effect is unknown.
    #[error("server terminated statement")]
    StatementTerminated,

    #[error("server error: {text}")]
    Server {
        text: String,
        sql_code: Option<String>,
    },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
