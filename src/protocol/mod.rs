//! Wire protocol of the Exasol WebSocket SQL API.
//!
//! Every message exchanged with the server is a single JSON document carried in one
//! WebSocket text frame. Requests name their operation in a `command` field, replies share
//! a fixed envelope:
//!
//! - `status`: `"ok"` or anything else on failure.
//! - `responseData`: the operation specific payload, present on success.
//! - `exception`: `{ "text": ..., "sqlCode": ... }`, present on failure.
//!
//! Query results are columnar: `resultSet.data` holds one vector per column, all of the same
//! length. See [`rows`](crate::rows) for turning them into rows.
//!
//! # Key Components
//!
//! - [`Request`]: the commands this client issues.
//! - [`Response`]: the reply envelope, generic over its payload.
//! - [`MessageSocket`]: the duplex message socket the rest of the crate talks through.
//! - [`ProtocolTransport`]: JSON codec over a [`MessageSocket`].
mod request;
mod response;
mod transport;

pub use request::{Attributes, Request, TokenCredentials};
pub use response::{
    ColumnInfo, DataType, Exception, ExecuteData, FetchData, LoginInfo, Response, ResultSet,
    StatementResult,
};
pub use transport::{MessageSocket, ProtocolTransport, TransportError, connect};
