//! Request/response engine over a single WebSocket.
//!
//! A [`Connection`] owns its socket exclusively. Requests go out one at a time and every reply
//! is read back in the order the requests were written: there is exactly one reply channel and
//! no pipelining. [`Connection::async_send`] writes immediately and hands back an [`Awaiter`];
//! since the awaiter mutably borrows the connection, no second request can be issued until the
//! first reply has been received or the awaiter dropped.
//!
//! Failures are never retried here. Whether to reconnect is up to the caller.
//!
//! # Example
//! ```rust,no_run
//! use exaws::{ConnConfig, Connection};
//!
//! let conf = ConnConfig {
//!     access_token: Some(String::from("token")),
//!     ..ConnConfig::default()
//! };
//! let mut conn = Connection::connect(conf).unwrap();
//!
//! for row in conn.fetch_chan("SELECT id, name FROM users").unwrap() {
//!     println!("{:?}", row.unwrap());
//! }
//! conn.disconnect().unwrap();
//! ```
use std::{collections::HashSet, sync::Arc};

use log::{debug, error, info, warn};
use serde::{
    Serialize,
    de::{DeserializeOwned, IgnoredAny},
};
use serde_json::Value;

use crate::{
    error::ClientError,
    protocol::{
        self, Attributes, ExecuteData, LoginInfo, MessageSocket, ProtocolTransport, Request,
        Response, ResultSet, StatementResult, TokenCredentials, TransportError,
    },
    quote::{KEYWORD_QUERY, KeywordCache, quote_ident_with},
    rows::{ResultRows, Row},
};

pub const DEFAULT_PORT: u16 = 8563;
pub const DEFAULT_FETCH_BYTES: u64 = 2 * 1024 * 1024;
const PROTOCOL_VERSION: u32 = 3;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    pub host: String,
    pub port: u16,
    /// Log in with this token right after connecting. Without one the socket is opened only.
    pub access_token: Option<String>,
    pub client_name: String,
    pub autocommit: bool,
    /// Upper bound on the size of each chunk requested with `fetch`.
    pub fetch_bytes: u64,
    /// Do not log failed requests. Errors are still returned.
    pub suppress_error: bool,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: DEFAULT_PORT,
            access_token: None,
            client_name: String::from(env!("CARGO_PKG_NAME")),
            autocommit: true,
            fetch_bytes: DEFAULT_FETCH_BYTES,
            suppress_error: false,
        }
    }
}

impl ConnConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

pub struct Connection {
    transport: ProtocolTransport<Box<dyn MessageSocket + Send>>,
    conf: ConnConfig,
    keywords: Arc<KeywordCache>,
    session: Option<LoginInfo>,
    last_error: Option<String>,
    /// Replies owed to awaiters that were dropped before receiving.
    unread: usize,
}

/// Deferred receipt of the reply to one request.
#[must_use = "replies must be received in the order their requests were sent"]
pub struct Awaiter<'c> {
    conn: &'c mut Connection,
    received: bool,
}

impl Awaiter<'_> {
    /// Blocks for the reply, decodes it and fails unless its status is `ok`.
    pub fn receive<T: DeserializeOwned>(mut self) -> Result<Response<T>, ClientError> {
        self.received = true;
        self.conn.receive()
    }
}

impl Drop for Awaiter<'_> {
    fn drop(&mut self) {
        if !self.received {
            self.conn.unread += 1;
        }
    }
}

impl Connection {
    /// Opens a socket to `conf.host:conf.port` and logs in when a token is configured.
    pub fn connect(conf: ConnConfig) -> Result<Self, ClientError> {
        Self::connect_with_keywords(conf, Arc::new(KeywordCache::new()))
    }

    /// Like [`Connection::connect`], sharing an existing keyword cache.
    pub fn connect_with_keywords(
        conf: ConnConfig,
        keywords: Arc<KeywordCache>,
    ) -> Result<Self, ClientError> {
        let ws = protocol::connect(&conf)?;
        let token = conf.access_token.clone();
        let mut conn = Self::with_socket(Box::new(ws), conf, keywords);

        if let Some(token) = token {
            conn.login_with_token(&token)?;
        }
        Ok(conn)
    }

    /// Wraps an already open socket.
    pub fn with_socket(
        mut socket: Box<dyn MessageSocket + Send>,
        conf: ConnConfig,
        keywords: Arc<KeywordCache>,
    ) -> Self {
        socket.enable_write_compression(false);
        Self {
            transport: ProtocolTransport::new(socket),
            conf,
            keywords,
            session: None,
            last_error: None,
            unread: 0,
        }
    }

    pub fn config(&self) -> &ConnConfig {
        &self.conf
    }

    pub fn keywords(&self) -> &Arc<KeywordCache> {
        &self.keywords
    }

    pub fn session(&self) -> Option<&LoginInfo> {
        self.session.as_ref()
    }

    /// Text of the most recent failed request.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Runs the two-step `loginToken` handshake.
    pub fn login_with_token(&mut self, token: &str) -> Result<LoginInfo, ClientError> {
        let _: Response<IgnoredAny> = self.send(&Request::LoginToken {
            protocol_version: PROTOCOL_VERSION,
        })?;

        let creds = TokenCredentials {
            access_token: token.to_string(),
            client_name: self.conf.client_name.clone(),
            client_version: String::from(env!("CARGO_PKG_VERSION")),
            driver_name: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            attributes: Attributes {
                autocommit: Some(self.conf.autocommit),
                ..Default::default()
            },
        };
        let login: LoginInfo = self.send(&creds)?.into_data()?;

        info!(
            "session {} opened on {} (protocol v{})",
            login.session_id, login.database_name, login.protocol_version
        );
        self.session = Some(login.clone());
        Ok(login)
    }

    /// Writes `request` and returns the handle that reads its reply.
    ///
    /// Replies of previously dropped awaiters are read and discarded first.
    pub fn async_send<Q: Serialize + ?Sized>(
        &mut self,
        request: &Q,
    ) -> Result<Awaiter<'_>, ClientError> {
        self.discard_unread()?;

        if let Err(e) = self.transport.write_request(request) {
            return Err(self.report(e.into()));
        }
        Ok(Awaiter {
            conn: self,
            received: false,
        })
    }

    /// Writes `request` and waits for its reply.
    pub fn send<Q: Serialize + ?Sized, T: DeserializeOwned>(
        &mut self,
        request: &Q,
    ) -> Result<Response<T>, ClientError> {
        self.async_send(request)?.receive()
    }

    fn receive<T: DeserializeOwned>(&mut self) -> Result<Response<T>, ClientError> {
        let result = match self.transport.read_response::<Response<T>>() {
            Ok(resp) => resp.validate(),
            Err(e) => Err(read_error(e)),
        };
        result.map_err(|e| self.report(e))
    }

    fn discard_unread(&mut self) -> Result<(), ClientError> {
        while self.unread > 0 {
            self.unread -= 1;
            warn!("discarding reply of an awaiter that was never received");
            if let Err(e) = self.transport.skip_response() {
                return Err(self.report(read_error(e)));
            }
        }
        Ok(())
    }

    fn report(&mut self, err: ClientError) -> ClientError {
        if !self.conf.suppress_error {
            error!("{err}");
        }
        self.last_error = Some(err.to_string());
        err
    }

    /// Runs a single statement and returns its first result.
    pub fn execute(&mut self, sql: &str) -> Result<StatementResult, ClientError> {
        debug!("execute: {sql}");
        let data: ExecuteData = self.send(&Request::execute(sql))?.into_data()?;
        data.results.into_iter().next().ok_or_else(|| {
            ClientError::MalformedPayload(String::from("execute returned no results"))
        })
    }

    /// Runs a query and returns its rows lazily. Statements without a result set yield no rows.
    pub fn fetch_chan(&mut self, sql: &str) -> Result<ResultRows<'_>, ClientError> {
        match self.execute(sql)? {
            StatementResult::ResultSet { result_set } => self.result_rows(result_set),
            StatementResult::RowCount { row_count } => {
                debug!("statement returned a row count ({row_count}), not rows");
                Ok(ResultRows::empty(self))
            }
        }
    }

    /// Iterates the rows of a result set returned by [`Connection::execute`].
    pub fn result_rows(&mut self, result_set: ResultSet) -> Result<ResultRows<'_>, ClientError> {
        ResultRows::new(self, result_set)
    }

    /// Runs a query and collects all of its rows.
    pub fn fetch_slice(&mut self, sql: &str) -> Result<Vec<Row>, ClientError> {
        self.fetch_chan(sql)?.collect()
    }

    pub(crate) fn close_result_set(&mut self, handle: i64) -> Result<(), ClientError> {
        let _: Response<IgnoredAny> = self.send(&Request::CloseResultSet {
            result_set_handles: vec![handle],
        })?;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), ClientError> {
        self.execute("COMMIT").map(|_| ())
    }

    pub fn rollback(&mut self) -> Result<(), ClientError> {
        self.execute("ROLLBACK").map(|_| ())
    }

    pub fn set_autocommit(&mut self, autocommit: bool) -> Result<(), ClientError> {
        let _: Response<IgnoredAny> = self.send(&Request::SetAttributes {
            attributes: Attributes {
                autocommit: Some(autocommit),
                ..Default::default()
            },
        })?;
        self.conf.autocommit = autocommit;
        Ok(())
    }

    /// Quotes `ident` for use in SQL text, loading the server's reserved words on first use.
    ///
    /// If loading the reserved words fails, the error is returned and the next call tries again.
    pub fn quote_ident(&mut self, ident: &str) -> Result<String, ClientError> {
        let keywords = Arc::clone(&self.keywords);
        let reserved = keywords.contains_or_load(&ident.to_lowercase(), || self.load_keywords())?;
        Ok(quote_ident_with(ident, reserved))
    }

    fn load_keywords(&mut self) -> Result<HashSet<String>, ClientError> {
        let mut words = HashSet::new();
        for row in self.fetch_chan(KEYWORD_QUERY)? {
            match row?.into_iter().next() {
                Some(Value::String(word)) => {
                    words.insert(word.to_lowercase());
                }
                other => warn!("ignoring keyword row {other:?}"),
            }
        }
        Ok(words)
    }

    /// Ends the session and closes the socket.
    pub fn disconnect(mut self) -> Result<(), ClientError> {
        let ended = self
            .send::<_, IgnoredAny>(&Request::Disconnect)
            .map(|_| ());
        let closed = self.transport.close().map_err(ClientError::from);
        info!("disconnected from {}", self.conf.url());
        ended.and(closed)
    }
}

fn read_error(err: TransportError) -> ClientError {
    if err.is_abnormal_closure() {
        ClientError::StatementTerminated
    } else {
        ClientError::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tungstenite::error::ProtocolError;

    use super::*;
    use crate::{
        protocol::FetchData,
        testing::{MockSocket, result_set_reply, test_connection},
    };

    #[test]
    fn send_returns_response_data() {
        let socket = MockSocket::new(vec![json!({
            "status": "ok",
            "responseData": {"numRows": 1, "data": [[42]]}
        })]);
        let mut conn = test_connection(socket);

        let data: FetchData = conn
            .send(&Request::Fetch {
                result_set_handle: 1,
                start_position: 0,
                num_bytes: 64,
            })
            .unwrap()
            .into_data()
            .unwrap();
        assert_eq!(data.data, vec![vec![json!(42)]]);
    }

    #[test]
    fn non_ok_status_is_a_server_error() {
        let socket = MockSocket::new(vec![json!({
            "status": "error",
            "exception": {"text": "syntax error", "sqlCode": "42000"}
        })]);
        let mut conn = test_connection(socket);

        match conn.execute("SELEC 1") {
            Err(ClientError::Server { text, .. }) => assert_eq!(text, "syntax error"),
            other => panic!("expected server error, got {other:?}"),
        }
        assert_eq!(conn.last_error(), Some("server error: syntax error"));
    }

    #[test]
    fn abnormal_closure_terminates_statement() {
        let socket = MockSocket::new(Vec::new()).then_fail(TransportError::WebSocket(
            tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake),
        ));
        let mut conn = test_connection(socket);

        let err = conn.execute("DELETE FROM t").unwrap_err();
        assert!(matches!(err, ClientError::StatementTerminated), "{err:?}");
    }

    #[test]
    fn other_read_failures_are_transport_errors() {
        let socket = MockSocket::new(Vec::new()).then_fail(TransportError::Closed {
            code: 1001,
            reason: String::from("going away"),
        });
        let mut conn = test_connection(socket);

        let err = conn.execute("SELECT 1").unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)), "{err:?}");
    }

    #[test]
    fn undecodable_reply_is_a_transport_error() {
        let socket = MockSocket::new(vec![json!([1, 2, 3])]);
        let mut conn = test_connection(socket);

        let err = conn.execute("SELECT 1").unwrap_err();
        assert!(
            matches!(err, ClientError::Transport(TransportError::Deserialize(_))),
            "{err:?}"
        );
    }

    #[test]
    fn suppressed_errors_are_still_returned() {
        let socket = MockSocket::new(vec![json!({
            "status": "error",
            "exception": {"text": "object T not found"}
        })]);
        let mut conn = test_connection(socket);
        conn.conf.suppress_error = true;

        assert!(conn.execute("DROP TABLE t").is_err());
        assert_eq!(conn.last_error(), Some("server error: object T not found"));
    }

    #[test]
    fn async_send_defers_the_read() {
        let socket = MockSocket::new(vec![json!({
            "status": "ok",
            "responseData": {"numResults": 1, "results": [{"resultType": "rowCount", "rowCount": 5}]}
        })]);
        let sent = socket.sent();
        let mut conn = test_connection(socket);

        let awaiter = conn
            .async_send(&Request::execute("UPDATE t SET a = 1"))
            .unwrap();
        assert_eq!(sent.lock().unwrap().len(), 1);

        let data: ExecuteData = awaiter.receive().unwrap().into_data().unwrap();
        assert_eq!(data.results[0].affected_rows(), 5);
    }

    #[test]
    fn dropped_awaiter_reply_is_discarded() {
        let socket = MockSocket::new(vec![
            json!({"status": "ok", "responseData": {"numResults": 1, "results": [{"resultType": "rowCount", "rowCount": 1}]}}),
            json!({"status": "ok", "responseData": {"numResults": 1, "results": [{"resultType": "rowCount", "rowCount": 2}]}}),
        ]);
        let mut conn = test_connection(socket);

        let awaiter = conn.async_send(&Request::execute("INSERT 1")).unwrap();
        drop(awaiter);

        assert_eq!(conn.execute("INSERT 2").unwrap().affected_rows(), 2);
    }

    #[test]
    fn fetch_slice_collects_inline_rows() {
        let socket = MockSocket::new(vec![result_set_reply(
            None,
            2,
            vec![vec![json!(1), json!(2)], vec![json!("a"), json!("b")]],
        )]);
        let mut conn = test_connection(socket);

        assert_eq!(
            conn.fetch_slice("SELECT id, name FROM t").unwrap(),
            vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]]
        );
    }

    #[test]
    fn fetch_chan_on_row_count_yields_nothing() {
        let socket = MockSocket::new(vec![json!({
            "status": "ok",
            "responseData": {"numResults": 1, "results": [{"resultType": "rowCount", "rowCount": 3}]}
        })]);
        let mut conn = test_connection(socket);

        assert_eq!(conn.fetch_chan("DELETE FROM t").unwrap().count(), 0);
    }

    #[test]
    fn login_with_token_runs_handshake() {
        let socket = MockSocket::new(vec![
            json!({"status": "ok"}),
            json!({
                "status": "ok",
                "responseData": {
                    "sessionId": 1234,
                    "protocolVersion": 3,
                    "releaseVersion": "8.29.1",
                    "databaseName": "DB1",
                    "productName": "Exasol"
                }
            }),
        ]);
        let sent = socket.sent();
        let mut conn = test_connection(socket);

        let login = conn.login_with_token("secret").unwrap();
        assert_eq!(login.session_id, 1234);
        assert_eq!(conn.session().map(|s| s.database_name.as_str()), Some("DB1"));

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0], json!({"command": "loginToken", "protocolVersion": 3}));
        assert_eq!(sent[1]["accessToken"], "secret");
        assert_eq!(sent[1]["attributes"], json!({"autocommit": true}));
    }

    #[test]
    fn commit_and_rollback_execute_statements() {
        let ok = json!({"status": "ok", "responseData": {"numResults": 1, "results": [{"resultType": "rowCount", "rowCount": 0}]}});
        let socket = MockSocket::new(vec![ok.clone(), ok]);
        let sent = socket.sent();
        let mut conn = test_connection(socket);

        conn.commit().unwrap();
        conn.rollback().unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0]["sqlText"], "COMMIT");
        assert_eq!(sent[1]["sqlText"], "ROLLBACK");
    }

    #[test]
    fn set_autocommit_updates_config() {
        let socket = MockSocket::new(vec![json!({"status": "ok"})]);
        let sent = socket.sent();
        let mut conn = test_connection(socket);

        conn.set_autocommit(false).unwrap();
        assert!(!conn.config().autocommit);
        assert_eq!(
            sent.lock().unwrap()[0],
            json!({"command": "setAttributes", "attributes": {"autocommit": false}})
        );
    }

    #[test]
    fn disconnect_sends_command() {
        let socket = MockSocket::new(vec![json!({"status": "ok"})]);
        let sent = socket.sent();
        let conn = test_connection(socket);

        conn.disconnect().unwrap();
        assert_eq!(sent.lock().unwrap()[0], json!({"command": "disconnect"}));
    }

    #[test]
    fn config_url() {
        let conf = ConnConfig {
            host: String::from("db.example.com"),
            ..ConnConfig::default()
        };
        assert_eq!(conf.url(), "ws://db.example.com:8563");
    }
}
