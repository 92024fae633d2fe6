//! Scripted in-memory socket used by the unit tests.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use serde_json::{Value, json};

use crate::{
    Connection, ConnConfig, KeywordCache,
    protocol::{MessageSocket, TransportError},
};

/// Replies to reads from a fixed script and records every message written to it.
pub(crate) struct MockSocket {
    replies: VecDeque<Result<String, TransportError>>,
    sent: Arc<Mutex<Vec<Value>>>,
}

impl MockSocket {
    pub(crate) fn new(replies: Vec<Value>) -> Self {
        Self {
            replies: replies.into_iter().map(|r| Ok(r.to_string())).collect(),
            sent: Arc::default(),
        }
    }

    pub(crate) fn then_fail(mut self, err: TransportError) -> Self {
        self.replies.push_back(Err(err));
        self
    }

    pub(crate) fn sent(&self) -> Arc<Mutex<Vec<Value>>> {
        Arc::clone(&self.sent)
    }
}

impl MessageSocket for MockSocket {
    fn write_text(&mut self, text: String) -> Result<(), TransportError> {
        let value = serde_json::from_str(&text).map_err(TransportError::Deserialize)?;
        self.sent.lock().unwrap().push(value);
        Ok(())
    }

    fn read_text(&mut self) -> Result<String, TransportError> {
        self.replies.pop_front().unwrap_or_else(|| {
            Err(TransportError::Closed {
                code: 1000,
                reason: String::from("script exhausted"),
            })
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn enable_write_compression(&mut self, _enabled: bool) {}
}

pub(crate) fn test_connection(socket: MockSocket) -> Connection {
    Connection::with_socket(
        Box::new(socket),
        ConnConfig::default(),
        Arc::new(KeywordCache::new()),
    )
}

/// An `execute` reply carrying one inline result set with a single chunk of `data`.
pub(crate) fn result_set_reply(handle: Option<i64>, num_rows: u64, data: Vec<Vec<Value>>) -> Value {
    let in_message = data.first().map_or(0, Vec::len);
    let mut result_set = json!({
        "numColumns": data.len(),
        "numRows": num_rows,
        "numRowsInMessage": in_message,
        "columns": [],
        "data": data,
    });
    if let Some(handle) = handle {
        result_set["resultSetHandle"] = json!(handle);
    }

    json!({
        "status": "ok",
        "responseData": {
            "numResults": 1,
            "results": [{"resultType": "resultSet", "resultSet": result_set}]
        }
    })
}
