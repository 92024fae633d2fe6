//! Row-oriented access to columnar results.
//!
//! The server ships result data column by column. [`stream_columns`] hands the columns to a
//! producer thread that assembles one row at a time and pushes it through a bounded channel,
//! so a slow consumer stalls the producer instead of the whole result being materialized a
//! second time in row form.
//!
//! [`ResultRows`] sits on top of that and pages through result sets the server keeps open,
//! requesting the next chunk only once the consumer has drained the current one.
//!
//! Rows come out in ascending order, with values in server column order.
use std::{
    io,
    sync::mpsc::{self, Receiver, SyncSender},
    thread::{self, JoinHandle},
};

use log::{debug, warn};
use serde_json::Value;

use crate::{
    Connection,
    error::ClientError,
    protocol::{FetchData, Request, ResultSet},
    utilities::transpose,
};

/// One result row, values in column order.
pub type Row = Vec<Value>;

/// Capacity of the channel between the row producer and its consumer.
pub const ROW_BUFFER: usize = 64;

/// Checks that every column has the same length and returns that length.
fn row_count(columns: &[Vec<Value>]) -> Result<usize, ClientError> {
    let Some(first) = columns.first() else {
        return Ok(0);
    };

    let rows = first.len();
    match columns.iter().position(|c| c.len() != rows) {
        Some(col) => Err(ClientError::MalformedPayload(format!(
            "column {col} has {} values, column 0 has {rows}",
            columns[col].len()
        ))),
        None => Ok(rows),
    }
}

/// Like [`row_count`], also requiring the length the server announced for the chunk.
fn chunk_row_count(columns: &[Vec<Value>], reported: u64) -> Result<usize, ClientError> {
    let rows = row_count(columns)?;
    if rows as u64 != reported {
        return Err(ClientError::MalformedPayload(format!(
            "chunk announced {reported} rows but carried {rows}"
        )));
    }
    Ok(rows)
}

/// Sends rows until all are out or the receiver hangs up, blocking while the channel is full.
/// Returns the number of rows handed to the channel.
fn send_rows(columns: Vec<Vec<Value>>, rows: usize, sender: &SyncSender<Row>) -> usize {
    let mut cols: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
    for row in 0..rows {
        let values: Row = cols.iter_mut().filter_map(Iterator::next).collect();
        if sender.send(values).is_err() {
            return row;
        }
    }
    rows
}

/// Streams the rows of a columnar payload through a channel of [`ROW_BUFFER`] rows.
pub fn stream_columns(columns: Vec<Vec<Value>>) -> Result<RowStream, ClientError> {
    stream_columns_bounded(columns, ROW_BUFFER)
}

/// Like [`stream_columns`] with an explicit channel capacity. `0` makes every send a rendezvous.
///
/// Failing to spawn the producer thread is reported as [`ClientError::Transport`] wrapping the
/// I/O error from the OS.
pub fn stream_columns_bounded(
    columns: Vec<Vec<Value>>,
    capacity: usize,
) -> Result<RowStream, ClientError> {
    let rows = row_count(&columns)?;
    let (sender, receiver) = mpsc::sync_channel(capacity);

    if rows == 0 {
        // Sender dropped here, the stream is already closed.
        return Ok(RowStream {
            receiver: Some(receiver),
            producer: None,
        });
    }

    let producer = thread::Builder::new()
        .name(String::from("exaws-rows"))
        .spawn(move || match send_rows(columns, rows, &sender) {
            sent if sent < rows => debug!("row consumer went away after {sent} of {rows} rows"),
            _ => debug!("streamed {rows} rows"),
        })
        .map_err(|e| {
            let err = io::Error::new(e.kind(), format!("failed to spawn row producer: {e}"));
            ClientError::Transport(err.into())
        })?;

    Ok(RowStream {
        receiver: Some(receiver),
        producer: Some(producer),
    })
}

/// Transposes a columnar payload into rows in one go.
pub fn collect_columns(columns: Vec<Vec<Value>>) -> Result<Vec<Row>, ClientError> {
    row_count(&columns)?;
    Ok(transpose(columns))
}

/// A finite, single-pass sequence of rows fed by a producer thread.
#[derive(Debug)]
pub struct RowStream {
    receiver: Option<Receiver<Row>>,
    producer: Option<JoinHandle<()>>,
}

impl RowStream {
    fn empty() -> Self {
        let (_, receiver) = mpsc::sync_channel(0);
        Self {
            receiver: Some(receiver),
            producer: None,
        }
    }
}

impl Iterator for RowStream {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.receiver.as_ref()?.recv().ok()
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        // Hang up first so a blocked producer wakes and exits.
        drop(self.receiver.take());
        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                warn!("row producer panicked");
            }
        }
    }
}

fn stream_chunk(columns: Vec<Vec<Value>>, reported: u64) -> Result<RowStream, ClientError> {
    chunk_row_count(&columns, reported)?;
    stream_columns(columns)
}

/// Rows of one statement result, fetched from the server chunk by chunk.
///
/// Holds the connection exclusively until dropped. After an error is yielded the iterator
/// is finished.
pub struct ResultRows<'c> {
    conn: &'c mut Connection,
    handle: Option<i64>,
    total: u64,
    position: u64,
    current: RowStream,
    done: bool,
}

impl<'c> ResultRows<'c> {
    pub(crate) fn new(conn: &'c mut Connection, result_set: ResultSet) -> Result<Self, ClientError> {
        debug!(
            "result set: {} rows, {} inline, handle {:?}",
            result_set.num_rows, result_set.num_rows_in_message, result_set.result_set_handle
        );

        // Built before validating the inline chunk so that Drop closes the handle on error.
        let mut rows = Self {
            conn,
            handle: result_set.result_set_handle,
            total: result_set.num_rows,
            position: result_set.num_rows_in_message,
            current: RowStream::empty(),
            done: false,
        };
        rows.current = stream_chunk(result_set.data, result_set.num_rows_in_message)?;
        Ok(rows)
    }

    pub(crate) fn empty(conn: &'c mut Connection) -> Self {
        Self {
            conn,
            handle: None,
            total: 0,
            position: 0,
            current: RowStream::empty(),
            done: false,
        }
    }

    /// Total number of rows the server reported for this result.
    pub fn total_rows(&self) -> u64 {
        self.total
    }

    /// Loads the next chunk. Returns `false` once every row has been delivered.
    fn advance(&mut self) -> Result<bool, ClientError> {
        if self.position >= self.total {
            if let Some(handle) = self.handle.take() {
                self.conn.close_result_set(handle)?;
            }
            return Ok(false);
        }

        let handle = self.handle.ok_or_else(|| {
            ClientError::MalformedPayload(format!(
                "{} of {} rows delivered but no result set handle",
                self.position, self.total
            ))
        })?;

        let fetch = Request::Fetch {
            result_set_handle: handle,
            start_position: self.position,
            num_bytes: self.conn.config().fetch_bytes,
        };
        let chunk: FetchData = self.conn.send(&fetch)?.into_data()?;
        if chunk.num_rows == 0 {
            return Err(ClientError::MalformedPayload(format!(
                "fetch at row {} of {} returned no rows",
                self.position, self.total
            )));
        }

        debug!("fetched rows {}..{}", self.position, self.position + chunk.num_rows);
        self.position += chunk.num_rows;
        self.current = stream_chunk(chunk.data, chunk.num_rows)?;
        Ok(true)
    }
}

impl Iterator for ResultRows<'_> {
    type Item = Result<Row, ClientError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(row) = self.current.next() {
                return Some(Ok(row));
            }
            match self.advance() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl Drop for ResultRows<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.conn.close_result_set(handle) {
                warn!("failed to close result set {handle}: {e}");
            }
        }
    }
}
