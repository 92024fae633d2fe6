pub mod cli;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod quote;
pub mod rows;
pub mod utilities;

#[cfg(test)]
mod testing;

pub use cli::{Command, prompt};
pub use connection::{Awaiter, ConnConfig, Connection};
pub use error::ClientError;
pub use quote::KeywordCache;
pub use rows::{ResultRows, Row, RowStream, collect_columns, stream_columns};
pub use utilities::{quote_str, transpose};
