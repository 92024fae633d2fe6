use serde::Deserialize;
use serde_json::Value;

use crate::error::ClientError;

const STATUS_OK: &str = "ok";

/// Envelope shared by every reply: a status, the payload on success and the exception otherwise.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response<T> {
    pub status: String,
    pub response_data: Option<T>,
    pub exception: Option<Exception>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
    #[serde(default)]
    pub text: String,
    pub sql_code: Option<String>,
}

impl<T> Response<T> {
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Fails with [`ClientError::Server`] unless the status is `ok`.
    pub fn validate(self) -> Result<Self, ClientError> {
        if self.is_ok() {
            return Ok(self);
        }

        let (text, sql_code) = match self.exception {
            Some(Exception { text, sql_code }) => (text, sql_code),
            None => (String::new(), None),
        };
        Err(ClientError::Server { text, sql_code })
    }

    pub fn into_data(self) -> Result<T, ClientError> {
        self.response_data.ok_or_else(|| {
            ClientError::MalformedPayload(String::from("reply carried no responseData"))
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginInfo {
    pub session_id: u64,
    pub protocol_version: u32,
    #[serde(default)]
    pub release_version: String,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub product_name: String,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteData {
    pub num_results: usize,
    #[serde(default)]
    pub results: Vec<StatementResult>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "resultType")]
pub enum StatementResult {
    #[serde(rename = "resultSet")]
    ResultSet {
        #[serde(rename = "resultSet")]
        result_set: ResultSet,
    },
    #[serde(rename = "rowCount")]
    RowCount {
        #[serde(rename = "rowCount")]
        row_count: u64,
    },
}

impl StatementResult {
    /// Rows returned for queries, rows touched for everything else.
    pub fn affected_rows(&self) -> u64 {
        match self {
            StatementResult::ResultSet { result_set } => result_set.num_rows,
            StatementResult::RowCount { row_count } => *row_count,
        }
    }
}

/// A columnar result: `data` holds one vector per column.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    pub result_set_handle: Option<i64>,
    pub num_columns: usize,
    pub num_rows: u64,
    pub num_rows_in_message: u64,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DataType {
    #[serde(rename = "type")]
    pub name: String,
}

/// Reply to `fetch`: the next chunk of an open result set.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FetchData {
    pub num_rows: u64,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}
