use serde::Serialize;

/// Session attributes understood by `execute` and `setAttributes`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autocommit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_timeout: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    LoginToken { protocol_version: u32 },
    #[serde(rename_all = "camelCase")]
    Execute {
        sql_text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attributes: Option<Attributes>,
    },
    #[serde(rename_all = "camelCase")]
    Fetch {
        result_set_handle: i64,
        start_position: u64,
        num_bytes: u64,
    },
    #[serde(rename_all = "camelCase")]
    CloseResultSet { result_set_handles: Vec<i64> },
    SetAttributes { attributes: Attributes },
    Disconnect,
}

impl Request {
    pub fn execute(sql: impl Into<String>) -> Self {
        Request::Execute {
            sql_text: sql.into(),
            attributes: None,
        }
    }
}

/// Second leg of the `loginToken` handshake. Carries no `command` field.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenCredentials {
    pub access_token: String,
    pub client_name: String,
    pub client_version: String,
    pub driver_name: String,
    pub attributes: Attributes,
}
