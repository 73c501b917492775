use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::Error;

/// Acknowledgement payload exactly as the transport delivered it.
pub type RawReply = Vec<Value>;

/// Pagination metadata returned alongside a paginated `find`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    pub total: i64,
    pub limit: i64,
    pub skip: i64,
}

/// Payload of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Object(Map<String, Value>),
    List(Vec<Value>),
}

impl ResponseData {
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            Self::Object(_) => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Object(map) => Value::Object(map),
            Self::List(items) => Value::Array(items),
        }
    }

    /// Deserialize the payload into a caller-defined type.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, Error> {
        serde_json::from_value(self.into_value()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
        })
    }
}

/// Successful result of a socket call.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub pagination: Option<Pagination>,
    pub data: ResponseData,
}

impl Response {
    pub fn object(map: Map<String, Value>) -> Self {
        Self {
            pagination: None,
            data: ResponseData::Object(map),
        }
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self {
            pagination: None,
            data: ResponseData::List(items),
        }
    }

    pub fn paginated(pagination: Pagination, items: Vec<Value>) -> Self {
        Self {
            pagination: Some(pagination),
            data: ResponseData::List(items),
        }
    }

    /// Look up a string field on an object-shaped payload.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.as_object()?.get(key)?.as_str()
    }

    /// Deserialize the data payload, discarding pagination.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, Error> {
        self.data.decode()
    }
}
