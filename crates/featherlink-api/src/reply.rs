// Reply classification
//
// The transport multiplexes success, error, paginated-list and plain-object
// replies over one untyped ack channel. `classify` turns any `RawReply`
// into exactly one outcome. Rule order is fixed: the `"NO ACK"` sentinel
// wins over an error code, which wins over data-shape detection.

use serde_json::{Map, Value};

use crate::error::{Error, RemoteStatus};
use crate::response::{Pagination, Response};

/// Sentinel string the transport acks with when the server never answered.
pub const NO_ACK: &str = "NO ACK";

/// Classify an acknowledgement payload into a response or an error.
pub fn classify(reply: &[Value]) -> Result<Response, Error> {
    if let Some(Value::String(s)) = reply.first() {
        if s == NO_ACK {
            return Err(Error::NotFound);
        }
    }

    if let Some(error) = reply.first().and_then(Value::as_object).and_then(remote_error) {
        return Err(error);
    }

    match reply.last() {
        Some(Value::Object(object)) => Ok(classify_object(object)),
        Some(Value::Array(items)) => Ok(Response::list(items.clone())),
        _ => Err(Error::Unknown),
    }
}

/// An error object is one with an integer `code` from the status table.
fn remote_error(object: &Map<String, Value>) -> Option<Error> {
    let status = object
        .get("code")
        .and_then(Value::as_i64)
        .and_then(RemoteStatus::from_code)?;
    Some(Error::Status {
        status,
        message: object
            .get("message")
            .and_then(Value::as_str)
            .map(String::from),
    })
}

fn classify_object(object: &Map<String, Value>) -> Response {
    if let Some(pagination) = parse_pagination(object) {
        if let Some(Value::Array(items)) = object.get("data") {
            return Response::paginated(pagination, items.clone());
        }
    }
    Response::object(object.clone())
}

/// Extract `{total, limit, skip}` when all three are present and integral.
///
/// Missing or mistyped fields yield `None`; this is not an error.
pub fn parse_pagination(object: &Map<String, Value>) -> Option<Pagination> {
    let field = |key: &str| object.get(key).and_then(Value::as_i64);
    Some(Pagination {
        limit: field("limit")?,
        skip: field("skip")?,
        total: field("total")?,
    })
}
