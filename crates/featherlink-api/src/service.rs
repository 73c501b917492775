// Service method → socket wire call
//
// Translates a logical service operation (find/get/create/update/patch/
// remove) into the socket event name and ordered argument list. Stateless;
// the dispatcher never sees an `Endpoint`, only the resulting `WireCall`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Query parameters attached to a service call.
pub type Query = Map<String, Value>;

/// Identifier of a single record. Servers accept either numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    Text(String),
}

impl From<i64> for Id {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<String> for Id {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

impl From<&str> for Id {
    fn from(id: &str) -> Self {
        Self::Text(id.to_owned())
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        match id {
            Id::Number(n) => Value::from(n),
            Id::Text(s) => Value::String(s),
        }
    }
}

/// A logical service operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    Find {
        query: Option<Query>,
    },
    Get {
        id: Id,
        query: Option<Query>,
    },
    Create {
        data: Value,
        query: Option<Query>,
    },
    Update {
        id: Option<Id>,
        data: Value,
        query: Option<Query>,
    },
    Patch {
        id: Option<Id>,
        data: Value,
        query: Option<Query>,
    },
    Remove {
        id: Option<Id>,
        query: Option<Query>,
    },
}

impl Method {
    /// The socket event this method is sent on.
    pub fn socket_event(&self) -> &'static str {
        match self {
            Self::Find { .. } => "find",
            Self::Get { .. } => "get",
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Patch { .. } => "patch",
            Self::Remove { .. } => "removed",
        }
    }

    /// Method-specific positional arguments (without the service path).
    ///
    /// Absent ids become `null`; absent queries become `{}` except for
    /// `remove`, which omits the query argument entirely.
    pub fn socket_args(&self) -> Vec<Value> {
        match self {
            Self::Find { query } => vec![query_or_empty(query.as_ref())],
            Self::Get { id, query } => vec![id.clone().into(), query_or_empty(query.as_ref())],
            Self::Create { data, query } => vec![data.clone(), query_or_empty(query.as_ref())],
            Self::Update { id, data, query } | Self::Patch { id, data, query } => vec![
                id_or_null(id.as_ref()),
                data.clone(),
                query_or_empty(query.as_ref()),
            ],
            Self::Remove { id, query } => {
                let mut args = vec![id_or_null(id.as_ref())];
                if let Some(query) = query {
                    args.push(Value::Object(query.clone()));
                }
                args
            }
        }
    }
}

fn query_or_empty(query: Option<&Query>) -> Value {
    Value::Object(query.cloned().unwrap_or_default())
}

fn id_or_null(id: Option<&Id>) -> Value {
    id.cloned().map_or(Value::Null, Value::from)
}

/// A service path paired with the operation to run on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub path: String,
    pub method: Method,
}

impl Endpoint {
    pub fn new(path: impl Into<String>, method: Method) -> Self {
        Self {
            path: path.into(),
            method,
        }
    }

    pub fn find(path: impl Into<String>, query: Option<Query>) -> Self {
        Self::new(path, Method::Find { query })
    }

    pub fn get(path: impl Into<String>, id: impl Into<Id>, query: Option<Query>) -> Self {
        Self::new(
            path,
            Method::Get {
                id: id.into(),
                query,
            },
        )
    }

    pub fn create(path: impl Into<String>, data: Value, query: Option<Query>) -> Self {
        Self::new(path, Method::Create { data, query })
    }

    pub fn update(
        path: impl Into<String>,
        id: Option<Id>,
        data: Value,
        query: Option<Query>,
    ) -> Self {
        Self::new(path, Method::Update { id, data, query })
    }

    pub fn patch(path: impl Into<String>, id: Option<Id>, data: Value, query: Option<Query>) -> Self {
        Self::new(path, Method::Patch { id, data, query })
    }

    pub fn remove(path: impl Into<String>, id: Option<Id>, query: Option<Query>) -> Self {
        Self::new(path, Method::Remove { id, query })
    }

    /// Build the wire call: event = method name, args = `[path, ..method args]`.
    pub fn wire_call(&self) -> WireCall {
        let mut args = Vec::with_capacity(4);
        args.push(Value::String(self.path.clone()));
        args.extend(self.method.socket_args());
        WireCall::new(self.method.socket_event(), args)
    }
}

/// Event name and ordered arguments, ready to emit.
#[derive(Debug, Clone, PartialEq)]
pub struct WireCall {
    pub path: String,
    pub args: Vec<Value>,
}

impl WireCall {
    pub fn new(path: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            path: path.into(),
            args,
        }
    }
}
