use crate::error::{DispatchError, FlowResult};
use crate::flow::ValueStream;
use crate::http::{Body, MutableResponse};
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A full response returned by a handler, mutable or not.
pub enum ResponseValue {
    Mutable(MutableResponse),
    Http(http::Response<Body>),
}

impl ResponseValue {
    /// Promote to a [`MutableResponse`], preserving status, headers, body and attributes.
    #[must_use]
    pub fn into_mutable(self) -> MutableResponse {
        match self {
            ResponseValue::Mutable(response) => response,
            ResponseValue::Http(response) => MutableResponse::from(response),
        }
    }
}

impl fmt::Debug for ResponseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseValue::Mutable(r) => f.debug_tuple("Mutable").field(&r.status()).finish(),
            ResponseValue::Http(r) => f.debug_tuple("Http").field(&r.status()).finish(),
        }
    }
}

/// What a handler produced.
///
/// The materializer turns each shape into a response; see
/// [`RouteExecutor`](crate::dispatcher::RouteExecutor).
pub enum RouteResult {
    /// No value (`null`).
    Empty,
    /// Status only.
    Status(StatusCode),
    Response(ResponseValue),
    Stream(ValueStream),
    /// An optional value; `None` is treated like [`RouteResult::Empty`].
    Optional(Option<Box<RouteResult>>),
    Value(Value),
    /// The handler parked itself; its completion comes from the suspension bridge.
    Suspended,
}

impl RouteResult {
    /// Serialize `value` into a [`RouteResult::Value`].
    pub fn json<T: Serialize>(value: &T) -> FlowResult<Self> {
        serde_json::to_value(value)
            .map(RouteResult::Value)
            .map_err(|e| DispatchError::Codec(e.to_string()))
    }

    #[must_use]
    pub fn optional(value: Option<RouteResult>) -> Self {
        RouteResult::Optional(value.map(Box::new))
    }

    #[must_use]
    pub fn response(response: MutableResponse) -> Self {
        RouteResult::Response(ResponseValue::Mutable(response))
    }

    /// Strip `Optional` layers; an empty optional becomes [`RouteResult::Empty`].
    #[must_use]
    pub fn flatten(self) -> Self {
        match self {
            RouteResult::Optional(Some(inner)) => inner.flatten(),
            RouteResult::Optional(None) => RouteResult::Empty,
            other => other,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, RouteResult::Empty | RouteResult::Optional(None))
    }
}

impl From<Value> for RouteResult {
    fn from(value: Value) -> Self {
        RouteResult::Value(value)
    }
}

impl From<StatusCode> for RouteResult {
    fn from(status: StatusCode) -> Self {
        RouteResult::Status(status)
    }
}

impl From<MutableResponse> for RouteResult {
    fn from(response: MutableResponse) -> Self {
        RouteResult::response(response)
    }
}

impl From<http::Response<Body>> for RouteResult {
    fn from(response: http::Response<Body>) -> Self {
        RouteResult::Response(ResponseValue::Http(response))
    }
}

impl From<ValueStream> for RouteResult {
    fn from(stream: ValueStream) -> Self {
        RouteResult::Stream(stream)
    }
}

impl fmt::Debug for RouteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteResult::Empty => f.write_str("Empty"),
            RouteResult::Status(s) => f.debug_tuple("Status").field(s).finish(),
            RouteResult::Response(r) => f.debug_tuple("Response").field(r).finish(),
            RouteResult::Stream(s) => f.debug_tuple("Stream").field(&s.kind()).finish(),
            RouteResult::Optional(o) => f.debug_tuple("Optional").field(o).finish(),
            RouteResult::Value(v) => f.debug_tuple("Value").field(v).finish(),
            RouteResult::Suspended => f.write_str("Suspended"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_optional_layers() {
        let nested = RouteResult::optional(Some(RouteResult::optional(Some(json!(3).into()))));
        assert!(matches!(nested.flatten(), RouteResult::Value(v) if v == json!(3)));
        assert!(RouteResult::optional(None).flatten().is_empty());
    }

    #[test]
    fn test_json_serializes() {
        #[derive(Serialize)]
        struct Item {
            id: u32,
        }
        let result = RouteResult::json(&Item { id: 42 }).unwrap();
        assert!(matches!(result, RouteResult::Value(v) if v == json!({"id": 42})));
    }
}
