use super::media::MediaType;
use crate::flow::ValueStream;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::Value;
use std::fmt;

/// Body slot of a [`MutableResponse`].
///
/// Serialization to bytes is the codec layer's job; the dispatcher only decides
/// which of these shapes the transport receives.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    /// A fully materialized value.
    Value(Value),
    /// A lazy stream of values, written chunked by the transport.
    Stream(ValueStream),
}

impl Body {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Body::Value(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Value(value)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Body::Stream(s) => f.debug_tuple("Stream").field(&s.kind()).finish(),
        }
    }
}

/// Outbound response built by the dispatcher and handed to the transport.
///
/// Headers are an `http::HeaderMap`: case-insensitive keys, values kept in
/// insertion order per key.
#[derive(Debug)]
pub struct MutableResponse {
    status: StatusCode,
    headers: HeaderMap,
    attributes: Extensions,
    body: Body,
}

impl MutableResponse {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            attributes: Extensions::new(),
            body: Body::Empty,
        }
    }

    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a header by name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Append a header value, keeping existing values for the same name.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replace all values of a header.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    #[must_use]
    pub fn content_type(&self) -> Option<MediaType> {
        self.header(CONTENT_TYPE.as_str()).and_then(MediaType::parse)
    }

    pub fn set_content_type(&mut self, media_type: &MediaType) {
        if let Ok(value) = HeaderValue::from_str(&media_type.to_string()) {
            self.headers.insert(CONTENT_TYPE, value);
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, media_type: &MediaType) -> Self {
        self.set_content_type(media_type);
        self
    }

    /// `Content-Length: 0`, asserted for bodies that can exist but are empty.
    #[must_use]
    pub fn with_zero_content_length(mut self) -> Self {
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(0u64));
        self
    }

    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.set_body(body);
        self
    }

    /// Take the body out, leaving [`Body::Empty`].
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    #[must_use]
    pub fn attributes(&self) -> &Extensions {
        &self.attributes
    }

    #[must_use]
    pub fn attribute<T: Clone + Send + Sync + 'static>(&self) -> Option<&T> {
        self.attributes.get::<T>()
    }

    pub fn set_attribute<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.attributes.insert(value)
    }

    /// Convert into an `http::Response` for the transport; attributes become extensions.
    #[must_use]
    pub fn into_http(self) -> http::Response<Body> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        *response.extensions_mut() = self.attributes;
        response
    }
}

impl From<http::Response<Body>> for MutableResponse {
    /// Promote an immutable `http::Response`, preserving status, every header
    /// value, the body and the extensions.
    fn from(response: http::Response<Body>) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            headers: parts.headers,
            attributes: parts.extensions,
            body,
        }
    }
}
