use super::media::{parse_accept, MediaType};
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use http::header::ACCEPT;
use http::{Extensions, HeaderMap, Method};
use parking_lot::Mutex;
use std::fmt;

/// Inbound request view handed to the dispatcher by the transport layer.
///
/// Method, path and headers are fixed at construction. The attribute bag is
/// interior-mutable so routing decisions can be stashed on a shared
/// `Arc<Request>` from any pipeline stage, including pool workers.
pub struct Request {
    request_id: RequestId,
    method: Method,
    path: String,
    headers: HeaderMap,
    accept: Vec<MediaType>,
    attributes: Mutex<Extensions>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self::from_parts(method, path.into(), HeaderMap::new())
    }

    /// Build from an `http` request, keeping method, path (without query) and headers.
    pub fn from_http<B>(req: &http::Request<B>) -> Self {
        Self::from_parts(
            req.method().clone(),
            req.uri().path().to_string(),
            req.headers().clone(),
        )
    }

    fn from_parts(method: Method, path: String, headers: HeaderMap) -> Self {
        let accept = headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_accept)
            .collect();
        let request_id = RequestId::from_header_or_new(
            headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()),
        );
        Self {
            request_id,
            method,
            path,
            headers,
            accept,
            attributes: Mutex::new(Extensions::new()),
        }
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Accepted media types, highest quality first.
    #[must_use]
    pub fn accept(&self) -> &[MediaType] {
        &self.accept
    }

    #[must_use]
    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    /// Store an attribute, returning the previous value of the same type.
    pub fn set_attribute<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.attributes.lock().insert(value)
    }

    #[must_use]
    pub fn attribute<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.attributes.lock().get::<T>().cloned()
    }

    pub fn remove_attribute<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.attributes.lock().remove::<T>()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
