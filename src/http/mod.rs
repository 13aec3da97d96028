//! # HTTP Model
//!
//! The request view the dispatcher reads and annotates, the response it builds,
//! media types for content negotiation, and the typed attributes it stamps.

mod attributes;
mod media;
mod request;
mod response;

pub use attributes::{AvailableMethods, ExceptionAttr, MatchedRoute, RouteInfoAttr, UriTemplate};
pub use media::{parse_accept, MediaType};
pub use request::Request;
pub use response::{Body, MutableResponse};

use http::Method;

/// Whether requests with this method can carry a body.
///
/// `Content-Length: 0` is only asserted on empty responses to such methods.
#[must_use]
pub fn permits_request_body(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::TRACE | Method::CONNECT
    )
}
