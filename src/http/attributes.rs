//! Typed attribute markers stored in request and response attribute bags.
//!
//! Attribute bags are keyed by type, so each routing decision gets its own
//! newtype rather than a string key.

use crate::error::DispatchError;
use crate::route::{RouteInfo, RouteMatch};
use http::Method;
use std::sync::Arc;

/// The route that matched the request (or produced the response).
#[derive(Clone)]
pub struct MatchedRoute(pub RouteMatch);

/// Classification facts of the route that handled the request.
#[derive(Clone, Debug)]
pub struct RouteInfoAttr(pub Arc<RouteInfo>);

/// URI template of the matched route, e.g. `/items/{id}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UriTemplate(pub Arc<str>);

/// Methods available on a path, recorded for unmatched `OPTIONS` requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvailableMethods(pub Vec<Method>);

/// The failure behind a generic error response.
#[derive(Clone, Debug)]
pub struct ExceptionAttr(pub Arc<DispatchError>);
