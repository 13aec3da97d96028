//! # Dispatcher Module
//!
//! The dispatcher takes a matched route and the current request and produces a
//! finished response, whatever the handler did: returned a value, a status, a
//! full response, nothing, a stream, suspended itself, failed, or panicked.
//!
//! ## Request Flow
//!
//! 1. [`RouteExecutor::find_route_match`] asks the [`RouteLocator`](crate::route::RouteLocator)
//!    for the closest route; more than one is an ambiguity
//! 2. The executor selector picks a worker pool, or the route runs inline
//! 3. Missing arguments are bound, the handler runs under panic recovery
//! 4. The result is materialized by shape and return classification
//! 5. The response is finalized: no body for `HEAD`, configured `Date` and
//!    `Server` headers, route attributes
//!
//! ## Failure Recovery
//!
//! A failing route is handed to the best error route: local to the handler's
//! declaring type before global, most specific failure type first, then status
//! routes by the failure's implied status. An error route that fails itself
//! produces the generic error response; recovery never recurses further.
//!
//! ## Example
//!
//! ```rust
//! use routeflow::config::ServerConfig;
//! use routeflow::dispatcher::RouteExecutor;
//! use routeflow::flow::RequestContext;
//! use routeflow::http::Request;
//! use routeflow::route::{RouteInfo, RouteLocator, RouteMatch, RouteResult};
//! use http::{Method, StatusCode};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Items;
//!
//! impl RouteLocator for Items {
//!     fn find_closest(&self, _request: &Request) -> Vec<RouteMatch> {
//!         let info = RouteInfo::new("get_item", Method::GET, "/items/{id}");
//!         vec![RouteMatch::from_fn(info, |_| Ok(RouteResult::Value(json!({"id": 42}))))]
//!     }
//!
//!     fn error_routes(&self) -> Vec<RouteMatch> {
//!         Vec::new()
//!     }
//! }
//!
//! let executor = RouteExecutor::new(Arc::new(Items), ServerConfig::default());
//! let request = Arc::new(Request::new(Method::GET, "/items/42"));
//! let response = executor.handle(RequestContext::new(), request).block().unwrap();
//! assert_eq!(response.status(), StatusCode::OK);
//! assert_eq!(response.body().as_value(), Some(&json!({"id": 42})));
//! ```

mod core;
mod error_response;
mod error_routes;
mod materializer;

pub use core::RouteExecutor;
pub use error_response::{DefaultErrorResponseProcessor, ErrorContext, ErrorResponseProcessor};
pub use materializer::resolve_default_content_type;
