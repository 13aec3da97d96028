//! # Route Model
//!
//! What the dispatcher knows about a handler ([`RouteInfo`]), a handler matched
//! for one request ([`RouteMatch`]), what a handler returns ([`RouteResult`]),
//! and the collaborator seams it consults: [`RouteLocator`] for the route table
//! and [`ArgumentSatisfier`] for argument binding.
//!
//! Route matching and argument binding themselves live outside this crate.

mod collaborators;
mod info;
mod matching;
mod result;

pub use collaborators::{ArgumentSatisfier, CompletenessCheck, RouteLocator};
pub use info::{ErrorMatcher, ErrorRouteSpec, ReturnClassification, RouteInfo};
pub use matching::{ArgumentVec, HandlerCall, RouteHandler, RouteMatch, MAX_INLINE_ARGS};
pub use result::{ResponseValue, RouteResult};
