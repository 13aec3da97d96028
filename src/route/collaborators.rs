use super::RouteMatch;
use crate::error::{DispatchError, FlowResult};
use crate::http::Request;

/// The route table, as seen by the dispatcher.
pub trait RouteLocator: Send + Sync {
    /// Closest matches for the request. More than one is an ambiguity.
    fn find_closest(&self, request: &Request) -> Vec<RouteMatch>;

    /// Routes on the request's path regardless of method.
    fn find_any(&self, request: &Request) -> Vec<RouteMatch> {
        let _ = request;
        Vec::new()
    }

    /// Every registered error route, exception and status, local and global.
    fn error_routes(&self) -> Vec<RouteMatch>;
}

/// Binds request data to handler arguments.
pub trait ArgumentSatisfier: Send + Sync {
    /// Bind what can be bound. With `must_be_complete`, any required argument
    /// left unbound is a failure.
    fn satisfy(&self, route: RouteMatch, request: &Request, must_be_complete: bool) -> FlowResult<RouteMatch>;
}

/// Satisfier that binds nothing and only enforces completeness.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompletenessCheck;

impl ArgumentSatisfier for CompletenessCheck {
    fn satisfy(&self, route: RouteMatch, _request: &Request, must_be_complete: bool) -> FlowResult<RouteMatch> {
        if must_be_complete {
            if let Some(missing) = route.missing_arguments().next() {
                return Err(DispatchError::unsatisfied(missing, "no value bound"));
            }
        }
        Ok(route)
    }
}
