//! Error-route resolution.
//!
//! Exception routes are searched first, local (same declaring type) before
//! global, and within a scope the route whose failure type sits earliest in the
//! failure's type chain wins. When no exception route applies, the failure's
//! status picks a status route, again local before global.

use crate::error::DispatchError;
use crate::http::Request;
use crate::route::{ArgumentSatisfier, ErrorMatcher, RouteLocator, RouteMatch};
use http::StatusCode;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Copy)]
enum Scope<'a> {
    Local(&'a str),
    Global,
}

impl Scope<'_> {
    fn contains(&self, route: &RouteMatch) -> bool {
        let info = route.info();
        match self {
            Scope::Local(declaring_type) => {
                !info.is_global_error_route() && info.declaring_type.as_deref() == Some(*declaring_type)
            }
            Scope::Global => info.is_global_error_route(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct ErrorRouteResolver {
    locator: Arc<dyn RouteLocator>,
    satisfier: Arc<dyn ArgumentSatisfier>,
}

impl ErrorRouteResolver {
    pub(crate) fn new(locator: Arc<dyn RouteLocator>, satisfier: Arc<dyn ArgumentSatisfier>) -> Self {
        Self { locator, satisfier }
    }

    /// Best error route for `cause`, raised by a handler of `declaring_type`,
    /// with all of its arguments bound.
    pub(crate) fn find_error_route(
        &self,
        cause: &Arc<DispatchError>,
        declaring_type: Option<&str>,
        request: &Request,
    ) -> Option<RouteMatch> {
        let mut declaring_type = declaring_type;
        if let Some(root_type) = cause.instantiation_root_type() {
            if declaring_type == Some(root_type) {
                // The handler's own type cannot be built, so neither can its local error routes.
                debug!(
                    request_id = %request.request_id(),
                    declaring_type = root_type,
                    "Skipping local error routes of a handler that failed to instantiate"
                );
                declaring_type = None;
            }
        }

        let routes = self.locator.error_routes();
        let chain = cause.type_chain();
        let by_exception = |scope: Scope<'_>| {
            routes
                .iter()
                .filter(|route| scope.contains(route))
                .filter_map(|route| match &route.info().error_route.as_ref()?.matcher {
                    ErrorMatcher::Exception(type_name) => chain
                        .iter()
                        .position(|t| t == type_name)
                        .map(|distance| (distance, route)),
                    ErrorMatcher::Status(_) => None,
                })
                .min_by_key(|(distance, _)| *distance)
                .map(|(_, route)| route.clone())
        };

        let found = declaring_type
            .and_then(|d| by_exception(Scope::Local(d)))
            .or_else(|| by_exception(Scope::Global))
            .or_else(|| {
                let status = cause.error_status()?;
                find_by_status(&routes, status, declaring_type)
            })?;

        debug!(
            request_id = %request.request_id(),
            error_route = %found.info().handler_name,
            error = %cause,
            "Found error route"
        );
        self.bind(found.with_failure(Arc::clone(cause)), request)
    }

    /// Status route for `status`, local to `declaring_type` first.
    pub(crate) fn find_status_route(
        &self,
        request: &Request,
        status: StatusCode,
        declaring_type: Option<&str>,
        failure: Option<Arc<DispatchError>>,
    ) -> Option<RouteMatch> {
        let routes = self.locator.error_routes();
        let found = find_by_status(&routes, status, declaring_type)?;
        let found = match failure {
            Some(failure) => found.with_failure(failure),
            None => found,
        };
        self.bind(found, request)
    }

    /// Bind the route's arguments; an error route left with unbound arguments is skipped.
    fn bind(&self, route: RouteMatch, request: &Request) -> Option<RouteMatch> {
        let handler_name = Arc::clone(&route.info().handler_name);
        match self.satisfier.satisfy(route, request, false) {
            Ok(route) if route.is_executable() => Some(route),
            Ok(route) => {
                debug!(
                    request_id = %request.request_id(),
                    error_route = %handler_name,
                    missing = ?route.missing_arguments().collect::<Vec<_>>(),
                    "Error route arguments could not be satisfied"
                );
                None
            }
            Err(e) => {
                debug!(
                    request_id = %request.request_id(),
                    error_route = %handler_name,
                    error = %e,
                    "Error route arguments could not be satisfied"
                );
                None
            }
        }
    }
}

fn find_by_status(routes: &[RouteMatch], status: StatusCode, declaring_type: Option<&str>) -> Option<RouteMatch> {
    let in_scope = |scope: Scope<'_>| {
        routes
            .iter()
            .filter(|route| scope.contains(route))
            .find(|route| {
                matches!(
                    route.info().error_route.as_ref().map(|spec| &spec.matcher),
                    Some(ErrorMatcher::Status(s)) if *s == status
                )
            })
            .cloned()
    };
    declaring_type
        .and_then(|d| in_scope(Scope::Local(d)))
        .or_else(|| in_scope(Scope::Global))
}
