use super::error_response::{DefaultErrorResponseProcessor, ErrorResponseProcessor};
use super::error_routes::ErrorRouteResolver;
use super::materializer::{resolve_default_content_type, ResponseMaterializer};
use crate::config::ServerConfig;
use crate::error::{DispatchError, FlowResult};
use crate::flow::{panic_message, ExecutionFlow, FlowContext, RequestContext, SuspensionBridge, CURRENT_REQUEST};
use crate::http::{AvailableMethods, ExceptionAttr, MediaType, MutableResponse, Request, RouteInfoAttr, UriTemplate};
use crate::route::{ArgumentSatisfier, CompletenessCheck, RouteInfo, RouteLocator, RouteMatch};
use crate::worker_pool::{ExecutorSelector, WorkerPool};
use http::{Method, StatusCode};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

/// How deep in failure recovery a dispatch is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchDepth {
    /// The matched route.
    Route,
    /// An error route handling the route's failure; its own failures go
    /// straight to the generic error response.
    ErrorRoute,
}

/// Runs matched routes and turns their outcomes into responses.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct RouteExecutor {
    locator: Arc<dyn RouteLocator>,
    satisfier: Arc<dyn ArgumentSatisfier>,
    selector: Option<Arc<dyn ExecutorSelector>>,
    bridge: Option<Arc<dyn SuspensionBridge>>,
    config: Arc<ServerConfig>,
    resolver: ErrorRouteResolver,
    materializer: ResponseMaterializer,
}

impl RouteExecutor {
    /// Executor with the default collaborators: completeness-only argument
    /// checks, no worker pools, no suspension bridge and the error body format
    /// from `config`.
    pub fn new(locator: Arc<dyn RouteLocator>, config: ServerConfig) -> Self {
        let errors: Arc<dyn ErrorResponseProcessor> =
            Arc::new(DefaultErrorResponseProcessor::new(config.error_format));
        Self::assemble(
            locator,
            Arc::new(CompletenessCheck),
            None,
            None,
            Arc::new(config),
            errors,
        )
    }

    fn assemble(
        locator: Arc<dyn RouteLocator>,
        satisfier: Arc<dyn ArgumentSatisfier>,
        selector: Option<Arc<dyn ExecutorSelector>>,
        bridge: Option<Arc<dyn SuspensionBridge>>,
        config: Arc<ServerConfig>,
        errors: Arc<dyn ErrorResponseProcessor>,
    ) -> Self {
        let resolver = ErrorRouteResolver::new(Arc::clone(&locator), Arc::clone(&satisfier));
        let materializer = ResponseMaterializer::new(Arc::clone(&config), errors, bridge.clone());
        Self {
            locator,
            satisfier,
            selector,
            bridge,
            config,
            resolver,
            materializer,
        }
    }

    #[must_use]
    pub fn with_argument_satisfier(self, satisfier: Arc<dyn ArgumentSatisfier>) -> Self {
        let errors = self.materializer.errors();
        Self::assemble(self.locator, satisfier, self.selector, self.bridge, self.config, errors)
    }

    #[must_use]
    pub fn with_executor_selector(mut self, selector: Arc<dyn ExecutorSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    #[must_use]
    pub fn with_suspension_bridge(self, bridge: Arc<dyn SuspensionBridge>) -> Self {
        let errors = self.materializer.errors();
        Self::assemble(self.locator, self.satisfier, self.selector, Some(bridge), self.config, errors)
    }

    #[must_use]
    pub fn with_error_processor(self, errors: Arc<dyn ErrorResponseProcessor>) -> Self {
        Self::assemble(self.locator, self.satisfier, self.selector, self.bridge, self.config, errors)
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Route, dispatch and recover: the whole request in one call.
    ///
    /// An unmatched request goes to a 404 status route when one exists, else
    /// to the generic not-found response. An ambiguous match fails the flow.
    pub fn handle(&self, context: RequestContext, request: Arc<Request>) -> ExecutionFlow<MutableResponse> {
        match self.find_route_match(&request) {
            Ok(Some(route_match)) => self.dispatch(context, route_match, request),
            Ok(None) => {
                debug!(
                    request_id = %request.request_id(),
                    method = %request.method(),
                    path = %request.path(),
                    "No route matched"
                );
                let failure = Arc::new(DispatchError::RouteNotFound {
                    method: request.method().clone(),
                    path: request.path().to_string(),
                });
                match self
                    .resolver
                    .find_status_route(&request, StatusCode::NOT_FOUND, None, Some(failure))
                {
                    Some(route) => self.dispatch_at(context, route, request, DispatchDepth::ErrorRoute),
                    None => ExecutionFlow::just(self.materializer.not_found(&request)),
                }
            }
            Err(e) => {
                error!(
                    request_id = %request.request_id(),
                    path = %request.path(),
                    error = %e,
                    "Ambiguous route match"
                );
                ExecutionFlow::error(e)
            }
        }
    }

    /// Find the single closest route for `request` and stamp the routing
    /// attributes on it.
    ///
    /// For an unmatched `OPTIONS` request, the attributes of any route on the
    /// path are stamped together with the methods available there, and `None`
    /// is returned.
    pub fn find_route_match(&self, request: &Request) -> FlowResult<Option<RouteMatch>> {
        let mut matches = self.locator.find_closest(request);
        if matches.len() > 1 {
            return Err(DispatchError::AmbiguousRoute {
                path: request.path().to_string(),
                candidates: matches
                    .iter()
                    .map(|m| m.info().handler_name.to_string())
                    .collect(),
            });
        }

        if let Some(route_match) = matches.pop() {
            set_route_attributes(request, &route_match);
            return Ok(Some(route_match));
        }

        if *request.method() == Method::OPTIONS {
            let any = self.locator.find_any(request);
            if let Some(first) = any.first() {
                set_route_attributes(request, first);
                let methods: Vec<Method> = any.iter().map(|m| m.info().method.clone()).collect();
                debug!(
                    request_id = %request.request_id(),
                    path = %request.path(),
                    methods = ?methods,
                    "Recorded available methods for OPTIONS"
                );
                request.set_attribute(AvailableMethods(methods));
            }
        }
        Ok(None)
    }

    /// Execute `route_match` and produce its response, recovering failures
    /// through error routes.
    ///
    /// Synchronous handlers yield an already-complete flow. With a cancellable
    /// [`RequestContext`], aborting resolves the flow to
    /// [`DispatchError::Cancelled`]; no response is materialized after that.
    pub fn dispatch(
        &self,
        context: RequestContext,
        route_match: RouteMatch,
        request: Arc<Request>,
    ) -> ExecutionFlow<MutableResponse> {
        self.dispatch_at(context, route_match, request, DispatchDepth::Route)
    }

    fn dispatch_at(
        &self,
        context: RequestContext,
        route_match: RouteMatch,
        request: Arc<Request>,
        depth: DispatchDepth,
    ) -> ExecutionFlow<MutableResponse> {
        let (context, registration) = context.into_parts();
        if context.is_cancelled() {
            return ExecutionFlow::error(DispatchError::Cancelled);
        }

        let flow = self.execute(context, route_match, request, depth);
        match registration {
            Some(registration) => flow.abortable(registration),
            None => flow,
        }
    }

    fn execute(
        &self,
        context: FlowContext,
        route_match: RouteMatch,
        request: Arc<Request>,
        depth: DispatchDepth,
    ) -> ExecutionFlow<MutableResponse> {
        let declaring_type = route_match.info().declaring_type.clone();
        let this = self.clone();
        let recovery_context = context.clone();
        let recovery_request = Arc::clone(&request);

        self.call_route(context, route_match, request).on_error_resume(move |cause| {
            if cause.is_cancelled() {
                return ExecutionFlow::error(cause);
            }
            this.recover(recovery_context, cause, declaring_type.as_deref(), recovery_request, depth)
        })
    }

    /// Failure of a route: dispatch the best error route, or fall back to the
    /// generic error response.
    fn recover(
        &self,
        context: FlowContext,
        cause: DispatchError,
        declaring_type: Option<&str>,
        request: Arc<Request>,
        depth: DispatchDepth,
    ) -> ExecutionFlow<MutableResponse> {
        let cause = Arc::new(cause);
        if depth == DispatchDepth::ErrorRoute {
            return ExecutionFlow::just(self.build_generic_error_response(&request, cause));
        }

        match self.resolver.find_error_route(&cause, declaring_type, &request) {
            Some(error_route) => {
                self.log_exception(&cause, &request);
                info!(
                    request_id = %request.request_id(),
                    error_route = %error_route.info().handler_name,
                    "Dispatching error route"
                );
                self.execute(context, error_route, request, DispatchDepth::ErrorRoute)
            }
            None => ExecutionFlow::just(self.build_generic_error_response(&request, cause)),
        }
    }

    /// Status route for `status`, local to `declaring_type` first, bound as far
    /// as possible.
    #[must_use]
    pub fn find_status_route(
        &self,
        request: &Request,
        status: StatusCode,
        declaring_type: Option<&str>,
    ) -> Option<RouteMatch> {
        self.resolver.find_status_route(request, status, declaring_type, None)
    }

    /// Response for a failure no error route handled.
    ///
    /// The status comes from the failure when it implies one, else 500. The
    /// failure is logged, attached as [`ExceptionAttr`], and the body is rendered
    /// by the configured [`ErrorResponseProcessor`].
    pub fn build_generic_error_response(
        &self,
        request: &Request,
        cause: impl Into<Arc<DispatchError>>,
    ) -> MutableResponse {
        let cause = cause.into();
        self.log_exception(&cause, request);

        let status = cause.error_status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            format!("Internal Server Error: {cause}")
        } else {
            cause.to_string()
        };

        let mut response = self
            .materializer
            .error_response(request, status, &message, Some(&cause));
        response.set_attribute(ExceptionAttr(Arc::clone(&cause)));
        response.set_attribute(RouteInfoAttr(Arc::new(RouteInfo::generic_error(
            request.method().clone(),
            request.path(),
        ))));
        response
    }

    /// Content type for a response that did not set one.
    #[must_use]
    pub fn resolve_default_content_type(&self, request: Option<&Request>, route: &RouteInfo) -> MediaType {
        resolve_default_content_type(request, route)
    }

    /// Run the route on its selected pool, or inline.
    fn call_route(
        &self,
        context: FlowContext,
        route_match: RouteMatch,
        request: Arc<Request>,
    ) -> ExecutionFlow<MutableResponse> {
        let pool = self.find_executor(route_match.info());
        let context = context.with(CURRENT_REQUEST, Arc::clone(&request));
        let suspended = route_match.info().returns.is_suspended;
        let bridge = self.bridge.clone();
        let this = self.clone();

        let supplier = move |context: FlowContext| {
            if suspended {
                if let Some(bridge) = &bridge {
                    bridge.setup_context(&request, &context);
                }
            }
            this.execute_route_and_convert_body(route_match, request, context)
        };

        match pool {
            Some(pool) => {
                debug!(pool = %pool.name(), "Shifting route onto worker pool");
                ExecutionFlow::async_on(pool.as_ref(), context, supplier)
            }
            None => supplier(context.clone()).in_context(context),
        }
    }

    fn find_executor(&self, route: &RouteInfo) -> Option<Arc<dyn WorkerPool>> {
        self.selector
            .as_ref()?
            .select(route, self.config.thread_selection)
    }

    /// Bind missing arguments, invoke the handler and materialize its result.
    fn execute_route_and_convert_body(
        &self,
        route_match: RouteMatch,
        request: Arc<Request>,
        context: FlowContext,
    ) -> ExecutionFlow<MutableResponse> {
        let route_match = if route_match.is_executable() {
            route_match
        } else {
            match self.satisfier.satisfy(route_match, &request, true) {
                Ok(route_match) => route_match,
                Err(e) => return ExecutionFlow::error(e).in_context(context),
            }
        };
        if let Some(missing) = route_match.missing_arguments().next() {
            let e = DispatchError::unsatisfied(missing, "no value bound");
            return ExecutionFlow::error(e).in_context(context);
        }

        debug!(
            request_id = %request.request_id(),
            handler_name = %route_match.info().handler_name,
            "Executing route"
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| route_match.execute(&request, &context)));
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return ExecutionFlow::error(e).in_context(context),
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(
                    request_id = %request.request_id(),
                    handler_name = %route_match.info().handler_name,
                    panic_message = %message,
                    "Handler panicked"
                );
                return ExecutionFlow::error(DispatchError::HandlerPanic(message)).in_context(context);
            }
        };

        if context.is_cancelled() {
            return ExecutionFlow::error(DispatchError::Cancelled).in_context(context);
        }

        self.materializer
            .create_response_for_body(&request, result, &route_match)
            .in_context(context)
    }

    /// Error level, except client-disconnect noise which only warrants debug.
    fn log_exception(&self, cause: &DispatchError, request: &Request) {
        if cause.is_ignorable() {
            debug!(
                request_id = %request.request_id(),
                error = %cause,
                "Swallowed an I/O error caused by client connectivity"
            );
        } else {
            error!(
                request_id = %request.request_id(),
                method = %request.method(),
                path = %request.path(),
                error = %cause,
                "Unexpected error occurred"
            );
        }
    }
}

fn set_route_attributes(request: &Request, route_match: &RouteMatch) {
    let info = route_match.info();
    request.set_attribute(crate::http::MatchedRoute(route_match.clone()));
    request.set_attribute(RouteInfoAttr(Arc::clone(info)));
    request.set_attribute(UriTemplate(Arc::clone(&info.uri_template)));
}
