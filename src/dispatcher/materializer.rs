//! Response materialization: turns whatever a handler produced into a
//! [`MutableResponse`], then finalizes it.

use super::error_response::{ErrorContext, ErrorResponseProcessor};
use crate::config::ServerConfig;
use crate::error::DispatchError;
use crate::flow::{ExecutionFlow, StreamKind, SuspensionBridge, ValueStream};
use crate::http::{permits_request_body, Body, MatchedRoute, MediaType, MutableResponse, Request, RouteInfoAttr};
use crate::route::{ResponseValue, RouteInfo, RouteMatch, RouteResult};
use http::header::{DATE, SERVER, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, StatusCode};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Default response media type when neither the request nor the route decide.
fn fallback_media_type() -> MediaType {
    MediaType::json()
}

/// Content type for a response that did not set one.
///
/// The first accepted type the route can produce wins; otherwise the route's
/// first producible type; otherwise JSON.
#[must_use]
pub fn resolve_default_content_type(request: Option<&Request>, route: &RouteInfo) -> MediaType {
    if let Some(request) = request {
        if let Some(accepted) = request
            .accept()
            .iter()
            .find(|accepted| route.produces.contains(accepted))
        {
            return accepted.clone();
        }
    }
    route
        .produces
        .first()
        .cloned()
        .unwrap_or_else(fallback_media_type)
}

/// `route`'s declared status, or `default`.
fn for_status(route: &RouteInfo, default: StatusCode) -> MutableResponse {
    MutableResponse::new(route.find_status(default))
}

#[derive(Clone)]
pub(crate) struct ResponseMaterializer {
    config: Arc<ServerConfig>,
    errors: Arc<dyn ErrorResponseProcessor>,
    bridge: Option<Arc<dyn SuspensionBridge>>,
}

impl ResponseMaterializer {
    pub(crate) fn new(
        config: Arc<ServerConfig>,
        errors: Arc<dyn ErrorResponseProcessor>,
        bridge: Option<Arc<dyn SuspensionBridge>>,
    ) -> Self {
        Self {
            config,
            errors,
            bridge,
        }
    }

    pub(crate) fn errors(&self) -> Arc<dyn ErrorResponseProcessor> {
        Arc::clone(&self.errors)
    }

    /// Build and finalize the response for `result`.
    pub(crate) fn create_response_for_body(
        &self,
        request: &Arc<Request>,
        result: RouteResult,
        route: &RouteMatch,
    ) -> ExecutionFlow<MutableResponse> {
        let outgoing = self.materialize(request, result, route.info());
        let this = self.clone();
        let request = Arc::clone(request);
        let route = route.clone();
        outgoing.map(move |response| this.finalize(response, &request, &route))
    }

    fn materialize(
        &self,
        request: &Arc<Request>,
        result: RouteResult,
        info: &Arc<RouteInfo>,
    ) -> ExecutionFlow<MutableResponse> {
        let result = result.flatten();
        if result.is_empty() {
            return ExecutionFlow::just(self.no_value(request, info));
        }

        let default_status = if info.is_error_route() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };

        match result {
            RouteResult::Stream(stream) => self.from_reactive(request, stream, info, default_status),
            RouteResult::Suspended => self.from_suspended(request, info, default_status),
            other if info.returns.is_async_or_reactive() => {
                self.from_reactive(request, ValueStream::just(other), info, default_status)
            }
            RouteResult::Status(status) => ExecutionFlow::just(MutableResponse::new(status)),
            _ if info.returns.is_unit => ExecutionFlow::just(for_status(info, default_status)),
            other => self.from_imperative(request, other, info, default_status),
        }
    }

    /// Nothing came back: success for void routes, not found otherwise.
    fn no_value(&self, request: &Request, info: &RouteInfo) -> MutableResponse {
        if info.returns.is_void {
            let response = for_status(info, StatusCode::OK);
            if permits_request_body(request.method()) {
                response.with_zero_content_length()
            } else {
                response
            }
        } else {
            self.not_found(request)
        }
    }

    /// Empty outcome of a single-valued or completion-only stream.
    fn empty_single(&self, request: &Request, info: &RouteInfo, completable: bool) -> MutableResponse {
        if completable || info.returns.is_void {
            for_status(info, StatusCode::OK).with_zero_content_length()
        } else {
            self.not_found(request)
        }
    }

    fn from_imperative(
        &self,
        request: &Arc<Request>,
        result: RouteResult,
        info: &Arc<RouteInfo>,
        default_status: StatusCode,
    ) -> ExecutionFlow<MutableResponse> {
        match result {
            RouteResult::Response(response) => self.from_response(request, response, info),
            RouteResult::Status(status) => ExecutionFlow::just(MutableResponse::new(status)),
            RouteResult::Value(value) => ExecutionFlow::just(for_status(info, default_status).with_body(value)),
            RouteResult::Stream(stream) => self.process_stream_body(
                request,
                for_status(info, default_status).with_body(Body::Stream(stream)),
                info,
            ),
            RouteResult::Optional(Some(inner)) => self.from_imperative(request, *inner, info, default_status),
            RouteResult::Empty | RouteResult::Optional(None) => {
                ExecutionFlow::just(for_status(info, default_status))
            }
            RouteResult::Suspended => ExecutionFlow::error(DispatchError::MissingContinuation {
                handler: info.handler_name.to_string(),
            }),
        }
    }

    /// A handler-built response: promote it and resolve a stream body.
    fn from_response(
        &self,
        request: &Arc<Request>,
        response: ResponseValue,
        info: &Arc<RouteInfo>,
    ) -> ExecutionFlow<MutableResponse> {
        let response = response.into_mutable();
        if response.body().is_stream() {
            self.process_stream_body(request, response, info)
        } else {
            ExecutionFlow::just(response)
        }
    }

    fn from_suspended(
        &self,
        request: &Arc<Request>,
        info: &Arc<RouteInfo>,
        default_status: StatusCode,
    ) -> ExecutionFlow<MutableResponse> {
        let completion = self.bridge.as_ref().and_then(|bridge| bridge.completion(request));
        let Some(completion) = completion else {
            return ExecutionFlow::error(DispatchError::MissingContinuation {
                handler: info.handler_name.to_string(),
            });
        };

        debug!(
            request_id = %request.request_id(),
            handler_name = %info.handler_name,
            "Awaiting suspended handler"
        );
        let this = self.clone();
        let request = Arc::clone(request);
        let info = Arc::clone(info);
        ExecutionFlow::from_future(async move {
            let resumed = completion.await?.map(RouteResult::flatten);
            match resumed {
                Some(RouteResult::Response(response)) => {
                    this.from_response(&request, response, &info).into_future().await
                }
                _ if info.returns.is_unit => Ok(for_status(&info, default_status)),
                None | Some(RouteResult::Empty) => Ok(this.not_found(&request)),
                Some(other) => {
                    this.from_imperative(&request, other, &info, default_status)
                        .into_future()
                        .await
                }
            }
        })
    }

    fn from_reactive(
        &self,
        request: &Arc<Request>,
        stream: ValueStream,
        info: &Arc<RouteInfo>,
        default_status: StatusCode,
    ) -> ExecutionFlow<MutableResponse> {
        let returns = &info.returns;
        let kind = stream.kind();
        let is_single = returns.specified_single
            || (returns.single_result
                && (returns.is_async || returns.is_suspended || kind == StreamKind::Single));
        let is_completable = kind == StreamKind::Completable;

        let this = self.clone();
        let request = Arc::clone(request);
        let info = Arc::clone(info);

        if is_single || is_completable {
            return ExecutionFlow::from_future(async move {
                match stream.first().await? {
                    Some(item) => {
                        this.single_item(&request, item, &info, default_status, is_completable)
                            .into_future()
                            .await
                    }
                    None => Ok(this.empty_single(&request, &info, is_completable)),
                }
            });
        }

        if returns.response_stream {
            // Items are whole responses; the first one is the response.
            return ExecutionFlow::from_future(async move {
                match stream.first().await? {
                    Some(item) => {
                        this.single_item(&request, item, &info, default_status, false)
                            .into_future()
                            .await
                    }
                    None => Ok(this.not_found(&request)),
                }
            });
        }

        let response = for_status(&info, default_status).with_body(Body::Stream(stream));
        this.process_stream_body(&request, response, &info)
    }

    fn single_item(
        &self,
        request: &Arc<Request>,
        item: RouteResult,
        info: &Arc<RouteInfo>,
        default_status: StatusCode,
        completable: bool,
    ) -> ExecutionFlow<MutableResponse> {
        match item.flatten() {
            RouteResult::Empty | RouteResult::Optional(None) => {
                ExecutionFlow::just(self.empty_single(request, info, completable))
            }
            RouteResult::Response(response) => self.from_response(request, response, info),
            RouteResult::Status(status) => ExecutionFlow::just(for_status(info, status)),
            other => self.from_imperative(request, other, info, default_status),
        }
    }

    /// Resolve a stream body: single-valued streams are awaited into a plain
    /// body, anything else is marked for chunked transfer.
    fn process_stream_body(
        &self,
        request: &Arc<Request>,
        mut response: MutableResponse,
        info: &RouteInfo,
    ) -> ExecutionFlow<MutableResponse> {
        let stream = match response.take_body() {
            Body::Stream(stream) => stream,
            other => {
                response.set_body(other);
                return ExecutionFlow::just(response);
            }
        };

        if stream.kind() == StreamKind::Single {
            return ExecutionFlow::from_future(async move {
                if let Some(item) = stream.first().await? {
                    response.set_body(item_body(item));
                }
                Ok(response)
            });
        }

        let media_type = response
            .content_type()
            .unwrap_or_else(|| resolve_default_content_type(Some(request), info));
        response.set_header(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        response.set_content_type(&media_type);
        response.set_body(Body::Stream(stream));
        ExecutionFlow::just(response)
    }

    /// Final touches on every route response.
    fn finalize(&self, mut response: MutableResponse, request: &Request, route: &RouteMatch) -> MutableResponse {
        if request.is_head() {
            // Dropping the body releases buffers and cancels a pending stream.
            drop(response.take_body());
            response.headers_mut().remove(TRANSFER_ENCODING);
        } else if matches!(response.body(), Body::Value(_)) && response.content_type().is_none() {
            let media_type = resolve_default_content_type(Some(request), route.info());
            response.set_content_type(&media_type);
        }
        self.apply_configured_headers(response.headers_mut());
        response.set_attribute(MatchedRoute(route.clone()));
        response.set_attribute(RouteInfoAttr(Arc::clone(route.info())));
        response
    }

    /// `Date` and `Server` headers, each only when configured and absent.
    pub(crate) fn apply_configured_headers(&self, headers: &mut HeaderMap) {
        if self.config.date_header && !headers.contains_key(DATE) {
            let date = httpdate::fmt_http_date(SystemTime::now());
            if let Ok(value) = HeaderValue::from_str(&date) {
                headers.insert(DATE, value);
            }
        }
        if let Some(server) = self.config.server_header.as_deref() {
            if !headers.contains_key(SERVER) {
                match HeaderValue::from_str(server) {
                    Ok(value) => {
                        headers.insert(SERVER, value);
                    }
                    Err(e) => warn!(server, error = %e, "Invalid Server header value"),
                }
            }
        }
    }

    /// The generic 404 response.
    pub(crate) fn not_found(&self, request: &Request) -> MutableResponse {
        self.error_response(request, StatusCode::NOT_FOUND, "Page Not Found", None)
    }

    /// A generic error response: rendered body, configured headers, JSON
    /// content type and no body for `HEAD`.
    pub(crate) fn error_response(
        &self,
        request: &Request,
        status: StatusCode,
        message: &str,
        cause: Option<&DispatchError>,
    ) -> MutableResponse {
        let context = ErrorContext {
            request,
            status,
            message,
            cause,
        };
        let mut response = self.errors.process(&context, MutableResponse::new(status));
        self.apply_configured_headers(response.headers_mut());
        if request.is_head() {
            drop(response.take_body());
        } else if response.content_type().is_none() {
            response.set_content_type(&MediaType::json());
        }
        response
    }
}

/// Body for a single stream item.
fn item_body(item: RouteResult) -> Body {
    match item.flatten() {
        RouteResult::Value(value) => Body::Value(value),
        RouteResult::Stream(stream) => Body::Stream(stream),
        _ => Body::Empty,
    }
}
