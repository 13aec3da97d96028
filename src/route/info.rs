use crate::http::MediaType;
use http::{Method, StatusCode};
use std::borrow::Cow;
use std::sync::Arc;

/// Classification of what a handler returns, decided once at registration.
///
/// The materializer branches on these flags and on the tagged
/// [`RouteResult`](super::RouteResult) variant, never on runtime type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnClassification {
    /// No value expected; a missing value is success.
    pub is_void: bool,
    /// Declared unit result of a suspendable handler; never carries a body.
    pub is_unit: bool,
    /// Handler may suspend and resume through a continuation.
    pub is_suspended: bool,
    /// Handler returns a stream.
    pub is_reactive: bool,
    /// Handler returns a deferred single value.
    pub is_async: bool,
    /// At most one value is produced.
    pub single_result: bool,
    /// Explicitly declared single-valued.
    pub specified_single: bool,
    /// Stream items are full responses.
    pub response_stream: bool,
}

impl ReturnClassification {
    const NONE: Self = Self {
        is_void: false,
        is_unit: false,
        is_suspended: false,
        is_reactive: false,
        is_async: false,
        single_result: true,
        specified_single: false,
        response_stream: false,
    };

    /// A plain value (or response, or status).
    #[must_use]
    pub const fn value() -> Self {
        Self::NONE
    }

    /// Nothing is returned.
    #[must_use]
    pub const fn void() -> Self {
        Self {
            is_void: true,
            ..Self::NONE
        }
    }

    /// A single-valued stream.
    #[must_use]
    pub const fn single() -> Self {
        Self {
            is_reactive: true,
            specified_single: true,
            ..Self::NONE
        }
    }

    /// A completion-only stream.
    #[must_use]
    pub const fn completable() -> Self {
        Self {
            is_void: true,
            is_reactive: true,
            single_result: false,
            ..Self::NONE
        }
    }

    /// A multi-valued stream.
    #[must_use]
    pub const fn stream() -> Self {
        Self {
            is_reactive: true,
            single_result: false,
            ..Self::NONE
        }
    }

    /// A multi-valued stream whose items are full responses.
    #[must_use]
    pub const fn response_stream() -> Self {
        Self {
            response_stream: true,
            ..Self::stream()
        }
    }

    /// A deferred single value.
    #[must_use]
    pub const fn deferred() -> Self {
        Self {
            is_async: true,
            ..Self::NONE
        }
    }

    /// A suspendable handler producing a value.
    #[must_use]
    pub const fn suspended() -> Self {
        Self {
            is_suspended: true,
            ..Self::NONE
        }
    }

    /// A suspendable handler with a unit result.
    #[must_use]
    pub const fn suspended_unit() -> Self {
        Self {
            is_void: true,
            is_unit: true,
            is_suspended: true,
            ..Self::NONE
        }
    }

    #[must_use]
    pub const fn is_async_or_reactive(&self) -> bool {
        self.is_async || self.is_reactive
    }
}

impl Default for ReturnClassification {
    fn default() -> Self {
        Self::value()
    }
}

/// What an error route handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorMatcher {
    /// A failure type name, matched against the failure's type chain.
    Exception(Cow<'static, str>),
    Status(StatusCode),
}

/// Error-route registration of a [`RouteInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRouteSpec {
    pub matcher: ErrorMatcher,
    /// Applies to every handler rather than only to its declaring type.
    pub global: bool,
}

/// Immutable facts about a handler, shared by every match of that handler.
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub handler_name: Arc<str>,
    pub method: Method,
    pub uri_template: Arc<str>,
    /// Logical owner of the handler; scopes local error routes.
    pub declaring_type: Option<Arc<str>>,
    /// Producible media types, in preference order.
    pub produces: Vec<MediaType>,
    /// Declared response status, overriding the computed default.
    pub status: Option<StatusCode>,
    pub returns: ReturnClassification,
    pub error_route: Option<ErrorRouteSpec>,
    /// Named worker pool that must run this handler.
    pub execute_on: Option<Arc<str>>,
    /// Handler performs blocking work.
    pub blocking: bool,
}

impl RouteInfo {
    pub fn new(handler_name: impl Into<Arc<str>>, method: Method, uri_template: impl Into<Arc<str>>) -> Self {
        Self {
            handler_name: handler_name.into(),
            method,
            uri_template: uri_template.into(),
            declaring_type: None,
            produces: Vec::new(),
            status: None,
            returns: ReturnClassification::value(),
            error_route: None,
            execute_on: None,
            blocking: false,
        }
    }

    #[must_use]
    pub fn declared_by(mut self, declaring_type: impl Into<Arc<str>>) -> Self {
        self.declaring_type = Some(declaring_type.into());
        self
    }

    #[must_use]
    pub fn producing(mut self, media_type: MediaType) -> Self {
        self.produces.push(media_type);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn returning(mut self, returns: ReturnClassification) -> Self {
        self.returns = returns;
        self
    }

    /// Register as an error route for failures of `type_name` (or its descendants).
    #[must_use]
    pub fn handles_exception(mut self, type_name: impl Into<Cow<'static, str>>) -> Self {
        self.error_route = Some(ErrorRouteSpec {
            matcher: ErrorMatcher::Exception(type_name.into()),
            global: false,
        });
        self
    }

    /// Register as an error route for `status`.
    #[must_use]
    pub fn handles_status(mut self, status: StatusCode) -> Self {
        self.error_route = Some(ErrorRouteSpec {
            matcher: ErrorMatcher::Status(status),
            global: false,
        });
        self
    }

    /// Make the error route apply to every handler.
    #[must_use]
    pub fn global(mut self) -> Self {
        if let Some(spec) = self.error_route.as_mut() {
            spec.global = true;
        }
        self
    }

    #[must_use]
    pub fn execute_on(mut self, pool: impl Into<Arc<str>>) -> Self {
        self.execute_on = Some(pool.into());
        self
    }

    #[must_use]
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    #[must_use]
    pub fn is_error_route(&self) -> bool {
        self.error_route.is_some()
    }

    /// `true` for error routes that apply outside their declaring type.
    #[must_use]
    pub fn is_global_error_route(&self) -> bool {
        self.error_route
            .as_ref()
            .is_some_and(|spec| spec.global || self.declaring_type.is_none())
    }

    /// The declared status if any, otherwise `default`.
    #[must_use]
    pub fn find_status(&self, default: StatusCode) -> StatusCode {
        self.status.unwrap_or(default)
    }

    /// Stand-in route info attached to generic error responses.
    pub(crate) fn generic_error(method: Method, path: &str) -> Self {
        Self::new("generic_error", method, path).handles_status(StatusCode::INTERNAL_SERVER_ERROR).global()
    }
}
