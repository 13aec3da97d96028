use crate::config::ErrorFormat;
use crate::error::DispatchError;
use crate::http::{MediaType, MutableResponse, Request};
use http::StatusCode;
use serde_json::json;

/// What went wrong, for rendering a generic error body.
#[derive(Debug)]
pub struct ErrorContext<'a> {
    pub request: &'a Request,
    pub status: StatusCode,
    pub message: &'a str,
    pub cause: Option<&'a DispatchError>,
}

/// Renders the body of generic error responses (no error route handled the failure).
pub trait ErrorResponseProcessor: Send + Sync {
    fn process(&self, context: &ErrorContext<'_>, response: MutableResponse) -> MutableResponse;
}

/// Built-in renderer driven by [`ErrorFormat`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorResponseProcessor {
    format: ErrorFormat,
}

impl DefaultErrorResponseProcessor {
    #[must_use]
    pub fn new(format: ErrorFormat) -> Self {
        Self { format }
    }
}

impl ErrorResponseProcessor for DefaultErrorResponseProcessor {
    fn process(&self, context: &ErrorContext<'_>, response: MutableResponse) -> MutableResponse {
        match self.format {
            ErrorFormat::Json => response
                .with_body(json!({
                    "error": context.message,
                    "status": context.status.as_u16(),
                    "path": context.request.path(),
                }))
                .with_content_type(&MediaType::json()),
            ErrorFormat::Problem => response
                .with_body(json!({
                    "type": "about:blank",
                    "title": context.status.canonical_reason().unwrap_or("Error"),
                    "status": context.status.as_u16(),
                    "detail": context.message,
                    "instance": context.request.path(),
                }))
                .with_content_type(&MediaType::problem_json()),
            ErrorFormat::None => response,
        }
    }
}
