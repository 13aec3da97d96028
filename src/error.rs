//! # Error Module
//!
//! Every failure the engine observes, whether thrown synchronously by a handler,
//! raised by a collaborator, or produced by a pool task or stream, is normalized
//! into [`DispatchError`] before any recovery logic runs.
//!
//! ## Failure types
//!
//! Error routes are matched against a failure's *type chain*: the failure's own
//! type name followed by its ancestors, always ending in [`ROOT_FAILURE_TYPE`].
//! A route registered for `"InventoryError"` therefore catches a
//! `HandlerFailure::new("OutOfStock", ..).extends("InventoryError")`, while a route
//! registered for `"OutOfStock"` is preferred because it sits earlier in the chain.
//!
//! ## Status mapping
//!
//! [`DispatchError::error_status`] tells the error-route resolver which status
//! route to try when no exception route matched:
//!
//! | Failure | Status |
//! |---|---|
//! | `UnsatisfiedArgument`, `Codec` | 400 |
//! | `Status { status, .. }` | `status` |
//! | `Handler` carrying a status | that status |
//! | `RouteNotFound` | 404 |
//! | `PoolRejected` | 503 |

use http::{Method, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::borrow::Cow;

/// Root of every failure type chain.
pub const ROOT_FAILURE_TYPE: &str = "Error";

/// Result type used throughout the dispatch pipeline.
pub type FlowResult<T> = Result<T, DispatchError>;

/// Failure type names, most specific first.
pub type TypeChain = SmallVec<[Cow<'static, str>; 4]>;

/// Client-disconnect noise: connection reset/closed/aborted/broken and broken pipe.
static IGNORABLE_ERROR_MESSAGE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)^.*(?:connection (?:reset|closed|abort|broken)|broken pipe).*$").ok()
});

/// A user-defined failure raised by a handler.
///
/// The `kind` names the failure type; `extends` records its ancestors from the
/// nearest parent outwards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerFailure {
    kind: Cow<'static, str>,
    ancestors: SmallVec<[Cow<'static, str>; 3]>,
    message: String,
    status: Option<StatusCode>,
}

impl HandlerFailure {
    pub fn new(kind: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ancestors: SmallVec::new(),
            message: message.into(),
            status: None,
        }
    }

    /// Declare the next ancestor type of this failure.
    #[must_use]
    pub fn extends(mut self, parent: impl Into<Cow<'static, str>>) -> Self {
        self.ancestors.push(parent.into());
        self
    }

    /// Attach an explicit HTTP status, making the failure eligible for status routes.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

/// The failure channel of the dispatch pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// More than one equally specific route matched.
    #[error("More than 1 route matched the incoming request for path [{path}]: {candidates:?}")]
    AmbiguousRoute {
        path: String,
        candidates: Vec<String>,
    },
    /// Nothing in the route table matched.
    #[error("No route matched [{method} {path}]")]
    RouteNotFound { method: Method, path: String },
    /// A required handler argument could not be bound from the request.
    #[error("Required argument [{argument}] not specified: {reason}")]
    UnsatisfiedArgument { argument: String, reason: String },
    /// The request body was not in the expected format.
    #[error("Failed to decode request body: {0}")]
    Codec(String),
    /// A handler or collaborator explicitly asked for a status.
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    /// The handler's own dependency could not be constructed.
    #[error("Failed to instantiate handler [{bean_type}]: {message}")]
    HandlerInstantiation { bean_type: String, message: String },
    #[error(transparent)]
    Handler(#[from] HandlerFailure),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("Handler panicked: {0}")]
    HandlerPanic(String),
    /// A worker pool refused the task (closed or over its queue bound).
    #[error("Worker pool [{pool}] rejected the task: {reason}")]
    PoolRejected { pool: String, reason: String },
    /// A handler reported it was suspended but no completion could be obtained.
    #[error("Suspended handler [{handler}] has no continuation to await")]
    MissingContinuation { handler: String },
    /// The transport aborted the request.
    #[error("Request cancelled")]
    Cancelled,
}

impl DispatchError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn unsatisfied(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsatisfiedArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Failure type names, most specific first, ending with [`ROOT_FAILURE_TYPE`].
    #[must_use]
    pub fn type_chain(&self) -> TypeChain {
        let mut chain = TypeChain::new();
        match self {
            Self::AmbiguousRoute { .. } => {
                chain.push(Cow::Borrowed("DuplicateRoute"));
                chain.push(Cow::Borrowed("Routing"));
            }
            Self::RouteNotFound { .. } => {
                chain.push(Cow::Borrowed("RouteNotFound"));
                chain.push(Cow::Borrowed("Routing"));
            }
            Self::UnsatisfiedArgument { .. } => {
                chain.push(Cow::Borrowed("UnsatisfiedRoute"));
                chain.push(Cow::Borrowed("Routing"));
            }
            Self::Codec(_) => chain.push(Cow::Borrowed("Codec")),
            Self::Status { .. } => chain.push(Cow::Borrowed("HttpStatus")),
            Self::HandlerInstantiation { .. } => {
                chain.push(Cow::Borrowed("HandlerInstantiation"));
            }
            Self::Handler(failure) => {
                chain.push(failure.kind.clone());
                chain.extend(failure.ancestors.iter().cloned());
            }
            Self::Io(_) => chain.push(Cow::Borrowed("Io")),
            Self::HandlerPanic(_) => chain.push(Cow::Borrowed("Panic")),
            Self::PoolRejected { .. } => chain.push(Cow::Borrowed("PoolRejected")),
            Self::MissingContinuation { .. } => {
                chain.push(Cow::Borrowed("MissingContinuation"));
            }
            Self::Cancelled => chain.push(Cow::Borrowed("Cancelled")),
        }
        chain.push(Cow::Borrowed(ROOT_FAILURE_TYPE));
        chain
    }

    /// Position of `type_name` in this failure's type chain; lower is more specific.
    #[must_use]
    pub fn type_distance(&self, type_name: &str) -> Option<usize> {
        self.type_chain().iter().position(|t| t == type_name)
    }

    /// Status implied by the failure, used for status-route fallback.
    #[must_use]
    pub fn error_status(&self) -> Option<StatusCode> {
        match self {
            Self::UnsatisfiedArgument { .. } | Self::Codec(_) => Some(StatusCode::BAD_REQUEST),
            Self::Status { status, .. } => Some(*status),
            Self::Handler(failure) => failure.status,
            Self::RouteNotFound { .. } => Some(StatusCode::NOT_FOUND),
            Self::PoolRejected { .. } => Some(StatusCode::SERVICE_UNAVAILABLE),
            _ => None,
        }
    }

    /// Root handler type for instantiation failures.
    #[must_use]
    pub fn instantiation_root_type(&self) -> Option<&str> {
        match self {
            Self::HandlerInstantiation { bean_type, .. } => Some(bean_type),
            _ => None,
        }
    }

    /// `true` for client-disconnect I/O noise that is logged at debug level only.
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        match self {
            Self::Io(err) => is_ignorable_message(&err.to_string()),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Check a message against the client-disconnect pattern.
#[must_use]
pub fn is_ignorable_message(message: &str) -> bool {
    IGNORABLE_ERROR_MESSAGE
        .as_ref()
        .is_some_and(|re| re.is_match(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_handler_failure_chain_ends_with_root() {
        let err: DispatchError = HandlerFailure::new("OutOfStock", "no widgets")
            .extends("InventoryError")
            .into();
        let chain: Vec<String> = err.type_chain().iter().map(|c| c.to_string()).collect();
        assert_eq!(chain, vec!["OutOfStock", "InventoryError", "Error"]);
        assert_eq!(err.type_distance("InventoryError"), Some(1));
        assert_eq!(err.type_distance("Unrelated"), None);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            DispatchError::unsatisfied("id", "missing").error_status(),
            Some(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            DispatchError::Codec("bad json".into()).error_status(),
            Some(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            DispatchError::status(StatusCode::CONFLICT, "taken").error_status(),
            Some(StatusCode::CONFLICT)
        );
        assert_eq!(DispatchError::HandlerPanic("boom".into()).error_status(), None);
        let failure = HandlerFailure::new("Gone", "gone").with_status(StatusCode::GONE);
        assert_eq!(
            DispatchError::from(failure).error_status(),
            Some(StatusCode::GONE)
        );
    }

    #[test]
    fn test_ignorable_io_messages() {
        for msg in [
            "Connection reset by peer",
            "connection closed before message completed",
            "CONNECTION ABORTED",
            "Broken pipe (os error 32)",
            "write failed: connection broken",
        ] {
            let err = DispatchError::Io(io::Error::new(io::ErrorKind::Other, msg));
            assert!(err.is_ignorable(), "{msg}");
        }
        let err = DispatchError::Io(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(!err.is_ignorable());
        // Only I/O failures are ever ignorable
        assert!(!DispatchError::HandlerPanic("broken pipe".into()).is_ignorable());
    }

    #[test]
    fn test_instantiation_root_type() {
        let err = DispatchError::HandlerInstantiation {
            bean_type: "PetController".into(),
            message: "db down".into(),
        };
        assert_eq!(err.instantiation_root_type(), Some("PetController"));
        assert_eq!(DispatchError::Cancelled.instantiation_root_type(), None);
    }
}
