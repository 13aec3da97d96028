use super::{RouteInfo, RouteResult};
use crate::error::{DispatchError, FlowResult};
use crate::flow::{Continuation, FlowContext};
use crate::http::Request;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Maximum number of arguments stored inline before spilling to the heap.
pub const MAX_INLINE_ARGS: usize = 8;

/// Bound handler arguments, in binding order.
pub type ArgumentVec = SmallVec<[(Arc<str>, Value); MAX_INLINE_ARGS]>;

/// Everything a handler sees when it is invoked.
pub struct HandlerCall<'a> {
    pub request: &'a Arc<Request>,
    pub context: &'a FlowContext,
    arguments: &'a ArgumentVec,
    failure: Option<&'a DispatchError>,
}

impl<'a> HandlerCall<'a> {
    /// Raw argument value; the last binding of a name wins.
    #[must_use]
    pub fn get_argument(&self, name: &str) -> Option<&'a Value> {
        self.arguments
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Deserialize an argument.
    pub fn argument<T: DeserializeOwned>(&self, name: &str) -> FlowResult<T> {
        let value = self
            .get_argument(name)
            .ok_or_else(|| DispatchError::unsatisfied(name, "no value bound"))?;
        T::deserialize(value).map_err(|e| DispatchError::unsatisfied(name, e.to_string()))
    }

    /// The failure an error route is handling.
    #[must_use]
    pub fn failure(&self) -> Option<&'a DispatchError> {
        self.failure
    }

    /// Resumption handle for suspendable handlers.
    #[must_use]
    pub fn continuation(&self) -> Option<Continuation> {
        self.request.attribute::<Continuation>()
    }
}

/// Invokes a handler.
pub trait RouteHandler: Send + Sync {
    fn call(&self, call: &HandlerCall<'_>) -> FlowResult<RouteResult>;
}

struct FnHandler<F>(F);

impl<F> RouteHandler for FnHandler<F>
where
    F: Fn(&HandlerCall<'_>) -> FlowResult<RouteResult> + Send + Sync,
{
    fn call(&self, call: &HandlerCall<'_>) -> FlowResult<RouteResult> {
        (self.0)(call)
    }
}

/// A route resolved for one request: the handler, its facts and the arguments
/// bound so far.
#[derive(Clone)]
pub struct RouteMatch {
    info: Arc<RouteInfo>,
    handler: Arc<dyn RouteHandler>,
    arguments: ArgumentVec,
    required: SmallVec<[Arc<str>; 4]>,
    failure: Option<Arc<DispatchError>>,
}

impl RouteMatch {
    pub fn new(info: Arc<RouteInfo>, handler: Arc<dyn RouteHandler>) -> Self {
        Self {
            info,
            handler,
            arguments: ArgumentVec::new(),
            required: SmallVec::new(),
            failure: None,
        }
    }

    /// Match backed by a closure handler.
    pub fn from_fn<F>(info: RouteInfo, handler: F) -> Self
    where
        F: Fn(&HandlerCall<'_>) -> FlowResult<RouteResult> + Send + Sync + 'static,
    {
        Self::new(Arc::new(info), Arc::new(FnHandler(handler)))
    }

    /// Declare an argument that must be bound before the handler can run.
    #[must_use]
    pub fn requiring(mut self, name: impl Into<Arc<str>>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Bind an argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<Arc<str>>, value: Value) -> Self {
        self.arguments.push((name.into(), value));
        self
    }

    /// Attach the failure an error route is about to handle.
    #[must_use]
    pub fn with_failure(mut self, failure: Arc<DispatchError>) -> Self {
        self.failure = Some(failure);
        self
    }

    #[must_use]
    pub fn info(&self) -> &Arc<RouteInfo> {
        &self.info
    }

    #[must_use]
    pub fn arguments(&self) -> &ArgumentVec {
        &self.arguments
    }

    #[inline]
    #[must_use]
    pub fn get_argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v)
    }

    /// Required arguments with no binding yet.
    pub fn missing_arguments(&self) -> impl Iterator<Item = &str> + '_ {
        self.required
            .iter()
            .map(|name| &**name)
            .filter(move |name| self.get_argument(name).is_none())
    }

    /// `true` when every required argument is bound.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.missing_arguments().next().is_none()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&Arc<DispatchError>> {
        self.failure.as_ref()
    }

    /// Invoke the handler.
    pub fn execute(&self, request: &Arc<Request>, context: &FlowContext) -> FlowResult<RouteResult> {
        let call = HandlerCall {
            request,
            context,
            arguments: &self.arguments,
            failure: self.failure.as_deref(),
        };
        self.handler.call(&call)
    }
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("handler_name", &self.info.handler_name)
            .field("method", &self.info.method)
            .field("uri_template", &self.info.uri_template)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}
