use crate::http::Request;
use futures::future::{AbortHandle, AbortRegistration};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Context key under which the dispatcher stores the current [`Request`].
pub const CURRENT_REQUEST: &str = "routeflow.current-request";

type Entries = HashMap<&'static str, Arc<dyn Any + Send + Sync>>;

/// Request-scoped context carried explicitly through flow transformations and
/// across worker pool boundaries.
///
/// Cloning is cheap (shared map); adding an entry copies the map only when it
/// is shared. Nothing here lives in thread-local storage, so the same context is
/// visible whichever coroutine or pool thread resumes the request.
#[derive(Clone, Default)]
pub struct FlowContext {
    entries: Arc<Entries>,
    abort: Option<AbortHandle>,
}

impl FlowContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a value under `key`, replacing any previous value.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, key: &'static str, value: Arc<T>) -> Self {
        Arc::make_mut(&mut self.entries).insert(key, value);
        self
    }

    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = Arc::clone(self.entries.get(key)?);
        value.downcast::<T>().ok()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The request being dispatched, if the dispatcher has attached it.
    #[must_use]
    pub fn current_request(&self) -> Option<Arc<Request>> {
        self.get::<Request>(CURRENT_REQUEST)
    }

    /// `true` once the transport aborted the request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortHandle::is_aborted)
    }

    /// Layer `inner` over `self`: inner entries win, the abort handle is kept
    /// from whichever side has one.
    #[must_use]
    pub fn merged_with(self, inner: FlowContext) -> Self {
        let abort = inner.abort.or(self.abort);
        let entries = if inner.entries.is_empty() {
            self.entries
        } else if self.entries.is_empty() {
            inner.entries
        } else {
            let mut merged = (*self.entries).clone();
            merged.extend(inner.entries.iter().map(|(k, v)| (*k, Arc::clone(v))));
            Arc::new(merged)
        };
        Self { entries, abort }
    }
}

impl fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&&str> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("FlowContext")
            .field("keys", &keys)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Per-request entry context handed to [`RouteExecutor::dispatch`](crate::dispatcher::RouteExecutor::dispatch).
///
/// Holds the context populated by upstream filters and, for cancellable
/// requests, the registration that ties the dispatch pipeline to the
/// transport's [`AbortHandle`].
#[derive(Default)]
pub struct RequestContext {
    context: FlowContext,
    registration: Option<AbortRegistration>,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context the transport can abort on client disconnect.
    #[must_use]
    pub fn cancellable() -> (Self, AbortHandle) {
        let (handle, registration) = AbortHandle::new_pair();
        let context = FlowContext {
            entries: Arc::default(),
            abort: Some(handle.clone()),
        };
        (
            Self {
                context,
                registration: Some(registration),
            },
            handle,
        )
    }

    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, key: &'static str, value: Arc<T>) -> Self {
        self.context = self.context.with(key, value);
        self
    }

    #[must_use]
    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    pub(crate) fn into_parts(self) -> (FlowContext, Option<AbortRegistration>) {
        (self.context, self.registration)
    }
}
