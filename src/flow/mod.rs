//! # Execution Flow
//!
//! [`ExecutionFlow`] is the uniform "value now or later" abstraction every
//! pipeline stage returns. A flow is either already complete (handlers that
//! return synchronously never touch an executor) or pending on a boxed future.
//!
//! ## Context propagation
//!
//! Each flow carries a [`FlowContext`]. Transformations keep it, and
//! [`ExecutionFlow::async_on`] hands it to the supplier on the worker pool, so
//! request-scoped values stay visible after a thread hop.
//!
//! ## Cancellation
//!
//! [`ExecutionFlow::abortable`] ties a pending flow to an
//! [`AbortRegistration`]. Once aborted the flow is never polled again and
//! resolves to [`DispatchError::Cancelled`].

mod context;
mod continuation;
mod stream;

pub use context::{FlowContext, RequestContext, CURRENT_REQUEST};
pub use continuation::{Completion, Continuation, ContinuationBridge, SuspensionBridge};
pub use stream::{channel, StreamKind, StreamSender, ValueStream};

use crate::error::{DispatchError, FlowResult};
use crate::worker_pool::WorkerPool;
use futures::channel::oneshot;
use futures::future::{AbortRegistration, Abortable, BoxFuture};
use futures::{Future, FutureExt, Stream, StreamExt};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

enum FlowState<T> {
    Complete(FlowResult<T>),
    Pending(BoxFuture<'static, FlowResult<T>>),
}

/// A value or failure, available now or later.
#[must_use = "flows do nothing unless completed or awaited"]
pub struct ExecutionFlow<T> {
    state: FlowState<T>,
    context: FlowContext,
}

impl<T: Send + 'static> ExecutionFlow<T> {
    pub fn just(value: T) -> Self {
        Self::from_result(Ok(value))
    }

    pub fn error(error: DispatchError) -> Self {
        Self::from_result(Err(error))
    }

    pub fn from_result(result: FlowResult<T>) -> Self {
        Self {
            state: FlowState::Complete(result),
            context: FlowContext::new(),
        }
    }

    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = FlowResult<T>> + Send + 'static,
    {
        Self {
            state: FlowState::Pending(future.boxed()),
            context: FlowContext::new(),
        }
    }

    /// Run `supplier` on `pool`, handing it `context`.
    ///
    /// The returned flow completes with whatever flow the supplier produced.
    /// A supplier panic becomes [`DispatchError::HandlerPanic`]; a refused task
    /// becomes the pool's error. The supplier is skipped if the request was
    /// cancelled before a worker picked it up.
    pub fn async_on<F>(pool: &dyn WorkerPool, context: FlowContext, supplier: F) -> Self
    where
        F: FnOnce(FlowContext) -> ExecutionFlow<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<ExecutionFlow<T>>();
        let job_context = context.clone();
        let pool_name = pool.name().to_string();
        let job = Box::new(move || {
            if job_context.is_cancelled() {
                debug!(pool = %pool_name, "Skipping task of a cancelled request");
                return;
            }
            let flow = match catch_unwind(AssertUnwindSafe(|| supplier(job_context))) {
                Ok(flow) => flow,
                Err(panic) => ExecutionFlow::error(DispatchError::HandlerPanic(panic_message(&*panic))),
            };
            // The receiver is gone only when the request was abandoned.
            let _ = tx.send(flow);
        });

        if let Err(error) = pool.execute(job) {
            return Self::error(error).in_context(context);
        }

        let future = async move {
            match rx.await {
                Ok(flow) => flow.into_future().await,
                Err(_) => Err(DispatchError::Cancelled),
            }
        };
        Self::from_future(future).in_context(context)
    }

    /// Transform the value; failures pass through untouched.
    pub fn map<U, F>(self, f: F) -> ExecutionFlow<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let state = match self.state {
            FlowState::Complete(result) => FlowState::Complete(result.map(f)),
            FlowState::Pending(future) => {
                FlowState::Pending(future.map(move |result| result.map(f)).boxed())
            }
        };
        ExecutionFlow {
            state,
            context: self.context,
        }
    }

    /// Chain a flow-returning step; failures pass through untouched.
    pub fn flat_map<U, F>(self, f: F) -> ExecutionFlow<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> ExecutionFlow<U> + Send + 'static,
    {
        let context = self.context;
        match self.state {
            FlowState::Complete(Ok(value)) => f(value).in_context(context),
            FlowState::Complete(Err(error)) => ExecutionFlow::error(error).in_context(context),
            FlowState::Pending(future) => ExecutionFlow::from_future(async move {
                match future.await {
                    Ok(value) => f(value).into_future().await,
                    Err(error) => Err(error),
                }
            })
            .in_context(context),
        }
    }

    /// Replace a failure with the flow produced by `f`.
    pub fn on_error_resume<F>(self, f: F) -> Self
    where
        F: FnOnce(DispatchError) -> ExecutionFlow<T> + Send + 'static,
    {
        let context = self.context;
        match self.state {
            FlowState::Complete(Ok(value)) => Self::just(value).in_context(context),
            FlowState::Complete(Err(error)) => f(error).in_context(context),
            FlowState::Pending(future) => Self::from_future(async move {
                match future.await {
                    Ok(value) => Ok(value),
                    Err(error) => f(error).into_future().await,
                }
            })
            .in_context(context),
        }
    }

    pub fn put_in_context<V: Any + Send + Sync>(mut self, key: &'static str, value: Arc<V>) -> Self {
        self.context = self.context.with(key, value);
        self
    }

    /// Layer this flow's own context over `outer`.
    pub fn in_context(mut self, outer: FlowContext) -> Self {
        self.context = outer.merged_with(self.context);
        self
    }

    #[must_use]
    pub fn context(&self) -> &FlowContext {
        &self.context
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, FlowState::Complete(_))
    }

    /// The outcome if already available, otherwise the flow back.
    pub fn try_complete(self) -> Result<FlowResult<T>, Self> {
        match self.state {
            FlowState::Complete(result) => Ok(result),
            pending => Err(Self {
                state: pending,
                context: self.context,
            }),
        }
    }

    pub fn into_future(self) -> BoxFuture<'static, FlowResult<T>> {
        match self.state {
            FlowState::Complete(result) => futures::future::ready(result).boxed(),
            FlowState::Pending(future) => future,
        }
    }

    /// Tie a pending flow to `registration`; an abort resolves it to
    /// [`DispatchError::Cancelled`] without polling it again.
    pub fn abortable(self, registration: AbortRegistration) -> Self {
        match self.state {
            FlowState::Complete(_) => self,
            FlowState::Pending(future) => ExecutionFlow {
                state: FlowState::Pending(
                    Abortable::new(future, registration)
                        .map(|outcome| outcome.unwrap_or_else(|_| Err(DispatchError::Cancelled)))
                        .boxed(),
                ),
                context: self.context,
            },
        }
    }

    /// Block the calling thread until the flow completes.
    ///
    /// For synchronous transports and tests; async transports should await
    /// [`ExecutionFlow::into_future`] instead.
    pub fn block(self) -> FlowResult<T> {
        match self.try_complete() {
            Ok(result) => result,
            Err(pending) => futures::executor::block_on(pending.into_future()),
        }
    }
}

impl<T: Send + 'static> ExecutionFlow<Option<T>> {
    /// First item of `stream`, or `None` if it completes empty.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = FlowResult<T>> + Send + 'static,
    {
        Self::from_future(async move {
            let mut stream = Box::pin(stream);
            stream.next().await.transpose()
        })
    }
}

impl<T> fmt::Debug for ExecutionFlow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            FlowState::Complete(Ok(_)) => "complete",
            FlowState::Complete(Err(_)) => "failed",
            FlowState::Pending(_) => "pending",
        };
        f.debug_struct("ExecutionFlow")
            .field("state", &state)
            .field("context", &self.context)
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
