//! Suspension support for handlers that park and resume later.
//!
//! A suspendable handler returns [`RouteResult::Suspended`] and keeps a
//! [`Continuation`]; whoever finishes the work calls [`Continuation::resume`].
//! The dispatcher asks its [`SuspensionBridge`] for the completion future and
//! builds the response once it resolves.

use super::FlowContext;
use crate::error::{DispatchError, FlowResult};
use crate::http::Request;
use crate::route::RouteResult;
use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Eventual outcome of a suspended handler. `Ok(None)` means it finished
/// without a value.
pub type Completion = BoxFuture<'static, FlowResult<Option<RouteResult>>>;

/// Glue between the dispatcher and a suspension mechanism.
pub trait SuspensionBridge: Send + Sync {
    /// Prepare per-request suspension state before a suspendable handler runs.
    ///
    /// Runs on whichever thread executes the handler, with the flow context of
    /// the dispatch.
    fn setup_context(&self, request: &Arc<Request>, context: &FlowContext);

    /// Completion of a handler that reported itself suspended, or `None` when
    /// no suspension state exists for the request.
    fn completion(&self, request: &Arc<Request>) -> Option<Completion>;
}

struct Slot {
    sender: Mutex<Option<oneshot::Sender<FlowResult<Option<RouteResult>>>>>,
    receiver: Mutex<Option<oneshot::Receiver<FlowResult<Option<RouteResult>>>>>,
    context: FlowContext,
}

/// Resumption handle of a suspended handler. Resumes at most once.
#[derive(Clone)]
pub struct Continuation {
    slot: Arc<Slot>,
}

impl Continuation {
    fn new(context: FlowContext) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            slot: Arc::new(Slot {
                sender: Mutex::new(Some(tx)),
                receiver: Mutex::new(Some(rx)),
                context,
            }),
        }
    }

    /// Resume with a value. Returns `false` if already resumed or nobody waits.
    pub fn resume(&self, value: RouteResult) -> bool {
        self.complete(Ok(Some(value)))
    }

    /// Resume without a value.
    pub fn resume_empty(&self) -> bool {
        self.complete(Ok(None))
    }

    pub fn resume_with_error(&self, error: DispatchError) -> bool {
        self.complete(Err(error))
    }

    /// Flow context captured when the handler was set up; carries the current request.
    #[must_use]
    pub fn context(&self) -> &FlowContext {
        &self.slot.context
    }

    fn complete(&self, outcome: FlowResult<Option<RouteResult>>) -> bool {
        match self.slot.sender.lock().take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    fn take_completion(&self) -> Option<Completion> {
        let rx = self.slot.receiver.lock().take()?;
        // A continuation dropped without resuming completes empty.
        Some(rx.map(|outcome| outcome.unwrap_or(Ok(None))).boxed())
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("resumed", &self.slot.sender.lock().is_none())
            .finish()
    }
}

/// Default bridge: one [`Continuation`] per request, kept in the request's
/// attributes until the dispatcher collects its completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContinuationBridge;

impl SuspensionBridge for ContinuationBridge {
    fn setup_context(&self, request: &Arc<Request>, context: &FlowContext) {
        if request
            .set_attribute(Continuation::new(context.clone()))
            .is_some()
        {
            debug!(
                request_id = %request.request_id(),
                "Replaced an unused continuation"
            );
        }
    }

    fn completion(&self, request: &Arc<Request>) -> Option<Completion> {
        // Removing the attribute leaves the handler's clone as the only sender.
        request.remove_attribute::<Continuation>()?.take_completion()
    }
}
