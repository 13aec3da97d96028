//! # Value Streams
//!
//! Lazy, possibly multi-valued handler results. A [`ValueStream`] is either a
//! single-valued stream (at most one item), a multi-valued stream, or a
//! completion-only stream that signals success without any item.
//!
//! Handlers that produce values over time use [`channel()`]:
//!
//! ```rust
//! use routeflow::flow::{channel, StreamKind};
//! use routeflow::route::RouteResult;
//! use serde_json::json;
//!
//! let (sender, stream) = channel(StreamKind::Multi);
//! std::thread::spawn(move || {
//!     for i in 0..3 {
//!         sender.send(RouteResult::Value(json!({ "tick": i })));
//!     }
//! });
//! assert_eq!(stream.kind(), StreamKind::Multi);
//! ```

use crate::error::{DispatchError, FlowResult};
use crate::route::RouteResult;
use futures::channel::mpsc;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use futures::Future;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Cardinality of a [`ValueStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Zero or one item.
    Single,
    /// Any number of items.
    Multi,
    /// No items; only completion or failure.
    Completable,
}

/// A lazy stream of handler results with a known cardinality.
pub struct ValueStream {
    kind: StreamKind,
    inner: BoxStream<'static, FlowResult<RouteResult>>,
}

impl ValueStream {
    pub fn new<S>(kind: StreamKind, stream: S) -> Self
    where
        S: Stream<Item = FlowResult<RouteResult>> + Send + 'static,
    {
        Self {
            kind,
            inner: stream.boxed(),
        }
    }

    /// Single-valued stream of an already known item.
    #[must_use]
    pub fn just(item: RouteResult) -> Self {
        Self::new(StreamKind::Single, stream::once(async move { Ok(item) }))
    }

    /// Single-valued stream resolved by a future; `Ok(None)` completes empty.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = FlowResult<Option<RouteResult>>> + Send + 'static,
    {
        let items = stream::once(future).filter_map(|outcome| async move { outcome.transpose() });
        Self::new(StreamKind::Single, items)
    }

    /// Completion-only stream resolved by a future.
    pub fn completable<F>(future: F) -> Self
    where
        F: Future<Output = FlowResult<()>> + Send + 'static,
    {
        let items = stream::once(future).filter_map(|outcome| async move { outcome.err().map(Err) });
        Self::new(StreamKind::Completable, items)
    }

    /// A stream that completes without items.
    #[must_use]
    pub fn empty(kind: StreamKind) -> Self {
        Self::new(kind, stream::empty())
    }

    /// Multi-valued stream over already known items.
    pub fn iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = RouteResult>,
        I::IntoIter: Send + 'static,
    {
        Self::new(StreamKind::Multi, stream::iter(items.into_iter().map(Ok)))
    }

    /// A stream that fails immediately.
    #[must_use]
    pub fn failed(kind: StreamKind, error: DispatchError) -> Self {
        Self::new(kind, stream::once(async move { Err(error) }))
    }

    #[must_use]
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// First item, dropping (and so cancelling) the rest of the stream.
    pub async fn first(mut self) -> FlowResult<Option<RouteResult>> {
        self.inner.next().await.transpose()
    }

    /// Items as JSON values for the transport's chunk writer.
    ///
    /// Empty items are skipped; nested streams and full responses are not
    /// valid stream items and surface as [`DispatchError::Codec`].
    pub fn into_values(self) -> BoxStream<'static, FlowResult<Value>> {
        self.inner
            .filter_map(|item| async move {
                match item {
                    Ok(result) => item_value(result).transpose(),
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed()
    }
}

fn item_value(result: RouteResult) -> FlowResult<Option<Value>> {
    match result {
        RouteResult::Value(value) => Ok(Some(value)),
        RouteResult::Empty | RouteResult::Optional(None) => Ok(None),
        RouteResult::Optional(Some(inner)) => item_value(*inner),
        other => Err(DispatchError::Codec(format!(
            "unsupported stream item: {other:?}"
        ))),
    }
}

impl Stream for ValueStream {
    type Item = FlowResult<RouteResult>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for ValueStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueStream")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Producer side of a [`channel()`].
///
/// Clone this to send items from multiple coroutines. Dropping every sender
/// completes the stream.
#[derive(Clone)]
pub struct StreamSender {
    tx: mpsc::UnboundedSender<FlowResult<RouteResult>>,
}

impl StreamSender {
    /// Queue an item. Returns `false` once the consumer is gone, e.g. because
    /// the request was cancelled or a `HEAD` response dropped the body.
    pub fn send(&self, item: RouteResult) -> bool {
        self.tx.unbounded_send(Ok(item)).is_ok()
    }

    pub fn send_value(&self, value: Value) -> bool {
        self.send(RouteResult::Value(value))
    }

    /// Fail the stream; the consumer sees the error as its next item.
    pub fn fail(&self, error: DispatchError) -> bool {
        self.tx.unbounded_send(Err(error)).is_ok()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a stream fed by a [`StreamSender`].
#[must_use]
pub fn channel(kind: StreamKind) -> (StreamSender, ValueStream) {
    let (tx, rx) = mpsc::unbounded();
    (StreamSender { tx }, ValueStream::new(kind, rx))
}
