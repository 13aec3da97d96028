//! # routeflow
//!
//! **routeflow** is the request dispatch and response materialization core of a
//! coroutine-powered HTTP stack. Given a matched route and the current request,
//! it runs the handler on the right executor and turns whatever came back into a
//! finished response.
//!
//! ## Overview
//!
//! Handlers may return a value, a status, a full response, nothing, a
//! single-valued or multi-valued stream, or suspend themselves and resume later.
//! They may also fail or panic. The dispatcher unifies all of these through
//! [`flow::ExecutionFlow`]: synchronous handlers produce an already-complete flow
//! with no executor hop, everything else completes later.
//!
//! ## Architecture
//!
//! - **[`dispatcher`]** - [`RouteExecutor`]: routing, execution, response
//!   materialization and error-route recovery
//! - **[`flow`]** - Execution flows, request-scoped context, value streams and
//!   suspension support
//! - **[`route`]** - Route facts, matched routes, handler results and the
//!   locator/argument-binding seams
//! - **[`worker_pool`]** - `may` coroutine pools and thread-selection policy
//! - **[`http`]** - Request view, mutable response, media types and attributes
//! - **[`error`]** - The failure type and its type chains
//! - **[`config`]** - Server settings from environment or YAML
//! - **[`logging`]** - `tracing` subscriber setup
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Transport
//!     participant Executor as RouteExecutor
//!     participant Locator as RouteLocator
//!     participant Pool as WorkerPool
//!     participant Handler
//!     participant Materializer
//!
//!     Transport->>Executor: handle(context, request)
//!     Executor->>Locator: find_closest(request)
//!     Locator-->>Executor: RouteMatch
//!     Executor->>Pool: async_on(supplier)
//!     Pool->>Handler: execute(arguments)
//!     Handler-->>Pool: RouteResult
//!     Pool->>Materializer: create_response_for_body
//!     Materializer-->>Executor: MutableResponse
//!
//!     alt Handler failed
//!         Executor->>Locator: error_routes()
//!         Executor->>Handler: error route
//!     end
//!
//!     Executor-->>Transport: ExecutionFlow<MutableResponse>
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use routeflow::config::ServerConfig;
//! use routeflow::dispatcher::RouteExecutor;
//! use routeflow::flow::RequestContext;
//! use routeflow::http::Request;
//! use routeflow::logging::{init_logging, LogConfig};
//! # use routeflow::route::{RouteLocator, RouteMatch};
//! # use std::sync::Arc;
//! # struct Table;
//! # impl RouteLocator for Table {
//! #     fn find_closest(&self, _: &Request) -> Vec<RouteMatch> { Vec::new() }
//! #     fn error_routes(&self) -> Vec<RouteMatch> { Vec::new() }
//! # }
//!
//! init_logging(&LogConfig::from_env()).expect("logging");
//! let executor = RouteExecutor::new(Arc::new(Table), ServerConfig::from_env());
//!
//! let http_request = http::Request::get("/items/42").body(()).unwrap();
//! let (context, abort) = RequestContext::cancellable();
//! let flow = executor.handle(context, Arc::new(Request::from_http(&http_request)));
//! // call `abort.abort()` if the client disconnects
//! let response = flow.block();
//! # drop(abort);
//! ```
//!
//! ## Runtime Configuration
//!
//! - `ROUTEFLOW_LOG_LEVEL`, `ROUTEFLOW_LOG_FORMAT`: logging, see [`logging`]
//! - `ROUTEFLOW_DATE_HEADER`, `ROUTEFLOW_SERVER_HEADER`, `ROUTEFLOW_THREAD_SELECTION`,
//!   `ROUTEFLOW_ERROR_FORMAT`: dispatcher settings, see [`config`]
//! - `ROUTEFLOW_POOL_WORKERS`, `ROUTEFLOW_POOL_QUEUE_BOUND`,
//!   `ROUTEFLOW_BACKPRESSURE_MODE`, `ROUTEFLOW_STACK_SIZE`: pools, see [`worker_pool`]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod flow;
pub mod http;
pub mod ids;
pub mod logging;
pub mod route;
pub mod worker_pool;

pub use config::ServerConfig;
pub use dispatcher::RouteExecutor;
pub use error::{DispatchError, FlowResult, HandlerFailure};
pub use flow::{ExecutionFlow, FlowContext, RequestContext};
pub use route::{RouteInfo, RouteMatch, RouteResult};
