#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end tests for the route executor
//!
//! # Test Coverage
//!
//! - Plain values, statuses, full responses and empty results
//! - Single-valued, completion-only and chunked multi-valued streams
//! - `HEAD` semantics and configured headers
//! - Suspended handlers resumed through the continuation bridge
//! - Worker pool offload, context propagation, rejection and cancellation
//! - Generic fallbacks: 404, 400, 500 and ambiguous matches

mod common;

use common::{request, request_accepting, HeldPool, Table, TestTracing, ThreadPerJob};
use futures::executor::block_on;
use futures::StreamExt;
use http::header::{CONTENT_LENGTH, DATE, SERVER, SET_COOKIE, TRANSFER_ENCODING};
use http::{Method, StatusCode};
use routeflow::config::ServerConfig;
use routeflow::error::{DispatchError, FlowResult, HandlerFailure};
use routeflow::flow::{channel, ContinuationBridge, RequestContext, StreamKind, StreamSender, ValueStream};
use routeflow::http::{
    AvailableMethods, Body, ExceptionAttr, MatchedRoute, MediaType, MutableResponse, RouteInfoAttr, UriTemplate,
};
use routeflow::route::{ReturnClassification, RouteInfo, RouteMatch, RouteResult};
use routeflow::worker_pool::{Job, PoolExecutorSelector, ThreadSelection, WorkerPool};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn get_item() -> RouteMatch {
    RouteMatch::from_fn(
        RouteInfo::new("get_item", Method::GET, "/items/{id}").declared_by("ItemController"),
        |call| {
            let id: i64 = call.argument("id")?;
            Ok(RouteResult::Value(json!({ "id": id })))
        },
    )
    .requiring("id")
}

fn returning(name: &str, method: Method, path: &str, returns: ReturnClassification) -> RouteInfo {
    RouteInfo::new(name.to_string(), method, path.to_string()).returning(returns)
}

fn stream_values(response: &mut MutableResponse) -> Vec<Value> {
    match response.take_body() {
        Body::Stream(stream) => block_on(stream.into_values().map(Result::unwrap).collect()),
        other => panic!("expected a stream body, got {other:?}"),
    }
}

#[test]
fn test_get_item_returns_json_body() {
    let _tracing = TestTracing::init();
    let executor = Table::new().route(get_item()).executor();
    let req = request(Method::GET, "/items/42");

    let flow = executor.handle(RequestContext::new(), Arc::clone(&req));
    assert!(flow.is_complete(), "synchronous handlers never hop executors");

    let response = flow.block().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_value(), Some(&json!({"id": 42})));
    assert_eq!(response.content_type(), Some(MediaType::json()));
    assert!(response.headers().contains_key(DATE));
    assert_eq!(
        response.attribute::<RouteInfoAttr>().unwrap().0.handler_name.as_ref(),
        "get_item"
    );
    assert!(response.attribute::<MatchedRoute>().is_some());
    assert_eq!(req.attribute::<UriTemplate>().unwrap().0.as_ref(), "/items/{id}");
}

#[test]
fn test_value_body_content_type_is_negotiated() {
    let route = RouteMatch::from_fn(
        RouteInfo::new("greeting", Method::GET, "/greeting")
            .producing(MediaType::json())
            .producing(MediaType::plain_text()),
        |_| Ok(RouteResult::Value(json!("hello"))),
    );
    let executor = Table::new().route(route).executor();

    let response = executor
        .handle(
            RequestContext::new(),
            request_accepting(Method::GET, "/greeting", "application/xml, text/plain;q=0.8"),
        )
        .block()
        .unwrap();
    assert_eq!(response.content_type(), Some(MediaType::plain_text()));

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/greeting"))
        .block()
        .unwrap();
    assert_eq!(response.content_type(), Some(MediaType::json()));

    // No body, nothing to describe
    let head = executor
        .handle(RequestContext::new(), request(Method::HEAD, "/greeting"))
        .block()
        .unwrap();
    assert!(head.body().is_empty());
    assert!(head.content_type().is_none());
}

#[test]
fn test_missing_route_is_generic_404() {
    let executor = Table::new().route(get_item()).executor();

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/missing"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.body().as_value(),
        Some(&json!({"error": "Page Not Found", "status": 404, "path": "/missing"}))
    );
    assert_eq!(response.content_type(), Some(MediaType::json()));

    let head = executor
        .handle(RequestContext::new(), request(Method::HEAD, "/missing"))
        .block()
        .unwrap();
    assert_eq!(head.status(), StatusCode::NOT_FOUND);
    assert!(head.body().is_empty());
}

#[test]
fn test_not_found_status_route_handles_unmatched_request() {
    let on_404 = RouteMatch::from_fn(
        RouteInfo::new("not_found_page", Method::GET, "/")
            .handles_status(StatusCode::NOT_FOUND)
            .with_status(StatusCode::NOT_FOUND),
        |call| {
            let failure = call.failure().expect("routing failure attached");
            Ok(RouteResult::Value(json!({ "missing": failure.to_string() })))
        },
    );
    let executor = Table::new().route(get_item()).error_route(on_404).executor();

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/nowhere"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.body().as_value(),
        Some(&json!({"missing": "No route matched [GET /nowhere]"}))
    );
}

#[test]
fn test_options_records_available_methods() {
    let delete = RouteMatch::from_fn(
        RouteInfo::new("delete_item", Method::DELETE, "/items/{id}"),
        |_| Ok(RouteResult::Status(StatusCode::NO_CONTENT)),
    );
    let executor = Table::new().route(get_item()).route(delete).executor();
    let req = request(Method::OPTIONS, "/items/7");

    assert!(executor.find_route_match(&req).unwrap().is_none());
    assert_eq!(
        req.attribute::<AvailableMethods>().unwrap().0,
        vec![Method::GET, Method::DELETE]
    );
    assert_eq!(req.attribute::<UriTemplate>().unwrap().0.as_ref(), "/items/{id}");
}

#[test]
fn test_ambiguous_match_fails_the_flow() {
    let by_slug = RouteMatch::from_fn(
        RouteInfo::new("get_item_by_slug", Method::GET, "/items/{slug}"),
        |_| Ok(RouteResult::Empty),
    );
    let executor = Table::new().route(get_item()).route(by_slug).executor();

    let outcome = executor
        .handle(RequestContext::new(), request(Method::GET, "/items/42"))
        .block();
    match outcome {
        Err(DispatchError::AmbiguousRoute { candidates, .. }) => {
            assert_eq!(candidates, vec!["get_item", "get_item_by_slug"]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[test]
fn test_unbound_argument_uses_400_status_route() {
    let create = RouteMatch::from_fn(RouteInfo::new("create_item", Method::POST, "/items"), |_| {
        Ok(RouteResult::Status(StatusCode::CREATED))
    })
    .requiring("body");
    let on_400 = RouteMatch::from_fn(
        RouteInfo::new("bad_request", Method::POST, "/")
            .handles_status(StatusCode::BAD_REQUEST)
            .with_status(StatusCode::BAD_REQUEST),
        |call| Ok(RouteResult::Value(json!({ "invalid": call.failure().unwrap().to_string() }))),
    );

    let executor = Table::new().route(create.clone()).error_route(on_400).executor();
    let response = executor
        .handle(RequestContext::new(), request(Method::POST, "/items"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body().as_value(),
        Some(&json!({"invalid": "Required argument [body] not specified: no value bound"}))
    );

    // Without a status route the generic response carries the implied status
    let executor = Table::new().route(create).executor();
    let response = executor
        .handle(RequestContext::new(), request(Method::POST, "/items"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body().as_value().unwrap()["error"],
        "Required argument [body] not specified: no value bound"
    );
}

#[test]
fn test_handler_panic_becomes_generic_500() {
    let _tracing = TestTracing::init();
    let route = RouteMatch::from_fn(RouteInfo::new("explode", Method::GET, "/explode"), |_| {
        panic!("boom")
    });
    let executor = Table::new().route(route).executor();

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/explode"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.body().as_value().unwrap()["error"],
        "Internal Server Error: Handler panicked: boom"
    );
    assert!(matches!(
        response.attribute::<ExceptionAttr>().unwrap().0.as_ref(),
        DispatchError::HandlerPanic(_)
    ));
    assert_eq!(
        response.attribute::<RouteInfoAttr>().unwrap().0.handler_name.as_ref(),
        "generic_error"
    );
}

#[test]
fn test_failure_with_status_maps_to_that_status() {
    let route = RouteMatch::from_fn(RouteInfo::new("gone", Method::GET, "/gone"), |_| {
        Err(HandlerFailure::new("Expired", "item expired")
            .with_status(StatusCode::GONE)
            .into())
    });
    let executor = Table::new().route(route).executor();

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/gone"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(response.body().as_value().unwrap()["error"], "item expired");
}

#[test]
fn test_void_and_non_void_empty_results() {
    let void_delete = RouteMatch::from_fn(
        returning("purge", Method::DELETE, "/cache", ReturnClassification::void()),
        |_| Ok(RouteResult::Empty),
    );
    let void_get = RouteMatch::from_fn(
        returning("ping", Method::GET, "/ping", ReturnClassification::void()),
        |_| Ok(RouteResult::Empty),
    );
    let lookup = RouteMatch::from_fn(RouteInfo::new("lookup", Method::GET, "/lookup"), |_| {
        Ok(RouteResult::optional(None))
    });
    let executor = Table::new().route(void_delete).route(void_get).route(lookup).executor();

    let purge = executor
        .handle(RequestContext::new(), request(Method::DELETE, "/cache"))
        .block()
        .unwrap();
    assert_eq!(purge.status(), StatusCode::OK);
    assert_eq!(purge.header(CONTENT_LENGTH.as_str()), Some("0"));
    assert!(purge.body().is_empty());

    let ping = executor
        .handle(RequestContext::new(), request(Method::GET, "/ping"))
        .block()
        .unwrap();
    assert_eq!(ping.status(), StatusCode::OK);
    assert!(!ping.headers().contains_key(CONTENT_LENGTH));

    let missing = executor
        .handle(RequestContext::new(), request(Method::GET, "/lookup"))
        .block()
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.body().as_value().unwrap()["error"], "Page Not Found");
}

#[test]
fn test_declared_status_overrides_default() {
    let route = RouteMatch::from_fn(
        RouteInfo::new("create", Method::POST, "/things").with_status(StatusCode::CREATED),
        |_| Ok(RouteResult::Value(json!({"created": true}))),
    );
    let executor = Table::new().route(route).executor();
    let response = executor
        .handle(RequestContext::new(), request(Method::POST, "/things"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[test]
fn test_status_result_has_no_body() {
    let route = RouteMatch::from_fn(RouteInfo::new("accept", Method::POST, "/jobs"), |_| {
        Ok(RouteResult::Status(StatusCode::ACCEPTED))
    });
    let executor = Table::new().route(route).executor();
    let response = executor
        .handle(RequestContext::new(), request(Method::POST, "/jobs"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.body().is_empty());
}

#[test]
fn test_response_promotion_and_configured_headers() {
    let route = RouteMatch::from_fn(RouteInfo::new("login", Method::POST, "/login"), |_| {
        let response = http::Response::builder()
            .status(StatusCode::SEE_OTHER)
            .header(SET_COOKIE, "session=abc")
            .header(SET_COOKIE, "theme=dark")
            .header(DATE, "Tue, 01 Jan 2030 00:00:00 GMT")
            .body(Body::Empty)
            .unwrap();
        Ok(response.into())
    });
    let config = ServerConfig {
        server_header: Some("routeflow".to_string()),
        ..ServerConfig::default()
    };
    let executor = Table::new().route(route).executor_with(config);

    let response = executor
        .handle(RequestContext::new(), request(Method::POST, "/login"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get_all(SET_COOKIE).iter().count(), 2);
    assert_eq!(response.header(DATE.as_str()), Some("Tue, 01 Jan 2030 00:00:00 GMT"));
    assert_eq!(response.header(SERVER.as_str()), Some("routeflow"));
}

#[test]
fn test_date_header_can_be_disabled() {
    let config = ServerConfig {
        date_header: false,
        ..ServerConfig::default()
    };
    let executor = Table::new().route(get_item()).executor_with(config);
    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/items/1"))
        .block()
        .unwrap();
    assert!(!response.headers().contains_key(DATE));
}

#[test]
fn test_single_streams() {
    let found = RouteMatch::from_fn(
        returning("find", Method::GET, "/find", ReturnClassification::single()),
        |_| Ok(ValueStream::from_future(async { Ok(Some(RouteResult::Value(json!("hit")))) }).into()),
    );
    let created = RouteMatch::from_fn(
        returning("make", Method::POST, "/make", ReturnClassification::single()),
        |_| Ok(ValueStream::just(RouteResult::Status(StatusCode::CREATED)).into()),
    );
    let empty = RouteMatch::from_fn(
        returning("miss", Method::GET, "/miss", ReturnClassification::single()),
        |_| Ok(ValueStream::empty(StreamKind::Single).into()),
    );
    let executor = Table::new().route(found).route(created).route(empty).executor();

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/find"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_value(), Some(&json!("hit")));

    let response = executor
        .handle(RequestContext::new(), request(Method::POST, "/make"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/miss"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_deferred_value_is_awaited() {
    let route = RouteMatch::from_fn(
        returning("later", Method::GET, "/later", ReturnClassification::deferred()),
        |_| Ok(RouteResult::Value(json!(7))),
    );
    let executor = Table::new().route(route).executor();
    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/later"))
        .block()
        .unwrap();
    assert_eq!(response.body().as_value(), Some(&json!(7)));
}

#[test]
fn test_completable_stream_is_empty_200() {
    let route = RouteMatch::from_fn(
        returning("flush", Method::POST, "/flush", ReturnClassification::completable()),
        |_| Ok(ValueStream::completable(async { Ok(()) }).into()),
    );
    let failing = RouteMatch::from_fn(
        returning("flush_fail", Method::POST, "/flush/fail", ReturnClassification::completable()),
        |_| Ok(ValueStream::completable(async { Err(DispatchError::Codec("bad frame".into())) }).into()),
    );
    let executor = Table::new().route(route).route(failing).executor();

    let response = executor
        .handle(RequestContext::new(), request(Method::POST, "/flush"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.header(CONTENT_LENGTH.as_str()), Some("0"));

    let response = executor
        .handle(RequestContext::new(), request(Method::POST, "/flush/fail"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn test_multi_stream_is_chunked_with_negotiated_type() {
    let route = RouteMatch::from_fn(
        returning("ticks", Method::GET, "/ticks", ReturnClassification::stream())
            .producing(MediaType::json())
            .producing(MediaType::event_stream()),
        |_| {
            Ok(ValueStream::iter(vec![
                RouteResult::Value(json!(1)),
                RouteResult::Value(json!(2)),
                RouteResult::Value(json!(3)),
            ])
            .into())
        },
    );
    let executor = Table::new().route(route).executor();

    let mut response = executor
        .handle(
            RequestContext::new(),
            request_accepting(Method::GET, "/ticks", "text/event-stream"),
        )
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.header(TRANSFER_ENCODING.as_str()), Some("chunked"));
    assert_eq!(response.content_type(), Some(MediaType::event_stream()));
    assert_eq!(stream_values(&mut response), vec![json!(1), json!(2), json!(3)]);

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/ticks"))
        .block()
        .unwrap();
    assert_eq!(response.content_type(), Some(MediaType::json()));
}

#[test]
fn test_head_drops_stream_body() {
    let slot: Arc<Mutex<Option<StreamSender>>> = Arc::default();
    let handler_slot = Arc::clone(&slot);
    let route = RouteMatch::from_fn(
        returning("feed", Method::GET, "/feed", ReturnClassification::stream()),
        move |_| {
            let (sender, stream) = channel(StreamKind::Multi);
            sender.send_value(json!("first"));
            *handler_slot.lock().unwrap() = Some(sender);
            Ok(stream.into())
        },
    );
    let executor = Table::new().route(route).executor();

    let response = executor
        .handle(RequestContext::new(), request(Method::HEAD, "/feed"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.body().is_empty());
    assert!(!response.headers().contains_key(TRANSFER_ENCODING));
    assert!(slot.lock().unwrap().as_ref().unwrap().is_closed());

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/feed"))
        .block()
        .unwrap();
    assert!(response.body().is_stream());
    assert_eq!(response.header(TRANSFER_ENCODING.as_str()), Some("chunked"));
    assert!(!slot.lock().unwrap().as_ref().unwrap().is_closed());
}

#[test]
fn test_response_stream_uses_first_response() {
    let route = RouteMatch::from_fn(
        returning("redirects", Method::GET, "/r", ReturnClassification::response_stream()),
        |_| {
            let first = MutableResponse::new(StatusCode::TEMPORARY_REDIRECT);
            let second = MutableResponse::new(StatusCode::OK);
            Ok(ValueStream::iter(vec![first.into(), second.into()]).into())
        },
    );
    let executor = Table::new().route(route).executor();
    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/r"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

fn suspended_route(name: &str, path: &str, returns: ReturnClassification, value: Option<RouteResult>) -> RouteMatch {
    let value = Arc::new(Mutex::new(value));
    RouteMatch::from_fn(returning(name, Method::GET, path, returns), move |call| {
        let continuation = call.continuation().expect("continuation set up");
        let value = value.lock().unwrap().take();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            match value {
                Some(value) => continuation.resume(value),
                None => continuation.resume_empty(),
            };
        });
        Ok(RouteResult::Suspended)
    })
}

#[test]
fn test_suspended_handler_resumes_with_value() {
    let route = suspended_route(
        "slow",
        "/slow",
        ReturnClassification::suspended(),
        Some(RouteResult::Value(json!({"slow": true}))),
    );
    let executor = Table::new()
        .route(route)
        .executor()
        .with_suspension_bridge(Arc::new(ContinuationBridge));

    let flow = executor.handle(RequestContext::new(), request(Method::GET, "/slow"));
    assert!(!flow.is_complete());
    let response = flow.block().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_value(), Some(&json!({"slow": true})));
}

#[test]
fn test_suspended_unit_handler_has_no_body() {
    let route = suspended_route(
        "fire",
        "/fire",
        ReturnClassification::suspended_unit(),
        Some(RouteResult::Value(json!("ignored"))),
    );
    let executor = Table::new()
        .route(route)
        .executor()
        .with_suspension_bridge(Arc::new(ContinuationBridge));

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/fire"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.body().is_empty());
}

#[test]
fn test_suspended_handler_resuming_empty_is_not_found() {
    let route = suspended_route("gone", "/gone", ReturnClassification::suspended(), None);
    let executor = Table::new()
        .route(route)
        .executor()
        .with_suspension_bridge(Arc::new(ContinuationBridge));

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/gone"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_suspended_without_bridge_is_500() {
    let route = RouteMatch::from_fn(
        returning("orphan", Method::GET, "/orphan", ReturnClassification::suspended()),
        |_| Ok(RouteResult::Suspended),
    );
    let executor = Table::new().route(route).executor();
    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/orphan"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_named_pool_runs_handler_off_thread_with_context() {
    let pool = ThreadPerJob::new("reports");
    let seen: Arc<Mutex<Option<(thread::ThreadId, String, String)>>> = Arc::default();
    let handler_seen = Arc::clone(&seen);
    let route = RouteMatch::from_fn(
        RouteInfo::new("report", Method::GET, "/reports").execute_on("reports"),
        move |call| {
            let tenant = call.context.get::<String>("tenant").map(|t| t.to_string()).unwrap_or_default();
            let path = call.context.current_request().map(|r| r.path().to_string()).unwrap_or_default();
            *handler_seen.lock().unwrap() = Some((thread::current().id(), tenant, path));
            Ok(RouteResult::Value(json!("report")))
        },
    );
    let selector = PoolExecutorSelector::new().with_pool(Arc::clone(&pool) as Arc<dyn WorkerPool>);
    let executor = Table::new()
        .route(route)
        .executor()
        .with_executor_selector(Arc::new(selector));

    let context = RequestContext::new().with("tenant", Arc::new("acme".to_string()));
    let flow = executor.handle(context, request(Method::GET, "/reports"));
    assert!(!flow.is_complete());
    let response = flow.block().unwrap();

    assert_eq!(response.body().as_value(), Some(&json!("report")));
    assert_eq!(pool.executed(), 1);
    let (thread_id, tenant, path) = seen.lock().unwrap().take().unwrap();
    assert_ne!(thread_id, thread::current().id());
    assert_eq!(tenant, "acme");
    assert_eq!(path, "/reports");
}

struct Refusing;

impl WorkerPool for Refusing {
    fn name(&self) -> &str {
        "refusing"
    }

    fn execute(&self, _job: Job) -> FlowResult<()> {
        Err(DispatchError::PoolRejected {
            pool: "refusing".into(),
            reason: "queue full".into(),
        })
    }
}

#[test]
fn test_pool_rejection_is_503() {
    let route = RouteMatch::from_fn(
        RouteInfo::new("busy", Method::GET, "/busy").execute_on("refusing"),
        |_| Ok(RouteResult::Value(json!("never"))),
    );
    let selector = PoolExecutorSelector::new().with_pool(Arc::new(Refusing));
    let executor = Table::new()
        .route(route)
        .executor()
        .with_executor_selector(Arc::new(selector));

    let response = executor
        .handle(RequestContext::new(), request(Method::GET, "/busy"))
        .block()
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn test_cancellation_skips_handler_and_materialization() {
    let pool = HeldPool::new();
    let ran = Arc::new(AtomicBool::new(false));
    let handler_ran = Arc::clone(&ran);
    let route = RouteMatch::from_fn(
        RouteInfo::new("long", Method::GET, "/long").execute_on("held"),
        move |_| {
            handler_ran.store(true, Ordering::SeqCst);
            Ok(RouteResult::Value(json!("late")))
        },
    );
    let selector = PoolExecutorSelector::new().with_pool(Arc::clone(&pool) as Arc<dyn WorkerPool>);
    let executor = Table::new()
        .route(route)
        .executor()
        .with_executor_selector(Arc::new(selector));

    let (context, abort) = RequestContext::cancellable();
    let flow = executor.handle(context, request(Method::GET, "/long"));
    abort.abort();
    pool.release();

    assert!(matches!(flow.block(), Err(DispatchError::Cancelled)));
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn test_cancelled_before_dispatch() {
    let executor = Table::new().route(get_item()).executor();
    let (context, abort) = RequestContext::cancellable();
    abort.abort();
    let outcome = executor
        .handle(context, request(Method::GET, "/items/1"))
        .block();
    assert!(matches!(outcome, Err(DispatchError::Cancelled)));
}

#[test]
fn test_auto_selection_offloads_blocking_routes() {
    let blocking = ThreadPerJob::new("blocking");
    let config = ServerConfig {
        thread_selection: ThreadSelection::Auto,
        ..ServerConfig::default()
    };
    let selector = PoolExecutorSelector::new().with_blocking_pool(Arc::clone(&blocking) as Arc<dyn WorkerPool>);
    let slow = RouteMatch::from_fn(RouteInfo::new("slow_io", Method::GET, "/slow").blocking(), |_| {
        Ok(RouteResult::Value(json!("done")))
    });
    let executor = Table::new()
        .route(slow)
        .route(RouteMatch::from_fn(RouteInfo::new("fast", Method::GET, "/fast"), |_| {
            Ok(RouteResult::Value(json!("done")))
        }))
        .executor_with(config)
        .with_executor_selector(Arc::new(selector));

    let fast = executor.handle(RequestContext::new(), request(Method::GET, "/fast"));
    assert!(fast.is_complete());
    assert_eq!(blocking.executed(), 0);

    let slow = executor.handle(RequestContext::new(), request(Method::GET, "/slow"));
    assert_eq!(slow.block().unwrap().body().as_value(), Some(&json!("done")));
    assert_eq!(blocking.executed(), 1);
}
