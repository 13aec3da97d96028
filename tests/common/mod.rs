#![allow(dead_code)]

//! Shared fixtures: a template-matching route table, request builders, test
//! worker pools and a scoped tracing subscriber.

use http::Method;
use routeflow::config::ServerConfig;
use routeflow::dispatcher::RouteExecutor;
use routeflow::error::FlowResult;
use routeflow::http::Request;
use routeflow::route::{RouteLocator, RouteMatch};
use routeflow::worker_pool::{Job, WorkerPool};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

/// Route table matching `{name}` template segments and binding them as arguments.
#[derive(Default, Clone)]
pub struct Table {
    routes: Vec<RouteMatch>,
    errors: Vec<RouteMatch>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, route: RouteMatch) -> Self {
        self.routes.push(route);
        self
    }

    pub fn error_route(mut self, route: RouteMatch) -> Self {
        self.errors.push(route);
        self
    }

    pub fn executor(self) -> RouteExecutor {
        self.executor_with(ServerConfig::default())
    }

    pub fn executor_with(self, config: ServerConfig) -> RouteExecutor {
        RouteExecutor::new(Arc::new(self), config)
    }
}

impl RouteLocator for Table {
    fn find_closest(&self, request: &Request) -> Vec<RouteMatch> {
        self.routes
            .iter()
            .filter(|route| {
                let method = &route.info().method;
                method == request.method() || (request.is_head() && *method == Method::GET)
            })
            .filter_map(|route| bind_path(route, request.path()))
            .collect()
    }

    fn find_any(&self, request: &Request) -> Vec<RouteMatch> {
        self.routes
            .iter()
            .filter_map(|route| bind_path(route, request.path()))
            .collect()
    }

    fn error_routes(&self) -> Vec<RouteMatch> {
        self.errors.clone()
    }
}

fn bind_path(route: &RouteMatch, path: &str) -> Option<RouteMatch> {
    let template: Vec<&str> = route.info().uri_template.trim_matches('/').split('/').collect();
    let actual: Vec<&str> = path.trim_matches('/').split('/').collect();
    if template.len() != actual.len() {
        return None;
    }

    let mut bound = route.clone();
    for (segment, value) in template.iter().zip(actual) {
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => {
                let value = value
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                bound = bound.with_argument(name.to_string(), value);
            }
            None if *segment != value => return None,
            None => {}
        }
    }
    Some(bound)
}

pub fn request(method: Method, path: &str) -> Arc<Request> {
    Arc::new(Request::new(method, path))
}

pub fn request_accepting(method: Method, path: &str, accept: &str) -> Arc<Request> {
    let http_request = http::Request::builder()
        .method(method)
        .uri(path)
        .header(http::header::ACCEPT, accept)
        .body(())
        .unwrap();
    Arc::new(Request::from_http(&http_request))
}

/// Pool that runs every job on a fresh OS thread and records where jobs ran.
pub struct ThreadPerJob {
    name: String,
    pub executed: AtomicUsize,
    pub threads: Mutex<Vec<ThreadId>>,
}

impl ThreadPerJob {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            executed: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        })
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

impl WorkerPool for ThreadPerJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, job: Job) -> FlowResult<()> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        let handle = std::thread::spawn(job);
        self.threads.lock().unwrap().push(handle.thread().id());
        Ok(())
    }
}

/// Pool that holds jobs until released, for cancellation tests.
#[derive(Default)]
pub struct HeldPool {
    jobs: Mutex<Vec<Job>>,
}

impl HeldPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn release(&self) {
        let jobs: Vec<Job> = std::mem::take(&mut *self.jobs.lock().unwrap());
        for job in jobs {
            job();
        }
    }
}

impl WorkerPool for HeldPool {
    fn name(&self) -> &str {
        "held"
    }

    fn execute(&self, job: Job) -> FlowResult<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// Scoped `tracing` subscriber writing through the test harness.
pub struct TestTracing {
    _guard: tracing::subscriber::DefaultGuard,
}

impl TestTracing {
    pub fn init() -> Self {
        let subscriber = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        Self {
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }
}
