//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay_ms: u64,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay_ms: 0,
        }
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::ok(value.to_string())
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            delay_ms: 0,
        }
    }

    pub fn delayed(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

#[derive(Clone, Default)]
struct Shared {
    routes: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

/// Local HTTP server standing in for the remote catalog.
///
/// Routes are keyed by path plus query (`/browse?page=1`). Each route plays
/// its replies in order and repeats the last one; unknown routes return 404.
pub struct MockCatalog {
    pub base_url: String,
    shared: Shared,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MockCatalog {
    pub fn start() -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind mock catalog");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");

        let shared = Shared::default();
        let state = shared.clone();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("mock runtime");
            runtime.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                let app = Router::new().fallback(respond).with_state(state);
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        shutdown_rx.await.ok();
                    })
                    .await
                    .expect("mock catalog failed");
            });
        });

        Self {
            base_url: format!("http://{addr}"),
            shared,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    pub fn route(&self, path_and_query: &str, replies: Vec<Reply>) {
        self.shared
            .routes
            .lock()
            .unwrap()
            .insert(path_and_query.to_string(), replies.into());
    }

    /// A browse page with one article per href.
    pub fn listing(&self, page: u32, hrefs: &[&str]) {
        let articles: String = hrefs
            .iter()
            .map(|h| format!("<article class=\"project\"><h2><a href=\"{h}\">{h}</a></h2></article>\n"))
            .collect();
        self.route(
            &format!("/browse?page={page}"),
            vec![Reply::ok(format!("<html><body>{articles}</body></html>"))],
        );
    }

    pub fn detail(&self, path: &str, id: &str, name: &str, version: serde_json::Value) {
        self.route(
            path,
            vec![Reply::json(serde_json::json!({
                "id": id,
                "project_name": name,
                "frida_version": version,
                "description": format!("{name} description"),
                "source": format!("// {name}\nconsole.log('{name}');"),
            }))],
        );
    }

    pub fn hits(&self) -> Vec<String> {
        self.shared.hits.lock().unwrap().clone()
    }

    pub fn hit_count(&self, path_and_query: &str) -> usize {
        self.hits().iter().filter(|h| *h == path_and_query).count()
    }
}

impl Drop for MockCatalog {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn respond(State(shared): State<Shared>, uri: Uri) -> Response {
    let key = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    shared.hits.lock().unwrap().push(key.clone());

    let reply = {
        let mut routes = shared.routes.lock().unwrap();
        match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };
    let Some(reply) = reply else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if reply.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(reply.delay_ms)).await;
    }
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, reply.body).into_response()
}
