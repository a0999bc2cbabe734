//! In-process file host built on axum.
//!
//! Accepts any request, records it, and answers the way a PUT-style host
//! does: names containing "huge" get a 413, names containing "plain" get
//! the location as a bare text body, everything else gets a 201 with a
//! JSON `url`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

/// One request as the host saw it.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Clone, Default)]
pub struct FileHost {
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl FileHost {
    /// Binds an ephemeral port and serves until the test runtime shuts down.
    /// Returns the host and its base URL.
    pub async fn start() -> (Self, String) {
        let host = Self::default();
        let app = Router::new().fallback(handle).with_state(host.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind file host");
        let base = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (host, base)
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }

    /// The request whose path ends with `/<name>`, percent-encoded as sent.
    pub fn request_for(&self, name: &str) -> Option<ReceivedRequest> {
        let suffix = format!("/{}", name);
        self.received().into_iter().find(|r| r.path.ends_with(&suffix))
    }
}

async fn handle(
    State(host): State<FileHost>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    host.received.lock().unwrap().push(ReceivedRequest {
        method,
        path: path.clone(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    });

    let location = format!("https://files.test{}", path);
    if path.contains("huge") {
        (StatusCode::PAYLOAD_TOO_LARGE, "file exceeds limit").into_response()
    } else if path.contains("plain") {
        (StatusCode::OK, format!("{}\n", location)).into_response()
    } else {
        (StatusCode::CREATED, Json(json!({ "url": location }))).into_response()
    }
}
