//! Shared HTTP surface for channel plugins.
//!
//! Webhook-style channels register a handler under a path at account start
//! and unregister it at stop. The gateway mounts [`router`] once; dispatch is
//! by exact path so registrations can come and go at runtime without
//! rebuilding the axum router.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    async_trait::async_trait,
    axum::{
        Router,
        body::Body,
        extract::{Request, State},
        response::{IntoResponse, Response},
    },
    bytes::Bytes,
    http::{Method, StatusCode},
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// Request view handed to a registered route handler.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub method: Method,
    pub body: Bytes,
}

/// Response a route handler produces, framework-agnostic.
#[derive(Debug, Clone)]
pub struct RouteResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
    /// Extra headers (name, value), e.g. `Allow` for 405 responses.
    pub headers: Vec<(&'static str, String)>,
}

impl RouteResponse {
    #[must_use]
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn json(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Handler registered under a path on the shared HTTP surface.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, req: RouteRequest) -> RouteResponse;
}

/// Dynamic path → handler registry.
pub struct HttpRouteRegistry {
    routes: RwLock<HashMap<String, Arc<dyn RouteHandler>>>,
}

impl Default for HttpRouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRouteRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` under `path`. Fails if the path is already taken.
    pub fn register(&self, path: &str, handler: Arc<dyn RouteHandler>) -> Result<()> {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if routes.contains_key(path) {
            return Err(Error::invalid_input(format!(
                "http path already registered: {path}"
            )));
        }
        debug!(path, "registered plugin http route");
        routes.insert(path.to_string(), handler);
        Ok(())
    }

    /// Remove the handler under `path`. Returns whether one was registered.
    pub fn unregister(&self, path: &str) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        let removed = routes.remove(path).is_some();
        if removed {
            debug!(path, "unregistered plugin http route");
        }
        removed
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<Arc<dyn RouteHandler>> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.get(path).map(Arc::clone)
    }

    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.keys().cloned().collect()
    }
}

/// Normalize a plugin-supplied webhook path: fall back to `default` when
/// empty, force a leading slash, strip a trailing slash.
#[must_use]
pub fn normalize_path(raw: Option<&str>, default: &str) -> String {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    let path = if trimmed.is_empty() { default } else { trimmed };
    let mut normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Maximum accepted request body (1 MiB); platform events are far smaller.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build an axum router that dispatches every request through `registry`.
#[must_use]
pub fn router(registry: Arc<HttpRouteRegistry>) -> Router {
    Router::new().fallback(dispatch).with_state(registry)
}

async fn dispatch(State(registry): State<Arc<HttpRouteRegistry>>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let Some(handler) = registry.get(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let method = req.method().clone();
    let body = match axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path, error = %e, "failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        },
    };

    let resp = handler.handle(RouteRequest { method, body }).await;

    let mut builder = Response::builder()
        .status(resp.status)
        .header(http::header::CONTENT_TYPE, resp.content_type);
    for (name, value) in &resp.headers {
        builder = builder.header(*name, value);
    }
    builder
        .body(Body::from(resp.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
