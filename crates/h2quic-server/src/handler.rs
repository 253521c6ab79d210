use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::header::{HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::StatusCode;
use tracing::{debug, warn};

use crate::request::Request;
use crate::response::ResponseWriter;

/// Application callback invoked once per request.
///
/// Each call runs on its own task; handlers for different requests run
/// concurrently. The runner closes the response after `serve` returns, so a
/// handler only needs to close it early when it wants to.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn serve(&self, request: Request, response: ResponseWriter);
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request, ResponseWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn serve(&self, request: Request, response: ResponseWriter) {
        (self)(request, response).await;
    }
}

/// Exact-path request router.
///
/// Requests whose path has no registered handler get a plain-text 404.
/// This is the handler a [`Server`](crate::Server) uses when none is given.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for requests whose path is exactly `path`.
    ///
    /// A later registration for the same path replaces the earlier one.
    pub fn route(mut self, path: impl Into<String>, handler: impl Handler) -> Self {
        let path = path.into();
        if self.routes.insert(path.clone(), Arc::new(handler)).is_some() {
            debug!(path = %path, "replacing route");
        }
        self
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl Handler for Router {
    async fn serve(&self, request: Request, response: ResponseWriter) {
        let handler = self.routes.get(request.uri().path()).cloned();
        match handler {
            Some(handler) => handler.serve(request, response).await,
            None => not_found(request, response).await,
        }
    }
}

/// Reply with `404 page not found`.
pub async fn not_found(request: Request, response: ResponseWriter) {
    debug!(path = request.uri().path(), "no route");
    response
        .insert_header(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )
        .await;
    response
        .insert_header(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"))
        .await;

    let result = async {
        response.write_header(StatusCode::NOT_FOUND).await?;
        response.write(b"404 page not found\n").await?;
        Ok::<_, crate::error::ResponseError>(())
    }
    .await;
    if let Err(err) = result {
        warn!(stream_id = response.stream_id(), error = %err, "failed to write 404");
    }
}
