use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{any, get};
use axum::Router;
use futures::FutureExt;
use tracing::{error, info};

use crate::config::Route;
use crate::error::internal_error_response;
use crate::handlers::{health_handler, metrics_handler, proxy_handler};
use crate::metrics::PANICS_TOTAL;
use crate::state::AppState;

/// Build the router: one any-method route per configured path, plus the
/// gateway's own `/health` and `/metrics`.
pub fn build_app(state: Arc<AppState>, routes: &[Route]) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    for route in routes {
        info!(path = %route.path, upstream = %route.upstream, "route registered");
        let upstream = Arc::new(route.upstream.clone());
        app = app.route(
            &route.path,
            any(move |State(state): State<Arc<AppState>>, req: Request| {
                let upstream = Arc::clone(&upstream);
                async move { proxy_handler(state, upstream, req).await }
            }),
        );
    }

    app.layer(middleware::from_fn(catch_panic)).with_state(state)
}

// Outermost boundary: a panic costs one request a 500, never the listener
async fn catch_panic(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            PANICS_TOTAL.inc();
            error!(%method, %path, panic = panic_message(&*panic), "request handler panicked");
            internal_error_response()
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::util::ServiceExt;

    async fn explode() -> &'static str {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let app: Router = Router::new()
            .route("/boom", get(explode))
            .layer(middleware::from_fn(catch_panic));

        let req = axum::http::Request::builder().uri("/boom").body(Body::empty()).unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // the router keeps serving after a panic
        let req = axum::http::Request::builder().uri("/missing").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
