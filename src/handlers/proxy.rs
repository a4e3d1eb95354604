use std::sync::Arc;

use axum::Json;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};
use url::Url;

use crate::metrics::{ADMITTED_TOTAL, REJECTED_TOTAL, REQUEST_TOTAL, UPSTREAM_ERRORS};
use crate::models::RefusalBody;
use crate::state::AppState;
use crate::upstream;

/// Entry point for every configured route.
///
/// Rejected requests get a 200 refusal body and never touch the upstream; the
/// alert goes out on its own task. Admitted requests are forwarded, and an
/// upstream failure is answered with 502 for this request only.
pub async fn proxy_handler(state: Arc<AppState>, upstream: Arc<Url>, req: Request) -> Response {
    REQUEST_TOTAL.inc();

    // the policy lock is released before any network I/O
    let verdict = state.policy.evaluate();

    if verdict.blocked {
        let window = verdict.breached_window;
        REJECTED_TOTAL.with_label_values(&[window.as_str()]).inc();
        info!(
            path = %req.uri().path(),
            window = window.as_str(),
            remaining_seconds = verdict.remaining_seconds,
            "request rejected by admission policy"
        );

        state.alerts.notify(window);
        return Json(RefusalBody::new(verdict.remaining_seconds)).into_response();
    }

    ADMITTED_TOTAL.inc();
    match upstream::forward(&state.client, &upstream, req).await {
        Ok(response) => response,
        Err(e) => {
            UPSTREAM_ERRORS.inc();
            warn!(upstream = %upstream, error = %e, "forwarding failed");
            e.into_response()
        }
    }
}
