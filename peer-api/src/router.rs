use std::future::ready;
use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, put},
    Router,
};
use tower_http::trace::TraceLayer;

use peer_common::metrics::{setup_metrics_recorder, track_metrics};
use peer_common::store::Store;

use crate::api::ApiError;
use crate::assignments;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

async fn index() -> &'static str {
    "peer-api"
}

async fn liveness(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.store.ping().await?;
    Ok("ok")
}

pub fn router<S: Store + 'static>(store: S, metrics: bool) -> Router {
    let state = AppState {
        store: Arc::new(store),
    };

    let router = Router::new()
        .route("/", get(index))
        .route("/_liveness", get(liveness))
        .route(
            "/api/assignments",
            get(assignments::list).post(assignments::create),
        )
        .route(
            "/api/assignments/:id",
            put(assignments::update).delete(assignments::remove),
        )
        .route(
            "/api/assignments/:id/teams",
            get(assignments::show_teams).post(assignments::regenerate),
        )
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to. Installing a global recorder
    // when the router is built repeatedly (during tests etc) does not work
    // well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
