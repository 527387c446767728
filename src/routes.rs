// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{events, session},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Mounts the session routes behind bearer-token identification.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (session registry, config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let session_routes = Router::new()
        .route("/", post(session::open_session))
        .route(
            "/{id}",
            get(session::get_session).delete(session::close_session),
        )
        .route("/{id}/answers", post(session::answer_question))
        .route("/{id}/next", post(session::next_question))
        .route("/{id}/previous", post(session::previous_question))
        .route("/{id}/submit", post(session::submit_session))
        .route("/{id}/retry", post(session::retry_persistence))
        .route("/{id}/signals", post(session::report_signal))
        .route("/{id}/visibility", post(session::report_visibility))
        .route("/{id}/acknowledge", post(session::acknowledge_warning))
        .route("/{id}/events", get(events::stream_events))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/sessions", session_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
