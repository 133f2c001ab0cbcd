use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState, validation::MAX_DOCUMENT_BYTES};

pub mod alerts;
pub mod auth;
pub mod cases;
pub mod catalog;
pub mod dashboard;
pub mod documents;
pub mod health;
pub mod movements;

/// Room for multipart framing and the text fields around an upload.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

fn cors_layer(allowed: Option<&String>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_ref());

    // logout and me take the user as an extractor argument.
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let cases_routes = Router::new()
        .route("/", get(cases::list_cases).post(cases::create_case))
        .route("/bulk/close", post(cases::bulk_close_cases))
        .route("/bulk/due-alerts", post(cases::bulk_create_due_alerts))
        .route(
            "/:id",
            get(cases::get_case)
                .patch(cases::update_case)
                .delete(cases::delete_case),
        )
        .route(
            "/:id/documents",
            get(documents::list_case_documents).post(documents::upload_case_document),
        )
        .route(
            "/:id/movements",
            get(movements::list_movements).post(movements::create_movement),
        );

    let documents_routes = Router::new()
        .route("/:id", delete(documents::delete_document))
        .route("/:id/download", get(documents::download_document));

    let movements_routes = Router::new().route("/:id", patch(movements::update_movement));

    let alerts_routes = Router::new()
        .route("/", get(alerts::list_alerts).post(alerts::create_alert))
        .route("/bulk/mark-sent", post(alerts::bulk_mark_sent))
        .route("/:id", patch(alerts::update_alert))
        .route("/:id/read", post(alerts::mark_alert_read))
        .route("/:id/resend", post(alerts::resend));

    let stats_routes = Router::new()
        .route("/cases-by-type", get(dashboard::cases_by_type))
        .route("/cases-by-status", get(dashboard::cases_by_status))
        .route("/upcoming-deadlines", get(dashboard::upcoming_deadlines));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/cases", cases_routes)
        .nest("/api/documents", documents_routes)
        .nest("/api/movements", movements_routes)
        .nest("/api/alerts", alerts_routes)
        .nest("/api/stats", stats_routes)
        .route("/api/dashboard", get(dashboard::dashboard))
        .route("/api/catalog", get(catalog::get_catalog))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(
            MAX_DOCUMENT_BYTES + MULTIPART_OVERHEAD_BYTES,
        ))
}
