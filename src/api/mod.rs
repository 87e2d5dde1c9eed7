//! HTTP surface: router, middleware, and server startup.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

use crate::auth::invalidation::{HttpInvalidationTransport, SessionInvalidationFanout};
use crate::auth::repository::NoopTokenValidator;
use crate::auth::{AuthConfig, AuthCoordinator, Sha512PasswordHasher};
use crate::store::PgAuthStore;

/// Shared server state: the coordinator over the Postgres store.
pub struct ApiContext {
    pub coordinator: AuthCoordinator<PgAuthStore, Sha512PasswordHasher>,
    pub validator: NoopTokenValidator,
}

/// Build the application router around a prepared context.
pub fn router(context: Arc<ApiContext>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health::health))
        .route("/v1/auth/login", post(handlers::auth::login))
        .route("/v1/auth/api-key", post(handlers::auth::api_key))
        .route("/v1/auth/token", post(handlers::auth::token))
        .route("/v1/auth/password", post(handlers::auth::change_password))
        .route(
            "/v1/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .route("/v1/auth/tenants/:user_id", get(handlers::auth::tenants))
        .route("/v1/auth/invalidate", post(handlers::auth::invalidate))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(context)),
        )
}

/// Start the server.
/// # Errors
/// Return error if the database is unreachable, the configuration is
/// invalid, or the server fails to start.
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: AuthConfig,
    peers: Vec<String>,
    peer_timeout: Duration,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let mut coordinator =
        AuthCoordinator::new(PgAuthStore::new(pool), Sha512PasswordHasher, auth_config)
            .context("Invalid authentication configuration")?;
    if !peers.is_empty() {
        coordinator = coordinator.with_invalidation(SessionInvalidationFanout::new(
            peers,
            peer_timeout,
            HttpInvalidationTransport::default(),
        ));
    }

    let context = Arc::new(ApiContext {
        coordinator,
        validator: NoopTokenValidator,
    });
    let app = router(context);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
