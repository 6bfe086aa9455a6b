use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use shared::constants::API_PREFIX;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::games::backend_wheel_game::{create_router as create_wheel_game_router, spawn_session_sweeper, SessionRegistry};
use crate::services::csv_service::{download_csv, read_csv, upload_csv, write_csv};
use crate::services::transaction_service::{create_transaction, list_transactions};
use crate::storage::StorageBackend;

mod config;
mod error;
mod games;
mod logging;
mod services;
mod storage;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Option<Arc<dyn StorageBackend>>,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(config: AppConfig, storage: Option<Arc<dyn StorageBackend>>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            sessions: SessionRegistry::default(),
        }
    }

    /// The configured storage backend, or `misconfigured` as a 500.
    pub fn storage(&self, misconfigured: &'static str) -> Result<Arc<dyn StorageBackend>, AppError> {
        self.storage.clone().ok_or(AppError::Misconfigured(misconfigured))
    }
}

async fn health_check() -> &'static str {
    "OK"
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health_check", get(health_check))
        .route("/upload-csv", post(upload_csv))
        .route("/read-csv/:filename", get(read_csv))
        .route("/write-csv", post(write_csv))
        .route("/download-csv/:filename", get(download_csv))
        .route("/transactions", post(create_transaction).get(list_transactions))
        .merge(create_wheel_game_router())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid origin in ALLOWED_ORIGINS: {}", origin);
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(vec![
            header::CONTENT_TYPE,
            HeaderName::from_static(shared::constants::SESSION_SIGNATURE_HEADER),
        ])
}

pub fn build_router(state: AppState) -> Router {
    let static_service = SetResponseHeaderLayer::if_not_present(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    )
    .layer(ServeDir::new(&state.config.static_dir));

    let api = api_routes();
    Router::new()
        .merge(api.clone())
        .nest(API_PREFIX, api)
        .fallback_service(static_service)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.allowed_origins))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    logging::setup()?;

    let config = AppConfig::from_env()?;
    let storage = storage::connect(&config);
    let state = AppState::new(config, storage);

    spawn_session_sweeper(
        state.sessions.clone(),
        state.config.session_ttl,
        state.config.session_sweep_interval,
    );

    let addr = state.config.bind_addr;
    let app = build_router(state);

    info!("listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::response::Response;
    use axum::Router;

    use crate::config::AppConfig;
    use crate::{build_router, storage, AppState};

    pub fn state_with(pairs: &[(&str, &str)]) -> AppState {
        let config = AppConfig::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap();
        let storage = storage::connect(&config);
        AppState::new(config, storage)
    }

    pub fn memory_state(presentation_delay_ms: u64) -> AppState {
        let delay = presentation_delay_ms.to_string();
        state_with(&[
            ("STORAGE_BACKEND", "memory"),
            ("PRESENTATION_DELAY_MS", delay.as_str()),
            ("WHEEL_SESSION_SECRET", "test-secret"),
            ("STATIC_DIR", "static-test-missing"),
        ])
    }

    pub fn memory_app(presentation_delay_ms: u64) -> Router {
        build_router(memory_state(presentation_delay_ms))
    }

    /// Supabase mode with no credentials, so storage routes report misconfiguration.
    pub fn unconfigured_app() -> Router {
        build_router(state_with(&[("WHEEL_SESSION_SECRET", "test-secret")]))
    }

    pub async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{body_string, memory_app, state_with};
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check_on_both_prefixes() {
        let app = memory_app(0);
        for uri in ["/health_check", "/api/health_check"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, "OK");
        }
    }

    #[tokio::test]
    async fn test_unknown_paths_fall_through_to_static_files() {
        let response = memory_app(0)
            .oneshot(Request::get("/missing.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let state = state_with(&[
            ("STORAGE_BACKEND", "memory"),
            ("ALLOWED_ORIGINS", "https://shop.example, http://127.0.0.1:8080"),
        ]);
        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri(shared::constants::WHEEL_SPIN_ENDPOINT)
                    .header(header::ORIGIN, "https://shop.example")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://shop.example"
        );
    }
}
