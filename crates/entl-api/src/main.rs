//! # entl-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the course entitlement API.
//! Binds to configurable port (default 8080).

use entl_api::lms::LmsGateway;
use entl_api::state::AppConfig;
use entl_lms_client::{LmsClient, LmsConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let auth_token = std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty());
    let default_site =
        std::env::var("ENTL_DEFAULT_SITE").unwrap_or_else(|_| "example.com".to_string());
    let config = AppConfig {
        port,
        auth_token,
        default_site,
    };

    // Optional: absent means in-memory only.
    let db_pool = entl_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;

    let lms = match LmsConfig::from_env() {
        Ok(Some(lms_config)) => {
            tracing::info!(base_url = %lms_config.base_url, "LMS client configured");
            LmsGateway::Remote(LmsClient::new(lms_config).map_err(|e| {
                tracing::error!("Failed to create LMS client: {e}");
                e
            })?)
        }
        Ok(None) => {
            tracing::warn!(
                "LMS_BASE_URL not set, using the in-process LMS. \
                 Unenrollments are recorded locally only."
            );
            LmsGateway::default()
        }
        Err(e) => {
            tracing::error!("Invalid LMS configuration: {e}");
            return Err(e.into());
        }
    };

    let state = entl_api::bootstrap::bootstrap(config, lms, db_pool).map_err(|e| {
        tracing::error!("Bootstrap failed: {e}");
        e
    })?;

    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("Database hydration failed: {e}");
        e
    })?;

    let app = entl_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Entitlements API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
