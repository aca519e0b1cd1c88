use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use log::*;
use service::AppState;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

mod controller;
mod error;
mod extractors;
mod router;
mod ws;

pub use error::{Error, ErrorCode};

/// Headers carrying the identity resolved by the upstream gateway.
pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const USER_ID_HEADER: &str = "x-user-id";

/// Serves `/health` and `/ws` until `shutdown` resolves.
pub async fn init_server(
    app_state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_owned());
    let listen_addr = format!("{interface}:{}", app_state.config.port);

    info!(
        "Server starting... listening for connections on http://{listen_addr} in {} mode",
        app_state.config.runtime_env()
    );

    let cors_layer = cors_layer(&app_state.config.allowed_origins);
    let listener = TcpListener::bind(&listen_addr).await?;

    axum::serve(listener, router::define_routes(app_state).layer(cors_layer))
        .with_graceful_shutdown(shutdown)
        .await
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_credentials(true)
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static(TENANT_ID_HEADER),
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .allow_origin(origins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_origins_are_skipped() {
        // Building the layer must not panic on a malformed entry.
        let _layer = cors_layer(&[
            "http://localhost:3000".to_owned(),
            "not a\norigin".to_owned(),
        ]);
    }
}
