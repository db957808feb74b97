//! Web server setup and routing

use anyhow::{bail, Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::config::TlsConfig;
use crate::state::AppState;

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::index).post(api::index))
        .route("/device", post(api::device))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the web server (HTTP or HTTPS depending on config)
pub async fn run(state: Arc<AppState>, bind: &str, tls: Option<&TlsConfig>) -> Result<()> {
    let app = router(state);

    if let Some(tls_config) = tls {
        run_https(app, bind, tls_config).await
    } else {
        run_http(app, bind).await
    }
}

/// Run plain HTTP server
async fn run_http(app: Router, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("cannot bind {}", bind))?;
    info!(address = %listener.local_addr()?, protocol = "HTTP", "Serving device API");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Certificate and key paths, checked before anything is bound
fn tls_files(tls: &TlsConfig) -> Result<(PathBuf, PathBuf)> {
    let cert = PathBuf::from(&tls.cert);
    let key = PathBuf::from(&tls.key);
    for (what, path) in [("certificate", &cert), ("key", &key)] {
        if !path.is_file() {
            bail!("TLS {} file not found: {}", what, path.display());
        }
    }
    Ok((cert, key))
}

/// Run HTTPS server with TLS
async fn run_https(app: Router, bind: &str, tls: &TlsConfig) -> Result<()> {
    let (cert, key) = tls_files(tls)?;
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;
    let rustls_config = RustlsConfig::from_pem_file(&cert, &key)
        .await
        .with_context(|| format!("cannot load TLS material from {}", cert.display()))?;

    info!(address = %addr, protocol = "HTTPS", cert = %cert.display(), "Serving device API");
    axum_server::bind_rustls(addr, rustls_config)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
