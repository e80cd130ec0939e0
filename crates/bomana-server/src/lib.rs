//! HTTP front end of the Bomana update service.
//!
//! Serves resolved update manifests to launchers and records their telemetry
//! events in the SQLite event store.

mod error;
mod logging;
mod routes;
mod settings;

use std::net::SocketAddr;

use bomana_core::ManifestResolver;
use bomana_stats::EventStore;
use log::{info, warn};

pub use error::{ApiError, ServerError};
pub use logging::init_logging;
pub use routes::{AppState, router};
pub use settings::{ServiceSettings, SettingsError};

/// Open the event store, build the resolver and serve until Ctrl-C.
///
/// # Errors
/// Returns an error if the store cannot be opened, the HTTP client cannot be
/// built, or the listener cannot bind or fails while serving.
pub async fn serve(settings: ServiceSettings) -> Result<(), ServerError> {
    let store = EventStore::open(&settings.db_path).await?;
    let resolver = ManifestResolver::from_config(&settings.resolver)?;
    info!(
        "Manifest mode {}, manifests in {}",
        resolver.policy().as_str(),
        settings.resolver.manifest_dir.display()
    );
    if resolver.policy().uses_remote() {
        info!(
            "Remote manifests from {}",
            settings.resolver.project.latest_release_url()
        );
    }

    let app = router(AppState::new(resolver, store));
    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .map_err(|source| ServerError::Io {
            context: "failed to bind listener",
            source,
        })?;
    info!("Listening on http://{}", settings.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|source| ServerError::Io {
        context: "server error",
        source,
    })?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {error}");
        std::future::pending::<()>().await;
    }
}
