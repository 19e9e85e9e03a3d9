//! eventsdb-server: event log over gRPC and HTTP
//!
//! ## Architecture
//! ```text
//! [gRPC clients] --(eventsdb.EventsDb)--+
//!                                        +--> [engine] --> [event store]
//! [HTTP clients] --(JSON / SSE)---------+
//! ```
//!
//! ## Configuration
//! - EVENTSDB_CONFIG: path to a YAML config file (optional)
//! - EVENTSDB__SECTION__KEY: overrides for any config field
//! - EVENTSDB_LOG: tracing filter (default: info)
//! - AUTH_TOKEN, TLS_CERT_FILE, TLS_KEY_FILE, DATABASE_URL: legacy overrides
//!
//! The first command-line argument, if present, names a config file.

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic_health::server::health_reporter;
use tracing::{error, info, warn};

use eventsdb::config::Config;
use eventsdb::engine::EventsEngine;
use eventsdb::handlers::{http, EventsDbService, TokenAuth};
use eventsdb::proto::events_db_server::EventsDbServer;
use eventsdb::storage::init_storage;
use eventsdb::utils::bootstrap::{init_tracing, shutdown_signal};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;
    init_tracing(config.server.log_format);

    #[cfg(feature = "otel")]
    let meter_provider = eventsdb::utils::bootstrap::init_metrics().map_err(|e| e.to_string())?;

    let store = init_storage(&config.storage).await?;
    let engine = EventsEngine::new(store, config.limits.clone());
    let auth = TokenAuth::new(config.auth.token());
    if !auth.is_enabled() {
        warn!("No auth token configured; all requests are accepted");
    }

    let host = &config.server.host;
    let grpc_addr: SocketAddr = format!("{}:{}", host, config.server.grpc_port).parse()?;
    let http_addr: SocketAddr = format!("{}:{}", host, config.server.http_port).parse()?;

    // Signal -> end live sessions -> let both servers drain.
    let stop = CancellationToken::new();
    tokio::spawn({
        let engine = engine.clone();
        let stop = stop.clone();
        async move {
            shutdown_signal().await;
            engine.shutdown().await;
            stop.cancel();
        }
    });

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<EventsDbServer<EventsDbService>>()
        .await;

    let mut grpc_builder = Server::builder();
    if let Some((cert_file, key_file)) = config.tls.files() {
        let cert = tokio::fs::read(cert_file).await?;
        let key = tokio::fs::read(key_file).await?;
        grpc_builder =
            grpc_builder.tls_config(ServerTlsConfig::new().identity(Identity::from_pem(cert, key)))?;
        info!(cert_file, "TLS enabled for gRPC");
        warn!("HTTP listener stays plaintext; terminate TLS in front of it");
    }

    let grpc_server = grpc_builder
        .add_service(health_service)
        .add_service(EventsDbServer::with_interceptor(
            EventsDbService::new(engine.clone()),
            auth.clone(),
        ))
        .serve_with_shutdown(grpc_addr, stop.clone().cancelled_owned());

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    let app = http::router(engine.clone(), auth);
    let http_server = http::serve(listener, app, stop.clone().cancelled_owned());

    info!(grpc = %grpc_addr, http = %http_addr, "eventsdb-server started");

    let result = tokio::try_join!(
        async { grpc_server.await.map_err(BoxError::from) },
        async { http_server.await.map_err(BoxError::from) },
    );

    engine.shutdown().await;

    #[cfg(feature = "otel")]
    if let Err(e) = meter_provider.shutdown() {
        warn!(error = %e, "Failed to flush metrics");
    }

    match result {
        Ok(_) => {
            info!("eventsdb-server stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Server failed");
            Err(e)
        }
    }
}
