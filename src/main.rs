//! Cluster Storage Operator
//!
//! Watches HarborCluster resources and reconciles their storage backend.

use clap::Parser;
use kube::CustomResourceExt;
use prometheus::Registry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cluster_storage_operator::controller::{self, Context};
use cluster_storage_operator::{
    Error, HarborCluster, KubeClusterClient, Metrics, OperatorConfig, Result,
    S3BucketStoreFactory, StorageReconciler,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Cluster Storage Operator - storage backends for registry clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Path to a YAML configuration file
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Print the HarborCluster CRD as YAML and exit
    #[arg(long)]
    print_crd: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_crd {
        print!("{}", serde_yaml::to_string(&HarborCluster::crd())?);
        return Ok(());
    }

    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => OperatorConfig::load(path)?,
        None => OperatorConfig::default(),
    };

    info!("Starting Cluster Storage Operator");
    info!("  Version: {}", cluster_storage_operator::VERSION);
    info!(
        "  Namespace: {}",
        args.namespace.as_deref().unwrap_or("all")
    );
    info!("  MinIO image: {}", config.storage.minio_image);
    info!("  Default bucket: {}", config.storage.default_bucket);

    let registry = Registry::new();
    let metrics = Metrics::new(&registry)?;

    let client = kube::Client::try_default().await?;
    let engine = StorageReconciler::new(
        Arc::new(KubeClusterClient::new(
            client.clone(),
            config.field_manager.clone(),
        )),
        Arc::new(S3BucketStoreFactory::new(config.storage.request_timeout())),
        config.storage.clone(),
    );

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_registry = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_registry).await {
            error!("Metrics server error: {}", e);
        }
    });

    let ctx = Arc::new(Context::new(client, engine, config, metrics));
    controller::run(ctx, args.namespace.clone()).await;

    info!("Operator shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "rustls=warn"] {
        filter = filter.add_directive(directive.parse().map_err(|e| {
            Error::Configuration(format!("Invalid log directive {}: {}", directive, e))
        })?);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => Response::new(Body::from("ok")),
                _ => {
                    let mut response = Response::new(Body::from("not found"));
                    *response.status_mut() = StatusCode::NOT_FOUND;
                    response
                }
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, registry: Registry) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                async move {
                    let mut response = Response::new(Body::empty());
                    if req.uri().path() != "/metrics" {
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        return Ok::<_, std::convert::Infallible>(response);
                    }

                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();
                    match encoder.encode(&registry.gather(), &mut buffer) {
                        Ok(()) => {
                            if let Ok(value) = encoder.format_type().parse() {
                                response.headers_mut().insert("Content-Type", value);
                            }
                            *response.body_mut() = Body::from(buffer);
                        }
                        Err(e) => {
                            error!("Failed to encode metrics: {}", e);
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                        }
                    }
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
