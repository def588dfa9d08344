use axum::extract::{Path, State};
use axum::{Json, Router};
use axum::http::StatusCode;
use axum::routing::get;
use clap::{Parser, ValueEnum};
use pkg_constants::paths;
use pkg_discovery::{NetworkInterface, ServiceDirectoryClient};
use pkg_metadata::MetadataClient;
use pkg_pki::MtlsConfigManager;
use pkg_server::Probe;
use pkg_transport::{Client, ClientOptions, ResolutionMode};
use pkg_types::config::RuntimeConfig;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Resolution {
    Disabled,
    ServiceDirectory,
    CloudRun,
}

impl From<Resolution> for ResolutionMode {
    fn from(value: Resolution) -> Self {
        match value {
            Resolution::Disabled => ResolutionMode::Disabled,
            Resolution::ServiceDirectory => ResolutionMode::ServiceDirectory,
            Resolution::CloudRun => ResolutionMode::CloudRun,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "run-ping", about = "Ping service calling its peers by name")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = paths::DEFAULT_RUNTIME_CONFIG)]
    config: String,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Namespace of the services reached through /call; bare names when unset
    #[arg(long)]
    peer_namespace: Option<String>,

    /// How peer service names are resolved
    #[arg(long, value_enum, default_value = "service-directory")]
    resolution: Resolution,

    /// Register this instance in the given Service Directory namespace on startup
    #[arg(long)]
    register: Option<String>,

    /// Serve and call peers over mutual TLS
    #[arg(long)]
    mtls: bool,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    pretty: bool,
}

struct Readiness(AtomicBool);

impl Probe for Readiness {
    fn ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct AppState {
    client: Client,
    peer_namespace: Option<String>,
    run_domain: String,
    scheme: &'static str,
}

impl AppState {
    fn peer_url(&self, service: &str) -> String {
        match &self.peer_namespace {
            Some(ns) => format!("{}://{}.{}.{}/", self.scheme, service, ns, self.run_domain),
            None => format!("{}://{}/", self.scheme, service),
        }
    }
}

async fn ping() -> &'static str {
    "pong"
}

async fn interfaces() -> Result<Json<Vec<NetworkInterface>>, (StatusCode, String)> {
    pkg_discovery::network_interfaces()
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn call(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> (StatusCode, String) {
    let url = state.peer_url(&service);
    match state.client.get(&url).await {
        Ok(response) => {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, body)
        }
        Err(e) => {
            warn!("Call to {} failed: {}", url, e);
            (StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.pretty {
        pkg_server::logging::init_pretty();
    } else {
        pkg_server::logging::init();
    }

    // Merge: CLI args > environment > config file > defaults
    let mut config = RuntimeConfig::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    info!("Config file: {}", cli.config);

    info!("Starting run-ping");
    info!("  Port:        {}", config.port);
    info!("  Resolution:  {:?}", cli.resolution);
    info!("  Run domain:  {}", config.run_domain);
    if let Some(service) = &config.service_name {
        info!("  Service:     {}", service);
    }

    let metadata = Arc::new(MetadataClient::new(&config.metadata_endpoint)?);
    if let Some(namespace) = &cli.register {
        let directory = ServiceDirectoryClient::new(
            &config.service_directory_endpoint,
            metadata.clone(),
            metadata.clone(),
        )?;
        directory.register_instance(namespace, config.port).await?;
    }
    let manager = cli
        .mtls
        .then(|| Arc::new(MtlsConfigManager::new(&config.mtls_config_path)));
    if let Some(manager) = &manager {
        manager.load_config()?;
    }

    let client = Client::with_options(
        &config,
        metadata,
        ClientOptions {
            inject_authorization: true,
            resolution: cli.resolution.into(),
            mtls: manager.clone(),
        },
    )?;
    let state = Arc::new(AppState {
        client,
        peer_namespace: cli.peer_namespace,
        run_domain: config.run_domain.clone(),
        scheme: if manager.is_some() { "https" } else { "http" },
    });

    let readiness = Arc::new(Readiness(AtomicBool::new(false)));
    let router = Router::new()
        .route("/ping", get(ping))
        .route("/call/{service}", get(call))
        .route("/interfaces", get(interfaces))
        .with_state(state.clone())
        .merge(pkg_server::probe_router(readiness.clone()));

    let shutdown = CancellationToken::new();
    let mtls_server = manager.map(|manager| {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.mtls_port));
        tokio::spawn(pkg_server::listen_and_serve_mtls(
            router.clone(),
            addr,
            manager,
            shutdown.clone(),
        ))
    });

    readiness.0.store(true, Ordering::SeqCst);
    pkg_server::listen_and_serve(router, config.port).await?;

    shutdown.cancel();
    state.client.shutdown();
    if let Some(server) = mtls_server {
        server.await??;
    }

    Ok(())
}
