use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use walrus_apiserver::bind::{Bind, Schema};
use walrus_apiserver::config::{load_config, ApiConfig};
use walrus_apiserver::lifecycle::{signals, Shutdown};
use walrus_apiserver::observability::{init_logging, init_metrics};
use walrus_apiserver::routing::{ApiRouter, Handler, MethodSet, Request, RouterOptions};
use walrus_apiserver::{methods, net, ApiError, HttpServer};

#[derive(Parser)]
#[command(name = "walrus-apiserver")]
#[command(about = "Walrus control-plane API server", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Default)]
struct LivezRequest;

impl Bind for LivezRequest {
    fn schema(_: &mut Schema<Self>) {}
}

impl Request for LivezRequest {
    const ROUTE: Option<&'static str> = Some("GET=/livez");
}

/// Process probes.
struct Probe;

impl Probe {
    async fn livez(&self, _: LivezRequest) -> Result<(), ApiError> {
        Ok(())
    }
}

impl Handler for Probe {
    fn methods(self: Arc<Self>, set: &mut MethodSet) {
        methods!(self, set, { "Livez" => livez });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ApiConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "walrus-apiserver starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        base_path = %config.api.base_path,
        request_timeout_secs = config.timeouts.request_secs,
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let mut router = ApiRouter::new(RouterOptions {
        stream: config.stream.clone(),
        ..Default::default()
    });
    router.routes(Arc::new(Probe));
    if config.api.catalog {
        router.group(&config.api.base_path).catalog("/routes");
    }
    tracing::info!(routes = router.registered().len(), "Routes registered");

    let shutdown = Shutdown::new();
    signals::install(&shutdown);

    let server = HttpServer::new(config.clone(), router);
    match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            let tls = net::tls::from_config(tls).await?;
            server.run_tls(addr, tls, shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            server.run(listener, shutdown).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
