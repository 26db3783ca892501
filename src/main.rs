use std::net::SocketAddr;
use std::path::PathBuf;

use aigw::config::{self, ConfigStore};
use aigw::grpc::{ExternalProcessorServer, RouterService, UpstreamService};
use aigw::processor::state::RequestRegistry;
use aigw::telemetry;
use clap::Parser;
use tracing::info;

/// The AI gateway data-plane processor: an `ext_proc` service mediating OpenAI-shaped
/// client traffic to heterogeneous upstream LLM providers.
#[derive(Parser, Debug)]
#[command(name = "aigw", version)]
struct Args {
	/// Path to the YAML runtime config (backends, routes, costs).
	#[arg(long, env = "AIGW_CONFIG")]
	config: PathBuf,

	/// Bind address for the client-facing (router) `ext_proc` listener.
	#[arg(long, env = "AIGW_ROUTER_ADDR", default_value = "0.0.0.0:9001")]
	router_addr: SocketAddr,

	/// Bind address for the upstream-facing `ext_proc` listener.
	#[arg(long, env = "AIGW_UPSTREAM_ADDR", default_value = "0.0.0.0:9002")]
	upstream_addr: SocketAddr,

	/// Default tracing level, overridden by `RUST_LOG` when set.
	#[arg(long, env = "AIGW_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	telemetry::init_logging(&args.log_level);

	let initial = config::RuntimeConfig::load(&args.config)?;
	let store = ConfigStore::new(initial);
	let _watcher = config::watch(store.clone(), args.config.clone())?;

	let registry = RequestRegistry::new();

	let router_server = tonic::transport::Server::builder()
		.add_service(ExternalProcessorServer::new(RouterService::new(registry.clone())))
		.serve(args.router_addr);

	let upstream_server = tonic::transport::Server::builder()
		.add_service(ExternalProcessorServer::new(UpstreamService::new(store.clone(), registry)))
		.serve(args.upstream_addr);

	info!(router_addr = %args.router_addr, upstream_addr = %args.upstream_addr, "aigw listening");

	tokio::try_join!(
		async { router_server.await.map_err(anyhow::Error::from) },
		async { upstream_server.await.map_err(anyhow::Error::from) },
	)?;

	Ok(())
}
