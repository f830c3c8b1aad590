//! centd: runs one gateway instance against a NATS server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use cent_core::transport::{NatsTransport, Transport};
use cent_server::events::{EventPublisher, JetStreamPublisher, TransportPublisher};
use cent_server::{CentServer, MemoryProvider, ServerConfig};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Billing command gateway and event forwarder.
#[derive(Parser, Debug)]
#[command(name = "centd", version)]
#[command(about = "Serves billing commands over NATS and publishes provider events")]
struct Args {
    /// NATS server URL
    #[arg(long, env = "CENT_NATS_URL", default_value = "nats://127.0.0.1:4222")]
    nats_url: String,

    /// Queue group shared by every gateway instance
    #[arg(long, env = "CENT_QUEUE", default_value = "cent")]
    queue: String,

    /// Concurrent dispatches before requests are shed
    #[arg(long, env = "CENT_MAX_CONCURRENT", default_value_t = 1000)]
    max_concurrent: u32,

    /// Capacity of the event publish queue
    #[arg(long, env = "CENT_EVENT_QUEUE", default_value_t = 1024)]
    event_queue: usize,

    /// Seconds to wait for in-flight dispatches on shutdown
    #[arg(long, env = "CENT_DRAIN_TIMEOUT", default_value_t = 30)]
    drain_timeout: u64,

    /// Publish events through JetStream and wait for stream acks
    #[arg(long, env = "CENT_DURABLE_EVENTS")]
    durable_events: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "CENT_LOG", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "CENT_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            queue_group: self.queue.clone(),
            max_concurrent_operations: self.max_concurrent,
            event_queue_capacity: self.event_queue,
            drain_timeout: Duration::from_secs(self.drain_timeout),
            ..ServerConfig::default()
        }
    }
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let installed = if args.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("centd: cannot install log subscriber: {e}");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c, shutting down");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let nats = NatsTransport::connect(&args.nats_url)
        .await
        .with_context(|| format!("connecting to {}", args.nats_url))?;
    info!(url = %args.nats_url, "connected to NATS");

    let events: Arc<dyn EventPublisher> = if args.durable_events {
        Arc::new(JetStreamPublisher::new(nats.client().clone()))
    } else {
        Arc::new(TransportPublisher::new(Arc::new(nats.clone())))
    };
    let transport: Arc<dyn Transport> = Arc::new(nats);

    let mut server = CentServer::new(
        args.server_config(),
        Arc::new(MemoryProvider::new()),
        transport,
        events,
    );
    server.start().await?;
    server.serve(shutdown_signal()).await
}
