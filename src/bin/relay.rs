// bin/relay.rs - cmdmesh Bootstrap Relay Binary

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cmdmesh::cli::{gossip_config, CommonArgs};
use cmdmesh::network::{ContentFilter, GossipTransport, Transport};
use cmdmesh::node::RelayMonitor;
use cmdmesh::resolver::ContractRegistry;

/// cmdmesh relay: the node agents and controllers bootstrap through
#[derive(Parser, Debug)]
#[command(name = "cmdmesh-relay")]
#[command(version)]
#[command(about = "Bootstrap relay for the cmdmesh command channel", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Listen address (multiaddr)
    #[arg(long, default_value = "/ip4/0.0.0.0/tcp/60000")]
    bind: String,

    /// Publish this address to the on-chain registry after startup
    #[arg(long)]
    register: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.common.init_tracing()?;
    let _metrics = args.common.init_metrics();
    let config = args.common.load_config().context("loading configuration")?;

    let (transport, swarm_task) = GossipTransport::start(gossip_config(Some(&args.bind), &config)?)?;
    let peer_id = transport.local_peer_id();

    let mut listen_addrs = Vec::new();
    for _ in 0..50 {
        listen_addrs = transport.listen_addrs().await?;
        if !listen_addrs.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if listen_addrs.is_empty() {
        bail!("relay did not start listening on {}", args.bind);
    }
    for addr in &listen_addrs {
        println!("{}/p2p/{}", addr, peer_id);
    }

    if let Some(address) = &args.register {
        let registry = ContractRegistry::from_config(&config.registry)
            .context("--register needs a configured registry")?;
        let tx_hash = registry.add_bootstrap_address(address).await?;
        info!(%address, %tx_hash, "Registered bootstrap address");
    }

    let subscription = transport
        .subscribe(&ContentFilter::all(config.pubsub_topic.clone()))
        .await?;
    let cancel = CancellationToken::new();
    let monitor = tokio::spawn(RelayMonitor::new(subscription, config.content_topic.clone()).run(cancel.clone()));

    info!(%peer_id, "Relay running");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
    }

    cancel.cancel();
    let seen = monitor.await.unwrap_or_default();
    transport.shutdown().await;
    let _ = swarm_task.await;
    info!(seen, "Relay stopped");
    Ok(())
}
