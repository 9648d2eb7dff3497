// bin/agent.rs - cmdmesh Agent Binary

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use cmdmesh::cli::{gossip_config, CommonArgs};
use cmdmesh::keys::KeyMaterial;
use cmdmesh::network::{connect, GossipTransport};
use cmdmesh::node::{command_filter, AgentNode};
use cmdmesh::resolver::{registry_from_config, resolve};

/// cmdmesh agent: executes commands received on the channel
#[derive(Parser, Debug)]
#[command(name = "cmdmesh-agent")]
#[command(version)]
#[command(about = "Receives commands over pub/sub and publishes their results", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Bootstrap peer address; the on-chain registry is used when omitted
    #[arg(short, long)]
    bootstrap: Option<String>,

    /// Listen address (multiaddr); dial-only when omitted
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.common.init_tracing()?;
    let _metrics = args.common.init_metrics();

    info!(version = cmdmesh::VERSION, "Starting cmdmesh agent");

    let config = args.common.load_config().context("loading configuration")?;
    let keys = Arc::new(KeyMaterial::from_config(&config.keys).context("loading key material")?);
    info!(
        identity = %keys.signing.public_key().short(),
        agreement_public = %keys.agreement.public_key(),
        trusted_controller = keys.trusted_controller.is_some(),
        "Key material loaded"
    );
    if keys.controller_agreement_public.is_none() {
        warn!("No controller agreement key configured; results will use the group key");
    }

    let registry = registry_from_config(&config.registry).context("building registry client")?;
    let candidates = resolve(args.bootstrap.as_deref(), registry.as_ref()).await?;

    let (transport, swarm_task) = GossipTransport::start(gossip_config(args.bind.as_deref(), &config)?)?;
    let transport = Arc::new(transport);

    let connection = connect(&candidates, transport.as_ref(), &command_filter(&config)).await?;
    info!(peer = ?connection.connected_to(), "Connected to command channel");

    let agent = AgentNode::new(transport.clone(), keys, &config).spawn(connection.subscription);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown requested");
        }
        _ = agent.stopped() => {
            warn!("Receive loop ended");
        }
    }

    let report = agent.shutdown(config.shutdown_grace()).await;
    transport.shutdown().await;
    let _ = swarm_task.await;

    info!(abandoned = report.abandoned, "Agent stopped");
    Ok(())
}
