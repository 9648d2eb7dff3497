// bin/controller.rs - cmdmesh Controller Binary

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cmdmesh::cli::{gossip_config, CommonArgs};
use cmdmesh::keys::{AgreementPublicKey, KeyMaterial};
use cmdmesh::network::{connect, GossipTransport};
use cmdmesh::node::{command_filter, ControllerNode};
use cmdmesh::resolver::{registry_from_config, resolve};

/// cmdmesh controller: publishes operator commands and prints results
#[derive(Parser, Debug)]
#[command(name = "cmdmesh-controller")]
#[command(version)]
#[command(about = "Reads commands from stdin, publishes them, prints agent results", long_about = None)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Bootstrap peer address; the on-chain registry is used when omitted
    #[arg(short, long)]
    bootstrap: Option<String>,

    /// Listen address (multiaddr); dial-only when omitted
    #[arg(long)]
    bind: Option<String>,

    /// Seal commands to this agent agreement key (hex) instead of the group key
    #[arg(long)]
    recipient: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.common.init_tracing()?;
    let _metrics = args.common.init_metrics();

    let config = args.common.load_config().context("loading configuration")?;
    let keys = Arc::new(KeyMaterial::from_config(&config.keys).context("loading key material")?);
    let recipient = args
        .recipient
        .as_deref()
        .map(AgreementPublicKey::from_hex)
        .transpose()
        .context("parsing --recipient")?;

    info!(
        identity = %keys.signing.public_key().short(),
        agreement_public = %keys.agreement.public_key(),
        "Starting cmdmesh controller"
    );

    let registry = registry_from_config(&config.registry).context("building registry client")?;
    let candidates = resolve(args.bootstrap.as_deref(), registry.as_ref()).await?;

    let (transport, swarm_task) = GossipTransport::start(gossip_config(args.bind.as_deref(), &config)?)?;
    let transport = Arc::new(transport);
    let connection = connect(&candidates, transport.as_ref(), &command_filter(&config)).await?;

    let controller = ControllerNode::new(transport.clone(), keys, &config);
    let cancel = CancellationToken::new();
    let (mut results, receiver) = controller.spawn_receiver(connection.subscription, cancel.clone());

    let printer = tokio::spawn(async move {
        while let Some(result) = results.recv().await {
            match result.sender {
                Some(sender) => println!("[{}] {}", sender.short(), result.text),
                None => println!("{}", result.text),
            }
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        published = controller.publish_lines(stdin, recipient.as_ref()) => {
            match published {
                Ok(count) => info!(count, "Input finished"),
                Err(e) => warn!(error = %e, "Failed to read stdin"),
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    cancel.cancel();
    let _ = receiver.await;
    let _ = printer.await;
    transport.shutdown().await;
    let _ = swarm_task.await;
    Ok(())
}
