use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use devvd::config::Config;
use devvd::message::{DevvMessage, MessageCallback};
use devvd::node::DevvNode;

#[derive(Parser, Debug)]
#[command(name = "devvd")]
#[command(about = "Devv shard validator daemon", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Write a default config file and exit
    #[arg(long)]
    generate_config: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.generate_config {
        match Config::default().save_to_file(&args.config) {
            Ok(()) => {
                println!("generated default config at {}", args.config);
                return;
            }
            Err(e) => {
                eprintln!("failed to generate config: {e}");
                std::process::exit(1);
            }
        }
    }

    let config = match Config::load_or_create(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config {}: {e}", args.config);
            std::process::exit(1);
        }
    };

    let default_level = if args.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(config).await {
        tracing::error!("node exited with error: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> devvd::DevvResult<()> {
    let context = Arc::new(config.build_context()?);
    let keys = Arc::new(config.build_keyring()?);
    let genesis_state = config.build_genesis_state()?;

    tracing::info!(
        "devvd {} starting: shard {} node {} ({:?})",
        env!("CARGO_PKG_VERSION"),
        context.shard_uri(),
        context.current_node(),
        context.app_mode(),
    );

    // The transport is an external collaborator; until one is wired in,
    // publish loops our own topics back so a single-node shard is live.
    let (fabric_tx, mut fabric_rx) = mpsc::unbounded_channel::<DevvMessage>();
    let publish: MessageCallback = Arc::new(move |msg: DevvMessage| {
        let _ = fabric_tx.send(msg);
    });

    let node = DevvNode::new(
        context.clone(),
        keys,
        genesis_state,
        config.consensus.max_tx_per_block,
        config.request_interval(),
        publish,
    );

    let incoming = node.incoming_sender();
    let subscriptions = [context.shard_uri(), context.own_uri()];
    let token = node.token();
    let loopback = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                msg = fabric_rx.recv() => match msg {
                    Some(msg) if subscriptions.contains(&msg.uri) => {
                        if incoming.send(msg).is_err() {
                            break;
                        }
                    }
                    Some(_) => {} // addressed to a peer we cannot reach yet
                    None => break,
                }
            }
        }
    });

    let mut manager = node.start()?;
    manager.register_task(loopback);
    node.controller().start_proposal_round().await?;
    manager.wait_for_shutdown().await;
    Ok(())
}
