//! Process entry point: CLI parsing, config loading, logging init,
//! component wiring, the admin RPC façade, and graceful shutdown.

mod admin;
mod wiring;

use std::path::Path;

use anyhow::Context;
use argh::FromArgs;
use squeak_common::{
    cli::{InitArgs, NodeCommand, RunArgs, SqueakArgs},
    config::NodeConfig,
    logger,
};
use squeak_store::Store;
use tracing::info;
use wiring::Node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: SqueakArgs = argh::from_env();
    match args.cmd {
        NodeCommand::Run(run_args) => run(run_args).await,
        NodeCommand::Init(init_args) => init(init_args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    logger::init(&args.log_level);

    let mut config = load_config(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    if let Some(peer_port) = args.peer_port {
        config.peer_port = peer_port;
    }
    if let Some(admin_port) = args.admin_port {
        config.admin_port = admin_port;
    }

    info!(
        peer_port = config.peer_port,
        admin_port = config.admin_port,
        network = ?config.network,
        "starting squeak-node"
    );

    let node = Node::init(config).await.context("failed to initialize node")?;
    let admin_addr: std::net::SocketAddr = ([0, 0, 0, 0], node.config.admin_port).into();
    let admin_routes = admin::routes(
        node.controller.clone(),
        node.manager.clone(),
        node.peer_server.clone(),
        node.shutdown.clone(),
    );
    let admin_shutdown = node.shutdown.clone();
    let (_, admin_server) = warp::serve(admin_routes).bind_with_graceful_shutdown(admin_addr, async move {
        admin_shutdown.recv().await;
    });
    let admin_task = tokio::spawn(admin_server);

    node.run().await?;
    admin_task.await.context("admin server task panicked")?;
    info!("squeak-node exited cleanly");
    Ok(())
}

async fn init(args: InitArgs) -> anyhow::Result<()> {
    logger::init("info");

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("failed to create data dir {}", args.data_dir.display()))?;

    let mut config = NodeConfig::default();
    config.data_dir = args.data_dir.clone();

    let db_path = config.db_path();
    {
        let db_path = db_path.clone();
        tokio::task::spawn_blocking(move || Store::connect(&db_path.to_string_lossy()))
            .await
            .context("store init task panicked")?
            .with_context(|| format!("failed to open/migrate store at {}", db_path.display()))?;
    }
    info!(path = %db_path.display(), "database initialized and migrated");

    let config_path = args.data_dir.join("squeak.toml");
    if !config_path.exists() {
        let toml = toml::to_string_pretty(&config).context("failed to serialize default config")?;
        std::fs::write(&config_path, toml)
            .with_context(|| format!("failed to write default config {}", config_path.display()))?;
        info!(path = %config_path.display(), "wrote default config");
    } else {
        info!(path = %config_path.display(), "config already present, leaving untouched");
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<NodeConfig> {
    if !path.exists() {
        info!(path = %path.display(), "no config file found, using defaults");
        return Ok(NodeConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    NodeConfig::from_toml_str(&text)
}
