//! Command-line argument parsing, via `argh`.

use std::path::PathBuf;

use argh::FromArgs;

/// squeak-node: a peer-to-peer micropayment-gated content network node.
#[derive(FromArgs, Debug)]
pub struct SqueakArgs {
    #[argh(subcommand)]
    pub cmd: NodeCommand,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum NodeCommand {
    Run(RunArgs),
    Init(InitArgs),
}

/// Run the node: bind the peer listener and admin RPC façade, connect to
/// the configured Lightning backend, and begin serving.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "run")]
pub struct RunArgs {
    /// path to the TOML config file
    #[argh(option, default = "PathBuf::from(\"./squeak.toml\")")]
    pub config: PathBuf,

    /// override the configured peer listen port
    #[argh(option)]
    pub peer_port: Option<u16>,

    /// override the configured admin RPC port
    #[argh(option)]
    pub admin_port: Option<u16>,

    /// log filter directive to use when `SQUEAK_LOG` is unset
    #[argh(option, default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Initialize a fresh data directory: create it, run migrations, and write
/// a default config file if one isn't already present.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "init")]
pub struct InitArgs {
    /// directory to initialize
    #[argh(option, default = "PathBuf::from(\"./squeak-data\")")]
    pub data_dir: PathBuf,
}
