use std::path::PathBuf;

use clap::Parser;
use url::Url;

pub mod op;
pub mod ops;

crate::command_enum! {
    (Daemon, ops::Daemon),
    (Volume, ops::Volume),
    (Health, ops::Health),
    (Version, ops::Version),
}

pub const DEFAULT_REMOTE: &str = "http://localhost:8080";

/// Tail files written into container volumes and stream their lines
#[derive(Parser, Debug)]
#[command(name = "tailvol", version, about)]
pub struct Args {
    /// Daemon address used by client commands
    #[arg(long, global = true, env = "TAILVOL_REMOTE", default_value = DEFAULT_REMOTE)]
    pub remote: Url,

    /// TOML config file
    #[arg(long, global = true, env = "TAILVOL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}
