//! Command-line interface of the `devpack` binary.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Development server with in-memory bundling and hot updates
#[derive(Parser, Debug)]
#[command(
    name = "devpack",
    version,
    about = "Development server with in-memory bundling and hot updates"
)]
pub struct Cli {
    /// Project root; entry modules are resolved against it
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Build directory, relative to the root unless absolute
    #[arg(long, default_value = ".devpack")]
    pub build_dir: PathBuf,

    /// Options file (defaults to devpack.toml in the root, if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
