//! Command-line argument parsing

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "filestore.toml";

/// Filestore Server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// IP address to bind to, overriding the config file (IPv4 or IPv6)
    #[arg(short, long)]
    pub bind: Option<IpAddr>,

    /// Port to listen on, overriding the config file
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Enable debug logging (per-call progress); RUST_LOG takes precedence
    #[arg(long, default_value = "false")]
    pub debug: bool,
}
