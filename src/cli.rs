use std::path::PathBuf;

use clap::Parser;

/// Server for the Basic Chat Protocol.
#[derive(Parser, Debug)]
#[command(name = "rpchat", version, about)]
pub struct Args {
    /// Port to host on
    #[arg(short = 'p', long = "port", default_value_t = 9001)]
    pub port: u16,

    /// Log location (defaults to stdout); appended, created with mode 0744
    #[arg(short = 'l', long = "log")]
    pub log: Option<PathBuf>,
}
