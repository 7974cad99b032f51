use clap::Parser;
use std::net::Ipv4Addr;

use pilotd::web;

/// The Resilience Pilot: a small HTTP service to break on purpose.
#[derive(Clone, Debug, Parser)]
struct Args {
    /// Address to bind on.
    #[clap(
        long = "address",
        value_parser,
        default_value = "0.0.0.0",
        env = "PILOT_ADDRESS"
    )]
    pub address: Ipv4Addr,

    /// Port to listen on.
    #[clap(long = "port", default_value = "8080", env = "PILOT_PORT")]
    pub port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().json().init();

    let Args { address, port } = Args::parse();

    web::serve(address, port).await;
}
