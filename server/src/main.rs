use clap::Parser;
use log::info;
use server::config::{Args, ServerConfig};
use server::network::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig::try_from(args)?;

    info!(
        "Starting session server on {} (max {} connections)",
        config.bind_addr, config.max_connections
    );

    let server = Server::bind(config).await?;
    server.run().await?;

    info!("Server stopped");
    Ok(())
}
