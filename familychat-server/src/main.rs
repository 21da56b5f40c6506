use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (FAMILYCHAT_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("FAMILYCHAT_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("familychat_server=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let config = familychat_server::config::ServerConfig::parse();
    tracing::info!("Starting family chat server on {}", config.listen_addr);
    tracing::info!("Group channel: {}", config.group_name);

    let server = familychat_server::server::Server::new(config);
    server.run().await
}
