use std::sync::Arc;

use clap::Parser;
use poker_core::auth::Role;
use poker_server::{ServerConfig, StaticAuthorizer};

/// Planning poker session server.
#[derive(Debug, Parser)]
#[command(name = "pokerd", version)]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Voter account, repeatable. The passcode equals the name.
    #[arg(long = "user", value_name = "NAME")]
    users: Vec<String>,

    /// Scrum master account, repeatable. The passcode equals the name.
    #[arg(long = "master", value_name = "NAME")]
    masters: Vec<String>,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut auth = StaticAuthorizer::new();
    for name in &args.users {
        auth = auth.with_user(name, name, Role::Voter);
    }
    for name in &args.masters {
        auth = auth.with_user(name, name, Role::ScrumMaster);
    }
    tracing::info!(
        voters = args.users.len(),
        masters = args.masters.len(),
        "accounts provisioned"
    );

    let config = ServerConfig {
        port: args.port,
        ..Default::default()
    };
    let handle = poker_server::start(config, Arc::new(auth))
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "poker server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}
