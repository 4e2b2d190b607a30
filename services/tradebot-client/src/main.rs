//! Headless Trading Bot Client
//!
//! Runs the client core without a UI:
//! 1. Loads config and restores the saved session (or logs in from env)
//! 2. Syncs strategies and notification history into the local cache
//! 3. Listens on the live channel and raises notifications
//! 4. Logs cache updates until Ctrl-C

use futures::StreamExt;
use std::path::PathBuf;
use tracing::{error, info, warn};

use tradebot_client::observability::init_tracing;
use tradebot_client::{ClientConfig, TradingClient};

const HISTORY_LIMIT: u64 = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_file = std::env::var("TRADEBOT_CONFIG").ok().map(PathBuf::from);
    let config = ClientConfig::load(config_file.as_deref())?;

    init_tracing(&config.log_level)?;
    info!("Starting trading client against {}", config.api_base_url);

    let client = TradingClient::connect(config).await?;

    if !client.auth().is_logged_in() {
        login_from_env(&client).await?;
    }

    match client.auth().current_user().await {
        Ok(user) => info!("Signed in as {} ({})", user.email, user.id),
        Err(e) => warn!("Could not load profile: {}", e),
    }

    sync(&client).await;
    client.prune_notifications().await;
    client.start_live();

    let mut strategies = client.strategies().observe_strategies();
    let mut unread = client.notifications().observe_unread_count();
    let mut auth_state = client.auth().auth_state();

    loop {
        tokio::select! {
            Some(list) = strategies.next() => {
                let running = list.iter().filter(|s| s.status.is_running()).count();
                info!("{} strategies cached ({} running)", list.len(), running);
            }
            Some(count) = unread.next() => {
                info!("{} unread notifications", count);
            }
            changed = auth_state.changed() => {
                if changed.is_err() || *auth_state.borrow() == tradebot_client::AuthState::Unauthenticated {
                    error!("Session ended, log in again");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

async fn login_from_env(client: &TradingClient) -> anyhow::Result<()> {
    let email = std::env::var("TRADEBOT_EMAIL")
        .map_err(|_| anyhow::anyhow!("No saved session and TRADEBOT_EMAIL is not set"))?;
    let password = std::env::var("TRADEBOT_PASSWORD")
        .map_err(|_| anyhow::anyhow!("TRADEBOT_PASSWORD environment variable required"))?;

    client
        .auth()
        .login(&email, &password)
        .await
        .map_err(|e| anyhow::anyhow!("Login failed: {}", e.user_message()))
}

async fn sync(client: &TradingClient) {
    match client.strategies().refresh().await {
        Ok(list) => info!("Synced {} strategies", list.len()),
        Err(e) => warn!("Strategy sync failed: {}", e),
    }

    match client.notifications().refresh_history(HISTORY_LIMIT).await {
        Ok(n) => info!("Synced {} notifications", n),
        Err(e) => warn!("Notification sync failed: {}", e),
    }

    let mut pager = client.trades().pager(None);
    match pager.refresh().await {
        Ok(trades) => info!("Synced {} recent trades", trades.len()),
        Err(e) => warn!("Trade sync failed: {}", e),
    }
}
