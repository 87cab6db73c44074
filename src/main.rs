use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use analyzer_session::{AppConfig, AppState, SessionEvent};

/// Boot the session layer and resolve a navigation
#[derive(Debug, Parser)]
#[command(name = "analyzer-session", version)]
struct Cli {
    /// Path to navigate to once the session check completes
    #[arg(default_value = "/")]
    path: String,

    /// Refresh token from a previous login, used to restore the session
    #[arg(long, env = "ANALYZER_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    /// Keep running and re-resolve the navigation on every session event
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if cfg!(debug_assertions) {
                "analyzer_session=debug,warn".into()
            } else {
                "analyzer_session=info,warn".into()
            }
        }))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    debug!(path = %cli.path, watch = cli.watch, "Parsed arguments");

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    info!(
        keycloak = %config.keycloak.url,
        realm = %config.keycloak.realm,
        api = %config.api.base_url,
        "Configuration loaded"
    );

    let state = AppState::with_keycloak(config, cli.refresh_token.clone())
        .context("Failed to build session layer")?;

    let session = state.start().await;
    let navigation = state.navigate(&cli.path).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "session": session,
            "navigation": navigation,
        }))?
    );

    if cli.watch {
        watch(&state, &cli.path).await?;
    }

    state.shutdown().await;
    Ok(())
}

async fn watch(state: &AppState, path: &str) -> Result<()> {
    let mut events = state.session.subscribe();
    for event in events.replay_buffer().await {
        debug!(event = event.name(), "Earlier session event");
    }
    info!("Watching session events, press Ctrl+C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                info!("Interrupted");
                return Ok(());
            }
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Missed session events");
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "Session event stream closed");
                        return Ok(());
                    }
                };

                let navigation = state.navigate(path).await;
                println!(
                    "{}",
                    serde_json::to_string(&json!({
                        "event": event,
                        "navigation": navigation,
                    }))?
                );

                if let SessionEvent::LoggedOut { target, .. } = &event {
                    info!(%target, "Session ended, follow the logout redirect");
                }
            }
        }
    }
}
