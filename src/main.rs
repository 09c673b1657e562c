//! Zerion terminal client
//!
//! Thin presentation shell around the realtime core: it logs in, opens the
//! session, prints server traffic, and forwards typed commands as intents
//! on the event bridge. All game semantics live in the library crate.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zerion_client::auth::AuthClient;
use zerion_client::config::Config;
use zerion_client::events::{ChatIntent, EventBridge, MoveIntent};
use zerion_client::net::Connection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    info!("Starting Zerion client");
    info!("API base: {}", config.api_base);
    info!("WebSocket endpoint: {}", config.ws_url);

    let bridge = Arc::new(EventBridge::new());

    bridge.server_hello.subscribe(|hello| {
        info!(
            tick_hz = hello.tick_hz,
            server_time_ms = hello.server_time_ms,
            "connected to server"
        );
    });
    bridge.server_state.subscribe(|state| {
        debug!(
            x = state.you.x,
            y = state.you.y,
            hp = state.you.hp,
            entities = state.entities.len(),
            "state"
        );
    });
    bridge.server_chat.subscribe(|line| {
        let when = chrono::DateTime::from_timestamp_millis(line.ts as i64)
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());
        println!("[{}] #{} <{}> {}", when, line.channel, line.from, line.msg);
    });

    let auth = AuthClient::new(&config.api_base);
    let token = auth
        .login(&config.email, &config.password)
        .await
        .context("login failed")?;

    let connection = Connection::new(&config, bridge.clone());
    connection.connect(&token).await.context("connect failed")?;

    println!("Connected. Type to chat, /move <dx> <dy>, /ping, /quit.");
    run_input_loop(&bridge, &connection).await?;

    connection.close();
    info!("Client shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Read stdin lines and publish them as intents until quit or Ctrl+C
async fn run_input_loop(bridge: &EventBridge, connection: &Connection) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                if !handle_line(bridge, connection, line.trim()) {
                    return Ok(());
                }
            }
        }
    }
}

/// Dispatch one typed line; returns false to quit
fn handle_line(bridge: &EventBridge, connection: &Connection, line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [] => {}
        ["/quit"] | ["/exit"] => return false,
        ["/ping"] => connection.send_ping(),
        ["/move", dx, dy] => match (dx.parse::<f64>(), dy.parse::<f64>()) {
            (Ok(dx), Ok(dy)) => bridge.client_move.publish(&MoveIntent { dx, dy }),
            _ => println!("usage: /move <dx> <dy>"),
        },
        _ if line.starts_with('/') => {
            println!("commands: /move <dx> <dy>, /ping, /quit");
        }
        _ => bridge.client_chat.publish(&ChatIntent {
            text: line.to_string(),
        }),
    }
    true
}
