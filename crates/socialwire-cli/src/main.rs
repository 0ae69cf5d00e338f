//! # socialwire
//!
//! Terminal client for the socialwire event socket.
//!
//! ## Usage
//!
//! ```bash
//! # Connect to the default origin
//! socialwire
//!
//! # Connect with a session cookie and a custom config
//! socialwire --config /path/to/socialwire.toml --cookie "sid=..."
//!
//! # Run with environment variables
//! SOCIALWIRE_ORIGIN=https://social.example.com SOCIALWIRE_SESSION=sid=... socialwire
//! ```
//!
//! Type `/help` once connected for the console commands.

mod config;
mod console;
mod metrics;

use anyhow::Result;
use clap::Parser;
use socialwire_client::Client;
use socialwire_core::ConnectionState;
use socialwire_protocol::RequestType;
use socialwire_transport::WebSocketConnector;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::console::Input;

#[derive(Parser, Debug)]
#[command(name = "socialwire", version, about = "socialwire event socket client")]
struct Args {
    /// Config file; the default search path is used when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Page origin, e.g. https://social.example.com.
    #[arg(long, env = "SOCIALWIRE_ORIGIN")]
    origin: Option<String>,

    /// Session cookie sent with the handshake, as name=value.
    #[arg(long, env = "SOCIALWIRE_SESSION", hide_env_values = true)]
    cookie: Option<String>,

    /// Serve Prometheus metrics on this port.
    #[arg(long)]
    metrics_port: Option<u16>,
}

impl Args {
    /// Flags and their environment variables win over the config file.
    fn apply(self, config: &mut Config) {
        if let Some(origin) = self.origin {
            config.origin = origin;
        }
        if let Some(cookie) = self.cookie.filter(|c| !c.is_empty()) {
            config.session_cookie = Some(cookie);
        }
        if let Some(port) = self.metrics_port {
            config.metrics.enabled = true;
            config.metrics.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "socialwire=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);

    if config.metrics.enabled {
        metrics::start_metrics_server(config.metrics.port)?;
    }

    let endpoint = config.endpoint()?;
    info!("Connecting to {}", endpoint);

    let connector = WebSocketConnector::new(config.websocket_config());
    let (client, task) = Client::start(connector, endpoint, config.client_config());

    run_console(&client).await?;

    client.shutdown().await;
    if let Err(e) = task.await {
        warn!(error = %e, "Connection manager task failed");
    }
    Ok(())
}

async fn run_console(client: &Client) -> Result<()> {
    let mut events = client.subscribe_kinds(console::PRINTED_KINDS)?;
    let mut errors = client.errors();
    let mut state = client.watch_state();
    let mut presence = client.presence();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", console::format_state(client.state()));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match console::parse_command(&line) {
                    Ok(Input::Quit) => break,
                    Ok(input) => handle_input(client, input),
                    Err(e) => println!("{e}"),
                }
            }

            Some(event) = events.recv() => println!("{}", console::format_event(&event)),

            error = errors.recv() => match error {
                Ok(error) => println!("{}", console::format_server_error(&error)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed server errors"),
                Err(RecvError::Closed) => break,
            },

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                println!("{}", console::format_state(current));
            }

            changed = presence.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = presence.borrow_and_update().clone();
                println!("{}", console::format_presence(&online));
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

fn handle_input(client: &Client, input: Input) {
    match input {
        Input::Request {
            request_type,
            payload,
        } => {
            if client.state() != ConnectionState::Connected {
                println!("[queued] {request_type} (not connected)");
            }
            let client = client.clone();
            tokio::spawn(async move { print_reply(&client, request_type, payload).await });
        }
        Input::Online => println!("{}", console::format_presence(&client.online_users())),
        Input::State => println!("{}", console::format_state(client.state())),
        Input::Requests => println!("{}", console::request_list()),
        Input::Help => println!("{}", console::HELP),
        Input::Quit | Input::Empty => {}
    }
}

async fn print_reply(client: &Client, request_type: RequestType, payload: serde_json::Value) {
    match client.call(request_type, &payload).await {
        Ok(reply) => println!("{}", console::format_reply(request_type, &reply)),
        Err(e) => println!("[failed {request_type}] {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::try_parse_from([
            "socialwire",
            "--origin",
            "https://social.example.com",
            "--cookie",
            "sid=abc",
            "--metrics-port",
            "9100",
        ])
        .unwrap();

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.origin, "https://social.example.com");
        assert_eq!(config.session_cookie.as_deref(), Some("sid=abc"));
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9100);
    }
}
