//! CLI for PopRelay
//!
//! Subcommands:
//! - `server`: run the HTTP producer endpoint and the WebSocket consumer endpoint
//! - `client`: connect to a consumer endpoint and print every message received

use clap::{Parser, Subcommand};
use poprelay::config::{Settings, load_config, load_config_from};
use poprelay::gateway::{self, AppState, Producer};
use poprelay::persistence::StoreTarget;
use poprelay::queue::{BoundedQueue, QueueConfig};
use poprelay::relay::{MessageFilter, SessionConfig};
use poprelay::transport::start_websocket_server;
use poprelay::utils::logging;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "poprelay")]
struct Cli {
    /// Configuration file (defaults to config/default.* when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the producer and consumer endpoints
    Server,
    /// Listen on a consumer endpoint and print incoming messages
    Client {
        /// WebSocket URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8003")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match cli.config.as_deref() {
        Some(path) => load_config_from(path, true),
        None => load_config(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.log.level);

    let result = match cli.command {
        Command::Server => run_server(settings).await,
        Command::Client { url } => run_client(&url).await,
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let target = StoreTarget::parse(&settings.queue.store_connection_target);
    let queue = Arc::new(BoundedQueue::new(
        QueueConfig::from_settings(&settings.queue),
        target.connector(),
    ));
    if !queue.connect().await {
        return Err("failed to connect to the message store".into());
    }

    let filter = MessageFilter::from_settings(&settings.filter);
    if let MessageFilter::Unknown(mode) = &filter {
        warn!("unrecognized filter mode {mode:?}; consumers will receive nothing");
    }

    let host = settings.server.host.as_str();
    let http_listener = TcpListener::bind((host, settings.server.http_port)).await?;
    let ws_listener = TcpListener::bind((host, settings.server.ws_port)).await?;

    let shutdown = CancellationToken::new();
    let state = AppState {
        producer: Producer::new(queue.clone(), settings.message.max_content_length),
        queue: queue.clone(),
        filter: filter.clone(),
    };
    let session_config = SessionConfig::from_settings(&settings.relay, &settings.queue);

    let mut http = tokio::spawn(gateway::serve(http_listener, state, shutdown.clone()));
    let mut ws = tokio::spawn(start_websocket_server(
        ws_listener,
        queue.clone(),
        filter,
        session_config,
        shutdown.clone(),
    ));

    let (http_done, ws_done) = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            (false, false)
        }
        result = &mut http => {
            error!("HTTP server exited unexpectedly: {result:?}");
            (true, false)
        }
        _ = &mut ws => {
            error!("WebSocket server exited unexpectedly.");
            (false, true)
        }
    };

    // Both servers drain before the store goes away.
    shutdown.cancel();
    if !http_done {
        match http.await {
            Ok(Err(e)) => error!("HTTP server failed while stopping: {e}"),
            Err(e) => error!("HTTP server task failed: {e}"),
            Ok(Ok(())) => info!("HTTP server stopped"),
        }
    }
    if !ws_done {
        if let Err(e) = ws.await {
            error!("WebSocket server task failed: {e}");
        }
    }

    if queue.disconnect().await {
        info!("Message store disconnected.");
    }

    Ok(())
}

async fn run_client(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;
    println!("WebSocket connected. Listening for messages...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Shutdown signal received.");
                break;
            }
            frame = ws_stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => println!("Message received: {text}"),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }

    let _ = ws_stream.close(None).await;
    println!("Closing WebSocket client.");
    Ok(())
}
