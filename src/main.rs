use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dod_party::config::Config;
use dod_party::deck::CardLibrary;
use dod_party::model::ToastMode;
use dod_party::net::server::{self, AppState};
use dod_party::net::Dialer;
use dod_party::session::{Client, Command, Driver, Host, UiEvent, UiSink};
use dod_party::telemetry;
use dod_party::util::id::{is_valid_lobby_code, new_lobby_code, new_peer_id};

#[derive(Parser)]
#[command(name = "dod-party")]
#[command(about = "Host or join a card party game lobby")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new lobby and host it
    Host {
        /// Display name
        #[arg(long)]
        name: String,
    },

    /// Join a lobby by its code
    Join {
        /// Six-character lobby code
        code: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Host address
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let cli = Cli::parse();
    let config = Config::from_env();

    let library = Arc::new(load_library(&config).await);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    tokio::spawn(log_ui(ui_rx));

    let shutdown = CancellationToken::new();
    let (driver, net_tx, cmd_tx) = Driver::new(config.keepalive_interval, shutdown.clone());
    tokio::spawn(read_console(cmd_tx));

    match cli.command {
        Commands::Host { name } => {
            let code = new_lobby_code();
            let session_id = config.session_id(&code);
            info!(%code, "lobby open, share this code");
            let host = Host::new(session_id.clone(), name, library, UiSink::new(ui_tx), &config);
            let state = AppState { session_id: session_id.into(), events: net_tx };
            let server = tokio::spawn(server::serve(config.server_addr(), state, shutdown.clone()));
            driver.run(host).await;
            shutdown.cancel();
            server.await??;
        }
        Commands::Join { code, name, addr } => {
            let session_id = config.session_id(&code.trim().to_uppercase());
            if !is_valid_lobby_code(config.lobby_code(&session_id)) {
                bail!("{code:?} is not a lobby code");
            }
            let peer_id = new_peer_id();
            let dialer = Dialer::new(&addr, &session_id, &name, &peer_id);
            info!(url = %dialer.url(), "joining");
            let client = Client::new(peer_id, name, library, UiSink::new(ui_tx), &config);
            drop(net_tx);
            driver.with_dialer(dialer).run(client).await;
        }
    }
    Ok(())
}

async fn load_library(config: &Config) -> CardLibrary {
    match CardLibrary::load_dir(&config.cards_dir).await {
        Ok(lib) => {
            info!(dir = %config.cards_dir.display(), editions = lib.len(), "card library loaded");
            lib
        }
        Err(err) => {
            warn!(dir = %config.cards_dir.display(), %err, "no card library, games cannot start");
            CardLibrary::new()
        }
    }
}

async fn read_console(commands: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if commands.send(command).is_err() {
                    break;
                }
            }
            Err(err) => warn!(%err, "bad command"),
        }
    }
}

async fn log_ui(mut events: mpsc::UnboundedReceiver<UiEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            UiEvent::Toast { message, mode: ToastMode::Error, .. } => warn!(%message, "toast"),
            UiEvent::Toast { message, .. } => info!(%message, "toast"),
            UiEvent::HideToast(key) => tracing::debug!(key, "hide toast"),
            UiEvent::Navigate(screen) => info!(?screen, "navigate"),
            UiEvent::RoundWon { name } => info!(%name, "round won"),
            UiEvent::GameWon { player_id } => info!(%player_id, "game won"),
        }
    }
}
