//! Companion application binary - composition root.
//!
//! Ties the engine crates into a single executable:
//! 1. Load configuration from TOML, apply CLI overrides
//! 2. Open the file-backed store and read engine settings
//! 3. Build the generation client, conversation repository and turn pipeline
//! 4. Start the debounced persistence writer
//! 5. Run the REPL until `/quit`, end of input or Ctrl-C

mod cli;
mod repl;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use companion_chat::{
    AttachmentRegistry, ConversationRepository, EngineSettings, FeedbackLog, HealthProbe,
    HttpGenerationClient, PersistenceHandle, PipelineConfig, TurnPipeline,
};
use companion_core::config::CompanionConfig;
use companion_core::events::{EngineEvent, EventBus};
use companion_dialogue::{DialogueController, Directory, LiveChat, LiveChatConfig, SimulatedDesk};
use companion_store::{DurableStore, FileStore, KeyValueStore};

use cli::CliArgs;
use repl::{Flow, Session};

/// Print user-visible notices as they are published.
async fn print_notices(events: EventBus) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(EngineEvent::Notice { level, message }) => println!("[{:?}] {}", level, message),
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Notice printer lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = CompanionConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Companion v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let data_dir = cli::expand_home(&config.general.data_dir);
    let file_store = match FileStore::open(&data_dir) {
        Ok(store) => store.with_quota(config.conversations.store_quota_bytes),
        Err(e) => {
            tracing::error!(path = %data_dir.display(), error = %e, "Failed to open data directory");
            return Err(e.into());
        }
    };
    tracing::info!(path = %data_dir.display(), "Store opened");

    let events = EventBus::default();
    tokio::spawn(print_notices(events.clone()));

    let backend: Arc<dyn KeyValueStore> = Arc::new(file_store);
    let store = DurableStore::new(backend, events.clone());

    // Settings. The stored backend URL overrides the file; the flag overrides both.
    let settings = EngineSettings::load(&store);
    if let Some(url) = args.resolve_backend_url().or_else(|| settings.backend_url.clone()) {
        config.backend.base_url = url;
    }

    // Generation.
    let probe = Arc::new(HealthProbe::from_config(&config.backend));
    let client = Arc::new(HttpGenerationClient::from_config(
        &config.backend,
        Arc::clone(&probe),
    ));
    tracing::info!(url = %config.backend.chat_url(), "Generation client ready");

    // Conversations.
    let feedback = FeedbackLog::new(store.clone(), &settings);
    let repo = Arc::new(ConversationRepository::new(
        store,
        Arc::new(AttachmentRegistry::new()),
        config.conversations.clone(),
    ));
    let restored = repo.initialize();
    tracing::info!(conversations = restored, "Conversations loaded");
    let persistence = PersistenceHandle::spawn(&repo);

    let pipeline = TurnPipeline::new(
        Arc::clone(&repo),
        client.clone(),
        PipelineConfig::new(&config.conversations, &config.backend, &settings),
    );

    // Help-desk widget.
    let live = LiveChat::new(
        client,
        LiveChatConfig::new(&config.conversations, &config.backend, &settings),
    );
    let widget = DialogueController::new(
        Directory::builtin(),
        Arc::new(SimulatedDesk::from_config(&config.widget)),
        live,
        events.clone(),
    );

    // === REPL ===

    let mut session = Session::new(pipeline, widget, probe, feedback);
    let mut stdout = std::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type a message, or /help for commands.");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };

        let command = match repl::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("error: {}", e);
                continue;
            }
        };
        if session.execute(command, &mut stdout).await? == Flow::Quit {
            break;
        }
    }

    // === Shutdown ===

    drop(session);
    persistence.shutdown().await;
    tracing::info!("Conversations saved, bye");

    Ok(())
}
