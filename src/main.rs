//! MIDI Automator
//!
//! Runs automation workers, the set list navigation and the control REPL
//! until Ctrl+C or `quit`.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midi_automator::automation::{AutomationContext, AutomationRegistry};
use midi_automator::cli::{self, ReplCommand, HELP};
use midi_automator::config::{AppConfig, ConfigWatcher};
use midi_automator::desktop::{NullScreenMatcher, XdotoolDesktop};
use midi_automator::dispatch::{DispatchQueue, MidiDispatcher, SwitchSignatures};
use midi_automator::error::{AutomatorError, Result as AutomatorResult};
use midi_automator::file_open::SystemFileOpener;
use midi_automator::navigation::NavigationController;
use midi_automator::paths::AppPaths;
use midi_automator::playlist::{
    Direction, InsertPosition, JsonPlaylistStore, PlaylistItem, PlaylistService,
};
use midi_automator::properties::PropertiesFile;
use midi_automator::signature;
use midi_automator::sniffer;
use midi_automator::status::StatusBoard;
use midi_automator::transport::{InboundMidi, MidirTransport};

/// MIDI Automator - GUI automations and set list switching from MIDI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: detected app data location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write a daily-rolling log file into the logs directory
    #[arg(long)]
    log_file: bool,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Print signatures of incoming MIDI, optionally only from matching inputs
    #[arg(long, value_name = "PATTERN", num_args = 0..=1, default_missing_value = "")]
    learn: Option<String>,

    /// Run without the interactive REPL
    #[arg(long)]
    no_repl: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = match &args.config {
        Some(config) => AppPaths::with_config(config.clone()),
        None => AppPaths::detect(),
    };

    let _log_guard = init_logging(
        &args.log_level,
        args.log_file.then_some(paths.logs_dir.as_path()),
    )?;

    if args.list_ports {
        return sniffer::list_ports_formatted();
    }

    if let Some(pattern) = args.learn {
        let pattern = Some(pattern).filter(|p| !p.is_empty());
        return sniffer::run_learn(pattern).await;
    }

    info!("Starting MIDI Automator...");
    paths.ensure_directories()?;
    info!("Configuration file: {}", paths.config.display());

    let (config_watcher, initial_config) = ConfigWatcher::new(paths.config.clone()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    let (midi_tx, midi_rx) = mpsc::channel(256);
    let app = App::build(paths, (*initial_config).clone(), midi_tx);
    app.start().await;

    let (repl_tx, repl_rx) = mpsc::channel(16);
    let repl = if args.no_repl {
        None
    } else {
        Some(cli::spawn_repl(repl_tx.clone()))
    };

    run_app(app, config_watcher, midi_rx, repl_rx, repl_tx, shutdown_signal()).await?;

    info!("MIDI Automator shutdown complete");
    if repl.is_some_and(|handle| !handle.is_finished()) {
        // A REPL parked on stdin would keep the runtime from shutting down
        drop(_log_guard);
        std::process::exit(0);
    }
    Ok(())
}

/// Every long-lived service, owned by the main loop
struct App {
    paths: AppPaths,
    config: AppConfig,
    status: Arc<StatusBoard>,
    playlist: Arc<PlaylistService>,
    registry: Arc<AutomationRegistry>,
    transport: Arc<MidirTransport>,
    navigation: Arc<NavigationController>,
    dispatcher: Arc<MidiDispatcher>,
}

impl App {
    fn build(
        paths: AppPaths,
        config: AppConfig,
        midi_tx: mpsc::Sender<InboundMidi>,
    ) -> Self {
        let base_dir = paths.base_dir();
        let (playlist_path, automations_path) = config.resolve_files(&base_dir);
        info!("Playlist file: {}", playlist_path.display());
        info!("Automations file: {}", automations_path.display());

        let status = Arc::new(StatusBoard::new());
        let playlist = Arc::new(PlaylistService::new(
            Arc::new(JsonPlaylistStore::new(playlist_path)),
            status.clone(),
        ));
        let registry = Arc::new(AutomationRegistry::new(
            AutomationContext {
                matcher: Arc::new(NullScreenMatcher),
                desktop: Arc::new(XdotoolDesktop::new()),
                timing: config.worker_timing(),
            },
            Arc::new(PropertiesFile::new(automations_path, "automations")),
            status.clone(),
        ));
        let transport = Arc::new(MidirTransport::new(midi_tx));
        let navigation = Arc::new(NavigationController::new(
            playlist.clone(),
            registry.clone(),
            transport.clone(),
            Arc::new(SystemFileOpener::new(base_dir)),
            status.clone(),
            config.navigation_settings(),
        ));
        let dispatcher = Arc::new(MidiDispatcher::new(
            registry.clone(),
            navigation.clone(),
            playlist.clone(),
            switch_signatures(&config),
        ));

        Self {
            paths,
            config,
            status,
            playlist,
            registry,
            transport,
            navigation,
            dispatcher,
        }
    }

    /// Load the playlist and automations, then open the MIDI ports
    async fn start(&self) {
        self.load_playlist().await;
        self.load_automations().await;
        self.reopen_ports();
    }

    async fn load_playlist(&self) {
        match self.playlist.reload().await {
            Ok(list) => info!("📋 Playlist loaded: {} entries", list.len()),
            Err(AutomatorError::PersistenceNotFound { path }) => {
                info!("No playlist at {}, starting empty", path.display())
            }
            Err(e) => warn!("Playlist not loaded: {}", e),
        }
        self.navigation.reset().await;
    }

    async fn load_automations(&self) {
        match self.registry.load_from_properties().await {
            Ok(count) => info!("🤖 {} automation(s) loaded", count),
            Err(AutomatorError::PersistenceNotFound { path }) => {
                info!("No automations at {}, none running", path.display())
            }
            Err(e) => warn!("Automations not loaded, none running: {}", e),
        }
    }

    fn reopen_ports(&self) {
        self.transport.close_all();
        let opened = self
            .transport
            .open_from_config(&self.config.midi, &self.registry.trigger_devices());
        info!("🎹 {} MIDI port(s) connected", opened);
    }

    async fn apply_config(&mut self, config: AppConfig) {
        if config.files != self.config.files {
            warn!("Changed data file paths take effect on the next start");
        }

        self.registry.set_timing(config.worker_timing());
        self.navigation.update_settings(config.navigation_settings());
        self.dispatcher.update_switch(switch_signatures(&config));
        self.config = config;

        self.navigation.reset().await;
        self.load_automations().await;
        self.reopen_ports();
    }

    async fn handle_command(&self, command: ReplCommand) {
        if let Err(e) = self.run_command(command).await {
            println!("{} {}", "error:".red().bold(), e);
        }
    }

    async fn run_command(&self, command: ReplCommand) -> AutomatorResult<()> {
        match command {
            ReplCommand::List => self.print_playlist().await,
            ReplCommand::Open(index) => self.navigation.open_by_index(index, true).await?,
            ReplCommand::Next => self.navigation.next().await?,
            ReplCommand::Prev => self.navigation.previous().await?,
            ReplCommand::Add {
                name,
                file,
                program,
            } => {
                let mut item = PlaylistItem::new(name, file);
                item.program_path = program;
                self.store(InsertPosition::Append, item, false).await?;
            }
            ReplCommand::Insert { index, name, file } => {
                self.store(InsertPosition::At(index), PlaylistItem::new(name, file), false)
                    .await?;
            }
            ReplCommand::Set { index, name, file } => {
                self.edit_item(index, |item| {
                    item.name = name;
                    item.file_path = file;
                })
                .await?;
            }
            ReplCommand::Delete(index) => {
                self.playlist.delete(index).await?;
            }
            ReplCommand::Up(index) => self.move_item(index, Direction::Up).await?,
            ReplCommand::Down(index) => self.move_item(index, Direction::Down).await?,
            ReplCommand::Listen(index, sig) => {
                let sig = sig.as_deref().map(signature::canonicalize).transpose()?;
                self.edit_item(index, |item| item.listen_signature = sig)
                    .await?;
            }
            ReplCommand::Send(index, sig) => {
                let sig = match sig.as_deref() {
                    None => match self.playlist.unique_send_signature() {
                        Some(sig) => Some(sig),
                        None => {
                            println!("No unused send signature left");
                            return Ok(());
                        }
                    },
                    Some("") => None,
                    Some(sig) => Some(signature::canonicalize(sig)?),
                };
                self.edit_item(index, |item| item.send_signature = sig)
                    .await?;
            }
            ReplCommand::Sig => match self.playlist.unique_send_signature() {
                Some(sig) => println!("{}", sig.bright_blue()),
                None => println!("No unused send signature left"),
            },
            ReplCommand::Status => self.print_status().await,
            ReplCommand::Pause => {
                self.registry.set_all_active(false);
                println!("Automations paused");
            }
            ReplCommand::Resume => {
                self.registry.set_all_active(true);
                println!("Automations resumed");
            }
            ReplCommand::Reload => {
                self.load_playlist().await;
                self.load_automations().await;
                self.reopen_ports();
            }
            ReplCommand::Reset => self.navigation.reset().await,
            ReplCommand::Help => println!("{}", HELP),
            // Handled by the main loop
            ReplCommand::Quit => {}
        }
        Ok(())
    }

    async fn store(
        &self,
        position: InsertPosition,
        item: PlaylistItem,
        overwrite: bool,
    ) -> AutomatorResult<()> {
        if !self.playlist.insert(position, item, overwrite).await? {
            println!("Entry name must not be empty");
        }
        Ok(())
    }

    /// Overwrite an entry with an edited copy, keeping the fields `edit` leaves alone
    async fn edit_item(
        &self,
        index: usize,
        edit: impl FnOnce(&mut PlaylistItem),
    ) -> AutomatorResult<()> {
        let snapshot = self.playlist.snapshot();
        let mut item = snapshot
            .get(index)
            .cloned()
            .ok_or(AutomatorError::IndexOutOfRange {
                index,
                len: snapshot.len(),
            })?;
        edit(&mut item);
        self.store(InsertPosition::At(index), item, true).await
    }

    async fn move_item(&self, index: usize, direction: Direction) -> AutomatorResult<()> {
        if !self.playlist.move_item(index, direction).await? {
            println!("Entry {} cannot move {:?}", index, direction);
        }
        Ok(())
    }

    async fn print_playlist(&self) {
        let list = self.playlist.snapshot();
        let current = self.navigation.current().await;

        if list.is_empty() {
            println!("{}", "Playlist is empty".dimmed());
            return;
        }
        for (index, item) in list.items().iter().enumerate() {
            let marker = if current == Some(index) { ">" } else { " " };
            let mut line = format!(
                "{} {} {}  {}",
                marker.green().bold(),
                format!("[{}]", index).green(),
                item.name.bold(),
                item.file_path.dimmed()
            );
            if let Some(program) = &item.program_path {
                line.push_str(&format!("  ({})", program));
            }
            if let Some(sig) = &item.listen_signature {
                line.push_str(&format!("\n      listen: {}", sig.bright_blue()));
            }
            if let Some(sig) = &item.send_signature {
                line.push_str(&format!("\n      send:   {}", sig.bright_blue()));
            }
            println!("{}", line);
        }
    }

    async fn print_status(&self) {
        println!("{}", "=== Status ===".bold().cyan());
        println!("Config: {}", self.paths.config.display());
        match self.navigation.current().await {
            Some(index) => println!("Position: {}", index),
            None => println!("Position: {}", "unset".dimmed()),
        }

        let messages = self.status.current();
        if messages.is_empty() {
            println!("{}", "No status messages".dimmed());
        }
        for (kind, message) in messages {
            let label = format!("[{}]", kind);
            let label = if kind.is_error() {
                label.red()
            } else {
                label.green()
            };
            println!(
                "{} {} {}",
                message.at.format("%H:%M:%S").to_string().dimmed(),
                label,
                message.text
            );
        }

        println!("\n{}", "Automations:".bold());
        let summaries = self.registry.summaries();
        if summaries.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for summary in summaries {
            let state = match (summary.paused, summary.active) {
                (true, _) => "paused".yellow(),
                (false, true) => "armed".green(),
                (false, false) => "idle".dimmed(),
            };
            println!(
                "  {} {} {:?}, fired {}: {}",
                summary.name.bold(),
                state,
                summary.phase,
                summary.fired,
                summary.definition
            );
        }
    }

    async fn shutdown(&self) {
        self.registry.stop_all().await;
        self.transport.close_all();
        info!("All automations stopped and ports closed");
    }
}

fn switch_signatures(config: &AppConfig) -> SwitchSignatures {
    SwitchSignatures::new(
        config.switch.prev_signature.as_deref(),
        config.switch.next_signature.as_deref(),
    )
}

async fn run_app(
    mut app: App,
    mut config_watcher: ConfigWatcher,
    mut midi_rx: mpsc::Receiver<InboundMidi>,
    mut repl_rx: mpsc::Receiver<ReplCommand>,
    // Held so the command channel stays open without a REPL
    _repl_tx: mpsc::Sender<ReplCommand>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("Starting main application loop...");

    let (queue, navigation_task) = DispatchQueue::start(app.dispatcher.clone());
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Navigation runs on the queue's task, so the settle delay never blocks the loop
            Some(inbound) = midi_rx.recv() => {
                queue.submit(inbound).await;
            }

            Some(command) = repl_rx.recv() => {
                if command == ReplCommand::Quit {
                    info!("Quit requested");
                    break;
                }
                app.handle_command(command).await;
            }

            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                app.apply_config(new_config).await;
                info!("✅ Configuration applied");
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!("Shutting down...");
    drop(queue);
    navigation_task.abort();
    app.shutdown().await;
    Ok(())
}

fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create logs directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "midi-automator.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
