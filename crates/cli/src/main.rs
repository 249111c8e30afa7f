mod repl;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatdesk_core::logging::{LoggingConfig, init_logging};
use chatdesk_core::{Config, Error, RequestParameters, markup};
use chatdesk_providers::{ModelClient, ProviderFactory, RetryConfig};
use chatdesk_session::{ConversationManager, RequestOutcome, SessionEvent, SessionId, SessionOptions, SessionUpdate};
use chatdesk_store::{RecordStore, TranscriptArchive};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use repl::ReplCommand;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// chatdesk - chat with a hosted language model from the terminal
#[derive(Parser, Debug)]
#[command(name = "chatdesk")]
#[command(about = "A multi-conversation chat client for OpenAI-compatible models", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to chatdesk.toml (default: ./chatdesk.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose output (also raises the log level to debug)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Start the interactive chat loop (default)
    Chat,
    /// List transcripts saved to the database
    History,
    /// Print an example configuration
    ExampleConfig,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.command == Some(Commands::ExampleConfig) {
        print!("{}", Config::example());
        return Ok(());
    }

    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("chatdesk.toml"));
    let config = load_or_create_config(&config_path)?;

    let mut logging = LoggingConfig::from(config.logging.clone());
    if cli.verbose {
        logging = logging.with_level("debug");
    }
    let _log_guard = init_logging(Some(logging)).context("Failed to initialize logging")?;

    if cli.verbose {
        println!("{} Using config: {}", "Info:".blue().bold(), config_path.display());
        println!("{} Provider: {} ({})", "Info:".blue().bold(), config.provider.kind, config.provider.model.cyan());
        println!("{} Database: {}", "Info:".blue().bold(), config.database.path.display());
    }

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(cmd_chat(&config))
        }
        Commands::History => cmd_history(&config),
        Commands::ExampleConfig => Ok(()),
    }
}

/// Load config from file or create from example
fn load_or_create_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    } else {
        println!("{} Config not found at {}", "Warning:".yellow().bold(), path.display());
        println!("{} Creating config from example...", "Info:".blue().bold());

        std::fs::write(path, Config::example()).context("Failed to create config")?;

        println!(
            "{} Created config at {}. Please edit it with your settings.",
            "Success:".green().bold(),
            path.display()
        );

        anyhow::bail!("Please edit {} with your settings and run again", path.display())
    }
}

fn open_store(config: &Config) -> Result<Arc<RecordStore>> {
    let store = RecordStore::open(&config.database.path)
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    Ok(Arc::new(store))
}

/// List archived transcripts
fn cmd_history(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let archive = TranscriptArchive::new(Arc::clone(&store));
    let entries = archive.list().context("Failed to read saved transcripts")?;

    println!("{}", "Saved transcripts".green().bold().underline());
    if entries.is_empty() {
        println!("  (none)");
    }
    for entry in &entries {
        let messages = entry.record.entries().map(|e| e.len()).unwrap_or(0);
        println!("  #{} {}  {} messages", entry.id.to_string().cyan(), entry.record.created_time, messages);
    }

    store.close().context("Failed to close database")?;
    Ok(())
}

/// Run the interactive loop until `/quit` or end of input
async fn cmd_chat(config: &Config) -> Result<()> {
    let provider = ProviderFactory::create_from_config(&config.provider).context("Failed to create provider")?;
    let store = open_store(config)?;
    let client = ModelClient::new(provider, RetryConfig::from(&config.retry));

    let (tx, mut updates) = mpsc::unbounded_channel();
    let mut manager = ConversationManager::new(client, Arc::clone(&store), SessionOptions::from(&config.defaults), tx);

    println!(
        "{} Chatting with {}. Type /help for commands.",
        "Info:".blue().bold(),
        config.provider.model.cyan()
    );
    print_prompt(&manager);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                match repl::parse(&line) {
                    Ok(ReplCommand::Quit) => break,
                    Ok(command) => apply(&mut manager, command, config, &store),
                    Err(e) => println!("{} {}", "Warning:".yellow().bold(), e),
                }
                drain_updates(&mut updates, manager.active_id());
                print_prompt(&manager);
            }
            _ = tick.tick() => {
                let outcomes = manager.poll_all();
                drain_updates(&mut updates, manager.active_id());
                if !outcomes.is_empty() {
                    for (id, outcome) in outcomes {
                        print_outcome(&manager, id, &outcome);
                    }
                    print_prompt(&manager);
                }
            }
        }
    }

    manager.shutdown();
    store.close().context("Failed to close database")?;
    tracing::info!("chat loop finished");
    Ok(())
}

fn apply(manager: &mut ConversationManager, command: ReplCommand, config: &Config, store: &Arc<RecordStore>) {
    match command {
        ReplCommand::Submit(text) => {
            let session = manager.active_mut();
            session.set_input(text);
            if let Err(e) = session.submit_prompt() {
                tracing::debug!(error = %e, "submit rejected");
                // the status line already reports an empty prompt
                if !matches!(e, Error::EmptyPrompt) {
                    println!("{} {}", "Warning:".yellow().bold(), e);
                }
            }
        }
        ReplCommand::New => {
            let id = manager.new_conversation();
            if let Some(session) = manager.get(id) {
                println!("{} Opened {} (/switch {})", "Info:".blue().bold(), session.title().cyan(), id);
            }
        }
        ReplCommand::Switch(id) => {
            if !manager.set_active(SessionId(id)) {
                println!("{} No conversation {}", "Warning:".yellow().bold(), id);
            }
        }
        ReplCommand::Close => {
            let id = manager.active_id();
            if !manager.close_conversation(id) {
                println!("{} The last conversation cannot be closed", "Warning:".yellow().bold());
            }
        }
        ReplCommand::List => {
            let active = manager.active_id();
            for session in manager.iter() {
                let marker = if session.id() == active { "*" } else { " " };
                let busy = if session.is_busy() { " (waiting)" } else { "" };
                println!(
                    " {} {} {}  {} messages{}",
                    marker,
                    session.id(),
                    session.title(),
                    session.transcript().len(),
                    busy
                );
            }
        }
        ReplCommand::Clear => manager.active_mut().clear_input(),
        ReplCommand::Save => {
            if let Err(e) = manager.active_mut().save_transcript_to_file(&config.export.dir) {
                tracing::warn!(error = %e, "file export failed");
            }
        }
        ReplCommand::SaveDb => {
            if let Err(e) = manager.active_mut().save_transcript_to_database() {
                tracing::warn!(error = %e, "database save failed");
            }
        }
        ReplCommand::ZoomIn => manager.active_mut().zoom_in(),
        ReplCommand::ZoomOut => manager.active_mut().zoom_out(),
        ReplCommand::Tokens(tokens) => {
            let session = manager.active_mut();
            let parameters = session.parameters().with_max_tokens(tokens);
            session.update_parameters(parameters);
            println!("{} Token limit: {}", "Info:".blue().bold(), parameters.max_tokens());
        }
        ReplCommand::Temperature(slider) => {
            let session = manager.active_mut();
            let parameters = RequestParameters::from_sliders(i64::from(session.parameters().max_tokens()), slider);
            session.update_parameters(parameters);
            println!("{} Temperature: {:.2}", "Info:".blue().bold(), parameters.temperature());
        }
        ReplCommand::History => {
            let archive = TranscriptArchive::new(Arc::clone(store));
            match archive.list() {
                Ok(entries) => {
                    for entry in entries {
                        println!("  #{} {}", entry.id.to_string().cyan(), entry.record.created_time);
                    }
                }
                Err(e) => println!("{} {}", "Warning:".yellow().bold(), e),
            }
        }
        ReplCommand::Help => println!("{}", repl::HELP),
        ReplCommand::Quit => {}
    }
}

fn drain_updates(updates: &mut mpsc::UnboundedReceiver<SessionUpdate>, active: SessionId) {
    let mut pending = Vec::new();
    while let Ok(update) = updates.try_recv() {
        pending.push(update);
    }
    for line in render_updates(&pending, active) {
        println!("{}", line);
    }
}

/// Terminal lines for a batch of updates.
///
/// The status change that repeats a `RequestFailed` message is skipped.
fn render_updates(updates: &[SessionUpdate], active: SessionId) -> Vec<String> {
    let mut lines = Vec::new();
    let mut previous: Option<&SessionUpdate> = None;
    for update in updates {
        let repeats_failure = match (previous.map(|p| (p.session_id, &p.event)), &update.event) {
            (Some((id, SessionEvent::RequestFailed { message })), SessionEvent::StatusChanged(status)) => {
                id == update.session_id && message == status
            }
            _ => false,
        };
        if !repeats_failure && let Some(line) = render_update(update, active) {
            lines.push(line);
        }
        previous = Some(update);
    }
    lines
}

/// Terminal line for `update`, if it is worth showing
fn render_update(update: &SessionUpdate, active: SessionId) -> Option<String> {
    let prefix = if update.session_id == active { String::new() } else { format!("[{}] ", update.session_id) };
    let line = match &update.event {
        SessionEvent::StatusChanged(status) if !status.is_empty() => format!("{}{}", prefix, status.dimmed()),
        SessionEvent::RequestFailed { message } => format!("{}{} {}", prefix, "Request failed:".red().bold(), message),
        SessionEvent::BusyChanged(true) => format!("{}{}", prefix, "waiting for the model...".dimmed()),
        SessionEvent::FontSizeChanged(size) => format!("{}Font size: {}", prefix, size),
        _ => return None,
    };
    Some(line)
}

fn print_outcome(manager: &ConversationManager, id: SessionId, outcome: &RequestOutcome) {
    let RequestOutcome::Completed { message, .. } = outcome else {
        return;
    };
    let title = manager.get(id).map(|s| s.title().to_string()).unwrap_or_else(|| id.to_string());
    println!("{} {}", format!("[{}]", title).dimmed(), message.role.label().green().bold());
    println!("{}", markup::to_plain_text(&message.content));
}

fn print_prompt(manager: &ConversationManager) {
    println!("{}", format!("{} >", manager.active().title()).cyan());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["chatdesk"]).unwrap();
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_cli_subcommands() {
        let cli = Cli::try_parse_from(["chatdesk", "--config", "/etc/chatdesk.toml", "history"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/chatdesk.toml")));
        assert_eq!(cli.command, Some(Commands::History));

        let cli = Cli::try_parse_from(["chatdesk", "-v", "example-config"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.command, Some(Commands::ExampleConfig));
    }

    #[test]
    fn test_load_or_create_config_existing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chatdesk.toml");
        std::fs::write(&path, "[provider]\nkind = \"mock\"\n").unwrap();

        let config = load_or_create_config(&path).unwrap();
        assert_eq!(config.provider.kind, chatdesk_core::ProviderKind::Mock);
    }

    #[test]
    fn test_load_or_create_config_not_existing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chatdesk.toml");

        let err = load_or_create_config(&path).unwrap_err();
        assert!(err.to_string().contains("Please edit"));
        assert!(path.exists());
        assert!(Config::from_file(&path).is_ok());
    }

    #[test]
    fn test_load_or_create_config_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chatdesk.toml");
        std::fs::write(&path, "[retry]\nmax_attempts = 0\n").unwrap();

        let err = load_or_create_config(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_render_update_tags_background_sessions() {
        let active = SessionId(1);
        let status = |id| SessionUpdate { session_id: SessionId(id), event: SessionEvent::StatusChanged("ok".into()) };

        let own = render_update(&status(1), active).unwrap();
        assert!(!own.starts_with('['));
        let other = render_update(&status(2), active).unwrap();
        assert!(other.starts_with("[2] "));

        let cleared = SessionUpdate { session_id: active, event: SessionEvent::InputCleared };
        assert_eq!(render_update(&cleared, active), None);
    }

    #[test]
    fn test_failure_is_reported_once() {
        let active = SessionId(1);
        let update = |event| SessionUpdate { session_id: active, event };
        let failure = "Incorrect API key provided".to_string();

        let lines = render_updates(
            &[
                update(SessionEvent::RequestFailed { message: failure.clone() }),
                update(SessionEvent::StatusChanged(failure.clone())),
                update(SessionEvent::InputCleared),
                update(SessionEvent::BusyChanged(false)),
            ],
            active,
        );
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(&failure));

        let lines = render_updates(&[update(SessionEvent::StatusChanged("Tokens used: 4".into()))], active);
        assert_eq!(lines.len(), 1);
    }
}
