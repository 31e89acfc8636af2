//! Command-line interface for tg-archiver.
//!
//! Provides commands for running the archiver, checking its position,
//! inspecting configuration and transcribing a local audio file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::adapters::{MessageSource, TelegramClient, TelegramConfig};
use crate::archive::{FormatConfig, MarkdownRenderer};
use crate::config::{self, ResolvedConfig};
use crate::core::{CheckpointStore, Orchestrator};
use crate::ingest::{Transcriber, WhisperTranscriber};
use crate::notify::DeliveryQueue;

/// tg-archiver - Archive Telegram messages into daily Markdown notes
#[derive(Parser, Debug)]
#[command(name = "tg-archiver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: .tg-archiver/config.yaml in the current directory or a parent)
    #[arg(long, global = true, env = "TG_ARCHIVER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive incoming messages until Ctrl+C
    Run,

    /// Show the checkpoint and archive locations
    Status,

    /// Show resolved configuration (debug)
    Config,

    /// Transcribe a local audio file with the configured Whisper setup
    Transcribe {
        /// Audio file (any format ffmpeg can read)
        file: PathBuf,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::load_config(self.config.as_deref())?;

        match self.command {
            Commands::Run => run_archiver(cfg).await,
            Commands::Status => show_status(&cfg).await,
            Commands::Config => {
                show_config(&cfg);
                Ok(())
            }
            Commands::Transcribe { file } => transcribe_file(&cfg, &file).await,
        }
    }
}

/// Wire the collaborators together and poll until interrupted
async fn run_archiver(cfg: ResolvedConfig) -> Result<()> {
    cfg.validate_for_run()?;

    let client = TelegramClient::from_config(TelegramConfig {
        bot_token: cfg.bot_token.clone(),
        batch_limit: cfg.polling.batch_limit,
        long_poll_timeout_secs: cfg.polling.long_poll_timeout_secs,
    });
    let source: Arc<dyn MessageSource> = Arc::new(client);

    let reporter = Arc::new(DeliveryQueue::new(
        cfg.delivery.clone(),
        Arc::clone(&source),
        cfg.user_id,
    ));
    reporter.start_background_processing();

    let format = FormatConfig::new(cfg.locale, cfg.paths.media_dir_name.clone());
    let renderer = Arc::new(MarkdownRenderer::new(format.clone()));
    let transcriber = Arc::new(WhisperTranscriber::new(cfg.whisper.clone()));

    let mut orchestrator = Orchestrator::new(
        source,
        transcriber,
        renderer,
        cfg.paths.clone(),
        Arc::clone(&reporter),
        cfg.polling.clone(),
    )
    .with_format(format);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            signal_cancel.cancel();
        }
    });

    eprintln!("Archiving into {}", cfg.paths.notes_root.display());
    let result = orchestrator.run(cancel).await;

    reporter.shutdown();
    let stats = reporter.stats();
    tracing::info!(
        sent = stats.sent,
        overflowed = stats.overflowed,
        exhausted = stats.exhausted,
        "Notification delivery summary"
    );

    result
}

/// Print the checkpoint and where today's notes go
async fn show_status(cfg: &ResolvedConfig) -> Result<()> {
    let store = CheckpointStore::new(cfg.paths.state_file.clone());
    let checkpoint = store
        .load()
        .await
        .context("Failed to read checkpoint")?;

    let today = cfg.paths.day_file(Local::now().date_naive());

    println!("State file:        {}", store.path().display());
    println!("Last processed id: {}", checkpoint.last_processed_id);
    println!("Next offset:       {}", checkpoint.next_offset());
    println!("Last updated:      {}", checkpoint.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"));
    println!();
    println!("Notes root:        {}", cfg.paths.notes_root.display());
    println!("Media directory:   {}", cfg.paths.media_dir().display());
    match tokio::fs::metadata(&today).await {
        Ok(meta) => println!("Today's notes:     {} ({} bytes)", today.display(), meta.len()),
        Err(_) => println!("Today's notes:     {} (not created yet)", today.display()),
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) {
    let config_file = cfg
        .config_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none - using defaults)".to_string());
    println!("Config file: {}", config_file);
    println!();
    println!("Telegram:");
    println!("  Bot token: {}", cfg.masked_token());
    println!("  User id:   {}", cfg.user_id);
    println!();
    println!("Paths:");
    println!("  Home:       {}", cfg.home.display());
    println!("  Notes root: {}", cfg.paths.notes_root.display());
    println!("  Media:      {}", cfg.paths.media_dir().display());
    println!("  State file: {}", cfg.paths.state_file.display());
    println!();
    println!("Whisper:");
    println!("  Binary:   {}", cfg.whisper.binary);
    println!("  ffmpeg:   {}", cfg.whisper.ffmpeg);
    println!("  Model:    {}", cfg.whisper.model_path.display());
    println!("  Download: {}", cfg.whisper.model_type.as_deref().unwrap_or("(disabled)"));
    println!("  Language: {}", cfg.whisper.language);
    println!();
    println!("Polling:");
    println!("  Interval:        {}ms", cfg.polling.poll_interval_ms);
    println!("  Retry interval:  {}ms", cfg.polling.retry_interval_ms);
    println!("  Batch limit:     {}", cfg.polling.batch_limit);
    println!("  Long-poll:       {}s", cfg.polling.long_poll_timeout_secs);
    println!("  Echo transcript: {}", cfg.polling.echo_transcripts);
    println!();
    println!("Error notifications:");
    println!("  Enabled:        {}", cfg.delivery.enabled);
    println!("  Max attempts:   {}", cfg.delivery.max_attempts);
    println!("  Retry interval: {}ms", cfg.delivery.retry_interval_ms);
    println!("  Queue size:     {}", cfg.delivery.max_queue_size);
    println!("  Max length:     {}", cfg.delivery.max_message_length);
    println!();
    println!("Format:");
    println!("  Locale: {:?}", cfg.locale);
}

/// Run the transcriber against one file and print the text
async fn transcribe_file(cfg: &ResolvedConfig, file: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Audio file not found: {}", file.display());
    }

    let transcriber = WhisperTranscriber::new(cfg.whisper.clone());
    let transcript = transcriber.transcribe(file).await;
    println!("{}", transcript);

    Ok(())
}
