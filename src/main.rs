use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use browser_recorder::coordinator::{ChannelTabs, Coordinator, Reply};
use browser_recorder::dom::Document;
use browser_recorder::driver::{BrowserPage, MemoryPage, PageDriver};
use browser_recorder::messages::Message;
use browser_recorder::model::ActionLog;
use browser_recorder::runner::{ConsoleEventListener, EventEmitter, PageRunner, RunnerEvent};
use browser_recorder::storage::FileStore;
use browser_recorder::utils::Config;

#[derive(Parser)]
#[command(name = "browser-recorder")]
#[command(version = "0.1.0")]
#[command(about = "Record browser interactions and replay them", long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a page in Chromium and record interactions until Ctrl+C
    Record {
        /// Page to open
        #[arg(short, long)]
        url: String,

        /// Also write the recording to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Run the browser without a window
        #[arg(long, default_value = "false")]
        headless: bool,
    },

    /// Replay a recording
    Play {
        /// Recording file (defaults to the stored recording)
        #[arg(short, long)]
        log: Option<PathBuf>,

        /// Replay against a local markup file instead of a browser
        #[arg(short, long)]
        page: Option<PathBuf>,

        /// Page to open (defaults to the recording's url)
        #[arg(short, long)]
        url: Option<String>,

        /// Run the browser without a window
        #[arg(long, default_value = "false")]
        headless: bool,
    },

    /// Show the stored recording
    Status,

    /// Export the stored recording as recording-<ms>.json
    Export {
        /// Target directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Validate and store a recording file
    Import {
        /// Path to a recording JSON file
        file: PathBuf,
    },

    /// Empty the stored recording
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Record {
            url,
            output,
            headless,
        } => {
            if headless {
                config.headless = true;
            }
            record(&config, &url, output.as_deref()).await?;
        }

        Commands::Play {
            log,
            page,
            url,
            headless,
        } => {
            if headless {
                config.headless = true;
            }
            play(&config, log.as_deref(), page.as_deref(), url.as_deref()).await?;
        }

        Commands::Status => {
            let mut coordinator = offline_coordinator(&config);
            if let Reply::Status {
                is_recording: _,
                recording_data,
            } = coordinator.handle(Message::GetStatus)
            {
                print_summary(&recording_data);
            }
        }

        Commands::Export { dir } => {
            if let Some(dir) = dir {
                config.export_dir = dir;
            }
            let mut coordinator = offline_coordinator(&config);
            if let Reply::Exported { path } = ensure_ok(coordinator.handle(Message::ExportData))? {
                println!(
                    "{} Exported {} actions",
                    "✅".green(),
                    coordinator.log().len()
                );
                println!("   Output: {}", path.display().to_string().cyan());
            }
        }

        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut coordinator = offline_coordinator(&config);
            ensure_ok(coordinator.handle(Message::ImportData {
                data: serde_json::Value::String(text),
            }))
            .with_context(|| format!("Failed to import {}", file.display()))?;
            println!(
                "{} Imported {} actions from {}",
                "✅".green(),
                coordinator.log().len(),
                file.display().to_string().cyan()
            );
        }

        Commands::Clear => {
            let mut coordinator = offline_coordinator(&config);
            ensure_ok(coordinator.handle(Message::ClearRecording))?;
            println!("{} Recording cleared", "✅".green());
        }
    }

    Ok(())
}

/// A coordinator with no pages attached, for commands that only touch the slot
fn offline_coordinator(config: &Config) -> Coordinator<ChannelTabs, FileStore> {
    Coordinator::new(
        ChannelTabs::new(),
        FileStore::new(config.store_path()),
        &config.export_dir,
    )
}

fn ensure_ok(reply: Reply) -> Result<Reply> {
    match reply {
        Reply::Failed { error } => Err(anyhow!(error)),
        other => Ok(other),
    }
}

fn stop_on_ctrlc(message: &'static str) -> Result<Arc<AtomicBool>> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_handler = stop_flag.clone();
    ctrlc::set_handler(move || {
        println!("\n\n{} {}", "⏹️ ".yellow(), message);
        stop_flag_handler.store(true, Ordering::SeqCst);
    })?;
    Ok(stop_flag)
}

async fn record(config: &Config, url: &str, output: Option<&Path>) -> Result<()> {
    println!("{} Starting record mode...", "🔴".to_string().red().bold());

    let page = BrowserPage::launch(config.browser_config()).await?;
    page.goto(url).await?;
    let driver: Arc<dyn PageDriver> = Arc::new(page);

    let (emitter, receiver) = EventEmitter::new();
    let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

    let (to_page, page_inbox) = mpsc::unbounded_channel();
    let (from_page, mut page_outbox) = mpsc::unbounded_channel();
    let runner = PageRunner::new(driver, config.runner_settings(), from_page, emitter);
    let runner_handle = tokio::spawn(runner.run(page_inbox));

    let mut coordinator = Coordinator::new(
        ChannelTabs::new(),
        FileStore::new(config.store_path()),
        &config.export_dir,
    );
    let tab = coordinator.tabs_mut().open(url, to_page);

    let stop_flag = stop_on_ctrlc("Stopping recording...")?;
    ensure_ok(coordinator.handle(Message::StartRecording { tab_id: Some(tab) }))?;

    let mut tick = tokio::time::interval(Duration::from_millis(100));
    while !stop_flag.load(Ordering::SeqCst) {
        tokio::select! {
            Some(message) = page_outbox.recv() => {
                coordinator.handle(message);
            }
            _ = tick.tick() => {}
        }
    }

    coordinator.handle(Message::StopRecording);
    // Closing the inbox ends the runner after it has flushed.
    coordinator.tabs_mut().close(tab);
    runner_handle.await??;
    while let Some(message) = page_outbox.recv().await {
        coordinator.handle(message);
    }
    let _ = listener.await;

    let log = coordinator.log();
    if let Some(output) = output {
        std::fs::write(output, log.to_pretty_json()?)
            .with_context(|| format!("Failed to write {}", output.display()))?;
    }

    println!("\n{} Recording complete!", "✅".green().bold());
    print_summary(log);
    if let Some(output) = output {
        println!("   Output: {}", output.display().to_string().cyan());
    }
    Ok(())
}

async fn play(
    config: &Config,
    log_path: Option<&Path>,
    page_path: Option<&Path>,
    url: Option<&str>,
) -> Result<()> {
    let mut coordinator = Coordinator::new(
        ChannelTabs::new(),
        FileStore::new(config.store_path()),
        &config.export_dir,
    );

    let explicit = match log_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(
                ActionLog::import(text)
                    .with_context(|| format!("Failed to load recording {}", path.display()))?,
            )
        }
        None => None,
    };
    let log = explicit.as_ref().unwrap_or(coordinator.log());
    if log.is_empty() {
        println!("{} Nothing to replay", "⚠️".yellow());
        return Ok(());
    }
    let target = url.map(str::to_string).unwrap_or_else(|| log.url.clone());

    let driver: Arc<dyn PageDriver> = match page_path {
        Some(path) => {
            println!("{} Dry run against {}", "▶".green().bold(), path.display());
            Arc::new(MemoryPage::new(Document::from_file(path, target.as_str())?))
        }
        None => {
            let page = BrowserPage::launch(config.browser_config()).await?;
            if !target.is_empty() {
                page.goto(&target).await?;
            }
            Arc::new(page)
        }
    };

    let (emitter, receiver) = EventEmitter::new();
    let mut progress = emitter.subscribe();
    let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

    let (to_page, page_inbox) = mpsc::unbounded_channel();
    let (from_page, _page_outbox) = mpsc::unbounded_channel();
    let runner = PageRunner::new(driver, config.runner_settings(), from_page, emitter);
    let runner_handle = tokio::spawn(runner.run(page_inbox));

    let tab = coordinator.tabs_mut().open(target, to_page);
    let stop_flag = stop_on_ctrlc("Stopping playback...")?;
    ensure_ok(coordinator.handle(Message::StartPlayback { data: explicit }))?;

    let mut tick = tokio::time::interval(Duration::from_millis(100));
    let missing = loop {
        tokio::select! {
            event = progress.recv() => match event {
                Ok(RunnerEvent::PlaybackCompleted { missing, .. }) => break Some(missing),
                Ok(RunnerEvent::PlaybackStopped) => break None,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break None,
            },
            _ = tick.tick() => {
                if stop_flag.swap(false, Ordering::SeqCst) {
                    coordinator.handle(Message::PlaybackStopped);
                }
            }
        }
    };

    coordinator.tabs_mut().close(tab);
    runner_handle.await??;
    let _ = listener.await;

    if let Some(missing) = missing {
        if missing > 0 {
            println!(
                "{} {} targets were not found on the page",
                "⚠️".yellow(),
                missing
            );
        }
    }
    Ok(())
}

fn print_summary(log: &ActionLog) {
    let summary = log.summary();
    println!("   Page: {}", summary.host.cyan());
    println!(
        "   Actions: {} over {:.1}s",
        summary.action_count.to_string().green(),
        summary.duration_secs()
    );
    for (kind, count) in &summary.counts {
        println!("     {:<10} {}", kind, count);
    }
}
