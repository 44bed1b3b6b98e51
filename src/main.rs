mod stubs;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use veska_channels::{AmbientMonitor, DailyCycleManager, StdinClarifier, VoiceClarifier, VoiceFrontend};
use veska_channels::hotkey::default_hotkeys;
use veska_core::config::AppConfig;
use veska_core::types::{TaskContext, TaskResult, TaskSource, TaskStatus};
use veska_dispatch::{Clarifier, Dispatcher, IntentRouter, NoClarifier};
use veska_knowledge::{KnowledgeGraph, ThreadStore};
use veska_memory::MemoryStore;
use veska_skills::daily_ops::DailyOpsPaths;
use veska_skills::{builtin_registry, SkillDeps};

#[derive(Parser)]
#[command(name = "veska", version, about = "Local-first multi-modal assistant core")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "veska.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a single text request and exit
    Dispatch {
        #[arg(trailing_var_arg = true)]
        utterance: Vec<String>,
    },
    /// Run the hands-free voice loop
    Voice {
        /// Always listen instead of waiting for the wake word
        #[arg(long)]
        barge_in: bool,
        /// Silence threshold ending a capture, in milliseconds
        #[arg(long)]
        silence: Option<u64>,
        /// Hard cap on one capture, in milliseconds
        #[arg(long)]
        max: Option<u64>,
    },
    /// Run a task on a timer in the background
    Ambient {
        /// Task to dispatch on every tick
        #[arg(long)]
        task: Option<String>,
        /// Interval between ticks, in seconds
        #[arg(long = "every")]
        every_secs: Option<u64>,
    },
    /// Run the daily ops cycle once
    Daily,
    /// Ask a question about the repository in the current directory
    Repo {
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Listen for key chords on stdin and run their macros
    Hotkeys,
}

struct App {
    config: AppConfig,
    dispatcher: Arc<Dispatcher>,
    memory: Arc<MemoryStore>,
}

fn build_app(config: AppConfig, clarifier: Arc<dyn Clarifier>) -> App {
    let memory = {
        let mut store = MemoryStore::new();
        if let Some(dir) = config.memory_dir() {
            store = store.with_persist_dir(dir);
        }
        if let Some(ref embed) = config.embedding {
            store = store.with_embedder(Arc::new(veska_memory::HttpEmbedder::new(
                &embed.base_url,
                embed.api_key.as_deref(),
                &embed.model,
                embed.dimensions,
            )));
        }
        Arc::new(store)
    };
    let threads = {
        let mut store = ThreadStore::new();
        if let Some(dir) = config.threads_dir() {
            store = store.with_persist_dir(dir);
        }
        Arc::new(store)
    };
    let graph = {
        let mut graph = KnowledgeGraph::new();
        if let Some(path) = config.graph_path() {
            graph = graph.with_persist_path(path);
        }
        Arc::new(graph)
    };

    let llm = veska_llm::create_text_client(&config.llm);
    let vision = veska_llm::create_vision_client(&config.llm);
    let browser = Arc::new(stubs::UnavailableBrowser);

    let deps = SkillDeps {
        llm: llm.clone(),
        vision,
        browser,
        memory: memory.clone(),
        max_vision_steps: config.vision.max_steps,
    };
    let daily_paths = match config.home_dir {
        Some(ref home) => DailyOpsPaths {
            notes_dir: home.join("notes"),
            logs_dir: home.join("logs"),
            events_file: home.join("events.log"),
            cluster_url: config.llm.router_url.clone(),
        },
        None => DailyOpsPaths::default(),
    };
    let registry = Arc::new(builtin_registry(deps, daily_paths));

    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        IntentRouter::new(llm, config.dispatch.min_utterance_chars),
        clarifier,
        memory.clone(),
        threads,
        graph,
        &config.dispatch,
    ));

    App {
        config,
        dispatcher,
        memory,
    }
}

/// Canonical user-visible line per outcome.
fn print_result(result: &TaskResult) {
    match result.status {
        TaskStatus::Ok => println!("{}", result.summary),
        TaskStatus::ClarificationNeeded => println!("{}", result.summary),
        TaskStatus::Refused => {
            println!("I won't do that without an explicit confirmation.")
        }
        TaskStatus::Failed => println!("Failed: {}", result.summary),
    }
    if let Some(ref answer) = result.answer {
        if answer != &result.summary {
            println!("{}", answer);
        }
    }
}

fn exit_code(result: &TaskResult, cancel: &CancellationToken) -> i32 {
    if cancel.is_cancelled() || result.summary == "cancelled" {
        return 130;
    }
    match result.status {
        TaskStatus::Ok => 0,
        TaskStatus::ClarificationNeeded => 2,
        TaskStatus::Refused => 3,
        TaskStatus::Failed => 1,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("veska=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        AppConfig::from_env()
    };

    let cancel = CancellationToken::new();
    let ctrlc_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutting down");
        ctrlc_cancel.cancel();
    });

    match cli.command {
        Commands::Dispatch { utterance } => {
            let text = utterance.join(" ");
            if text.trim().is_empty() {
                eprintln!("usage: veska dispatch <utterance>");
                std::process::exit(1);
            }
            let app = build_app(config, Arc::new(StdinClarifier));
            let result = app
                .dispatcher
                .dispatch(TaskContext::new(text, TaskSource::Text), cancel.clone())
                .await;
            print_result(&result);
            std::process::exit(exit_code(&result, &cancel));
        }
        Commands::Voice {
            barge_in,
            silence,
            max,
        } => {
            let silence_ms = silence.unwrap_or(config.voice.silence_ms);
            let max_ms = max.unwrap_or(config.voice.max_ms);
            let asr: Arc<dyn veska_core::traits::SpeechToText> = Arc::new(stubs::UnavailableAsr);
            let tts: Arc<dyn veska_core::traits::TextToSpeech> = Arc::new(stubs::ConsoleTts);

            let clarifier = Arc::new(VoiceClarifier::new(
                asr.clone(),
                tts.clone(),
                silence_ms,
                max_ms,
            ));
            let app = build_app(config, clarifier);

            let frontend = VoiceFrontend::new(
                app.dispatcher.clone(),
                asr,
                tts,
                stubs::wake_word_detector(),
                silence_ms,
                max_ms,
            )
            .with_barge_in(barge_in);
            frontend.run(cancel.clone()).await?;
            if cancel.is_cancelled() {
                std::process::exit(130);
            }
        }
        Commands::Ambient { task, every_secs } => {
            let app = build_app(config, Arc::new(NoClarifier));
            let task = task.unwrap_or_else(|| app.config.ambient.task.clone());
            let interval =
                Duration::from_secs(every_secs.unwrap_or(app.config.ambient.interval_secs));
            let monitor = AmbientMonitor::new(
                app.dispatcher.clone(),
                app.memory.clone(),
                task,
                interval,
                cancel.clone(),
            );
            monitor.run().await;
            if cancel.is_cancelled() {
                std::process::exit(130);
            }
        }
        Commands::Daily => {
            let app = build_app(config, Arc::new(NoClarifier));
            let cycle = DailyCycleManager::new(app.dispatcher.clone(), Duration::from_secs(3600));
            cycle.run_cycle(&cancel).await;
            std::process::exit(if cancel.is_cancelled() { 130 } else { 0 });
        }
        Commands::Repo { question } => {
            let text = question.join(" ");
            if text.trim().is_empty() {
                eprintln!("usage: veska repo <question>");
                std::process::exit(1);
            }
            let app = build_app(config, Arc::new(StdinClarifier));
            let cwd = std::env::current_dir()?;
            let result = app
                .dispatcher
                .dispatch(
                    TaskContext::new(format!("repo: {}", text), TaskSource::Text)
                        .with_meta("repo_root", serde_json::json!(cwd.display().to_string())),
                    cancel.clone(),
                )
                .await;
            print_result(&result);
            std::process::exit(exit_code(&result, &cancel));
        }
        Commands::Hotkeys => {
            let app = build_app(config, Arc::new(NoClarifier));
            let manager = default_hotkeys(app.dispatcher.clone());
            manager.listen_stdin(cancel.clone()).await?;
        }
    }

    Ok(())
}
