use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chatscope_archive::{read_table, ChatArchive};
use chatscope_common::Config;
use chatscope_pipeline::{
    format_elapsed, EmotionClassifier, EmotionTimeline, HttpClassifier, JobEvent, Orchestrator,
    Outcome, ResultStore, RunRequest, DEFAULT_BATCH_SIZE, DEFAULT_TOKEN_SIZE,
};

#[derive(Parser)]
#[command(name = "chatscope", about = "Stream chat ingestion and emotion tagging")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch (or resume) a chat table, classify it, and save it
    Run(RunArgs),
    /// Print per-minute message and emotion counts for a saved table
    Summary {
        /// Path to a saved chat table
        path: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Output table. If it already exists the run resumes from it.
    #[arg(long, short)]
    output: PathBuf,

    /// YouTube or Twitch video URL
    #[arg(long, short, default_value = "")]
    url: String,

    /// Require an existing output table instead of downloading
    #[arg(long)]
    skip_download: bool,

    /// Stop after saving the unlabeled table
    #[arg(long)]
    skip_classify: bool,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Maximum tokens per message passed to the classifier
    #[arg(long, default_value_t = DEFAULT_TOKEN_SIZE)]
    token_size: usize,
}

impl From<RunArgs> for RunRequest {
    fn from(args: RunArgs) -> Self {
        RunRequest {
            output_path: args.output,
            url: args.url,
            skip_download: args.skip_download,
            skip_classify: args.skip_classify,
            batch_size: args.batch_size,
            token_size: args.token_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries run progress and summaries
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chatscope=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Summary { path } => summary(&path),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = Config::from_env()?;
    config.log_keys();

    let archive = Arc::new(ChatArchive::new(&config));
    let classifier = HttpClassifier::from_config(&config)
        .map(|c| Arc::new(c) as Arc<dyn EmotionClassifier>);
    let store = Arc::new(ResultStore::new());
    let orchestrator = Arc::new(Orchestrator::new(archive, classifier, store));

    let started = Instant::now();
    let mut handle = orchestrator.spawn_run(args.into());

    let cancel = handle.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancellation requested");
            cancel.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    let mut outcome = None;
    while let Some(event) = handle.events.recv().await {
        match event {
            JobEvent::Step(step) => println!("\n{step}"),
            JobEvent::Progress(percent) => {
                print!("\r  {percent:>3}%");
                stdout.flush()?;
            }
            JobEvent::Finished(finished) => {
                println!();
                match &finished {
                    Outcome::Completed => println!("Completed"),
                    Outcome::Cancelled => println!("{}", chatscope_common::CANCEL_MESSAGE),
                    Outcome::Failed(message) => eprintln!("{message}"),
                }
                outcome = Some(finished);
            }
        }
    }

    let result = handle.join.await?;
    println!("Elapsed: {}", format_elapsed(started.elapsed()));

    if let Ok(table) = &result {
        info!(records = table.records.len(), "Result published");
    }
    if matches!(outcome, Some(Outcome::Failed(_))) {
        std::process::exit(1);
    }
    Ok(())
}

fn summary(path: &Path) -> Result<()> {
    let table = read_table(path)?;
    if let Some(title) = &table.metadata.title {
        println!("{title}");
    }
    if !table.metadata.url.is_empty() {
        println!("{}", table.metadata.url);
    }
    print!("{}", EmotionTimeline::from_table(&table));
    Ok(())
}
