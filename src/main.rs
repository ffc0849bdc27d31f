//! Command-line entry point for conclave.
//!
//! Dispatches a single query through the orchestration pipeline and
//! streams agent output to stdout as it arrives.

// The CLI writes its results to stdout/stderr directly.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use futures_util::StreamExt;

use conclave::agent::{
    AgentConfig, ImagePayload, LlmProvider, Pipeline, Query, ResponseEvent, create_provider,
};

/// Conclave: multi-agent query orchestration.
///
/// Categorizes the query, routes it to one or more specialist agents,
/// and streams the (optionally collaboratively refined) answer.
#[derive(Parser, Debug)]
#[command(name = "conclave")]
#[command(version, about, long_about = None)]
struct Cli {
    /// The query to answer.
    query: String,

    /// Path to an image to attach (jpeg, png, gif, or webp).
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Force collaborative refinement even for single-category queries.
    #[arg(short, long)]
    deep: bool,

    /// Collaboration round budget override.
    #[arg(short, long)]
    rounds: Option<usize>,

    /// Specialist model override.
    #[arg(short, long)]
    model: Option<String>,

    /// Output format (text, json).
    #[arg(long, default_value = "text")]
    format: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut builder = AgentConfig::builder().from_env();
    if let Some(rounds) = cli.rounds {
        builder = builder.round_budget(rounds);
    }
    if let Some(model) = &cli.model {
        builder = builder.agent_model(model.clone());
    }
    let config = builder
        .build()
        .context("resolving configuration (is OPENAI_API_KEY set?)")?;

    let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(&config)?);
    let pipeline = Pipeline::new(provider, config);

    let mut query = Query::new(&cli.query).with_deep_analysis(cli.deep);
    if let Some(path) = &cli.image {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading image {}", path.display()))?;
        query = query.with_image(ImagePayload::from_bytes(media_type_for(path), &bytes));
    }

    if cli.format == "json" {
        let response = pipeline.query(query).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let mut stream = pipeline.stream_query(query).await?;
    let mut stdout = std::io::stdout();
    let mut current_agent = String::new();

    while let Some(item) = stream.next().await {
        match item? {
            ResponseEvent::RoundStarted { round } => {
                if cli.verbose {
                    eprintln!("--- round {round} ---");
                }
            }
            ResponseEvent::Chunk { agent, text, .. } => {
                if agent != current_agent {
                    if !current_agent.is_empty() {
                        println!();
                    }
                    println!("[{agent}]");
                    current_agent = agent;
                }
                print!("{text}");
                stdout.flush()?;
            }
            ResponseEvent::AgentAbsent { agent, reason, .. } => {
                eprintln!("warning: {agent} unavailable: {reason}");
            }
            ResponseEvent::Completed(response) => {
                println!();
                if cli.verbose {
                    eprintln!(
                        "done: agents={} rounds={} degraded={}",
                        response.attribution.agents.join(", "),
                        response.attribution.rounds,
                        response.attribution.degraded
                    );
                }
            }
        }
    }

    Ok(())
}

/// Initializes stderr tracing, honoring `RUST_LOG` when set.
fn init_tracing(verbose: bool) {
    let default = if verbose { "conclave=debug" } else { "conclave=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Guesses the image media type from the file extension.
fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}
