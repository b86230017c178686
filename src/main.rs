//! Section QA CLI
//!
//! Summarizes and answers questions over a section tree produced by the
//! extraction stage and stored as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use section_qa::{
    config::Config,
    executor::{Pricing, PromptExecutor, UsageStats},
    llm::LlmClient,
    metadata::{StructuredMetadata, SummaryMapping},
    tree::Document,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Section QA - summaries and refine-loop question answering over PDF section trees
#[derive(Parser)]
#[command(name = "section-qa")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize every section of a document tree
    Summarize {
        /// Path to the document tree (JSON)
        tree: PathBuf,

        /// Where to write the summary mapping (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print structured metadata (tree + summaries) as JSON
    Metadata {
        /// Path to the document tree (JSON)
        tree: PathBuf,

        /// Path to the summary mapping produced by `summarize`
        #[arg(short, long)]
        summaries: PathBuf,
    },

    /// Answer a question about a document
    Ask {
        /// The question
        question: String,

        /// Path to the document tree (JSON)
        #[arg(short, long)]
        tree: PathBuf,

        /// Path to the summary mapping produced by `summarize`
        #[arg(short, long)]
        summaries: PathBuf,

        /// Print the final answer state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display the section outline of a document tree
    Show {
        /// Path to the document tree (JSON)
        tree: PathBuf,
    },

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Summarize { tree, output } => cmd_summarize(config, tree, output).await,
        Commands::Metadata { tree, summaries } => cmd_metadata(tree, summaries),
        Commands::Ask {
            question,
            tree,
            summaries,
            json,
        } => cmd_ask(config, question, tree, summaries, json).await,
        Commands::Show { tree } => cmd_show(tree),
        Commands::Test => cmd_test(config).await,
    }
}

fn load_document(path: &Path) -> Result<Document> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document tree '{}'", path.display()))?;
    Document::from_json(&json)
        .with_context(|| format!("Invalid document tree '{}'", path.display()))
}

fn load_summaries(path: &Path) -> Result<SummaryMapping> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read summaries '{}'", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Invalid summary mapping '{}'", path.display()))
}

fn build_executor(config: &Config) -> Result<PromptExecutor<LlmClient>> {
    config.validate().context("Invalid configuration")?;
    Ok(PromptExecutor::new(
        LlmClient::new(config.llm.clone()),
        Pricing::from(&config.llm),
    ))
}

fn print_usage(usage: &UsageStats) {
    eprintln!(
        "Model usage: {} requests, {} prompt + {} completion tokens, ${:.4}",
        usage.successful_requests, usage.prompt_tokens, usage.completion_tokens, usage.total_cost
    );
}

async fn cmd_summarize(config: Config, tree: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let document = load_document(&tree)?;
    let executor = build_executor(&config)?;

    eprintln!(
        "Summarizing {} sections with {}...",
        document.node_count(),
        config.llm.model
    );
    let start = Instant::now();

    let summaries = executor
        .summarize(document.sections())
        .await
        .context("Summarization failed")?;

    let json = serde_json::to_string_pretty(&summaries)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            eprintln!("Summaries saved to: {}", path.display());
        }
        None => println!("{}", json),
    }

    eprintln!("Done in {:.2?}", start.elapsed());
    print_usage(&executor.usage());
    Ok(())
}

fn cmd_metadata(tree: PathBuf, summaries: PathBuf) -> Result<()> {
    let document = load_document(&tree)?;
    let summaries = load_summaries(&summaries)?;

    let metadata = StructuredMetadata::project(&document, &summaries)
        .context("Summaries do not cover the document tree")?;
    println!("{}", metadata.to_json()?);
    Ok(())
}

async fn cmd_ask(
    config: Config,
    question: String,
    tree: PathBuf,
    summaries: PathBuf,
    json: bool,
) -> Result<()> {
    let document = load_document(&tree)?;
    let summaries = load_summaries(&summaries)?;
    let executor = build_executor(&config)?;

    let start = Instant::now();
    let answer = executor
        .answer(&document, &summaries, &question)
        .await
        .context("Answering failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{}", answer.intermediate_answer);
        if !answer.section_ids.is_empty() {
            println!();
            println!("Sources:");
            for id in &answer.section_ids {
                let title = document
                    .find(id)
                    .and_then(|s| s.title_clean())
                    .unwrap_or_else(|| "(unknown section)".to_string());
                println!("  [{}] {}", id, title);
            }
        }
    }

    eprintln!("Answered in {:.2?}", start.elapsed());
    print_usage(&executor.usage());
    Ok(())
}

fn cmd_show(tree: PathBuf) -> Result<()> {
    let document = load_document(&tree)?;
    println!("{}", document.format());
    println!("Max depth: {}", document.max_depth());
    Ok(())
}

async fn cmd_test(config: Config) -> Result<()> {
    println!("Testing LLM connection...\n");

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!(
        "  API Key:   {}...",
        config.llm.api_key.chars().take(8).collect::<String>()
    );
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm);

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => println!("Connection successful!"),
        Err(e) => println!("Connection failed: {}", e),
    }

    Ok(())
}
