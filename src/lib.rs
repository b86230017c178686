//! Section QA - question answering over hierarchically extracted PDFs.
//!
//! An extraction stage turns a PDF into a tree of sections (headings) holding
//! paragraphs, tables and figures. This crate takes that tree and:
//!
//! 1. summarizes every section with an LLM,
//! 2. projects the tree plus summaries into nested structured metadata,
//! 3. answers questions by letting the model pick sections from their
//!    summaries, then refining an answer one fetched section at a time while
//!    recording which sections it used.
//!
//! # Quick Start
//!
//! ```no_run
//! use section_qa::{
//!     config::Config,
//!     executor::{Pricing, PromptExecutor},
//!     llm::LlmClient,
//!     metadata::StructuredMetadata,
//!     tree::Document,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let json = std::fs::read_to_string("tree.json")?;
//!     let document = Document::from_json(&json)?;
//!
//!     let executor = PromptExecutor::new(
//!         LlmClient::new(config.llm.clone()),
//!         Pricing::from(&config.llm),
//!     );
//!
//!     let summaries = executor.summarize(document.sections()).await?;
//!     let metadata = StructuredMetadata::project(&document, &summaries)?;
//!     println!("{}", metadata.to_json()?);
//!
//!     let answer = executor
//!         .answer(&document, &summaries, "What was total revenue?")
//!         .await?;
//!     println!("{} (sources: {:?})", answer.intermediate_answer, answer.section_ids);
//!     println!("{:?}", executor.usage());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **cleanup**: raw extracted text to presentation text
//! - **document** / **tree**: paragraphs, sections and the document root
//! - **metadata**: summary mapping and structured metadata projection
//! - **tools**: the `fetch_sections` function exposed to the model
//! - **refine**: selection followed by the sequential refine fold
//! - **executor**: model invocation contracts and usage accounting
//! - **llm**: the [`llm::ChatModel`] seam and an OpenAI-compatible client

pub mod cleanup;
pub mod config;
pub mod document;
pub mod error;
pub mod executor;
pub mod llm;
pub mod metadata;
pub mod refine;
pub mod tools;
pub mod tree;

// Re-export commonly used types
pub use config::Config;
pub use document::{Paragraph, TextOrigin};
pub use error::{Result, SectionQaError};
pub use executor::{Pricing, PromptExecutor, UsageStats};
pub use llm::{ChatModel, LlmClient};
pub use metadata::{StructuredMetadata, SummaryMapping};
pub use refine::{RefineLoop, RefineState};
pub use tools::{FetchSectionsTool, FetchedSection};
pub use tree::{Document, Section};
