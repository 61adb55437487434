//! # stepgraph-prebuilt - Ready-made workflows
//!
//! A human-in-the-loop research workflow built on `stepgraph-core`: parallel
//! document and persona branches, two user confirmations that suspend the run
//! in the same superstep, and a deferred `answer` node that joins both branches.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use stepgraph_prebuilt::{build_research_graph, StaticSearcher, TemplateGenerator};
//! use stepgraph_core::{RunInput, StateDelta};
//! use stepgraph_checkpoint::CheckpointConfig;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let searcher = Arc::new(StaticSearcher::new(vec!["Rust is a systems language.".into()]));
//! let graph = build_research_graph(searcher, Arc::new(TemplateGenerator::default()))?
//!     .compile_in_memory()?;
//!
//! let config = CheckpointConfig::new("thread-1").with_checkpoint_ns("para");
//! let input = StateDelta::new().set("question", json!("What is Rust?"));
//! let outcome = graph.invoke(RunInput::State(input), &config).await?;
//! assert!(outcome.is_interrupted());
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod error;
pub mod research;

pub use collaborators::{Generator, Searcher, StaticSearcher, TemplateGenerator};
pub use error::{ResearchError, Result};
pub use research::{
    build_research_graph, channels, is_affirmative, CONFIRM_BACKSTORY_QUERY, CONFIRM_DOCS_QUERY,
};
