//! External collaborators of the research workflow
//!
//! The workflow needs a document search and a text generator. Both are traits
//! so that real backends can be plugged in; [`StaticSearcher`] and
//! [`TemplateGenerator`] are deterministic offline implementations used by the
//! CLI and by tests.

use crate::error::Result;
use async_trait::async_trait;

/// Looks up documents for a question
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}

/// Produces text for a prompt
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Serves a fixed document set, at most `max_results` per search
#[derive(Debug, Clone)]
pub struct StaticSearcher {
    documents: Vec<String>,
    max_results: usize,
}

impl StaticSearcher {
    pub fn new(documents: Vec<String>) -> Self {
        Self {
            documents,
            max_results: 3,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

#[async_trait]
impl Searcher for StaticSearcher {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let results: Vec<String> = self
            .documents
            .iter()
            .take(self.max_results)
            .cloned()
            .collect();
        tracing::debug!(query = %query, results = results.len(), "Static search");
        Ok(results)
    }
}

/// Answers every prompt with a fixed prefix followed by the prompt's question.
///
/// The question is the text after the first `Question:` marker, up to the end
/// of that line; prompts without a marker use their first non-empty line.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    prefix: String,
}

impl TemplateGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn question(prompt: &str) -> &str {
        prompt
            .lines()
            .find_map(|line| line.trim().strip_prefix("Question:"))
            .or_else(|| prompt.lines().find(|line| !line.trim().is_empty()))
            .unwrap_or("")
            .trim()
    }
}

impl Default for TemplateGenerator {
    fn default() -> Self {
        Self::new("Here is what I can tell you about: ")
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(format!("{}{}", self.prefix, Self::question(prompt)))
    }
}
