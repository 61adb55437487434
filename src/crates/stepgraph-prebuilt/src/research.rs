//! Human-in-the-loop research workflow
//!
//! Two branches run in parallel after the question is trimmed: one gathers
//! documents and asks the user to confirm them, the other invents a persona
//! and asks the user whether it is interesting. `answer` is a deferred node,
//! so it runs once, after the longer documents branch has been pruned.
//!
//! ```text
//!                     START
//!                       │
//!                     trim
//!              ┌────────┴─────────┐
//!           search           gen_backstory
//!              │                  │
//!         confirm_docs     confirm_backstory
//!              │                  │
//!           pruning               │
//!              └────────┬─────────┘
//!                    answer (deferred)
//!                       │
//!                      END
//! ```

use crate::collaborators::{Generator, Searcher};
use crate::error::{ResearchError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use stepgraph_core::{
    NodeOptions, NodeOutcome, Reducer, StateDelta, StateGraph, Step, StepContext, END, START,
};

/// Channel names of the research state
pub mod channels {
    pub const QUESTION: &str = "question";
    pub const DOCUMENTS: &str = "documents";
    pub const BACKSTORY: &str = "backstory";
    pub const MESSAGES: &str = "messages";
    pub const DOCS_APPROVAL: &str = "docs_approval";
    pub const BACKSTORY_APPROVAL: &str = "backstory_approval";
}

pub const CONFIRM_DOCS_QUERY: &str = "Please confirm that the documents look relevant. (Y/n)";
pub const CONFIRM_BACKSTORY_QUERY: &str = "Do you find this persona interesting? (Y/n)";

const BACKSTORY_PROMPT: &str = "You are an expert improv comedian and actor.
Based on the question asked, create an engaging persona you believe will entertain the user.
Create a short backstory, less than 3 sentences. Speak in the first person, taking on the role.

Question: {question}

Backstory:";

const ANSWER_WITH_BACKSTORY_PROMPT: &str = "You are an eccentric professor with an interesting past.
Your job is to summarize the answer to a question based on relevant background context.
You must weave in your backstory wherever possible.

Question: {question}

Backstory: {backstory}

Context: {context}

Answer:";

const ANSWER_PROMPT: &str = "You are a professor and expert in explaining complex topics in a way that is easy to understand.
Your job is to summarize the answer to a question based on relevant background context.

Question: {question}

Context: {context}

Answer:";

/// `y` or `yes` in any case; anything else, including non-strings, is a no
pub fn is_affirmative(answer: &Value) -> bool {
    answer
        .as_str()
        .map(|a| {
            let a = a.trim();
            a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes")
        })
        .unwrap_or(false)
}

fn question(ctx: &StepContext) -> Result<String> {
    ctx.state()
        .get_str(channels::QUESTION)
        .map(str::to_string)
        .ok_or(ResearchError::MissingChannel(channels::QUESTION))
}

fn documents(ctx: &StepContext) -> Vec<Value> {
    ctx.state().get_array(channels::DOCUMENTS).to_vec()
}

struct Trim;

#[async_trait]
impl Step for Trim {
    async fn run(&self, ctx: StepContext) -> NodeOutcome {
        question(&ctx)
            .map(|q| StateDelta::new().set(channels::QUESTION, json!(q.trim())))
            .into()
    }
}

struct Search {
    searcher: Arc<dyn Searcher>,
}

#[async_trait]
impl Step for Search {
    async fn run(&self, ctx: StepContext) -> NodeOutcome {
        let query = match question(&ctx) {
            Ok(q) => q,
            Err(e) => return NodeOutcome::failed(e),
        };
        let mut docs = documents(&ctx);
        match self.searcher.search(&query).await {
            Ok(found) => {
                tracing::debug!(query = %query, found = found.len(), existing = docs.len(), "Search finished");
                docs.extend(found.into_iter().map(Value::String));
                NodeOutcome::completed(StateDelta::new().set(channels::DOCUMENTS, Value::Array(docs)))
            }
            Err(e) => NodeOutcome::failed(e),
        }
    }
}

/// Suspends with `query` and records the yes/no answer in `channel`
struct Confirm {
    query: &'static str,
    channel: &'static str,
}

#[async_trait]
impl Step for Confirm {
    async fn run(&self, ctx: StepContext) -> NodeOutcome {
        match ctx.interrupt(json!({ "query": self.query })) {
            Ok(answer) => {
                NodeOutcome::completed(StateDelta::new().set(self.channel, json!(is_affirmative(&answer))))
            }
            Err(suspend) => suspend.into(),
        }
    }
}

struct Pruning;

#[async_trait]
impl Step for Pruning {
    async fn run(&self, ctx: StepContext) -> NodeOutcome {
        let mut docs = documents(&ctx);
        let approved = ctx.state().get_bool(channels::DOCS_APPROVAL).unwrap_or(true);
        if docs.len() > 2 && !approved {
            docs.pop();
        }
        NodeOutcome::completed(StateDelta::new().set(channels::DOCUMENTS, Value::Array(docs)))
    }
}

struct GenBackstory {
    generator: Arc<dyn Generator>,
}

#[async_trait]
impl Step for GenBackstory {
    async fn run(&self, ctx: StepContext) -> NodeOutcome {
        let result = async {
            let prompt = BACKSTORY_PROMPT.replace("{question}", &question(&ctx)?);
            let backstory = self.generator.generate(&prompt).await?;
            Ok::<_, ResearchError>(StateDelta::new().set(channels::BACKSTORY, json!(backstory)))
        }
        .await;
        result.into()
    }
}

struct Answer {
    generator: Arc<dyn Generator>,
}

impl Answer {
    fn prompt(ctx: &StepContext) -> Result<String> {
        let question = question(ctx)?;
        let context = documents(ctx)
            .iter()
            .map(|doc| match doc {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let approved = ctx.state().get_bool(channels::BACKSTORY_APPROVAL).unwrap_or(false);
        let prompt = if approved {
            let backstory = ctx.state().get_str(channels::BACKSTORY).unwrap_or("");
            ANSWER_WITH_BACKSTORY_PROMPT
                .replace("{question}", &question)
                .replace("{backstory}", backstory)
                .replace("{context}", &context)
        } else {
            ANSWER_PROMPT
                .replace("{question}", &question)
                .replace("{context}", &context)
        };
        Ok(prompt)
    }
}

#[async_trait]
impl Step for Answer {
    async fn run(&self, ctx: StepContext) -> NodeOutcome {
        let result = async {
            let prompt = Self::prompt(&ctx)?;
            let generation = self.generator.generate(&prompt).await?;
            let message = json!({ "role": "assistant", "content": generation });
            Ok::<_, ResearchError>(StateDelta::new().set(channels::MESSAGES, json!([message])))
        }
        .await;
        result.into()
    }
}

/// Build the research workflow graph; compile it with the checkpointer of your choice
pub fn build_research_graph(
    searcher: Arc<dyn Searcher>,
    generator: Arc<dyn Generator>,
) -> Result<StateGraph> {
    let mut graph = StateGraph::new();

    graph
        .add_channel(channels::QUESTION, Reducer::Overwrite)?
        .add_channel(channels::DOCUMENTS, Reducer::Overwrite)?
        .add_channel(channels::BACKSTORY, Reducer::Overwrite)?
        .add_channel(channels::MESSAGES, Reducer::Append)?
        .add_channel_with_default(channels::DOCS_APPROVAL, Reducer::Overwrite, json!(true))?
        .add_channel_with_default(channels::BACKSTORY_APPROVAL, Reducer::Overwrite, json!(true))?;

    let docs = || NodeOptions::new().with_metadata("category", json!("docs"));
    let backstory = || NodeOptions::new().with_metadata("category", json!("backstory"));

    graph
        .add_step("trim", Arc::new(Trim), NodeOptions::new())?
        .add_step("search", Arc::new(Search { searcher }), docs())?
        .add_step(
            "confirm_docs",
            Arc::new(Confirm {
                query: CONFIRM_DOCS_QUERY,
                channel: channels::DOCS_APPROVAL,
            }),
            docs(),
        )?
        .add_step("pruning", Arc::new(Pruning), docs())?
        .add_step(
            "gen_backstory",
            Arc::new(GenBackstory {
                generator: Arc::clone(&generator),
            }),
            backstory(),
        )?
        .add_step(
            "confirm_backstory",
            Arc::new(Confirm {
                query: CONFIRM_BACKSTORY_QUERY,
                channel: channels::BACKSTORY_APPROVAL,
            }),
            backstory(),
        )?
        .add_step("answer", Arc::new(Answer { generator }), NodeOptions::deferred())?;

    graph
        .add_edge(START, "trim")?
        .add_edge("trim", "search")?
        .add_edge("trim", "gen_backstory")?
        .add_edge("search", "confirm_docs")?
        .add_edge("confirm_docs", "pruning")?
        .add_edge("pruning", "answer")?
        .add_edge("gen_backstory", "confirm_backstory")?
        .add_edge("confirm_backstory", "answer")?
        .add_edge("answer", END)?;

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{StaticSearcher, TemplateGenerator};
    use stepgraph_core::{NodeMode, State};

    fn ctx(values: Value) -> StepContext {
        let state: State = values.as_object().cloned().unwrap_or_default().into_iter().collect();
        StepContext::new("test", 0, Arc::new(state))
    }

    fn delta(outcome: NodeOutcome) -> StateDelta {
        match outcome {
            NodeOutcome::Completed(delta) => delta,
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_is_affirmative() {
        for yes in ["y", "Y", "yes", "YES", " Yes "] {
            assert!(is_affirmative(&json!(yes)), "{yes}");
        }
        for no in ["n", "no", "", "yep", "yess"] {
            assert!(!is_affirmative(&json!(no)), "{no}");
        }
        assert!(!is_affirmative(&json!(true)));
    }

    #[tokio::test]
    async fn test_trim() {
        let delta = delta(Trim.run(ctx(json!({"question": "  what is rust?\n"}))).await);
        assert_eq!(delta.get("question"), Some(&json!("what is rust?")));

        assert!(matches!(Trim.run(ctx(json!({}))).await, NodeOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_search_appends_to_existing_documents() {
        let search = Search {
            searcher: Arc::new(StaticSearcher::new(vec!["new".into()])),
        };
        let delta = delta(
            search
                .run(ctx(json!({"question": "q", "documents": ["old"]})))
                .await,
        );
        assert_eq!(delta.get("documents"), Some(&json!(["old", "new"])));
    }

    #[tokio::test]
    async fn test_pruning() {
        let cases = [
            (json!({"documents": ["a", "b", "c"], "docs_approval": false}), json!(["a", "b"])),
            (json!({"documents": ["a", "b", "c"], "docs_approval": true}), json!(["a", "b", "c"])),
            (json!({"documents": ["a", "b"], "docs_approval": false}), json!(["a", "b"])),
            (json!({"documents": ["a", "b", "c"]}), json!(["a", "b", "c"])),
        ];
        for (state, expected) in cases {
            let delta = delta(Pruning.run(ctx(state)).await);
            assert_eq!(delta.get("documents"), Some(&expected));
        }
    }

    #[tokio::test]
    async fn test_confirm_suspends_then_records_answer() {
        let confirm = Confirm {
            query: CONFIRM_DOCS_QUERY,
            channel: channels::DOCS_APPROVAL,
        };
        match confirm.run(ctx(json!({}))).await {
            NodeOutcome::Suspended(payload) => {
                assert_eq!(payload, json!({"query": CONFIRM_DOCS_QUERY}))
            }
            other => panic!("expected suspension, got {:?}", other),
        }

        let delta = delta(confirm.run(ctx(json!({})).with_resume(json!("No"))).await);
        assert_eq!(delta.get("docs_approval"), Some(&json!(false)));
    }

    #[test]
    fn test_answer_prompt_includes_backstory_only_when_approved() {
        let approved = Answer::prompt(&ctx(json!({
            "question": "q",
            "documents": ["d1", "d2"],
            "backstory": "I was a pirate.",
            "backstory_approval": true,
        })))
        .unwrap();
        assert!(approved.contains("Backstory: I was a pirate."));
        assert!(approved.contains("Context: d1\nd2"));

        let plain = Answer::prompt(&ctx(json!({
            "question": "q",
            "backstory": "I was a pirate.",
            "backstory_approval": false,
        })))
        .unwrap();
        assert!(!plain.contains("pirate"));
    }

    #[test]
    fn test_graph_shape() {
        let graph = build_research_graph(
            Arc::new(StaticSearcher::new(Vec::new())),
            Arc::new(TemplateGenerator::default()),
        )
        .unwrap();
        let graph = graph.graph();

        assert_eq!(graph.node_count(), 7);
        assert_eq!(graph.node("answer").unwrap().mode, NodeMode::Deferred);
        assert_eq!(
            graph.node("pruning").unwrap().metadata.get("category"),
            Some(&json!("docs"))
        );
        assert_eq!(
            graph.node("confirm_backstory").unwrap().metadata.get("category"),
            Some(&json!("backstory"))
        );

        let mut into_answer: Vec<_> = graph.predecessors("answer").cloned().collect();
        into_answer.sort();
        assert_eq!(into_answer, vec!["confirm_backstory", "pruning"]);

        let defaults = graph.channels().defaults();
        assert_eq!(defaults.get("docs_approval"), Some(&json!(true)));
        assert_eq!(defaults.get("backstory_approval"), Some(&json!(true)));
    }
}
