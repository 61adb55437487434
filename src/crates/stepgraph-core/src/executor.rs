//! Superstep executor
//!
//! [`RunLoop`] drives one run call on one lineage. Each superstep:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ 1. partition frontier → ready / blocked (deferred nodes  │
//! │    wait until every in-edge source has completed)        │
//! │ 2. run ready nodes concurrently on the pre-step state    │
//! │    (nodes with a pending write are replayed, not re-run) │
//! │ 3. any Failed     → abort, nothing written               │
//! │    any Suspended  → Interrupt checkpoint, stop           │
//! │    else           → apply deltas [BARRIER], advance      │
//! │                     frontier, Loop checkpoint            │
//! └──────────────────────────────────────────────────────────┘
//!          repeat until the frontier is empty
//! ```
//!
//! The latest checkpoint of a lineage is always a consistent resume point: a
//! superstep either writes exactly one checkpoint or none at all.

use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeId, END, START};
use crate::interrupt::{match_resume, Interrupt, InterruptStatus, ResumePlan};
use crate::node::{NodeError, NodeOutcome, StepContext};
use crate::state::{State, StateDelta, StateStore};
use crate::stream::RunInput;
use futures::future::join_all;
use parking_lot::Mutex;
use stepgraph_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource,
    PendingWrite,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// Default bound on supersteps per run call
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Engine-side configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Supersteps a single run call may execute before failing with
    /// [`GraphError::RecursionLimit`]
    pub max_steps: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl ExecutorConfig {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Everything a compiled graph shares between its runs
pub(crate) struct Engine {
    pub(crate) graph: Graph,
    pub(crate) store: StateStore,
    pub(crate) saver: Arc<dyn CheckpointSaver>,
    pub(crate) config: ExecutorConfig,
    active: Mutex<HashSet<CheckpointConfig>>,
}

impl Engine {
    pub(crate) fn new(graph: Graph, saver: Arc<dyn CheckpointSaver>, config: ExecutorConfig) -> Self {
        let store = StateStore::new(Arc::new(graph.channels().clone()));
        Self {
            graph,
            store,
            saver,
            config,
            active: Mutex::new(HashSet::new()),
        }
    }
}

/// Exclusive hold on a lineage for the lifetime of a run
struct ThreadLease {
    engine: Arc<Engine>,
    key: CheckpointConfig,
}

impl ThreadLease {
    fn acquire(engine: &Arc<Engine>, key: &CheckpointConfig) -> Result<Self> {
        if !engine.active.lock().insert(key.clone()) {
            return Err(GraphError::ThreadBusy(key.to_string()));
        }
        Ok(Self {
            engine: Arc::clone(engine),
            key: key.clone(),
        })
    }
}

impl Drop for ThreadLease {
    fn drop(&mut self) {
        self.engine.active.lock().remove(&self.key);
    }
}

/// What a superstep produced
#[derive(Debug)]
pub(crate) enum SuperstepResult {
    /// Deltas committed, in node-name order
    Committed(Vec<(NodeId, StateDelta)>),
    /// The superstep suspended on these interrupts
    Suspended(Vec<Interrupt>),
}

/// One run call on one lineage
pub(crate) struct RunLoop {
    engine: Arc<Engine>,
    config: CheckpointConfig,
    checkpoint: Checkpoint,
    state: Arc<State>,
    resume: Option<ResumePlan>,
    supersteps: usize,
    _lease: ThreadLease,
}

impl RunLoop {
    /// Take the lineage and position the loop according to `input`.
    ///
    /// A `State` input writes an `Input` checkpoint before anything runs;
    /// `Resume` and `Continue` start from the latest checkpoint and write nothing.
    pub(crate) async fn start(
        engine: Arc<Engine>,
        config: CheckpointConfig,
        input: RunInput,
    ) -> Result<Self> {
        let lease = ThreadLease::acquire(&engine, &config)?;
        let latest = engine.saver.get_latest(&config).await?;

        let (checkpoint, resume) = match input {
            RunInput::State(delta) => {
                let checkpoint = Self::input_checkpoint(&engine, &config, latest, delta)?;
                engine.saver.put(&config, checkpoint.clone()).await?;
                tracing::info!(
                    lineage = %config,
                    step = checkpoint.step,
                    frontier = ?checkpoint.frontier,
                    "Run started"
                );
                (checkpoint, None)
            }
            RunInput::Resume(command) => {
                let checkpoint = latest.ok_or_else(|| GraphError::NoCheckpoint(config.to_string()))?;
                let plan = match_resume(&checkpoint.pending_interrupts, &command)?;
                for interrupt in &checkpoint.pending_interrupts {
                    tracing::debug!(
                        lineage = %config,
                        node = %interrupt.node,
                        interrupt_id = %interrupt.interrupt_id,
                        status = ?plan.status(interrupt),
                        "Resuming interrupt"
                    );
                }
                (checkpoint, Some(plan))
            }
            RunInput::Continue => {
                let checkpoint = latest.ok_or_else(|| GraphError::NoCheckpoint(config.to_string()))?;
                tracing::info!(
                    lineage = %config,
                    step = checkpoint.step,
                    "Continuing from latest checkpoint"
                );
                (checkpoint, None)
            }
        };

        let state = Arc::new(State::from(checkpoint.channel_values.clone()));
        Ok(Self {
            engine,
            config,
            checkpoint,
            state,
            resume,
            supersteps: 0,
            _lease: lease,
        })
    }

    fn input_checkpoint(
        engine: &Engine,
        config: &CheckpointConfig,
        latest: Option<Checkpoint>,
        input: StateDelta,
    ) -> Result<Checkpoint> {
        let mut metadata = CheckpointMetadata::new().with_source(CheckpointSource::Input);

        let (base, step) = match latest {
            Some(previous) => {
                for interrupt in &previous.pending_interrupts {
                    tracing::info!(
                        lineage = %config,
                        node = %interrupt.node,
                        interrupt_id = %interrupt.interrupt_id,
                        status = ?InterruptStatus::Abandoned,
                        "New run abandons pending interrupt"
                    );
                }
                metadata = metadata.with_parent(previous.id);
                (State::from(previous.channel_values), previous.step + 1)
            }
            None => (engine.store.channels().defaults(), -1),
        };

        let state = engine.store.apply(&base, &[(START.to_string(), input)])?;
        let frontier = engine
            .graph
            .successors(START)
            .filter(|node| node.as_str() != END)
            .cloned();

        Ok(Checkpoint::new(step, state.into_values())
            .with_completed([START.to_string()])
            .with_frontier(frontier)
            .with_metadata(metadata.with_writes(vec![START.to_string()])))
    }

    /// The checkpoint the loop currently stands on
    pub(crate) fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Run one superstep; `None` once the frontier is empty.
    pub(crate) async fn superstep(&mut self) -> Result<Option<SuperstepResult>> {
        if self.checkpoint.frontier.is_empty() {
            tracing::info!(
                lineage = %self.config,
                step = self.checkpoint.step,
                "Run finished"
            );
            return Ok(None);
        }

        let limit = self.engine.config.max_steps;
        if self.supersteps >= limit {
            tracing::warn!(lineage = %self.config, limit, "Recursion limit reached");
            return Err(GraphError::RecursionLimit { limit });
        }
        self.supersteps += 1;

        let step = self.checkpoint.step + 1;
        let graph = &self.engine.graph;
        let (ready, blocked): (Vec<NodeId>, Vec<NodeId>) = self
            .checkpoint
            .frontier
            .iter()
            .cloned()
            .partition(|node| graph.is_ready(node, &self.checkpoint.completed));

        if ready.is_empty() {
            return Err(GraphError::Stalled { step, blocked });
        }

        // Siblings that already completed before a suspension are replayed
        let carried: BTreeMap<NodeId, StateDelta> = self
            .checkpoint
            .pending_writes
            .iter()
            .filter(|write| ready.contains(&write.node))
            .map(|write| (write.node.clone(), StateDelta::from(write.delta.clone())))
            .collect();

        let resume = self.resume.take();
        let mut tasks = Vec::new();
        for name in ready.iter().filter(|name| !carried.contains_key(*name)) {
            let spec = graph.node(name).ok_or_else(|| {
                GraphError::InvalidInput(format!(
                    "checkpoint of '{}' schedules unknown node '{}'",
                    self.config, name
                ))
            })?;

            let mut ctx = StepContext::new(name.clone(), step, Arc::clone(&self.state))
                .with_metadata(Arc::clone(&spec.metadata));
            if let Some(value) = resume.as_ref().and_then(|plan| plan.resume_value(name)) {
                ctx = ctx.with_resume(value.clone());
            }

            let node_step = Arc::clone(&spec.step);
            let node = name.clone();
            tasks.push(async move {
                tracing::debug!(
                    node = %node,
                    step,
                    resumed = ctx.resume_value().is_some(),
                    "Running node"
                );
                let outcome = node_step.run(ctx).await;
                (node, outcome)
            });
        }

        tracing::debug!(
            lineage = %self.config,
            step,
            ready = ?ready,
            blocked = ?blocked,
            replayed = carried.len(),
            "Superstep started"
        );

        let outcomes = join_all(tasks).await;

        let mut writes: Vec<(NodeId, StateDelta)> = carried.into_iter().collect();
        let mut interrupts = Vec::new();
        let mut failure: Option<(NodeId, NodeError)> = None;

        for (node, outcome) in outcomes {
            match outcome {
                NodeOutcome::Completed(delta) => {
                    tracing::debug!(node = %node, step, channels = delta.len(), "Node completed");
                    writes.push((node, delta));
                }
                NodeOutcome::Suspended(payload) => {
                    tracing::debug!(node = %node, step, "Node suspended");
                    interrupts.push(Interrupt::new(node, payload));
                }
                NodeOutcome::Failed(error) => {
                    tracing::error!(node = %node, step, error = %error, "Node failed");
                    if failure.is_none() {
                        failure = Some((node, error));
                    }
                }
            }
        }

        if let Some((node, error)) = failure {
            return Err(GraphError::node_execution(node, step, error.to_string()));
        }

        writes.sort_by(|a, b| a.0.cmp(&b.0));

        if !interrupts.is_empty() {
            return self.suspend(step, writes, interrupts).await.map(Some);
        }
        self.commit(step, ready, blocked, writes).await.map(Some)
    }

    async fn suspend(
        &mut self,
        step: i64,
        writes: Vec<(NodeId, StateDelta)>,
        interrupts: Vec<Interrupt>,
    ) -> Result<SuperstepResult> {
        let pending_writes = writes
            .into_iter()
            .map(|(node, delta)| PendingWrite::new(node, delta.into_values()))
            .collect();

        let checkpoint = Checkpoint::new(step, self.checkpoint.channel_values.clone())
            .with_completed(self.checkpoint.completed.iter().cloned())
            .with_frontier(self.checkpoint.frontier.iter().cloned())
            .with_pending_interrupts(interrupts.clone())
            .with_pending_writes(pending_writes)
            .with_metadata(
                CheckpointMetadata::new()
                    .with_source(CheckpointSource::Interrupt)
                    .with_parent(self.checkpoint.id.clone()),
            );

        self.engine.saver.put(&self.config, checkpoint.clone()).await?;
        tracing::info!(
            lineage = %self.config,
            step,
            nodes = ?interrupts.iter().map(|i| i.node.as_str()).collect::<Vec<_>>(),
            "Superstep suspended"
        );

        self.checkpoint = checkpoint;
        Ok(SuperstepResult::Suspended(interrupts))
    }

    async fn commit(
        &mut self,
        step: i64,
        ready: Vec<NodeId>,
        blocked: Vec<NodeId>,
        writes: Vec<(NodeId, StateDelta)>,
    ) -> Result<SuperstepResult> {
        let next_state = self.engine.store.apply(&self.state, &writes)?;

        let mut completed = self.checkpoint.completed.clone();
        completed.extend(ready.iter().cloned());

        let mut frontier: BTreeSet<NodeId> = blocked.into_iter().collect();
        for node in &ready {
            frontier.extend(
                self.engine
                    .graph
                    .successors(node)
                    .filter(|target| target.as_str() != END)
                    .cloned(),
            );
        }

        let checkpoint = Checkpoint::new(step, next_state.values().clone())
            .with_completed(completed)
            .with_frontier(frontier)
            .with_metadata(
                CheckpointMetadata::new()
                    .with_source(CheckpointSource::Loop)
                    .with_parent(self.checkpoint.id.clone())
                    .with_writes(writes.iter().map(|(node, _)| node.clone()).collect()),
            );

        self.engine.saver.put(&self.config, checkpoint.clone()).await?;
        tracing::info!(
            lineage = %self.config,
            step,
            nodes = ?ready,
            next = ?checkpoint.frontier,
            "Superstep committed"
        );

        self.checkpoint = checkpoint;
        self.state = Arc::new(next_state);
        Ok(SuperstepResult::Committed(writes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateGraph;
    use crate::interrupt::ResumeCommand;
    use crate::state::Reducer;
    use futures::future::BoxFuture;
    use serde_json::json;
    use stepgraph_checkpoint::InMemoryCheckpointSaver;

    fn append(value: i64) -> impl Fn(StepContext) -> BoxFuture<'static, NodeOutcome> + Send + Sync {
        move |_ctx: StepContext| -> BoxFuture<'static, NodeOutcome> {
            Box::pin(async move { NodeOutcome::completed(StateDelta::new().set("log", json!(value))) })
        }
    }

    fn engine(graph: StateGraph) -> (Arc<Engine>, InMemoryCheckpointSaver) {
        let saver = InMemoryCheckpointSaver::new();
        let compiled = graph.compile(Arc::new(saver.clone())).unwrap();
        (compiled.engine(), saver)
    }

    fn chain() -> StateGraph {
        let mut graph = StateGraph::new();
        graph.add_channel("log", Reducer::Append).unwrap();
        graph.add_node("a", append(1)).unwrap();
        graph.add_node("b", append(2)).unwrap();
        graph.add_edge(START, "a").unwrap();
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", END).unwrap();
        graph
    }

    #[tokio::test]
    async fn test_input_checkpoint_then_supersteps() {
        let (engine, saver) = engine(chain());
        let config = CheckpointConfig::new("t");

        let mut run = RunLoop::start(engine, config.clone(), RunInput::State(StateDelta::new()))
            .await
            .unwrap();
        assert_eq!(run.checkpoint().step, -1);
        assert_eq!(
            run.checkpoint().metadata.source,
            Some(CheckpointSource::Input)
        );

        let mut steps = Vec::new();
        while let Some(result) = run.superstep().await.unwrap() {
            match result {
                SuperstepResult::Committed(writes) => steps.push(writes[0].0.clone()),
                SuperstepResult::Suspended(_) => panic!("nothing suspends"),
            }
        }
        assert_eq!(steps, vec!["a", "b"]);

        let latest = saver.get_latest(&config).await.unwrap().unwrap();
        assert_eq!(latest.step, 1);
        assert!(latest.is_terminal());
        assert_eq!(latest.channel_values.get("log"), Some(&json!([1, 2])));
        assert_eq!(latest.metadata.writes, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let mut graph = StateGraph::new();
        graph.add_channel("log", Reducer::Append).unwrap();
        graph.add_node("loop", append(0)).unwrap();
        graph.add_edge(START, "loop").unwrap();
        graph.add_edge("loop", "loop").unwrap();
        graph.with_max_steps(3);
        let (engine, saver) = engine(graph);

        let config = CheckpointConfig::new("t");
        let mut run = RunLoop::start(engine, config.clone(), RunInput::State(StateDelta::new()))
            .await
            .unwrap();
        let err = loop {
            match run.superstep().await {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("cycle never finishes"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, GraphError::RecursionLimit { limit: 3 }));
        assert_eq!(saver.checkpoint_count().await, 4);
    }

    #[tokio::test]
    async fn test_thread_busy_until_run_dropped() {
        let (engine, _saver) = engine(chain());
        let config = CheckpointConfig::new("t");

        let run = RunLoop::start(Arc::clone(&engine), config.clone(), RunInput::State(StateDelta::new()))
            .await
            .unwrap();
        let busy = RunLoop::start(Arc::clone(&engine), config.clone(), RunInput::Continue).await;
        assert!(matches!(busy, Err(GraphError::ThreadBusy(_))));

        let other = RunLoop::start(
            Arc::clone(&engine),
            CheckpointConfig::new("t").with_checkpoint_ns("other"),
            RunInput::State(StateDelta::new()),
        )
        .await;
        assert!(other.is_ok());

        drop(run);
        assert!(RunLoop::start(engine, config, RunInput::Continue).await.is_ok());
    }

    #[tokio::test]
    async fn test_stalled_deferred_node() {
        let mut graph = StateGraph::new();
        graph.add_channel("log", Reducer::Append).unwrap();
        graph.add_node("a", append(1)).unwrap();
        graph.add_node("never", append(2)).unwrap();
        graph.add_deferred_node("join", append(3)).unwrap();
        graph.add_edge(START, "a").unwrap();
        graph.add_edge("a", "join").unwrap();
        // "never" has no in-edge, so it can never complete
        graph.add_edge("never", "join").unwrap();
        let (engine, _saver) = engine(graph);

        let mut run = RunLoop::start(engine, CheckpointConfig::new("t"), RunInput::State(StateDelta::new()))
            .await
            .unwrap();
        assert!(run.superstep().await.unwrap().is_some());
        let err = run.superstep().await.unwrap_err();
        assert!(matches!(err, GraphError::Stalled { step: 1, ref blocked } if blocked == &vec!["join".to_string()]));
    }

    #[tokio::test]
    async fn test_resume_requires_checkpoint() {
        let (engine, _saver) = engine(chain());
        let err = RunLoop::start(
            engine,
            CheckpointConfig::new("t"),
            RunInput::Resume(ResumeCommand::new().with("x", json!(1))),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, GraphError::NoCheckpoint(_)));
    }

    #[tokio::test]
    async fn test_unknown_input_channel_writes_nothing() {
        let (engine, saver) = engine(chain());
        let config = CheckpointConfig::new("t");
        let err = RunLoop::start(
            engine,
            config.clone(),
            RunInput::State(StateDelta::new().set("nope", json!(1))),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, GraphError::UnknownChannel { ref node, .. } if node == START));
        assert!(saver.get_latest(&config).await.unwrap().is_none());
    }
}
