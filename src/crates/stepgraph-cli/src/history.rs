//! Checkpoint history listing

use anyhow::{Context, Result};
use std::io::Write;
use stepgraph_core::{CheckpointConfig, CompiledGraph, StateSnapshot};

/// Print every checkpoint of a lineage, oldest first
pub async fn print_history<W: Write>(
    graph: &CompiledGraph,
    config: &CheckpointConfig,
    mut out: W,
) -> Result<()> {
    let history = graph
        .get_state_history(config)
        .await
        .with_context(|| format!("Failed to read history of thread {}", config))?;

    if history.is_empty() {
        writeln!(out, "No checkpoints for thread {}", config)?;
        return Ok(());
    }

    writeln!(out, "{:>5}  {:<10} {:<40} {}", "STEP", "SOURCE", "NEXT", "INTERRUPTS")?;
    for snapshot in &history {
        writeln!(out, "{}", format_snapshot(snapshot))?;
    }
    Ok(())
}

fn format_snapshot(snapshot: &StateSnapshot) -> String {
    let source = snapshot
        .source
        .as_ref()
        .map(|s| format!("{:?}", s).to_lowercase())
        .unwrap_or_else(|| "-".to_string());
    let next = snapshot.next.iter().cloned().collect::<Vec<_>>().join(",");
    let interrupts = snapshot
        .interrupts
        .iter()
        .map(|i| format!("{}({})", i.node, i.interrupt_id))
        .collect::<Vec<_>>()
        .join(",");
    format!("{:>5}  {:<10} {:<40} {}", snapshot.step, source, next, interrupts)
        .trim_end()
        .to_string()
}
