//! Interactive chat loop
//!
//! Each question starts a new run on the same thread. When the run suspends,
//! every pending interrupt is shown and answered in turn, and the answers are
//! sent back together as one resume command. Interrupts left pending by an
//! earlier session on the same thread are asked first.

use anyhow::{Context, Result};
use futures::StreamExt;
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use stepgraph_core::{
    CheckpointConfig, CompiledGraph, Interrupt, ResumeCommand, RunInput, StateDelta, StepOutput,
};
use stepgraph_prebuilt::channels;

/// Run the chat loop until the user quits or `input` is exhausted
pub async fn run_chat<R, W>(
    graph: &CompiledGraph,
    config: &CheckpointConfig,
    mut input: R,
    mut out: W,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut pending: Vec<Interrupt> = graph
        .get_state(config)
        .await?
        .map(|snapshot| snapshot.interrupts)
        .unwrap_or_default();

    loop {
        let turn = if pending.is_empty() {
            let Some(line) = prompt(&mut input, &mut out, "User (q to quit): ")? else {
                break;
            };
            if line == "q" || line == "Q" {
                writeln!(out, "AI: Goodbye!")?;
                break;
            }
            RunInput::State(StateDelta::new().set(channels::QUESTION, json!(line)))
        } else {
            let mut command = ResumeCommand::new();
            for interrupt in pending.drain(..) {
                writeln!(out, "INTERRUPT==================")?;
                writeln!(out, "{}", interrupt.payload)?;
                let Some(answer) = prompt(&mut input, &mut out, "User: ")? else {
                    return Ok(());
                };
                command.insert(interrupt.interrupt_id, json!(answer));
            }
            RunInput::Resume(command)
        };

        let mut stream = graph.stream(turn, config);
        while let Some(output) = stream.next().await {
            match output.with_context(|| format!("Run on thread {} failed", config))? {
                StepOutput::Update { delta, .. } => print_update(&mut out, &delta)?,
                StepOutput::Interrupt(interrupts) => pending = interrupts,
            }
        }
    }

    Ok(())
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, text: &str) -> Result<Option<String>> {
    write!(out, "{}", text)?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Print one node update
pub fn print_update<W: Write>(out: &mut W, delta: &StateDelta) -> Result<()> {
    writeln!(out, "STATE UPDATE ----------------")?;
    for (channel, value) in delta.iter() {
        match channel.as_str() {
            channels::DOCUMENTS => {
                let count = value.as_array().map(Vec::len).unwrap_or(0);
                writeln!(out, "# of Documents: {}", count)?;
            }
            channels::MESSAGES => {
                let content = value
                    .as_array()
                    .and_then(|messages| messages.last())
                    .map(message_content)
                    .unwrap_or_default();
                writeln!(out, "messages: {}", content)?;
            }
            _ => writeln!(out, "{}: {}", channel, display(value))?,
        }
    }
    Ok(())
}

fn message_content(message: &Value) -> String {
    match message.get("content") {
        Some(content) => display(content),
        None => display(message),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printed(delta: StateDelta) -> String {
        let mut out = Vec::new();
        print_update(&mut out, &delta).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_print_documents_as_count() {
        let text = printed(StateDelta::new().set("documents", json!(["a", "b"])));
        assert_eq!(text, "STATE UPDATE ----------------\n# of Documents: 2\n");
    }

    #[test]
    fn test_print_last_message_content() {
        let text = printed(StateDelta::new().set(
            "messages",
            json!([{"role": "assistant", "content": "first"}, {"role": "assistant", "content": "last"}]),
        ));
        assert!(text.ends_with("messages: last\n"));
    }

    #[test]
    fn test_print_other_channels() {
        let text = printed(
            StateDelta::new()
                .set("docs_approval", json!(false))
                .set("question", json!("why?")),
        );
        assert!(text.contains("docs_approval: false\n"));
        assert!(text.contains("question: why?\n"));
    }

    #[test]
    fn test_prompt_strips_newline_and_detects_eof() {
        let mut input = "yes\r\n".as_bytes();
        let mut out = Vec::new();
        assert_eq!(prompt(&mut input, &mut out, "> ").unwrap(), Some("yes".to_string()));
        assert_eq!(prompt(&mut input, &mut out, "> ").unwrap(), None);
        assert_eq!(out, b"> > ");
    }
}
