//! `codeloop ask`: run one prompt to a final answer.

use std::path::PathBuf;

use anyhow::Context;
use codeloop_agent::RunRequest;

use super::runtime::{Runtime, ctrl_c_token};

pub async fn run(prompt: String, dir: PathBuf) -> anyhow::Result<()> {
    let runtime = Runtime::build(dir)?;
    let (token, watcher) = ctrl_c_token();

    let request = RunRequest::prompt(prompt)
        .with_instructions(runtime.instructions.clone())
        .with_cancellation(token);
    let result = runtime.query_loop.run(request).await;
    watcher.abort();

    let streaming = runtime.streaming;
    let usage = runtime.usage.clone();
    runtime.shutdown().await?;

    let outcome = result.context("Query failed")?;
    // Streamed answers were already echoed chunk by chunk.
    if !streaming {
        println!("{}", outcome.answer);
    }
    let totals = usage.totals();
    eprintln!(
        "  [{} round(s), {} tokens]",
        outcome.rounds, totals.usage.total_tokens
    );
    Ok(())
}
