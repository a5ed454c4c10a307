//! `codeloop chat`: one conversation fed line by line from stdin.

use std::io::Write;
use std::path::PathBuf;

use codeloop_agent::RunRequest;
use codeloop_core::message::Transcript;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::runtime::{Runtime, ctrl_c_token};

pub async fn run(dir: PathBuf) -> anyhow::Result<()> {
    let runtime = Runtime::build(dir)?;

    eprintln!();
    eprintln!("  codeloop chat — tools: {}", runtime.query_loop.tools().names().join(", "));
    eprintln!("  Type 'exit' or send EOF to quit. Ctrl+C cancels the current answer.");
    eprintln!();

    let mut transcript = Transcript::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        std::io::stderr().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let (token, watcher) = ctrl_c_token();
        let request = RunRequest::prompt(line)
            .with_instructions(runtime.instructions.clone())
            .with_cancellation(token);
        let result = runtime.query_loop.run_in(&mut transcript, request).await;
        watcher.abort();

        match result {
            Ok(answer) => {
                if !runtime.streaming {
                    println!("{answer}");
                }
            }
            // The transcript keeps what was appended; the next prompt continues from it.
            Err(e) => eprintln!("  [error] {e}"),
        }
        println!();
    }

    let totals = runtime.usage.totals();
    eprintln!(
        "  {} queries, {} tokens",
        totals.queries, totals.usage.total_tokens
    );
    runtime.shutdown().await
}
