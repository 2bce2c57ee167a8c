//! CLI command for `compass hook <kind>`.

use anyhow::Result;
use clap::Parser;
use compass_core::{HookConfig, HookRunner};
use compass_proto::HookKind;
use std::io::{Read, Write};

/// Largest payload read from stdin; anything past it is ignored.
const MAX_INPUT_BYTES: u64 = 4 * 1024 * 1024;

/// Run one lifecycle hook for the host.
#[derive(Parser, Debug)]
pub struct HookArgs {
    /// Hook kind (session-start, user-prompt-submit, subagent-stop,
    /// pre-compact, pre-tool-use)
    pub kind: HookKind,
}

/// Never returns an error: the host always gets one JSON line.
pub async fn execute(args: HookArgs) -> Result<()> {
    let kind = args.kind;
    let raw_input = read_stdin();

    let runner = HookRunner::new(HookConfig::global().clone());
    let line = runner.run(kind, &raw_input).await.to_json_line(kind);

    let mut out = std::io::stdout().lock();
    if let Err(err) = writeln!(out, "{line}").and_then(|()| out.flush()) {
        tracing::debug!("Failed to write {} hook output: {}", kind, err);
    }
    Ok(())
}

fn read_stdin() -> String {
    let mut bytes = Vec::new();
    if let Err(err) = std::io::stdin()
        .lock()
        .take(MAX_INPUT_BYTES)
        .read_to_end(&mut bytes)
    {
        tracing::debug!("Failed to read hook input: {}", err);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
