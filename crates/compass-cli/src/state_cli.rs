//! CLI commands for the `compass state` namespace.
//!
//! Lets the orchestrator keep the recovery snapshot current between
//! compactions: active agents, pending decisions and free-form notes.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use compass_core::{SessionState, SessionStateStore};
use std::path::PathBuf;

use crate::OutputFormat;

#[derive(Parser, Debug)]
pub struct StateArgs {
    #[command(subcommand)]
    pub command: StateCommands,

    /// Project directory (default: current directory)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Print the current snapshot
    Show(ShowArgs),

    /// Replace the notes, or append to them with --append
    Note(NoteArgs),

    /// Add a pending decision
    Decide(DecideArgs),

    /// Resolve a pending decision by text or 1-based number
    Resolve(ResolveArgs),

    /// Track an agent as active on a task
    AgentStart(AgentStartArgs),

    /// Stop tracking an agent
    AgentStop(AgentStopArgs),
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct NoteArgs {
    pub text: String,

    /// Append to the existing notes on a new line
    #[arg(long)]
    pub append: bool,
}

#[derive(Parser, Debug)]
pub struct DecideArgs {
    pub decision: String,
}

#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Decision text or its 1-based position
    pub selector: String,
}

#[derive(Parser, Debug)]
pub struct AgentStartArgs {
    pub agent: String,

    /// Opaque task handle
    pub task: String,
}

#[derive(Parser, Debug)]
pub struct AgentStopArgs {
    pub agent: String,
}

pub fn execute(args: StateArgs) -> Result<()> {
    let project = match args.project {
        Some(project) => project,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    let store = SessionStateStore::new(&project);

    match args.command {
        StateCommands::Show(show_args) => {
            let state = store
                .try_load()
                .with_context(|| format!("Failed to read {}", store.path().display()))?;
            show_state(&state, show_args.format)
        }
        StateCommands::Note(note_args) => {
            update(&store, |state| {
                let text = note_args.text.trim();
                if note_args.append && !state.notes.is_empty() {
                    state.notes.push('\n');
                    state.notes.push_str(text);
                } else {
                    state.notes = text.to_string();
                }
            })?;
            println!("Notes updated");
            Ok(())
        }
        StateCommands::Decide(decide_args) => {
            if decide_args.decision.trim().is_empty() {
                bail!("Decision text must not be empty");
            }
            let state = update(&store, |state| state.add_decision(&decide_args.decision))?;
            println!("Pending decision #{} recorded", state.pending_decisions.len());
            Ok(())
        }
        StateCommands::Resolve(resolve_args) => {
            let mut resolved = None;
            update(&store, |state| {
                resolved = state.resolve_decision(&resolve_args.selector);
            })?;
            match resolved {
                Some(decision) => {
                    println!("Resolved: {decision}");
                    Ok(())
                }
                None => bail!("No pending decision matches {:?}", resolve_args.selector),
            }
        }
        StateCommands::AgentStart(start_args) => {
            if start_args.agent.trim().is_empty() {
                bail!("Agent name must not be empty");
            }
            update(&store, |state| {
                state.start_agent(&start_args.agent, &start_args.task);
            })?;
            println!("Tracking {}", start_args.agent.trim());
            Ok(())
        }
        StateCommands::AgentStop(stop_args) => {
            let mut stopped = None;
            update(&store, |state| stopped = state.stop_agent(&stop_args.agent))?;
            match stopped {
                Some(task) => println!("Stopped {} ({task})", stop_args.agent.trim()),
                None => println!("{} was not active", stop_args.agent.trim()),
            }
            Ok(())
        }
    }
}

fn update<F>(store: &SessionStateStore, edit: F) -> Result<SessionState>
where
    F: FnOnce(&mut SessionState),
{
    store
        .update(edit)
        .with_context(|| format!("Failed to write {}", store.path().display()))
}

fn show_state(state: &SessionState, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }

    let last = state
        .last_compaction
        .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
    println!("Last compaction: {last}");
    println!(
        "Sprint: workflow {}, status {}, phase {} -> {}",
        state.sprint.workflow,
        state.sprint.status,
        state.sprint.current_phase,
        state.sprint.next_phase
    );

    println!("Active agents:");
    if state.active_agents.is_empty() {
        println!("  (none)");
    }
    for (agent, task) in &state.active_agents {
        println!("  {agent}: {task}");
    }

    println!("Pending decisions:");
    if state.pending_decisions.is_empty() {
        println!("  (none)");
    }
    for (i, decision) in state.pending_decisions.iter().enumerate() {
        println!("  {}. {decision}", i + 1);
    }

    if !state.notes.is_empty() {
        println!("Notes:");
        for line in state.notes.lines() {
            println!("  {line}");
        }
    }
    Ok(())
}
