//! Hook handlers.
//!
//! [`HookRunner::run`] is the only entry point the binary needs: it parses
//! the host payload, runs the handler for the hook kind under telemetry, and
//! always returns an envelope. Handler errors and panics both collapse into
//! [`HookOutput::fallback`].

use std::fmt::Write as _;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use compass_proto::{HookInput, HookKind, HookOutput};

use crate::config::HookConfig;
use crate::fallback::fallback_message;
use crate::health::HealthProbe;
use crate::instrument::{elapsed_ms, instrument_async, panic_message};
use crate::routing::next_step;
use crate::session_state::{SessionState, SessionStateStore, SprintSnapshot, StateOverrides};
use crate::sprint_status::{SprintField, SprintStatus};
use crate::telemetry::EventLogger;
use crate::text::{single_line, truncate_with_ellipsis};

/// Tool name prefix of the memory service's tools.
const MEMORY_TOOL_PREFIX: &str = "mcp__memory";

/// Longest free-text note echoed back into the conversation.
const MAX_NOTE_CHARS: usize = 400;

/// Runs hook handlers against one installation.
#[derive(Debug, Clone)]
pub struct HookRunner {
    config: HookConfig,
    logger: EventLogger,
    probe: HealthProbe,
}

impl HookRunner {
    pub fn new(config: HookConfig) -> Self {
        let logger = EventLogger::from_config(&config);
        let probe = HealthProbe::from_config(&config);
        Self {
            config,
            logger,
            probe,
        }
    }

    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    pub fn logger(&self) -> &EventLogger {
        &self.logger
    }

    /// Runs `kind` for a raw stdin payload. The project directory is the
    /// payload's `cwd`, else the process working directory.
    pub async fn run(&self, kind: HookKind, raw_input: &str) -> HookOutput {
        let default_project = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        self.run_in(kind, raw_input, &default_project).await
    }

    /// Like [`HookRunner::run`] with an explicit fallback project directory.
    pub async fn run_in(
        &self,
        kind: HookKind,
        raw_input: &str,
        default_project: &Path,
    ) -> HookOutput {
        let input = HookInput::parse_lenient(raw_input);
        let project = input
            .cwd
            .clone()
            .filter(|cwd| cwd.is_dir())
            .unwrap_or_else(|| default_project.to_path_buf());

        let runner = self.clone();
        self.guarded(kind, async move { runner.dispatch(kind, input, project).await })
            .await
    }

    /// Runs `body` on its own task under telemetry, turning an error or a
    /// panic into the fallback envelope for `kind`.
    pub(crate) async fn guarded<F>(&self, kind: HookKind, body: F) -> HookOutput
    where
        F: Future<Output = Result<HookOutput>> + Send + 'static,
    {
        let started = Instant::now();
        let logger = self.logger.clone();
        let task = tokio::spawn(async move { instrument_async(&logger, kind.id(), body).await });

        match task.await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                tracing::warn!("{} hook failed: {:#}", kind, err);
                HookOutput::fallback(kind)
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic().as_ref())
                } else {
                    join_err.to_string()
                };
                tracing::warn!("{} hook aborted: {}", kind, message);
                self.logger
                    .record_error(kind.id(), elapsed_ms(started), &message);
                HookOutput::fallback(kind)
            }
        }
    }

    async fn dispatch(
        &self,
        kind: HookKind,
        input: HookInput,
        project: PathBuf,
    ) -> Result<HookOutput> {
        tracing::debug!(
            "Running {} hook in {} (session {})",
            kind,
            project.display(),
            input.session_id.as_deref().unwrap_or("-")
        );
        if let Some(event) = input.hook_event_name.as_deref()
            && event != kind.event_name()
        {
            tracing::warn!("{} hook launched for {} event", kind, event);
        }
        match kind {
            HookKind::SessionStart => self.session_start(&input, &project).await,
            HookKind::UserPromptSubmit => Ok(Self::user_prompt_submit(&project)),
            HookKind::SubagentStop => self.subagent_stop(&input, &project).await,
            HookKind::PreCompact => self.pre_compact(&input, &project).await,
            HookKind::PreToolUse => Ok(self.pre_tool_use(&input).await),
        }
    }

    /// Sprint summary, recovered state and a fallback notice when the memory
    /// service is down.
    async fn session_start(&self, input: &HookInput, project: &Path) -> Result<HookOutput> {
        let sprint = SprintStatus::load(project);
        let state = SessionStateStore::new(project).load();

        let mut context = String::from("## Compass session context\n");
        render_sprint(&mut context, &sprint)?;
        if has_recoverable_state(&state) {
            context.push('\n');
            render_state(&mut context, &state)?;
            if input.source.as_deref() == Some("compact") {
                context.push_str("Context was just compacted; resume from the state above.\n");
            }
        }
        if !self.probe.is_healthy().await {
            writeln!(context, "\n{}", fallback_message(Some(HookKind::SessionStart.id())))?;
        }

        Ok(HookOutput::context(HookKind::SessionStart, context.trim_end()))
    }

    /// One-line sprint reminder; nothing when the project has no status
    /// document.
    fn user_prompt_submit(project: &Path) -> HookOutput {
        let sprint = SprintStatus::load(project);
        if sprint.source().is_none() {
            return HookOutput::acknowledge(HookKind::UserPromptSubmit);
        }
        let reminder = format!(
            "[compass] Phase {} -> {} | sprint {} | stories {} done",
            sprint.display(SprintField::CurrentPhase),
            sprint.display(SprintField::NextPhase),
            sprint.display(SprintField::Status),
            sprint.progress(),
        );
        HookOutput::context(HookKind::UserPromptSubmit, reminder)
    }

    /// Suggests the next pipeline step and drops the finished agent from the
    /// active set.
    async fn subagent_stop(&self, input: &HookInput, project: &Path) -> Result<HookOutput> {
        let agent = input.agent.as_deref().unwrap_or_default();
        let step = next_step(agent);

        let mut message = if agent.is_empty() {
            format!("Sub-agent finished. Next: {step}")
        } else {
            format!("Agent {agent} finished. Next: {step}")
        };

        if !agent.is_empty() {
            let store = SessionStateStore::new(project);
            let tracked = store
                .load()
                .active_agents
                .keys()
                .any(|known| known.eq_ignore_ascii_case(agent));
            if tracked
                && let Err(err) = store.update(|state| {
                    state.stop_agent(agent);
                })
            {
                tracing::debug!("Could not clear finished agent {}: {}", agent, err);
            }
        }

        if !self.probe.is_healthy().await {
            write!(message, " {}", fallback_message(Some(HookKind::SubagentStop.id())))?;
        }

        Ok(HookOutput::proceed(message))
    }

    /// Refreshes and persists the recovery snapshot before the host discards
    /// the conversation.
    async fn pre_compact(&self, input: &HookInput, project: &Path) -> Result<HookOutput> {
        let sprint = SprintStatus::load(project);
        let store = SessionStateStore::new(project);
        let state = store.load_and_merge(SprintSnapshot::from(&sprint), StateOverrides::default());

        let mut message = if store.persist(&state) {
            format!(
                "Session state saved to {} (phase {} -> {}, {} active agent(s), {} pending decision(s)).",
                store.path().display(),
                state.sprint.current_phase,
                state.sprint.next_phase,
                state.active_agents.len(),
                state.pending_decisions.len(),
            )
        } else {
            "Session state could not be saved; continuing without a recovery snapshot.".to_string()
        };
        if let Some(trigger) = input.trigger.as_deref() {
            tracing::debug!("Compaction trigger: {}", trigger);
        }

        if !self.probe.is_healthy().await {
            write!(message, " {}", fallback_message(Some(HookKind::PreCompact.id())))?;
        }

        Ok(HookOutput::status(HookKind::PreCompact, message))
    }

    /// Always approves; memory tools get a warning when the service is down.
    async fn pre_tool_use(&self, input: &HookInput) -> HookOutput {
        let is_memory_tool = input
            .tool_name
            .as_deref()
            .is_some_and(|tool| tool.starts_with(MEMORY_TOOL_PREFIX));

        if is_memory_tool && !self.probe.is_healthy().await {
            return HookOutput::approve_with_reason(fallback_message(Some(
                HookKind::PreToolUse.id(),
            )));
        }
        HookOutput::approve()
    }
}

fn has_recoverable_state(state: &SessionState) -> bool {
    state.last_compaction.is_some()
        || !state.active_agents.is_empty()
        || !state.pending_decisions.is_empty()
        || !state.notes.trim().is_empty()
}

fn render_sprint(out: &mut String, sprint: &SprintStatus) -> std::fmt::Result {
    if sprint.source().is_none() {
        return writeln!(out, "No sprint status document found.");
    }
    writeln!(
        out,
        "Sprint: workflow {}, status {}, quality {}, scale {}",
        sprint.display(SprintField::Workflow),
        sprint.display(SprintField::Status),
        sprint.display(SprintField::QualityTier),
        sprint.display(SprintField::Scale),
    )?;
    writeln!(
        out,
        "Phase: {} (next: {})",
        sprint.display(SprintField::CurrentPhase),
        sprint.display(SprintField::NextPhase),
    )?;
    writeln!(out, "Stories: {} done", sprint.progress())
}

fn render_state(out: &mut String, state: &SessionState) -> std::fmt::Result {
    match state.last_compaction {
        Some(at) => writeln!(out, "Recovered session state (saved {}):", at.to_rfc3339())?,
        None => writeln!(out, "Recovered session state:")?,
    }
    writeln!(
        out,
        "Last phase: {} (next: {})",
        state.sprint.current_phase, state.sprint.next_phase
    )?;

    if !state.active_agents.is_empty() {
        let agents: Vec<String> = state
            .active_agents
            .iter()
            .map(|(agent, task)| format!("{agent} ({})", single_line(task)))
            .collect();
        writeln!(out, "Active agents: {}", agents.join(", "))?;
    }
    if !state.pending_decisions.is_empty() {
        writeln!(out, "Pending decisions:")?;
        for (i, decision) in state.pending_decisions.iter().enumerate() {
            writeln!(out, "  {}. {}", i + 1, single_line(decision))?;
        }
    }
    let notes = single_line(&state.notes);
    if !notes.is_empty() {
        writeln!(out, "Notes: {}", truncate_with_ellipsis(&notes, MAX_NOTE_CHARS))?;
    }
    Ok(())
}
