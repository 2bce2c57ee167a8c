//! Agent pipeline router.
//!
//! Maps the agent that just finished to the step the orchestrator should take
//! next. The table is static; lookups are case-insensitive.

/// Returned for agents the table does not know.
pub const GENERIC_NEXT_STEP: &str =
    "Consult the sprint status document to choose the next agent.";

const ROUTES: &[(&str, &str)] = &[
    (
        "analyst",
        "Hand the product brief to the pm agent to draft the PRD.",
    ),
    (
        "pm",
        "Send the PRD to the architect agent for the technical design.",
    ),
    (
        "ux-designer",
        "Pass the UX spec to the architect agent so the design covers the front end.",
    ),
    (
        "architect",
        "Ask the sm agent to shard the design into epics and stories.",
    ),
    (
        "sm",
        "Start the dev agent on the next ready-for-dev story.",
    ),
    (
        "dev",
        "Move the story to review and run the reviewer agent.",
    ),
    (
        "reviewer",
        "Run the qa agent against the reviewed story, or return findings to dev.",
    ),
    (
        "qa",
        "Mark the story done if checks passed, then ask the sm agent for the next story.",
    ),
    (
        "tech-writer",
        "Merge the documentation updates and close out the sprint checklist.",
    ),
];

/// Agent identifiers with a dedicated next step.
pub const KNOWN_AGENTS: [&str; 9] = [
    "analyst",
    "pm",
    "ux-designer",
    "architect",
    "sm",
    "dev",
    "reviewer",
    "qa",
    "tech-writer",
];

pub fn next_step(agent: &str) -> &'static str {
    let agent = agent.trim();
    ROUTES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(agent))
        .map_or(GENERIC_NEXT_STEP, |(_, step)| *step)
}
