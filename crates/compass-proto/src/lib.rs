//! # compass-proto
//!
//! Wire types exchanged between the host orchestration runtime and Compass
//! hook processes.
//!
//! This crate provides:
//! - [`HookKind`], the fixed set of lifecycle extension points
//! - [`HookInput`], the lenient view of the JSON object a hook reads on stdin
//! - [`HookOutput`], the single JSON object every hook writes on stdout

mod envelope;
mod hook_kind;

pub use envelope::{Decision, HookInput, HookOutput, HookSpecificOutput, HookVerdict};
pub use hook_kind::{HookKind, UnknownHookKind};
