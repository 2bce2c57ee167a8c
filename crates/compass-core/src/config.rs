//! Process-wide configuration read once from the environment.
//!
//! Only three tunables reach the core: the memory service port, the
//! installation root, and a forced-unhealthy override for tests and runbooks.
//! Values are validated here, before any component sees them.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Port the companion memory service listens on unless overridden.
pub const DEFAULT_MEMORY_PORT: u16 = 8765;

pub const MEMORY_PORT_ENV: &str = "COMPASS_MEMORY_PORT";
pub const ROOT_ENV: &str = "COMPASS_ROOT";
pub const FORCE_UNHEALTHY_ENV: &str = "COMPASS_MEMORY_FORCE_UNHEALTHY";

/// Relative location of the telemetry log under the installation root.
const TELEMETRY_FILE: &str = "logs/hook-events.jsonl";

/// Relative location of the host hook manifest under the installation root.
const HOOKS_MANIFEST: &str = "hooks/hooks.json";

static GLOBAL: OnceLock<HookConfig> = OnceLock::new();

/// Problems found while reading configuration. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("COMPASS_MEMORY_PORT={value:?} is not a valid port ({reason}); using the default")]
    InvalidPort { value: String, reason: String },
}

/// Validated hook configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookConfig {
    pub memory_host: Ipv4Addr,
    pub memory_port: u16,
    pub root: PathBuf,
    pub force_unhealthy: bool,
    /// Values that were rejected and replaced by defaults.
    pub warnings: Vec<ConfigError>,
}

impl HookConfig {
    /// Configuration for this process, read from the environment on first use.
    pub fn global() -> &'static HookConfig {
        GLOBAL.get_or_init(Self::from_env)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();

        let memory_port = match lookup(MEMORY_PORT_ENV) {
            None => DEFAULT_MEMORY_PORT,
            Some(raw) => parse_port(&raw).unwrap_or_else(|err| {
                tracing::warn!("{err}");
                warnings.push(err);
                DEFAULT_MEMORY_PORT
            }),
        };

        let root = lookup(ROOT_ENV)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_root);

        let force_unhealthy = lookup(FORCE_UNHEALTHY_ENV).is_some_and(|raw| is_truthy(&raw));

        Self {
            memory_host: Ipv4Addr::LOCALHOST,
            memory_port,
            root,
            force_unhealthy,
            warnings,
        }
    }

    /// Defaults rooted at `root`, ignoring the environment.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            memory_host: Ipv4Addr::LOCALHOST,
            memory_port: DEFAULT_MEMORY_PORT,
            root: root.as_ref().to_path_buf(),
            force_unhealthy: false,
            warnings: Vec::new(),
        }
    }

    pub fn telemetry_path(&self) -> PathBuf {
        self.root.join(TELEMETRY_FILE)
    }

    pub fn hooks_manifest_path(&self) -> PathBuf {
        self.root.join(HOOKS_MANIFEST)
    }

    /// URL of the memory service health endpoint.
    ///
    /// Built from typed values only; the port has already been validated as a
    /// `u16`, so nothing from the environment reaches this string verbatim.
    pub fn health_url(&self) -> String {
        format!("http://{}:{}/health", self.memory_host, self.memory_port)
    }
}

/// Parses a port number, rejecting empty, non-numeric, zero and out-of-range
/// values.
pub fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPort {
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("not a number"));
    }
    match trimmed.parse::<u16>() {
        Ok(0) => Err(invalid("zero")),
        Ok(port) => Ok(port),
        Err(_) => Err(invalid("out of range")),
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// `<root>/bin/compass` resolves to `<root>`; otherwise the executable's own
/// directory, or `.` when the executable path is unknown.
fn default_root() -> PathBuf {
    let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    else {
        return PathBuf::from(".");
    };

    if exe_dir.file_name().is_some_and(|name| name == "bin")
        && let Some(root) = exe_dir.parent()
    {
        return root.to_path_buf();
    }
    exe_dir
}
