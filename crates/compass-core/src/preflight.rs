//! Installation checks behind `compass doctor`.

use std::fs::{self, OpenOptions};
use std::path::Path;

use async_trait::async_trait;
use compass_proto::HookKind;
use serde::Serialize;
use serde_json::Value;

use crate::config::HookConfig;
use crate::health::HealthProbe;

/// Status of an installation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single installation check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub label: String,
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &str, label: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            label: label.into(),
            status: CheckStatus::Pass,
            message: None,
        }
    }

    pub fn warn(name: &str, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            label: label.into(),
            status: CheckStatus::Warn,
            message: Some(message.into()),
        }
    }

    pub fn fail(name: &str, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            label: label.into(),
            status: CheckStatus::Fail,
            message: Some(message.into()),
        }
    }
}

/// A single installation check.
#[async_trait]
pub trait InstallCheck: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, config: &HookConfig) -> CheckResult;
}

/// Aggregated check report.
#[derive(Debug, Clone, Serialize)]
pub struct PreflightReport {
    pub passed: bool,
    pub warnings: usize,
    pub failures: usize,
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    pub fn from_results(checks: Vec<CheckResult>) -> Self {
        let warnings = checks
            .iter()
            .filter(|check| check.status == CheckStatus::Warn)
            .count();
        let failures = checks
            .iter()
            .filter(|check| check.status == CheckStatus::Fail)
            .count();

        Self {
            passed: failures == 0,
            warnings,
            failures,
            checks,
        }
    }
}

/// Runs a set of installation checks in order.
pub struct PreflightRunner {
    checks: Vec<Box<dyn InstallCheck>>,
}

impl PreflightRunner {
    pub fn default_checks() -> Self {
        Self {
            checks: vec![
                Box::new(ConfigCheck),
                Box::new(RootExistsCheck),
                Box::new(HooksManifestCheck),
                Box::new(TelemetryWritableCheck),
                Box::new(MemoryServiceCheck),
            ],
        }
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|check| check.name()).collect()
    }

    pub async fn run_all(&self, config: &HookConfig) -> PreflightReport {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            results.push(check.run(config).await);
        }
        PreflightReport::from_results(results)
    }
}

struct ConfigCheck;

#[async_trait]
impl InstallCheck for ConfigCheck {
    fn name(&self) -> &'static str {
        "config"
    }

    async fn run(&self, config: &HookConfig) -> CheckResult {
        if config.warnings.is_empty() {
            return CheckResult::pass(
                self.name(),
                format!("Configuration valid (memory port {})", config.memory_port),
            );
        }
        let details = config
            .warnings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        CheckResult::warn(
            self.name(),
            format!("Configuration valid ({} warning(s))", config.warnings.len()),
            details,
        )
    }
}

struct RootExistsCheck;

#[async_trait]
impl InstallCheck for RootExistsCheck {
    fn name(&self) -> &'static str {
        "root"
    }

    async fn run(&self, config: &HookConfig) -> CheckResult {
        if config.root.is_dir() {
            CheckResult::pass(
                self.name(),
                format!("Installation root {}", config.root.display()),
            )
        } else {
            CheckResult::fail(
                self.name(),
                "Installation root missing",
                format!("{} is not a directory", config.root.display()),
            )
        }
    }
}

struct HooksManifestCheck;

#[async_trait]
impl InstallCheck for HooksManifestCheck {
    fn name(&self) -> &'static str {
        "hooks"
    }

    async fn run(&self, config: &HookConfig) -> CheckResult {
        let path = config.hooks_manifest_path();
        match missing_hook_registrations(&path) {
            Ok(missing) if missing.is_empty() => CheckResult::pass(
                self.name(),
                format!("All {} hooks registered", HookKind::ALL.len()),
            ),
            Ok(missing) => CheckResult::fail(
                self.name(),
                "Hooks not registered",
                format!("Missing from {}: {}", path.display(), missing.join(", ")),
            ),
            Err(message) => CheckResult::fail(self.name(), "Hook manifest unusable", message),
        }
    }
}

/// Event names the manifest at `path` does not register under `hooks`.
fn missing_hook_registrations(path: &Path) -> Result<Vec<&'static str>, String> {
    let content = fs::read_to_string(path)
        .map_err(|err| format!("Cannot read {}: {}", path.display(), err))?;
    let manifest: Value = serde_json::from_str(&content)
        .map_err(|err| format!("Invalid JSON in {}: {}", path.display(), err))?;
    let hooks = manifest
        .get("hooks")
        .and_then(Value::as_object)
        .ok_or_else(|| format!("{} has no \"hooks\" object", path.display()))?;

    Ok(HookKind::ALL
        .into_iter()
        .map(HookKind::event_name)
        .filter(|event| !hooks.contains_key(*event))
        .collect())
}

struct TelemetryWritableCheck;

#[async_trait]
impl InstallCheck for TelemetryWritableCheck {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    async fn run(&self, config: &HookConfig) -> CheckResult {
        let path = config.telemetry_path();
        let mut created = false;

        if let Some(parent) = path.parent()
            && !parent.is_dir()
        {
            if let Err(err) = fs::create_dir_all(parent) {
                return CheckResult::fail(
                    self.name(),
                    "Telemetry directory unavailable",
                    format!("{}: {}", parent.display(), err),
                );
            }
            created = true;
        }

        if let Err(err) = OpenOptions::new().create(true).append(true).open(&path) {
            return CheckResult::fail(
                self.name(),
                "Telemetry log not writable",
                format!("{}: {}", path.display(), err),
            );
        }

        if created {
            CheckResult::warn(
                self.name(),
                "Telemetry directory created",
                format!("Created: {}", path.parent().unwrap_or(&path).display()),
            )
        } else {
            CheckResult::pass(self.name(), "Telemetry log writable")
        }
    }
}

struct MemoryServiceCheck;

#[async_trait]
impl InstallCheck for MemoryServiceCheck {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn run(&self, config: &HookConfig) -> CheckResult {
        let probe = HealthProbe::from_config(config);
        if probe.is_healthy().await {
            CheckResult::pass(self.name(), format!("Memory service healthy ({})", probe.url()))
        } else {
            CheckResult::warn(
                self.name(),
                "Memory service unreachable",
                format!(
                    "{} did not answer; hooks will run in fallback mode",
                    config.health_url()
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use serde_json::json;
    use tempfile::TempDir;

    fn offline_config(root: &Path) -> HookConfig {
        let mut config = HookConfig::with_root(root);
        config.force_unhealthy = true;
        config
    }

    fn write_manifest(root: &Path, manifest: &Value) {
        let path = root.join("hooks/hooks.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(manifest).unwrap()).unwrap();
    }

    fn full_manifest() -> Value {
        let hooks: serde_json::Map<String, Value> = HookKind::ALL
            .into_iter()
            .map(|kind| {
                let command = format!("bin/compass hook {}", kind.id());
                let entry = json!([{"hooks": [{"type": "command", "command": command}]}]);
                (kind.event_name().to_string(), entry)
            })
            .collect();
        json!({ "hooks": hooks })
    }

    #[tokio::test]
    async fn report_counts_statuses() {
        let report = PreflightReport::from_results(vec![
            CheckResult::pass("a", "ok"),
            CheckResult::warn("b", "warn", "needs attention"),
            CheckResult::fail("c", "fail", "broken"),
        ]);

        assert_eq!(report.warnings, 1);
        assert_eq!(report.failures, 1);
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn config_check_reports_port_warnings() {
        let mut config = HookConfig::with_root("/tmp");
        config.warnings.push(ConfigError::InvalidPort {
            value: "abc".to_string(),
            reason: "not a number".to_string(),
        });

        let result = ConfigCheck.run(&config).await;
        assert_eq!(result.status, CheckStatus::Warn);
        assert!(result.message.unwrap_or_default().contains("abc"));
    }

    #[tokio::test]
    async fn root_check_fails_for_missing_root() {
        let temp = TempDir::new().unwrap();
        let config = offline_config(&temp.path().join("absent"));

        let result = RootExistsCheck.run(&config).await;
        assert_eq!(result.status, CheckStatus::Fail);
    }

    #[tokio::test]
    async fn manifest_check_accepts_full_manifest() {
        let temp = TempDir::new().unwrap();
        write_manifest(temp.path(), &full_manifest());

        let result = HooksManifestCheck.run(&offline_config(temp.path())).await;
        assert_eq!(result.status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn manifest_check_lists_missing_hooks() {
        let temp = TempDir::new().unwrap();
        let mut manifest = full_manifest();
        manifest["hooks"].as_object_mut().unwrap().remove("PreCompact");
        write_manifest(temp.path(), &manifest);

        let result = HooksManifestCheck.run(&offline_config(temp.path())).await;
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.message.unwrap_or_default().contains("PreCompact"));
    }

    #[tokio::test]
    async fn manifest_check_rejects_invalid_json() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("hooks")).unwrap();
        fs::write(temp.path().join("hooks/hooks.json"), "{ nope").unwrap();

        let result = HooksManifestCheck.run(&offline_config(temp.path())).await;
        assert_eq!(result.status, CheckStatus::Fail);
        assert!(result.message.unwrap_or_default().contains("Invalid JSON"));
    }

    #[tokio::test]
    async fn telemetry_check_creates_missing_dir() {
        let temp = TempDir::new().unwrap();
        let config = offline_config(temp.path());

        let result = TelemetryWritableCheck.run(&config).await;
        assert_eq!(result.status, CheckStatus::Warn);
        assert!(temp.path().join("logs").is_dir());

        let result = TelemetryWritableCheck.run(&config).await;
        assert_eq!(result.status, CheckStatus::Pass);
    }

    #[tokio::test]
    async fn memory_check_only_warns() {
        let temp = TempDir::new().unwrap();
        let result = MemoryServiceCheck.run(&offline_config(temp.path())).await;
        assert_eq!(result.status, CheckStatus::Warn);
    }

    #[tokio::test]
    async fn healthy_install_passes_with_offline_memory() {
        let temp = TempDir::new().unwrap();
        write_manifest(temp.path(), &full_manifest());
        fs::create_dir_all(temp.path().join("logs")).unwrap();

        let runner = PreflightRunner::default_checks();
        assert_eq!(
            runner.check_names(),
            ["config", "root", "hooks", "telemetry", "memory"]
        );

        let report = runner.run_all(&offline_config(temp.path())).await;
        assert!(report.passed);
        assert_eq!(report.failures, 0);
        assert_eq!(report.warnings, 1);
    }
}
