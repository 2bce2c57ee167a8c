//! CLI command for `compass doctor`.

use std::fmt::Write as _;

use anyhow::Result;
use clap::Parser;
use compass_core::{CheckStatus, HookConfig, PreflightReport, PreflightRunner};

use crate::OutputFormat;

/// ANSI color codes for terminal output.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
}

/// Validate the installation: root, hook manifest, telemetry, memory service.
#[derive(Parser, Debug)]
pub struct DoctorArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

pub async fn execute(args: DoctorArgs, use_colors: bool) -> Result<()> {
    let config = HookConfig::global();
    let report = PreflightRunner::default_checks().run_all(config).await;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print!("{}", render_report(&report, config, use_colors)),
    }

    if report.failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Renders the installation summary, one line per check and the verdict.
fn render_report(report: &PreflightReport, config: &HookConfig, use_colors: bool) -> String {
    let paint = |text: &str, color: &str| {
        if use_colors {
            format!("{color}{text}{}", colors::RESET)
        } else {
            text.to_string()
        }
    };

    let mut out = String::new();
    let memory = if config.force_unhealthy {
        format!("{} (forced offline)", config.health_url())
    } else {
        config.health_url()
    };
    let _ = writeln!(out, "Compass installation {}", config.root.display());
    let _ = writeln!(out, "  manifest   {}", config.hooks_manifest_path().display());
    let _ = writeln!(out, "  telemetry  {}", config.telemetry_path().display());
    let _ = writeln!(out, "  memory     {memory}");
    out.push('\n');

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => paint("[ok]  ", colors::GREEN),
            CheckStatus::Warn => paint("[warn]", colors::YELLOW),
            CheckStatus::Fail => paint("[fail]", colors::RED),
        };
        let _ = writeln!(out, "{marker} {:<9} {}", check.name, check.label);
        if let Some(message) = &check.message {
            for line in message.lines() {
                let _ = writeln!(out, "         {line}");
            }
        }
    }
    out.push('\n');

    let fallback_mode = report
        .checks
        .iter()
        .any(|check| check.name == "memory" && check.status != CheckStatus::Pass);
    if fallback_mode {
        out.push_str("Hooks will add memory-fallback notices until the service answers.\n");
    }

    let verdict = if report.passed {
        paint("PASS", colors::GREEN)
    } else {
        paint("FAIL", colors::RED)
    };
    let _ = writeln!(
        out,
        "Result: {verdict} ({} failure(s), {} warning(s))",
        report.failures, report.warnings
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use compass_core::CheckResult;

    fn report() -> PreflightReport {
        PreflightReport::from_results(vec![
            CheckResult::pass("config", "Configuration valid (memory port 8765)"),
            CheckResult::fail(
                "hooks",
                "Hooks not registered",
                "Missing: PreCompact\nMissing: Stop",
            ),
            CheckResult::warn("memory", "Memory service unreachable", "did not answer"),
        ])
    }

    #[test]
    fn test_render_lists_paths_checks_and_verdict() {
        let mut config = HookConfig::with_root("/opt/compass");
        config.force_unhealthy = true;

        let text = render_report(&report(), &config, false);
        assert!(text.starts_with("Compass installation /opt/compass\n"));
        assert!(text.contains("(forced offline)"));
        assert!(text.contains("[fail] hooks     Hooks not registered"));
        assert!(text.contains("         Missing: Stop"));
        assert!(text.contains("memory-fallback notices"));
        assert!(text.ends_with("Result: FAIL (1 failure(s), 1 warning(s))\n"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_render_colors_markers() {
        let config = HookConfig::with_root("/opt/compass");
        let text = render_report(&report(), &config, true);
        assert!(text.contains(&format!("{}[ok]  {}", colors::GREEN, colors::RESET)));
        assert!(text.contains(&format!("Result: {}FAIL{}", colors::RED, colors::RESET)));
    }
}
