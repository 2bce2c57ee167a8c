//! Start/end/error telemetry around a hook body.
//!
//! The wrapper is transparent: the body's value or error comes back
//! unchanged, and a panicking body keeps panicking after its `hook_error`
//! record is written.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::telemetry::EventLogger;
use crate::text::truncate_with_ellipsis;

/// Longest error message copied into a telemetry record.
const MAX_ERROR_CHARS: usize = 500;

/// Runs `body` between a `hook_start` and a `hook_end`/`hook_error` record.
pub fn instrument<T, E, F>(logger: &EventLogger, hook: &str, body: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: Display,
{
    logger.record_start(hook);
    let started = Instant::now();

    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => {
            finish(logger, hook, started, &result);
            result
        }
        Err(payload) => {
            logger.record_error(hook, elapsed_ms(started), &panic_message(payload.as_ref()));
            panic::resume_unwind(payload)
        }
    }
}

/// Async variant of [`instrument`].
///
/// Panics inside `body` are not intercepted here; the hook runner converts
/// them at its own boundary.
pub async fn instrument_async<T, E, Fut>(
    logger: &EventLogger,
    hook: &str,
    body: Fut,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    logger.record_start(hook);
    let started = Instant::now();
    let result = body.await;
    finish(logger, hook, started, &result);
    result
}

fn finish<T, E: Display>(
    logger: &EventLogger,
    hook: &str,
    started: Instant,
    result: &Result<T, E>,
) {
    let duration_ms = elapsed_ms(started);
    match result {
        Ok(_) => logger.record_end(hook, duration_ms),
        Err(err) => logger.record_error(
            hook,
            duration_ms,
            &truncate_with_ellipsis(&err.to_string(), MAX_ERROR_CHARS),
        ),
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    };
    truncate_with_ellipsis(&format!("panic: {message}"), MAX_ERROR_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{HookEvent, TelemetryRecord};
    use tempfile::TempDir;

    #[derive(Debug, PartialEq)]
    struct BodyError(&'static str);

    impl Display for BodyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    fn temp_logger() -> (TempDir, EventLogger) {
        let dir = TempDir::new().unwrap();
        let logger = EventLogger::new(dir.path().join("events.jsonl"));
        (dir, logger)
    }

    fn records(logger: &EventLogger) -> Vec<TelemetryRecord> {
        let (records, malformed) = logger.read_all().unwrap();
        assert_eq!(malformed, 0);
        records
    }

    #[test]
    fn test_success_returns_value_unchanged() {
        let (_dir, logger) = temp_logger();

        let result: Result<u32, BodyError> = instrument(&logger, "session-start", || Ok(7));
        assert_eq!(result, Ok(7));

        let records = records(&logger);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, HookEvent::HookStart);
        assert_eq!(records[1].event, HookEvent::HookEnd);
        assert!(records[1].error.is_none());
    }

    #[test]
    fn test_error_is_recorded_and_returned_unchanged() {
        let (_dir, logger) = temp_logger();

        let result: Result<(), BodyError> =
            instrument(&logger, "pre-compact", || Err(BodyError("x")));
        assert_eq!(result, Err(BodyError("x")));

        let records = records(&logger);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, HookEvent::HookStart);
        assert_eq!(records[1].event, HookEvent::HookError);
        assert_eq!(records[1].error.as_deref(), Some("x"));
        assert_eq!(records[1].hook, "pre-compact");
    }

    #[test]
    fn test_panic_is_recorded_and_propagated() {
        let (_dir, logger) = temp_logger();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), BodyError> =
                instrument(&logger, "subagent-stop", || panic!("kaboom"));
        }));
        assert!(outcome.is_err());

        let records = records(&logger);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].event, HookEvent::HookError);
        assert_eq!(records[1].error.as_deref(), Some("panic: kaboom"));
    }

    #[test]
    fn test_long_error_is_truncated() {
        let (_dir, logger) = temp_logger();
        let long = "e".repeat(2000);

        let _: Result<(), String> = instrument(&logger, "pre-tool-use", || Err(long.clone()));

        let records = records(&logger);
        let error = records[1].error.as_deref().unwrap();
        assert_eq!(error.chars().count(), MAX_ERROR_CHARS + 3);
        assert!(error.ends_with("..."));
    }

    #[test]
    fn test_unwritable_log_does_not_change_result() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let logger = EventLogger::new(blocker.join("events.jsonl"));

        let result: Result<&str, BodyError> = instrument(&logger, "session-start", || Ok("fine"));
        assert_eq!(result, Ok("fine"));
    }

    #[tokio::test]
    async fn test_async_error_is_recorded() {
        let (_dir, logger) = temp_logger();

        let result: Result<(), anyhow::Error> =
            instrument_async(&logger, "user-prompt-submit", async { Err(anyhow::anyhow!("x")) })
                .await;
        assert_eq!(result.unwrap_err().to_string(), "x");

        let records = records(&logger);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].event, HookEvent::HookError);
        assert_eq!(records[1].error.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_async_duration_is_measured() {
        let (_dir, logger) = temp_logger();

        let result: Result<(), BodyError> = instrument_async(&logger, "session-start", async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(())
        })
        .await;
        assert!(result.is_ok());

        let records = records(&logger);
        assert!(records[1].duration_ms >= 20);
    }
}
