//! Built-in trigger: run a job on a cron cadence with job-level retries.
//!
//! The job itself is opaque here; for this crate it is one pipeline run.
//! Retries happen at whole-job granularity, never per city.

use std::{fmt::Display, future::Future, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid cron expression: {0}")]
    CronParse(String),
    #[error("schedule {0:?} has no future occurrence")]
    Exhausted(String),
}

/// How often a failed job is attempted again before waiting for the next slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            retry_delay: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schedule {
    expr: String,
    inner: cron::Schedule,
}

impl Schedule {
    /// Parse a cron expression. Standard 5-field expressions get a leading
    /// seconds field of `0`; shortcuts like `@daily` pass through.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let normalized = normalize_cron_expr(expr);
        let inner = cron::Schedule::from_str(&normalized)
            .map_err(|e| ScheduleError::CronParse(format!("{expr}: {e}")))?;

        Ok(Self {
            expr: expr.trim().to_string(),
            inner,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.after(&after).next()
    }
}

fn normalize_cron_expr(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Run `job` at every occurrence of `schedule` until `shutdown` holds `true`.
pub async fn run_scheduled<F, Fut, T, E>(
    schedule: &Schedule,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) -> Result<(), ScheduleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    loop {
        let now = Utc::now();
        let next = schedule
            .next_after(now)
            .ok_or_else(|| ScheduleError::Exhausted(schedule.expr().to_string()))?;
        log::info!("Next run at {next} ({})", schedule.expr());

        let wait = (next - now).to_std().unwrap_or_default();
        if !sleep_or_shutdown(wait, &mut shutdown).await {
            log::info!("Shutdown requested, leaving scheduler");
            return Ok(());
        }

        if let Err(e) = run_with_retries(&policy, &mut shutdown, &mut job).await {
            log::error!("Scheduled run failed after all attempts: {e}");
        }
    }
}

/// One job attempt plus up to `policy.retries` more on failure.
pub async fn run_with_retries<F, Fut, T, E>(
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
    job: &mut F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match job().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                log::warn!(
                    "Run failed: {e}; retry {attempt}/{} in {:?}",
                    policy.retries,
                    policy.retry_delay
                );
                if !sleep_or_shutdown(policy.retry_delay, shutdown).await {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Returns `false` if shutdown was requested before `wait` elapsed.
async fn sleep_or_shutdown(wait: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(wait);
    tokio::pin!(sleep);

    loop {
        if *shutdown.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Sender gone: nobody can ask us to stop any more.
                    (&mut sleep).await;
                    return true;
                }
            }
        }
    }
}
