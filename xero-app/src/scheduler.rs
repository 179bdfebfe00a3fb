use crate::jobs::{JobKind, JobRunner};
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;
use xero_core::Clock;

/// Longest accepted interval trigger: one leap year.
const MAX_INTERVAL_SECONDS: u64 = 366 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobTrigger {
    Interval { interval_seconds: u64 },
    /// Six- or seven-field expression (seconds first), evaluated in UTC.
    Cron { expression: String },
}

impl JobTrigger {
    pub fn validate(&self) -> Result<()> {
        match self {
            JobTrigger::Interval { interval_seconds } => {
                if *interval_seconds == 0 {
                    return Err(anyhow::anyhow!("interval_seconds must be > 0"));
                }
                if *interval_seconds > MAX_INTERVAL_SECONDS {
                    return Err(anyhow::anyhow!(
                        "interval_seconds must be <= {MAX_INTERVAL_SECONDS}"
                    ));
                }
            }
            JobTrigger::Cron { expression } => {
                if expression.trim().is_empty() {
                    return Err(anyhow::anyhow!("cron expression must not be empty"));
                }
                Schedule::from_str(expression)
                    .map_err(|e| anyhow::anyhow!("invalid cron expression: {e}"))?;
            }
        }
        Ok(())
    }

    /// First occurrence strictly after `from`; `None` when a cron schedule
    /// has no further occurrences.
    pub fn next_after(&self, from: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        match self {
            JobTrigger::Interval { interval_seconds } => {
                let next = i64::try_from((*interval_seconds).max(1))
                    .ok()
                    .and_then(ChronoDuration::try_seconds)
                    .and_then(|step| from.checked_add_signed(step))
                    .ok_or_else(|| {
                        anyhow::anyhow!("interval of {interval_seconds}s overflows the calendar")
                    })?;
                Ok(Some(next))
            }
            JobTrigger::Cron { expression } => {
                let schedule = Schedule::from_str(expression)
                    .map_err(|e| anyhow::anyhow!("invalid cron expression: {e}"))?;
                Ok(schedule.after(&from).next())
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStatus {
    pub job: Option<JobKind>,
    pub run_count: u64,
    pub failure_count: u64,
    /// Occurrences that fell inside a previous run and were dropped.
    pub skipped_ticks: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// One loop per job. A job never overlaps itself: the loop awaits each run
/// before computing the next occurrence.
pub struct Scheduler {
    runner: Arc<dyn JobRunner>,
    clock: Arc<dyn Clock>,
    statuses: Arc<RwLock<BTreeMap<JobKind, JobStatus>>>,
    shutdown: CancellationToken,
    background_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn JobRunner>, clock: Arc<dyn Clock>) -> Self {
        Self {
            runner,
            clock,
            statuses: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown: CancellationToken::new(),
            background_tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn spawn_job(&self, kind: JobKind, trigger: JobTrigger) -> Result<()> {
        trigger.validate()?;
        let first = trigger.next_after(self.clock.now())?;
        self.statuses.write().await.insert(
            kind,
            JobStatus {
                job: Some(kind),
                next_run_at: first,
                ..JobStatus::default()
            },
        );

        let runner = self.runner.clone();
        let clock = self.clock.clone();
        let statuses = self.statuses.clone();
        let shutdown = self.shutdown.child_token();
        tracing::info!(job = %kind, ?trigger, next_run_at = ?first, "job scheduled");

        let task = tokio::spawn(async move {
            let mut next = first;
            while let Some(due) = next {
                let wait = xero_core::clock::until(clock.now(), due);
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = clock.sleep(wait) => {}
                }

                let run_id = Uuid::new_v4();
                let span = tracing::info_span!("job_run", job = %kind, %run_id);
                let result = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        tracing::warn!(job = %kind, %run_id, "job run cancelled by shutdown");
                        break;
                    }
                    result = runner.run(kind).instrument(span) => result,
                };

                let finished = clock.now();
                let (following, skipped) = match next_after_run(&trigger, due, finished) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::error!(job = %kind, error = %e, "failed to compute next run; stopping job");
                        (None, 0)
                    }
                };
                if skipped > 0 {
                    tracing::warn!(job = %kind, skipped, "run overran its schedule; skipped occurrences");
                }

                {
                    let mut guard = statuses.write().await;
                    let status = guard.entry(kind).or_default();
                    match &result {
                        Ok(outcome) => {
                            status.run_count = status.run_count.saturating_add(1);
                            status.last_error = None;
                            tracing::info!(job = %kind, %run_id, ?outcome, "job finished");
                        }
                        Err(e) => {
                            status.failure_count = status.failure_count.saturating_add(1);
                            status.last_error = Some(format!("{e:#}"));
                            tracing::error!(job = %kind, %run_id, error = %format!("{e:#}"), "job failed");
                        }
                    }
                    status.skipped_ticks = status.skipped_ticks.saturating_add(skipped);
                    status.last_run_at = Some(finished);
                    status.next_run_at = following;
                }
                next = following;
            }
            tracing::info!(job = %kind, "job loop stopped");
        });
        self.background_tasks.lock().await.push(task);
        Ok(())
    }

    pub async fn status(&self) -> Vec<JobStatus> {
        self.statuses.read().await.values().cloned().collect()
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = {
            let mut guard = self.background_tasks.lock().await;
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            match tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "job task join failed");
                }
                Err(_) => {
                    tracing::warn!("timed out waiting for job task shutdown");
                }
            }
        }
    }
}

/// Next occurrence after a run that was due at `due` and ended at `finished`,
/// with the number of occurrences dropped in between.
fn next_after_run(
    trigger: &JobTrigger,
    due: DateTime<Utc>,
    finished: DateTime<Utc>,
) -> Result<(Option<DateTime<Utc>>, u64)> {
    let mut skipped = 0_u64;
    let mut next = trigger.next_after(due)?;
    while let Some(at) = next {
        if at > finished {
            break;
        }
        skipped = skipped.saturating_add(1);
        next = trigger.next_after(at)?;
    }
    Ok((next, skipped))
}
