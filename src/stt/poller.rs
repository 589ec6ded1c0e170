//! Completion polling for remote transcription jobs.
//!
//! [`JobPoller::poll`] queries a [`JobStatusSource`] until the job leaves
//! `queued` / `processing`. The first query is sent immediately; later ones
//! wait according to [`PollPolicy`] (exponential backoff capped at
//! `max_delay`). The loop is bounded by both an attempt count and a total
//! elapsed time; running out of either is [`PollError::Timeout`], which the
//! engine keeps distinct from a job that actually failed.
//!
//! A status response without a `status` field stops the loop as well and is
//! reported as [`PollOutcome::StatusMissing`] rather than as an error.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::PollConfig;
use crate::stt::engine::SttError;

// ---------------------------------------------------------------------------
// JobId / JobStatus / StatusReport
// ---------------------------------------------------------------------------

/// Identifier assigned by the remote service when a job is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Processing,
    Finished,
    Failed,
}

impl JobStatus {
    /// Parse the lowercase wire name; `None` for anything unrecognised.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "finished" => Some(JobStatus::Finished),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status response, already lifted out of the wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Raw `status` field; `None` when the response had none.
    pub status: Option<String>,
    /// Result payload (caption document), present once finished.
    pub result: Option<String>,
    /// Error description, usually present once failed.
    pub error: Option<String>,
}

impl StatusReport {
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Build a report from a JSON status body.
    ///
    /// Non-string `result`/`error` values are kept in their JSON text form.
    pub fn from_json(body: &serde_json::Value) -> Self {
        let text = |key: &str| match body.get(key) {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        Self {
            status: body.get("status").and_then(|v| v.as_str()).map(str::to_string),
            result: text("result"),
            error: text("error"),
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatusSource
// ---------------------------------------------------------------------------

/// Anything that can report the status of a submitted job.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn query_status(&self, job: &JobId) -> Result<StatusReport, SttError>;
}

// ---------------------------------------------------------------------------
// PollPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Wait after the first non-terminal status.
    pub initial_delay: Duration,
    /// Growth factor per further non-terminal status (`1.0` = fixed).
    pub backoff_factor: f64,
    /// Cap for a single wait.
    pub max_delay: Duration,
    /// Upper bound on status queries.
    pub max_attempts: u32,
    /// Upper bound on total time spent polling one job.
    pub max_elapsed: Duration,
}

impl PollPolicy {
    /// A fixed interval with no attempt or time bound.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_delay: interval,
            backoff_factor: 1.0,
            max_delay: interval,
            max_attempts: u32::MAX,
            max_elapsed: Duration::MAX,
        }
    }

    /// Wait after the `attempt`-th (1-based) non-terminal status.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.max(1.0).powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(cfg: &PollConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            backoff_factor: cfg.backoff_factor,
            max_delay: Duration::from_millis(cfg.max_delay_ms.max(cfg.initial_delay_ms)),
            max_attempts: cfg.max_attempts.max(1),
            max_elapsed: Duration::from_secs(cfg.max_elapsed_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// PollOutcome / PollError
// ---------------------------------------------------------------------------

/// How a poll loop ended without a transport error or timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// `finished`, with the result payload (empty if the service sent none).
    Finished { result: String },
    /// `failed`, with whatever error payload the service sent.
    Failed { reason: String },
    /// The response carried no `status` field.
    StatusMissing,
    /// The `status` field held a value outside the known set.
    UnknownStatus(String),
}

#[derive(Debug, Clone, Error)]
pub enum PollError {
    #[error("job {job} still running after {attempts} queries ({elapsed:?})")]
    Timeout {
        job: JobId,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("status query for job {job} failed: {source}")]
    Query { job: JobId, source: SttError },
}

impl From<PollError> for SttError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::Timeout {
                attempts, elapsed, ..
            } => SttError::Timeout { attempts, elapsed },
            PollError::Query { source, .. } => source,
        }
    }
}

// ---------------------------------------------------------------------------
// JobPoller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct JobPoller {
    policy: PollPolicy,
}

impl JobPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Query `source` until `job` reaches a terminal state.
    ///
    /// Transport errors are returned immediately without retrying.
    pub async fn poll<S>(&self, source: &S, job: &JobId) -> Result<PollOutcome, PollError>
    where
        S: JobStatusSource + ?Sized,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let report = source
                .query_status(job)
                .await
                .map_err(|source| PollError::Query {
                    job: job.clone(),
                    source,
                })?;

            let Some(raw_status) = report.status else {
                log::warn!("poller: job {job} response has no status field, stopping");
                return Ok(PollOutcome::StatusMissing);
            };

            match JobStatus::from_wire(&raw_status) {
                Some(JobStatus::Finished) => {
                    log::debug!("poller: job {job} finished after {attempts} queries");
                    return Ok(PollOutcome::Finished {
                        result: report.result.unwrap_or_default(),
                    });
                }
                Some(JobStatus::Failed) => {
                    let reason = report
                        .error
                        .or(report.result)
                        .unwrap_or_else(|| "no details".to_string());
                    log::warn!("poller: job {job} failed: {reason}");
                    return Ok(PollOutcome::Failed { reason });
                }
                None => {
                    log::warn!("poller: job {job} reported unknown status {raw_status:?}");
                    return Ok(PollOutcome::UnknownStatus(raw_status));
                }
                Some(status) => {
                    log::debug!("poller: job {job} is {status} (query {attempts})");
                }
            }

            let elapsed = started.elapsed();
            if attempts >= self.policy.max_attempts || elapsed >= self.policy.max_elapsed {
                return Err(PollError::Timeout {
                    job: job.clone(),
                    attempts,
                    elapsed,
                });
            }

            tokio::time::sleep(self.policy.delay_after(attempts)).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted reports and records when each query happened.
    struct Scripted {
        reports: Mutex<VecDeque<StatusReport>>,
        /// Returned once the script runs out.
        tail: StatusReport,
        queried_at: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(reports: Vec<StatusReport>) -> Self {
            Self::with_tail(reports, StatusReport::with_status(JobStatus::Processing))
        }

        fn with_tail(reports: Vec<StatusReport>, tail: StatusReport) -> Self {
            Self {
                reports: Mutex::new(reports.into()),
                tail,
                queried_at: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> Vec<Instant> {
            self.queried_at.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobStatusSource for Scripted {
        async fn query_status(&self, _job: &JobId) -> Result<StatusReport, SttError> {
            self.queried_at.lock().unwrap().push(Instant::now());
            let next = self.reports.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| self.tail.clone()))
        }
    }

    struct Unreachable;

    #[async_trait]
    impl JobStatusSource for Unreachable {
        async fn query_status(&self, _job: &JobId) -> Result<StatusReport, SttError> {
            Err(SttError::Request("connection refused".into()))
        }
    }

    fn job() -> JobId {
        JobId("job-1".into())
    }

    fn finished(result: &str) -> StatusReport {
        StatusReport {
            result: Some(result.into()),
            ..StatusReport::with_status(JobStatus::Finished)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn queued_processing_finished_takes_three_queries_at_fixed_interval() {
        let source = Scripted::new(vec![
            StatusReport::with_status(JobStatus::Queued),
            StatusReport::with_status(JobStatus::Processing),
            finished("1\n00:00:00,000 --> 00:00:01,000\nhi\n"),
        ]);
        let poller = JobPoller::new(PollPolicy::fixed(Duration::from_secs(1)));

        let outcome = poller.poll(&source, &job()).await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Finished {
                result: "1\n00:00:00,000 --> 00:00:01,000\nhi\n".into()
            }
        );
        let q = source.queries();
        assert_eq!(q.len(), 3);
        assert_eq!(q[1] - q[0], Duration::from_secs(1));
        assert_eq!(q[2] - q[1], Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_on_first_query_returns_immediately() {
        let source = Scripted::new(vec![StatusReport {
            error: Some("unsupported codec".into()),
            ..StatusReport::with_status(JobStatus::Failed)
        }]);
        let poller = JobPoller::new(PollPolicy::fixed(Duration::from_secs(1)));
        let started = Instant::now();

        let outcome = poller.poll(&source, &job()).await.unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                reason: "unsupported codec".into()
            }
        );
        assert_eq!(source.queries().len(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_status_field_stops_without_error() {
        let source = Scripted::new(vec![
            StatusReport::with_status(JobStatus::Processing),
            StatusReport {
                result: Some("something".into()),
                ..StatusReport::default()
            },
        ]);
        let poller = JobPoller::new(PollPolicy::fixed(Duration::from_secs(1)));

        let outcome = poller.poll(&source, &job()).await;

        assert!(matches!(outcome, Ok(PollOutcome::StatusMissing)));
        assert_eq!(source.queries().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_status_stops_the_loop() {
        let source = Scripted::new(vec![StatusReport {
            status: Some("exploded".into()),
            ..StatusReport::default()
        }]);
        let outcome = JobPoller::default().poll(&source, &job()).await.unwrap();
        assert_eq!(outcome, PollOutcome::UnknownStatus("exploded".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_out_of_attempts_with_timeout() {
        let source = Scripted::new(vec![]);
        let policy = PollPolicy {
            max_attempts: 4,
            ..PollPolicy::fixed(Duration::from_millis(500))
        };

        let err = JobPoller::new(policy)
            .poll(&source, &job())
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Timeout { attempts: 4, .. }));
        assert_eq!(source.queries().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_out_of_time_with_timeout() {
        let source = Scripted::new(vec![]);
        let policy = PollPolicy {
            max_elapsed: Duration::from_secs(10),
            ..PollPolicy::fixed(Duration::from_secs(3))
        };

        let err = JobPoller::new(policy)
            .poll(&source, &job())
            .await
            .unwrap_err();

        // queries at t = 0, 3, 6, 9, 12 → the one at 12 s exceeds the budget
        assert!(matches!(err, PollError::Timeout { attempts: 5, .. }));
        let sttr: SttError = err.into();
        assert!(matches!(sttr, SttError::Timeout { attempts: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_spacing_grows_between_queries() {
        let source = Scripted::new(vec![
            StatusReport::with_status(JobStatus::Queued),
            StatusReport::with_status(JobStatus::Processing),
            StatusReport::with_status(JobStatus::Processing),
            finished(""),
        ]);
        let policy = PollPolicy {
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(3),
            max_attempts: 10,
            max_elapsed: Duration::from_secs(60),
        };

        JobPoller::new(policy).poll(&source, &job()).await.unwrap();

        let q = source.queries();
        let gaps: Vec<_> = q.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            [
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3)
            ]
        );
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried() {
        let err = JobPoller::default()
            .poll(&Unreachable, &job())
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Query { .. }));
        assert!(matches!(SttError::from(err), SttError::Request(_)));
    }

    #[test]
    fn delay_after_is_capped() {
        let policy = PollPolicy {
            initial_delay: Duration::from_millis(100),
            backoff_factor: 10.0,
            max_delay: Duration::from_secs(2),
            max_attempts: 100,
            max_elapsed: Duration::MAX,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_secs(1));
        assert_eq!(policy.delay_after(3), Duration::from_secs(2));
        assert_eq!(policy.delay_after(1_000), Duration::from_secs(2));
    }

    #[test]
    fn policy_from_config() {
        let policy = PollPolicy::from(&PollConfig::default());
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.backoff_factor, 2.0);
        assert_eq!(policy.max_attempts, 60);
    }

    #[test]
    fn status_report_from_json() {
        let body = serde_json::json!({ "status": "finished", "result": "WEBVTT\n" });
        let r = StatusReport::from_json(&body);
        assert_eq!(r.status.as_deref(), Some("finished"));
        assert_eq!(r.result.as_deref(), Some("WEBVTT\n"));
        assert!(r.error.is_none());

        let body = serde_json::json!({ "error": { "code": 3 } });
        let r = StatusReport::from_json(&body);
        assert!(r.status.is_none());
        assert_eq!(r.error.as_deref(), Some("{\"code\":3}"));
    }

    #[test]
    fn job_status_wire_names() {
        assert_eq!(JobStatus::from_wire("QUEUED"), Some(JobStatus::Queued));
        assert_eq!(JobStatus::from_wire("processing"), Some(JobStatus::Processing));
        assert_eq!(JobStatus::from_wire("done"), None);
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }
}
