use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::api::JobStatusResponse;

/// Lifecycle state of a remote generation job as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Processing,
    Completed,
    Failed,
    Unknown,
}

impl JobState {
    /// Map a raw status string from the server. Unrecognised values map to
    /// `Unknown` and keep the poller running.
    pub fn from_remote(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "created" | "queued" | "pending" => JobState::Created,
            "processing" | "running" => JobState::Processing,
            "completed" | "done" => JobState::Completed,
            "failed" | "error" => JobState::Failed,
            _ => JobState::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Created => write!(f, "created"),
            JobState::Processing => write!(f, "processing"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Unknown => write!(f, "unknown"),
        }
    }
}

/// One poll result: `{state, stage markers, message}`.
///
/// `stage_markers` is `None` when the server omitted the field, which is
/// different from an empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub stage_markers: Option<Vec<String>>,
    pub message: Option<String>,
}

impl From<JobStatusResponse> for JobSnapshot {
    fn from(resp: JobStatusResponse) -> Self {
        Self {
            state: JobState::from_remote(&resp.status),
            stage_markers: resp.available_formats,
            message: resp.info_message,
        }
    }
}

/// A remote generation job. Mutated only by poll results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub state: JobState,
    pub stage_markers: Vec<String>,
    pub message: Option<String>,
    pub state_history: Vec<JobState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state: JobState::Created,
            stage_markers: Vec::new(),
            message: None,
            state_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a poll result. Markers are only replaced when the server sent them.
    pub fn apply(&mut self, snapshot: &JobSnapshot) {
        if snapshot.state != self.state {
            self.state_history.push(self.state);
            self.state = snapshot.state;
        }
        if let Some(markers) = &snapshot.stage_markers {
            self.stage_markers = markers.clone();
        }
        if snapshot.message.is_some() {
            self.message = snapshot.message.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Identity of the job currently being tracked.
///
/// Every long-running loop holds a clone and compares job ids before
/// applying a result, so late answers for a replaced job are dropped.
#[derive(Debug, Clone)]
pub struct JobTracker {
    current: Arc<watch::Sender<Option<String>>>,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            current: Arc::new(tx),
        }
    }

    pub fn track(&self, job_id: &str) {
        self.current.send_replace(Some(job_id.to_string()));
    }

    pub fn clear(&self) {
        self.current.send_replace(None);
    }

    pub fn current(&self) -> Option<String> {
        self.current.borrow().clone()
    }

    pub fn is_current(&self, job_id: &str) -> bool {
        self.current.borrow().as_deref() == Some(job_id)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.current.subscribe()
    }
}

/// Retry behaviour for loading the primary font weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Never less than one attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_status_mapping() {
        assert_eq!(JobState::from_remote("processing"), JobState::Processing);
        assert_eq!(JobState::from_remote("COMPLETED"), JobState::Completed);
        assert_eq!(JobState::from_remote("failed"), JobState::Failed);
        assert_eq!(JobState::from_remote("created"), JobState::Created);
        assert_eq!(JobState::from_remote("exploded"), JobState::Unknown);
        assert!(JobState::Completed.is_terminal());
        assert!(!JobState::Unknown.is_terminal());
    }

    #[test]
    fn snapshot_from_response_keeps_absent_markers_absent() {
        let snapshot = JobSnapshot::from(JobStatusResponse {
            status: "processing".into(),
            info_message: Some("Generating base image".into()),
            available_formats: None,
        });
        assert_eq!(snapshot.state, JobState::Processing);
        assert!(snapshot.stage_markers.is_none());
        assert_eq!(snapshot.message.as_deref(), Some("Generating base image"));
    }

    #[test]
    fn job_apply_records_history_and_keeps_markers() {
        let mut job = Job::new("job-1");
        job.apply(&JobSnapshot {
            state: JobState::Processing,
            stage_markers: Some(vec!["base-image".into()]),
            message: Some("step 1".into()),
        });
        job.apply(&JobSnapshot {
            state: JobState::Processing,
            stage_markers: None,
            message: None,
        });
        assert_eq!(job.stage_markers, vec!["base-image".to_string()]);
        assert_eq!(job.message.as_deref(), Some("step 1"));
        assert_eq!(job.state_history, vec![JobState::Created]);

        job.apply(&JobSnapshot {
            state: JobState::Completed,
            stage_markers: None,
            message: None,
        });
        assert_eq!(
            job.state_history,
            vec![JobState::Created, JobState::Processing]
        );
    }

    #[test]
    fn tracker_compares_ids() {
        let tracker = JobTracker::new();
        assert!(!tracker.is_current("a"));
        tracker.track("a");
        assert!(tracker.is_current("a"));

        let clone = tracker.clone();
        clone.track("b");
        assert!(!tracker.is_current("a"));
        assert_eq!(tracker.current().as_deref(), Some("b"));

        tracker.clear();
        assert_eq!(clone.current(), None);
    }

    #[tokio::test]
    async fn tracker_notifies_subscribers() {
        let tracker = JobTracker::new();
        let mut rx = tracker.subscribe();
        tracker.track("job-2");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref(), Some("job-2"));
    }

    #[test]
    fn retry_config_never_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            delay_ms: 1000,
        };
        assert_eq!(config.attempts(), 1);
        assert_eq!(RetryConfig::default().attempts(), 3);
        assert_eq!(RetryConfig::default().delay(), Duration::from_secs(1));
    }

    #[test]
    fn job_serialization_roundtrip() {
        let job = Job::new("job-1");
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "job-1");
        assert_eq!(back.state, JobState::Created);
    }
}
