//! Processing job cache fed by `job_progress` pushes.
//!
//! ```no_run
//! use docstream_realtime::{JobTracker, ProcessingJob, RealtimeClient};
//!
//! # fn example(client: &RealtimeClient) {
//! let tracker = JobTracker::new(client.registry());
//! tracker.track(ProcessingJob::new("job-1"));
//! client.request_job_updates("job-1");
//!
//! if let Some(job) = tracker.get("job-1") {
//!     println!("{:?} {:.0}%", job.status, job.progress);
//! }
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::identifiers::Topic;
use crate::protocol::{JobProgress, JobStatus};
use crate::router::SubscriptionRegistry;

use super::{Handles, Revision};

// ============================================================================
// ProcessingJob
// ============================================================================

/// Locally cached state of one processing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    /// Server-assigned job id.
    pub id: String,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Percent complete, 0-100.
    pub progress: f64,
    /// Pipeline stage currently running, e.g. `ocr`.
    pub current_stage: Option<String>,
    /// Server estimate of the completion time, passed through as sent.
    pub estimated_completion: Option<String>,
    /// Documents finished so far.
    pub documents_processed: u64,
    /// Errors reported by the last update that carried any.
    pub errors: Vec<String>,
    /// Time of the last applied update.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProcessingJob {
    /// Creates a pending job with no progress.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            progress: 0.0,
            current_stage: None,
            estimated_completion: None,
            documents_processed: 0,
            errors: Vec::new(),
            updated_at: None,
        }
    }

    /// Applies an update. Fields absent from the update keep their value.
    pub fn apply(&mut self, update: JobProgress) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.clamp(0.0, 100.0);
        }
        if let Some(stage) = update.current_stage {
            self.current_stage = Some(stage);
        }
        if let Some(eta) = update.estimated_completion {
            self.estimated_completion = Some(eta);
        }
        if let Some(documents) = update.documents_processed {
            self.documents_processed = documents;
        }
        if let Some(errors) = update.errors {
            self.errors = errors;
        }
        self.updated_at = Some(Utc::now());
    }

    /// Returns `true` once no more updates are expected.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

// ============================================================================
// JobTracker
// ============================================================================

struct Shared {
    registry: SubscriptionRegistry,
    jobs: Mutex<FxHashMap<String, ProcessingJob>>,
    handles: Handles,
    revision: Revision,
}

/// Keeps a [`ProcessingJob`] per tracked id current.
///
/// Each tracked, unfinished job holds exactly one registration on
/// `job_progress_{id}`. The registration is released when the job reaches
/// a terminal status or is untracked.
#[derive(Clone)]
pub struct JobTracker {
    shared: Arc<Shared>,
}

impl fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobTracker")
            .field("jobs", &self.shared.jobs.lock().len())
            .field("subscriptions", &self.shared.handles.len())
            .finish()
    }
}

impl JobTracker {
    /// Creates a tracker listening on `registry`.
    #[must_use]
    pub fn new(registry: &SubscriptionRegistry) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: registry.clone(),
                jobs: Mutex::new(FxHashMap::default()),
                handles: Handles::default(),
                revision: Revision::new(),
            }),
        }
    }

    /// Inserts or replaces `job` and subscribes to its progress.
    ///
    /// Finished jobs are cached without a subscription, and replacing a
    /// followed job with a finished one releases its registration.
    pub fn track(&self, job: ProcessingJob) {
        let id = job.id.clone();
        let finished = job.is_finished();

        self.shared.jobs.lock().insert(id.clone(), job);

        if finished {
            if self.shared.handles.remove(&id) {
                debug!(job = %id, "Job replaced as finished, releasing subscription");
            }
        } else {
            let weak = Arc::downgrade(&self.shared);
            let key = id.clone();
            let subscribed = self.shared.handles.insert_with(&id, || {
                self.shared
                    .registry
                    .subscribe(Topic::job_progress(&id), move |data: &Value| {
                        on_progress(&weak, &key, data);
                    })
            });
            if subscribed {
                debug!(job = %id, "Tracking job progress");
            }
        }

        self.shared.revision.bump();
    }

    /// Stops tracking `job_id`. Returns the last known state.
    pub fn untrack(&self, job_id: &str) -> Option<ProcessingJob> {
        self.shared.handles.remove(job_id);
        let removed = self.shared.jobs.lock().remove(job_id);
        if removed.is_some() {
            self.shared.revision.bump();
        }
        removed
    }

    /// Returns a snapshot of one job.
    #[must_use]
    pub fn get(&self, job_id: &str) -> Option<ProcessingJob> {
        self.shared.jobs.lock().get(job_id).cloned()
    }

    /// Returns every tracked job, sorted by id.
    #[must_use]
    pub fn jobs(&self) -> Vec<ProcessingJob> {
        let mut jobs: Vec<ProcessingJob> = self.shared.jobs.lock().values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Returns the number of live progress registrations.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.shared.handles.len()
    }

    /// Returns `true` if progress for `job_id` is being followed.
    #[must_use]
    pub fn is_following(&self, job_id: &str) -> bool {
        self.shared.handles.contains(job_id)
    }

    /// Returns a receiver that changes after every cache update.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.watch()
    }
}

fn on_progress(shared: &Weak<Shared>, job_id: &str, data: &Value) {
    let Some(shared) = shared.upgrade() else {
        return;
    };

    let update: JobProgress = match serde_json::from_value(data.clone()) {
        Ok(update) => update,
        Err(e) => {
            warn!(job = job_id, error = %e, "Malformed job progress payload");
            return;
        }
    };

    let finished = {
        let mut jobs = shared.jobs.lock();
        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };
        job.apply(update);
        job.is_finished().then_some(job.status)
    };

    if let Some(status) = finished {
        info!(job = job_id, ?status, "Job finished, releasing subscription");
        shared.handles.remove(job_id);
    }

    shared.revision.bump();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn setup() -> (SubscriptionRegistry, JobTracker) {
        let registry = SubscriptionRegistry::new();
        let tracker = JobTracker::new(&registry);
        (registry, tracker)
    }

    #[test]
    fn test_track_subscribes_once() {
        let (registry, tracker) = setup();

        tracker.track(ProcessingJob::new("job-1"));
        tracker.track(ProcessingJob::new("job-1"));

        assert_eq!(registry.listener_count("job_progress_job-1"), 1);
        assert_eq!(tracker.active_subscriptions(), 1);
        assert_eq!(tracker.jobs().len(), 1);
    }

    #[test]
    fn test_progress_merges_fields() {
        let (registry, tracker) = setup();
        tracker.track(ProcessingJob::new("job-1"));

        registry.emit(
            "job_progress_job-1",
            &json!({ "jobId": "job-1", "status": "processing", "progress": 42, "currentStage": "ocr" }),
        );
        registry.emit(
            "job_progress_job-1",
            &json!({ "jobId": "job-1", "progress": 60, "errors": ["page 3 unreadable"] }),
        );

        let job = tracker.get("job-1").expect("tracked");
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 60.0);
        assert_eq!(job.current_stage.as_deref(), Some("ocr"));
        assert_eq!(job.errors, vec!["page 3 unreadable".to_string()]);
        assert!(job.updated_at.is_some());
    }

    #[test]
    fn test_terminal_status_releases_subscription() {
        let (registry, tracker) = setup();
        tracker.track(ProcessingJob::new("job-1"));

        registry.emit(
            "job_progress_job-1",
            &json!({ "jobId": "job-1", "status": "completed", "progress": 100 }),
        );

        assert!(!registry.has_listeners("job_progress_job-1"));
        assert!(!tracker.is_following("job-1"));
        assert!(tracker.get("job-1").expect("kept").is_finished());

        registry.emit("job_progress_job-1", &json!({ "jobId": "job-1", "progress": 5 }));
        assert_eq!(tracker.get("job-1").expect("kept").progress, 100.0);
    }

    #[test]
    fn test_untrack_unsubscribes() {
        let (registry, tracker) = setup();
        tracker.track(ProcessingJob::new("job-1"));

        let last = tracker.untrack("job-1").expect("tracked");
        assert_eq!(last.id, "job-1");
        assert_eq!(registry.topic_count(), 0);
        assert!(tracker.untrack("job-1").is_none());
    }

    #[test]
    fn test_retrack_after_finish_subscribes_again() {
        let (registry, tracker) = setup();
        tracker.track(ProcessingJob::new("job-1"));
        registry.emit("job_progress_job-1", &json!({ "jobId": "job-1", "status": "failed" }));

        tracker.track(ProcessingJob::new("job-1"));
        assert_eq!(registry.listener_count("job_progress_job-1"), 1);
    }

    #[test]
    fn test_retrack_as_finished_releases_subscription() {
        let (registry, tracker) = setup();
        tracker.track(ProcessingJob::new("job-1"));
        assert!(tracker.is_following("job-1"));

        let mut done = ProcessingJob::new("job-1");
        done.status = JobStatus::Completed;
        done.progress = 100.0;
        tracker.track(done);

        assert_eq!(registry.listener_count("job_progress_job-1"), 0);
        assert!(!tracker.is_following("job-1"));
        assert_eq!(tracker.active_subscriptions(), 0);

        registry.emit("job_progress_job-1", &json!({ "jobId": "job-1", "progress": 5 }));
        assert_eq!(tracker.get("job-1").expect("kept").progress, 100.0);
    }

    #[test]
    fn test_finished_job_not_subscribed() {
        let (registry, tracker) = setup();
        let mut job = ProcessingJob::new("job-9");
        job.status = JobStatus::Cancelled;

        tracker.track(job);
        assert!(tracker.get("job-9").is_some());
        assert_eq!(registry.topic_count(), 0);
    }

    #[test]
    fn test_malformed_payload_ignored() {
        let (registry, tracker) = setup();
        tracker.track(ProcessingJob::new("job-1"));

        registry.emit("job_progress_job-1", &json!({ "progress": "lots" }));
        assert_eq!(tracker.get("job-1").expect("tracked").progress, 0.0);
    }

    #[test]
    fn test_changes_notified() {
        let (registry, tracker) = setup();
        let mut changes = tracker.changes();

        tracker.track(ProcessingJob::new("job-1"));
        registry.emit("job_progress_job-1", &json!({ "jobId": "job-1", "progress": 10 }));

        assert!(changes.has_changed().expect("alive"));
        assert_eq!(*changes.borrow_and_update(), 2);
    }

    #[test]
    fn test_dropped_tracker_stops_listening() {
        let registry = SubscriptionRegistry::new();
        {
            let tracker = JobTracker::new(&registry);
            tracker.track(ProcessingJob::new("job-1"));
        }
        assert_eq!(registry.topic_count(), 0);
    }
}
