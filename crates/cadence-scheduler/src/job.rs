//! Jobs — one scheduled operation on one worker.
//!
//! A job is planned for exactly one wave, dispatched once, then polled
//! until the execution sink no longer resolves its handle.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use cadence_core::{ExecHandle, ExecutionSink, LaunchRequest, OpKind, OpProfiles};

use crate::error::{BatchError, BatchResult};

/// Execution state of a job as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// Planned, not handed to the sink yet.
    Planned,
    /// Launched; the handle is still expected to resolve.
    Dispatched { handle: ExecHandle },
    /// The handle no longer resolves.
    Finished,
}

/// Result of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Not dispatched yet.
    Pending,
    Running { elapsed: Duration },
    Finished,
}

/// A scheduled operation. Everything but the execution state is fixed at
/// planning time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    /// Role and cycle, e.g. `"weaken-hack 3"`.
    pub id: String,
    pub kind: OpKind,
    pub target: String,
    pub worker: String,
    pub threads: u32,
    /// Memory the job occupies on its worker.
    pub memory: f64,
    /// Delay relative to the wave's dispatch instant.
    pub start_delay: Duration,
    pub expected_duration: Duration,
    state: JobState,
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        kind: OpKind,
        target: &str,
        worker: &str,
        threads: u32,
        memory: f64,
        start_delay: Duration,
        expected_duration: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            target: target.to_string(),
            worker: worker.to_string(),
            threads,
            memory,
            start_delay,
            expected_duration,
            state: JobState::Planned,
        }
    }

    /// Completion time relative to the wave's dispatch instant.
    pub fn expected_end(&self) -> Duration {
        self.start_delay + self.expected_duration
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn handle(&self) -> Option<ExecHandle> {
        match self.state {
            JobState::Dispatched { handle } => Some(handle),
            _ => None,
        }
    }

    /// Launch the job on its worker. A refusal is returned, not raised:
    /// the caller decides that it stops the whole wave.
    pub fn dispatch(
        &mut self,
        sink: &dyn ExecutionSink,
        profiles: &OpProfiles,
    ) -> BatchResult<ExecHandle> {
        if self.state != JobState::Planned {
            return Err(BatchError::AlreadyDispatched(self.id.clone()));
        }

        let request = LaunchRequest {
            worker: &self.worker,
            kind: self.kind,
            executable: &profiles[self.kind].executable,
            target: &self.target,
            threads: self.threads,
            start_delay: self.start_delay,
        };

        let handle = sink.launch(&request).map_err(|source| BatchError::Dispatch {
            job: self.id.clone(),
            worker: self.worker.clone(),
            source,
        })?;

        debug!(
            job = %self.id,
            worker = %self.worker,
            kind = %self.kind,
            threads = self.threads,
            delay_ms = self.start_delay.as_millis() as u64,
            %handle,
            "job dispatched"
        );
        self.state = JobState::Dispatched { handle };
        Ok(handle)
    }

    /// Ask the sink whether the job is still alive.
    pub fn poll(&mut self, sink: &dyn ExecutionSink) -> JobStatus {
        match self.state {
            JobState::Planned => JobStatus::Pending,
            JobState::Finished => JobStatus::Finished,
            JobState::Dispatched { handle } => {
                if sink.is_alive(handle) {
                    JobStatus::Running {
                        elapsed: sink.elapsed(handle).unwrap_or_default(),
                    }
                } else {
                    self.state = JobState::Finished;
                    JobStatus::Finished
                }
            }
        }
    }

    /// Time left until the expected end, clamped at zero, or `None` once
    /// the job is not running. Polls the sink once. Observability only.
    pub fn remaining_estimate(&mut self, sink: &dyn ExecutionSink) -> Option<Duration> {
        match self.poll(sink) {
            JobStatus::Running { elapsed } => Some(self.expected_end().saturating_sub(elapsed)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use cadence_core::LaunchError;

    use super::*;
    use crate::testing::test_profiles;

    /// Sink whose liveness and elapsed time are set by the test.
    #[derive(Default)]
    struct ScriptedSink {
        next: Mutex<u64>,
        running: Mutex<HashMap<ExecHandle, Duration>>,
        refuse: bool,
        launched: Mutex<Vec<(String, String, u32, Duration)>>,
    }

    impl ScriptedSink {
        fn set_elapsed(&self, handle: ExecHandle, elapsed: Duration) {
            self.running.lock().unwrap().insert(handle, elapsed);
        }

        fn finish(&self, handle: ExecHandle) {
            self.running.lock().unwrap().remove(&handle);
        }
    }

    impl ExecutionSink for ScriptedSink {
        fn launch(&self, request: &LaunchRequest<'_>) -> Result<ExecHandle, LaunchError> {
            if self.refuse {
                return Err(LaunchError::InsufficientMemory {
                    worker: request.worker.to_string(),
                    needed: 10.0,
                    available: 2.0,
                });
            }
            let mut next = self.next.lock().unwrap();
            *next += 1;
            let handle = ExecHandle(*next);
            self.running.lock().unwrap().insert(handle, Duration::ZERO);
            self.launched.lock().unwrap().push((
                request.worker.to_string(),
                request.executable.to_string(),
                request.threads,
                request.start_delay,
            ));
            Ok(handle)
        }

        fn is_alive(&self, handle: ExecHandle) -> bool {
            self.running.lock().unwrap().contains_key(&handle)
        }

        fn elapsed(&self, handle: ExecHandle) -> Option<Duration> {
            self.running.lock().unwrap().get(&handle).copied()
        }
    }

    fn test_job() -> Job {
        Job::new(
            "grow 0",
            OpKind::Grow,
            "alpha",
            "w1",
            12,
            12.0,
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn expected_end_is_delay_plus_duration() {
        assert_eq!(test_job().expected_end(), Duration::from_secs(35));
    }

    #[test]
    fn undispatched_job_is_pending() {
        let sink = ScriptedSink::default();
        let mut job = test_job();
        assert_eq!(job.poll(&sink), JobStatus::Pending);
        assert_eq!(job.remaining_estimate(&sink), None);
    }

    #[test]
    fn dispatch_passes_plan_to_sink() {
        let sink = ScriptedSink::default();
        let mut job = test_job();
        let handle = job.dispatch(&sink, &test_profiles()).unwrap();

        assert_eq!(job.handle(), Some(handle));
        let launched = sink.launched.lock().unwrap();
        assert_eq!(
            launched[0],
            (
                "w1".to_string(),
                "ops/grow".to_string(),
                12,
                Duration::from_secs(5)
            )
        );
    }

    #[test]
    fn dispatch_happens_once() {
        let sink = ScriptedSink::default();
        let mut job = test_job();
        job.dispatch(&sink, &test_profiles()).unwrap();
        let again = job.dispatch(&sink, &test_profiles());
        assert!(matches!(again, Err(BatchError::AlreadyDispatched(_))));
    }

    #[test]
    fn refused_launch_is_a_dispatch_error() {
        let sink = ScriptedSink {
            refuse: true,
            ..ScriptedSink::default()
        };
        let mut job = test_job();
        let err = job.dispatch(&sink, &test_profiles()).unwrap_err();
        assert!(matches!(err, BatchError::Dispatch { ref worker, .. } if worker == "w1"));
        assert_eq!(job.state(), JobState::Planned);
    }

    #[test]
    fn remaining_estimate_counts_down_and_clamps() {
        let sink = ScriptedSink::default();
        let mut job = test_job();
        let handle = job.dispatch(&sink, &test_profiles()).unwrap();

        sink.set_elapsed(handle, Duration::from_secs(20));
        assert_eq!(job.remaining_estimate(&sink), Some(Duration::from_secs(15)));

        sink.set_elapsed(handle, Duration::from_secs(50));
        assert_eq!(job.remaining_estimate(&sink), Some(Duration::ZERO));
    }

    #[test]
    fn unresolvable_handle_means_finished() {
        let sink = ScriptedSink::default();
        let mut job = test_job();
        let handle = job.dispatch(&sink, &test_profiles()).unwrap();
        assert!(matches!(job.poll(&sink), JobStatus::Running { .. }));

        sink.finish(handle);
        assert_eq!(job.remaining_estimate(&sink), None);
        assert_eq!(job.poll(&sink), JobStatus::Finished);
        assert_eq!(job.handle(), None);
        assert_eq!(job.state(), JobState::Finished);
    }

    #[test]
    fn job_serializes_without_handle_noise() {
        let json = serde_json::to_value(test_job()).unwrap();
        assert_eq!(json["id"], "grow 0");
        assert_eq!(json["kind"], "grow");
        assert_eq!(json["state"]["state"], "planned");
    }
}
