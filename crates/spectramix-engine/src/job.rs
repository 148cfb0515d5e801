//! Background mix jobs with per-output supersession.
//!
//! [`JobController`] owns one worker thread. Every submission gets a
//! fresh [`JobId`] (a monotonically increasing generation number) and
//! replaces whatever job was previously in flight for the same
//! [`OutputSlot`]. The worker itself knows nothing about supersession:
//! it tags every event with the job's id and the controller drops
//! events whose job is no longer current.
//!
//! The controller never blocks on submission. Results are collected with
//! [`JobController::poll`] (non-blocking) or
//! [`JobController::wait_event`] (bounded wait).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::cache::MixInputs;
use crate::diagnostics::{MixDiagnostics, StdClock};
use crate::mix::{self, MixOutput, MixStage};
use crate::types::{GrayscaleImage, MixError, MixSpecification, OutputSlot};

/// Number of terminal job records kept for [`JobController::state`].
pub const MAX_TRACKED_JOBS: usize = 256;

/// Generation number of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    /// Raw generation number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Submitted, not yet picked up by the worker.
    Queued,
    /// The worker is computing it.
    Running,
    /// Finished and its result was delivered.
    Completed,
    /// A newer job for the same output replaced it.
    Superseded,
    /// The mix returned an error.
    Failed,
    /// Cancelled by the owner.
    Cancelled,
}

impl JobState {
    /// Returns `true` once the job can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

/// Notification delivered to the owner.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// The job advanced. `percent` never decreases for a given job.
    Progress {
        /// Job that advanced.
        job: JobId,
        /// Output the job targets.
        output: OutputSlot,
        /// Progress in `0..=100`.
        percent: u8,
    },
    /// The job finished successfully.
    Completed {
        /// Finished job.
        job: JobId,
        /// Output the job targets.
        output: OutputSlot,
        /// Mixed image.
        image: GrayscaleImage,
        /// Stage timings and counts.
        diagnostics: MixDiagnostics,
    },
    /// The mix failed.
    Failed {
        /// Failed job.
        job: JobId,
        /// Output the job targets.
        output: OutputSlot,
        /// Why it failed.
        error: MixError,
    },
}

impl JobEvent {
    /// Job the event belongs to.
    #[must_use]
    pub const fn job(&self) -> JobId {
        match self {
            Self::Progress { job, .. } | Self::Completed { job, .. } | Self::Failed { job, .. } => {
                *job
            }
        }
    }

    /// Output the event belongs to.
    #[must_use]
    pub const fn output(&self) -> OutputSlot {
        match self {
            Self::Progress { output, .. }
            | Self::Completed { output, .. }
            | Self::Failed { output, .. } => *output,
        }
    }
}

/// Command sent to the worker.
struct MixJob {
    id: JobId,
    output: OutputSlot,
    spec: MixSpecification,
    inputs: MixInputs,
}

/// Raw event sent back by the worker.
enum WorkerEvent {
    Started {
        job: JobId,
    },
    Progress {
        job: JobId,
        stage: MixStage,
    },
    Finished {
        job: JobId,
        result: Result<MixOutput, MixError>,
    },
}

#[derive(Debug, Clone, Copy)]
struct JobRecord {
    output: OutputSlot,
    state: JobState,
    percent: u8,
}

/// Owner-side handle to the background mix worker.
pub struct JobController {
    commands: Option<mpsc::Sender<MixJob>>,
    events: Option<mpsc::Receiver<WorkerEvent>>,
    worker: Option<JoinHandle<()>>,
    jobs: BTreeMap<JobId, JobRecord>,
    in_flight: [Option<JobId>; 2],
    next_generation: u64,
}

impl JobController {
    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::WorkerUnavailable`] if the thread cannot be
    /// spawned.
    pub fn new() -> Result<Self, MixError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("spectramix-worker".into())
            .spawn(move || worker_loop(&command_rx, &event_tx))
            .map_err(|e| {
                warn!("failed to spawn mix worker: {e}");
                MixError::WorkerUnavailable
            })?;
        Ok(Self {
            commands: Some(command_tx),
            events: Some(event_rx),
            worker: Some(worker),
            jobs: BTreeMap::new(),
            in_flight: [None; 2],
            next_generation: 1,
        })
    }

    /// Queue a mix for `output`, superseding the job currently in flight
    /// for that output.
    ///
    /// Never blocks on the worker.
    ///
    /// # Errors
    ///
    /// Invalid specifications and inputs are rejected here, before any
    /// job is created: [`MixError::InvalidWeight`],
    /// [`MixError::InvalidParameter`], [`MixError::EmptyInput`] and
    /// [`MixError::DimensionMismatch`]. Returns
    /// [`MixError::WorkerUnavailable`] if the worker has stopped.
    pub fn submit(
        &mut self,
        output: OutputSlot,
        spec: MixSpecification,
        inputs: MixInputs,
    ) -> Result<JobId, MixError> {
        spec.validate()?;
        inputs.dimensions()?;

        let id = JobId(self.next_generation);
        let commands = self.commands.as_ref().ok_or(MixError::WorkerUnavailable)?;
        commands
            .send(MixJob {
                id,
                output,
                spec,
                inputs,
            })
            .map_err(|_| {
                warn!("{output}: mix worker has stopped, job {id} not queued");
                MixError::WorkerUnavailable
            })?;
        self.next_generation += 1;

        if let Some(previous) = self.in_flight[output.index()].replace(id) {
            self.finish(previous, JobState::Superseded);
            debug!("{output}: job {previous} superseded by {id}");
        }
        self.jobs.insert(
            id,
            JobRecord {
                output,
                state: JobState::Queued,
                percent: 0,
            },
        );
        debug!("{output}: job {id} queued");
        self.prune();
        Ok(id)
    }

    /// Cancel the job in flight for `output`, if any.
    ///
    /// The worker may still finish computing it; its result is dropped.
    pub fn cancel(&mut self, output: OutputSlot) -> Option<JobId> {
        let id = self.in_flight[output.index()].take()?;
        self.finish(id, JobState::Cancelled);
        debug!("{output}: job {id} cancelled");
        Some(id)
    }

    /// Drain every event the worker has produced so far.
    pub fn poll(&mut self) -> Vec<JobEvent> {
        let mut delivered = Vec::new();
        loop {
            let Some(events) = self.events.as_ref() else {
                break;
            };
            match events.try_recv() {
                Ok(event) => delivered.extend(self.handle(event)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.worker_stopped();
                    break;
                }
            }
        }
        delivered
    }

    /// Wait up to `timeout` for the next deliverable event.
    ///
    /// Returns `None` on timeout or if the worker has stopped.
    pub fn wait_event(&mut self, timeout: Duration) -> Option<JobEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let received = self.events.as_ref()?.recv_timeout(remaining);
            match received {
                Ok(event) => {
                    if let Some(delivered) = self.handle(event) {
                        return Some(delivered);
                    }
                    if remaining.is_zero() {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    self.worker_stopped();
                    return None;
                }
            }
        }
    }

    /// Current state of `job`, if it is still tracked.
    #[must_use]
    pub fn state(&self, job: JobId) -> Option<JobState> {
        self.jobs.get(&job).map(|record| record.state)
    }

    /// Job currently queued or running for `output`.
    #[must_use]
    pub const fn in_flight(&self, output: OutputSlot) -> Option<JobId> {
        self.in_flight[output.index()]
    }

    /// Translate a worker event, dropping it if its job is not current.
    fn handle(&mut self, event: WorkerEvent) -> Option<JobEvent> {
        let job = match &event {
            WorkerEvent::Started { job }
            | WorkerEvent::Progress { job, .. }
            | WorkerEvent::Finished { job, .. } => *job,
        };
        let Some(record) = self.jobs.get_mut(&job) else {
            debug!("dropping event for untracked job {job}");
            return None;
        };
        if record.state.is_terminal() {
            debug!(
                "{}: dropping event for {:?} job {job}",
                record.output, record.state
            );
            return None;
        }
        let output = record.output;

        match event {
            WorkerEvent::Started { .. } => {
                record.state = JobState::Running;
                debug!("{output}: job {job} running");
                Some(JobEvent::Progress {
                    job,
                    output,
                    percent: 0,
                })
            }
            WorkerEvent::Progress { stage, .. } => {
                let percent = stage.progress();
                if percent <= record.percent {
                    return None;
                }
                record.percent = percent;
                Some(JobEvent::Progress {
                    job,
                    output,
                    percent,
                })
            }
            WorkerEvent::Finished { result, .. } => {
                self.in_flight[output.index()] = None;
                match result {
                    Ok(MixOutput { image, diagnostics }) => {
                        self.finish(job, JobState::Completed);
                        info!(
                            "{output}: job {job} completed ({} in {:.1}ms)",
                            diagnostics.dimensions,
                            diagnostics.total_duration.as_secs_f64() * 1000.0,
                        );
                        Some(JobEvent::Completed {
                            job,
                            output,
                            image,
                            diagnostics,
                        })
                    }
                    Err(error) => {
                        self.finish(job, JobState::Failed);
                        warn!("{output}: job {job} failed: {error}");
                        Some(JobEvent::Failed { job, output, error })
                    }
                }
            }
        }
    }

    fn finish(&mut self, job: JobId, state: JobState) {
        if let Some(record) = self.jobs.get_mut(&job) {
            record.state = state;
        }
    }

    /// Mark every in-flight job failed once the worker is gone.
    fn worker_stopped(&mut self) {
        warn!("mix worker stopped unexpectedly");
        self.events = None;
        self.commands = None;
        for output in OutputSlot::ALL {
            if let Some(job) = self.in_flight[output.index()].take() {
                self.finish(job, JobState::Failed);
            }
        }
    }

    /// Forget the oldest terminal records beyond [`MAX_TRACKED_JOBS`].
    fn prune(&mut self) {
        let terminal = self
            .jobs
            .values()
            .filter(|record| record.state.is_terminal())
            .count();
        let excess = terminal.saturating_sub(MAX_TRACKED_JOBS);
        if excess == 0 {
            return;
        }
        let stale: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|(_, record)| record.state.is_terminal())
            .map(|(&id, _)| id)
            .take(excess)
            .collect();
        for id in stale {
            self.jobs.remove(&id);
        }
    }
}

impl fmt::Debug for JobController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobController")
            .field("running", &self.commands.is_some())
            .field("tracked_jobs", &self.jobs.len())
            .field("in_flight", &self.in_flight)
            .field("next_generation", &self.next_generation)
            .finish_non_exhaustive()
    }
}

impl Drop for JobController {
    fn drop(&mut self) {
        // Close the event channel first so a worker mid-job stops at its
        // next send, then close the command channel so it stops waiting.
        drop(self.events.take());
        drop(self.commands.take());
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("mix worker panicked");
        }
    }
}

/// Worker thread body: run the newest job per output until either
/// channel closes.
///
/// The queue is drained and coalesced before every job, so a command
/// superseded while another job was running is never started.
fn worker_loop(commands: &mpsc::Receiver<MixJob>, events: &mpsc::Sender<WorkerEvent>) {
    let mut pending: Vec<MixJob> = Vec::new();
    loop {
        if pending.is_empty() {
            match commands.recv() {
                Ok(job) => pending.push(job),
                Err(_) => return,
            }
        }
        while let Ok(job) = commands.try_recv() {
            pending.push(job);
        }

        pending = coalesce(pending);
        if pending.is_empty() {
            continue;
        }
        let job = pending.remove(0);
        if !run_job(&job, events) {
            return;
        }
    }
}

/// Keep only the last command per output, ordered by id.
///
/// `pending` arrives in submission order.
fn coalesce(pending: Vec<MixJob>) -> Vec<MixJob> {
    let mut newest: [Option<MixJob>; 2] = [None, None];
    for job in pending {
        if let Some(skipped) = newest[job.output.index()].replace(job) {
            debug!("worker: skipping stale job {}", skipped.id);
        }
    }
    let mut batch: Vec<MixJob> = newest.into_iter().flatten().collect();
    batch.sort_by_key(|job| job.id);
    batch
}

/// Run one job, returning `false` once the owner has gone away.
///
/// The mix cannot be interrupted between stages, so a closed event
/// channel is only acted on once it returns.
fn run_job(job: &MixJob, events: &mpsc::Sender<WorkerEvent>) -> bool {
    if events.send(WorkerEvent::Started { job: job.id }).is_err() {
        return false;
    }
    let mut owner_gone = false;
    let result = mix::mix_inputs(&job.inputs, &job.spec, &StdClock, |stage| {
        if !owner_gone && events.send(WorkerEvent::Progress { job: job.id, stage }).is_err() {
            owner_gone = true;
        }
    });
    if owner_gone {
        debug!("worker: owner gone, dropping result of job {}", job.id);
        return false;
    }
    events
        .send(WorkerEvent::Finished {
            job: job.id,
            result,
        })
        .is_ok()
}
