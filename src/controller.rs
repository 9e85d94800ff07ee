use anyhow::Result;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::client::{ClientError, JobBackend};
use crate::db::Database;
use crate::logging::note_recovered;
use crate::models::{AgentStep, JobType, RunStatus, StatusReport, UploadFile};
use crate::scheduler::TaskHandle;

pub const RESUME_REQUIRED: &str = "Please upload your resume to continue.";
pub const SESSION_LOST: &str = "Session lost: the server no longer has this analysis, \
     most likely because it restarted. Please launch a new analysis.";
const GENERIC_FAILURE: &str = "Analysis failed. Please try again.";

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Pause between reaching `Completed` and handing over to the dashboard.
    pub dashboard_delay: Duration,
    /// Give up after this many consecutive transient status failures.
    /// `None` tolerates them indefinitely.
    pub max_transient_failures: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_busy(&self) -> bool {
        matches!(self, RunPhase::Submitting | RunPhase::Polling)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Submitting => "submitting",
            RunPhase::Polling => "polling",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Running(Vec<AgentStep>),
    Completed(Vec<AgentStep>),
    Failed {
        steps: Vec<AgentStep>,
        message: String,
    },
    SessionLost,
    Transient(String),
}

impl PollOutcome {
    pub fn classify(result: Result<StatusReport, ClientError>) -> Self {
        match result {
            Ok(report) => match report.status {
                RunStatus::Completed => PollOutcome::Completed(report.steps),
                RunStatus::Error => PollOutcome::Failed {
                    steps: report.steps,
                    message: report
                        .error
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
                },
                RunStatus::Running | RunStatus::Other => PollOutcome::Running(report.steps),
            },
            Err(e) if e.is_not_found() => PollOutcome::SessionLost,
            Err(e) => PollOutcome::Transient(e.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollOutcome::Completed(_) | PollOutcome::Failed { .. } | PollOutcome::SessionLost
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Progress,
    Completed,
    Failed(String),
    /// Fired once per completed run, `dashboard_delay` after completion.
    DashboardReady,
}

#[derive(Debug, Default)]
struct PollCycle {
    latest: u64,
    consecutive_failures: u32,
    settled: bool,
}

impl PollCycle {
    /// Classifies the reply to cycle `seq`. Returns `None` when there is
    /// nothing to report: the reply is older than one already reported, the
    /// run has settled, or the failure is transient and under the cap.
    fn accept(
        &mut self,
        seq: u64,
        result: Result<StatusReport, ClientError>,
        limit: Option<u32>,
    ) -> Option<PollOutcome> {
        if self.settled || seq <= self.latest {
            tracing::debug!(seq, latest = self.latest, "Dropping late status reply");
            return None;
        }
        self.latest = seq;

        let outcome = match PollOutcome::classify(result) {
            PollOutcome::Transient(reason) => {
                self.consecutive_failures += 1;
                note_recovered("status check", &reason);
                match limit {
                    Some(limit) if self.consecutive_failures >= limit => PollOutcome::Failed {
                        steps: Vec::new(),
                        message: format!(
                            "Lost contact with the server after {} failed status checks.",
                            self.consecutive_failures
                        ),
                    },
                    _ => return None,
                }
            }
            other => {
                self.consecutive_failures = 0;
                other
            }
        };
        if outcome.is_terminal() {
            self.settled = true;
        }
        Some(outcome)
    }
}

fn lock_cycle(cycle: &Mutex<PollCycle>) -> MutexGuard<'_, PollCycle> {
    cycle.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Message {
    Poll(PollOutcome),
    Dashboard,
}

struct Envelope {
    generation: u64,
    message: Message,
}

/// Drives one analysis run at a time: idle -> submitting -> polling ->
/// completed | failed.
pub struct AnalysisController<'a> {
    backend: Arc<dyn JobBackend>,
    db: &'a Database,
    config: PollConfig,
    phase: RunPhase,
    job_id: Option<String>,
    steps: Vec<AgentStep>,
    error: Option<String>,
    notice: Option<String>,
    dashboard_ready: bool,
    // Bumped on every launch/reset so messages from an old run are dropped.
    generation: u64,
    poll_task: Option<TaskHandle>,
    dashboard_task: Option<TaskHandle>,
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

impl<'a> AnalysisController<'a> {
    pub fn new(backend: Arc<dyn JobBackend>, db: &'a Database, config: PollConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            db,
            config,
            phase: RunPhase::Idle,
            job_id: None,
            steps: Vec::new(),
            error: None,
            notice: None,
            dashboard_ready: false,
            generation: 0,
            poll_task: None,
            dashboard_task: None,
            tx,
            rx,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    fn can_launch(&self) -> bool {
        !self.phase.is_busy()
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.as_ref().is_some_and(TaskHandle::is_active)
    }

    /// Submits a new analysis. Without a resume nothing is sent and only the
    /// inline notice is set. Returns the phase after the attempt.
    pub fn launch(
        &mut self,
        resume: Option<UploadFile>,
        cover_letter: Option<UploadFile>,
        job_type: JobType,
    ) -> Result<RunPhase> {
        if !self.can_launch() {
            tracing::warn!(phase = self.phase.as_str(), "Launch ignored while a run is active");
            return Ok(self.phase);
        }
        let Some(resume) = resume else {
            self.notice = Some(RESUME_REQUIRED.to_string());
            return Ok(self.phase);
        };

        self.begin_run();
        self.db.clear_cached_jobs()?;
        self.phase = RunPhase::Submitting;
        tracing::info!(file = %resume.file_name, job_type = job_type.as_str(), "Submitting analysis");

        match self.backend.submit(&resume, cover_letter.as_ref(), job_type) {
            Ok(job_id) => {
                if let Err(e) = self.db.set_active_job_id(&job_id) {
                    self.fail(format!("Could not record the analysis: {}", e));
                    return Err(e);
                }
                tracing::info!(%job_id, "Analysis accepted");
                self.start_polling(job_id);
            }
            Err(e) => self.fail(e.to_string()),
        }
        Ok(self.phase)
    }

    /// Picks up polling for the persisted active job, e.g. after the client
    /// was restarted mid-run. Returns false if there is nothing to resume.
    pub fn resume_polling(&mut self) -> bool {
        if self.phase.is_busy() {
            return false;
        }
        let Some(job_id) = self.db.active_job_id() else {
            return false;
        };
        self.begin_run();
        tracing::info!(%job_id, "Resuming status polling");
        self.start_polling(job_id);
        true
    }

    /// Cancels the polling task. Safe to call any number of times. A run
    /// that was polling settles back to idle with its job still persisted,
    /// so it can be relaunched or picked up again with `resume_polling`.
    pub fn stop_polling(&mut self) {
        if let Some(mut task) = self.poll_task.take() {
            task.cancel();
        }
        if self.phase == RunPhase::Polling {
            self.phase = RunPhase::Idle;
        }
    }

    /// Back to idle: stops all timers and forgets the job and its cache.
    pub fn reset(&mut self) -> Result<()> {
        self.stop_polling();
        if let Some(mut task) = self.dashboard_task.take() {
            task.cancel();
        }
        self.generation += 1;
        self.phase = RunPhase::Idle;
        self.job_id = None;
        self.steps.clear();
        self.error = None;
        self.notice = None;
        self.dashboard_ready = false;
        self.db.clear_active_job_id()?;
        self.db.clear_cached_jobs()?;
        Ok(())
    }

    pub fn wait_event(&mut self, timeout: Duration) -> Option<RunEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let envelope = self.rx.recv_timeout(remaining).ok()?;
            if let Some(event) = self.apply(envelope) {
                return Some(event);
            }
        }
    }

    fn begin_run(&mut self) {
        self.stop_polling();
        if let Some(mut task) = self.dashboard_task.take() {
            task.cancel();
        }
        self.generation += 1;
        self.job_id = None;
        self.steps.clear();
        self.error = None;
        self.notice = None;
        self.dashboard_ready = false;
    }

    fn start_polling(&mut self, job_id: String) {
        self.stop_polling();
        self.phase = RunPhase::Polling;
        self.job_id = Some(job_id.clone());

        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let generation = self.generation;
        let limit = self.config.max_transient_failures;
        let cycle = Arc::new(Mutex::new(PollCycle::default()));
        let mut seq = 0u64;

        // Each status check runs on its own thread, so a hung request only
        // stalls its own cycle.
        self.poll_task = Some(TaskHandle::repeat(self.config.interval, move || {
            if lock_cycle(&cycle).settled {
                return ControlFlow::Break(());
            }
            seq += 1;

            let backend = Arc::clone(&backend);
            let job_id = job_id.clone();
            let tx = tx.clone();
            let cycle = Arc::clone(&cycle);
            let this_seq = seq;
            thread::spawn(move || {
                let result = backend.poll_status(&job_id);
                let mut cycle = lock_cycle(&cycle);
                let Some(outcome) = cycle.accept(this_seq, result, limit) else {
                    return;
                };
                // Sent under the lock so the channel sees cycles in order.
                let sent = tx.send(Envelope {
                    generation,
                    message: Message::Poll(outcome),
                });
                if sent.is_err() {
                    cycle.settled = true;
                }
            });
            ControlFlow::Continue(())
        }));
    }

    fn apply(&mut self, envelope: Envelope) -> Option<RunEvent> {
        if envelope.generation != self.generation {
            tracing::debug!(generation = envelope.generation, "Dropping message from a previous run");
            return None;
        }

        match envelope.message {
            Message::Poll(_) if self.phase != RunPhase::Polling => None,
            Message::Poll(PollOutcome::Running(steps)) => {
                self.steps = steps;
                Some(RunEvent::Progress)
            }
            Message::Poll(PollOutcome::Completed(steps)) => {
                self.steps = steps;
                self.stop_polling();
                self.phase = RunPhase::Completed;
                tracing::info!(job_id = ?self.job_id, "Analysis completed");
                self.schedule_dashboard();
                Some(RunEvent::Completed)
            }
            Message::Poll(PollOutcome::Failed { steps, message }) => {
                if !steps.is_empty() {
                    self.steps = steps;
                }
                self.fail(message.clone());
                Some(RunEvent::Failed(message))
            }
            Message::Poll(PollOutcome::SessionLost) => {
                self.fail(SESSION_LOST.to_string());
                Some(RunEvent::Failed(SESSION_LOST.to_string()))
            }
            // Transient failures never leave the polling task.
            Message::Poll(PollOutcome::Transient(_)) => None,
            Message::Dashboard => {
                if self.phase != RunPhase::Completed || self.dashboard_ready {
                    return None;
                }
                self.dashboard_ready = true;
                self.dashboard_task = None;
                Some(RunEvent::DashboardReady)
            }
        }
    }

    fn schedule_dashboard(&mut self) {
        let tx = self.tx.clone();
        let generation = self.generation;
        self.dashboard_task = Some(TaskHandle::once(self.config.dashboard_delay, move || {
            let _ = tx.send(Envelope {
                generation,
                message: Message::Dashboard,
            });
        }));
    }

    fn fail(&mut self, message: String) {
        self.stop_polling();
        tracing::warn!(job_id = ?self.job_id, "Analysis failed: {}", message);
        self.phase = RunPhase::Failed;
        self.error = Some(message);
    }
}
