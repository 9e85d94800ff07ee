//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::client::{ClientError, JobBackend};
use crate::models::{
    AgentStep, JobListing, JobType, RunStatus, StatusReport, StepStatus, UploadFile,
};

pub fn listing(id: &str, score: f64) -> JobListing {
    JobListing {
        id: id.to_string(),
        title: format!("Engineer {}", id),
        company: format!("Company {}", id),
        location: "Remote".to_string(),
        job_type: "Full-time".to_string(),
        salary: String::new(),
        relevance_score: score,
        posted_date: "Recently".to_string(),
        posted_at: None,
        description: String::new(),
        relevance_summary: None,
        url: None,
        source: None,
        bullet_suggestions: Vec::new(),
        bullet_suggestions_by_section: None,
        suggested_projects: Vec::new(),
        future_score: None,
        improvement_potential: None,
        saved: false,
        applied: false,
    }
}

pub fn step(id: &str, status: StepStatus) -> AgentStep {
    AgentStep {
        id: id.to_string(),
        name: format!("Step {}", id),
        description: String::new(),
        status,
        duration: None,
        logs: Vec::new(),
    }
}

pub fn report(status: RunStatus, error: Option<&str>) -> StatusReport {
    StatusReport {
        status,
        steps: vec![step("1", StepStatus::Running)],
        error: error.map(str::to_string),
    }
}

pub fn resume() -> UploadFile {
    UploadFile::new("resume.pdf", b"%PDF-1.4 resume".to_vec())
}

/// Scripted backend. Status replies are consumed in order; once the script
/// runs out the last reply repeats.
#[derive(Default)]
pub struct FakeBackend {
    pub submit_reply: Mutex<Option<Result<String, ClientError>>>,
    pub status_script: Mutex<VecDeque<Result<StatusReport, ClientError>>>,
    pub results_reply: Mutex<Option<Result<Vec<JobListing>, ClientError>>>,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub results_calls: AtomicUsize,
    pub last_job_type: Mutex<Option<JobType>>,
    /// Holds the first status check for this long before answering.
    pub first_poll_delay: Option<Duration>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submit(self, reply: Result<String, ClientError>) -> Self {
        *self.submit_reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn with_status(self, replies: Vec<Result<StatusReport, ClientError>>) -> Self {
        *self.status_script.lock().unwrap() = replies.into();
        self
    }

    pub fn with_first_poll_delay(mut self, delay: Duration) -> Self {
        self.first_poll_delay = Some(delay);
        self
    }

    pub fn with_results(self, reply: Result<Vec<JobListing>, ClientError>) -> Self {
        *self.results_reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.results_calls.load(Ordering::SeqCst)
    }
}

impl JobBackend for FakeBackend {
    fn submit(
        &self,
        _resume: &UploadFile,
        _cover_letter: Option<&UploadFile>,
        job_type: JobType,
    ) -> Result<String, ClientError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_job_type.lock().unwrap() = Some(job_type);
        self.submit_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok("job-1".to_string()))
    }

    fn poll_status(&self, _job_id: &str) -> Result<StatusReport, ClientError> {
        let previous = self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let (0, Some(delay)) = (previous, self.first_poll_delay) {
            std::thread::sleep(delay);
        }
        let mut script = self.status_script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(report(RunStatus::Running, None)))
        }
    }

    fn fetch_results(&self, _job_id: &str) -> Result<Vec<JobListing>, ClientError> {
        self.results_calls.fetch_add(1, Ordering::SeqCst);
        self.results_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
