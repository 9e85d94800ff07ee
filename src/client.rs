use reqwest::StatusCode;
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

use crate::models::{JobListing, JobType, StatusReport, UploadFile};

// --- Backend trait ---

/// The three backend operations. All single-shot: retry policy belongs to
/// the caller.
pub trait JobBackend: Send + Sync {
    fn submit(
        &self,
        resume: &UploadFile,
        cover_letter: Option<&UploadFile>,
        job_type: JobType,
    ) -> Result<String, ClientError>;

    fn poll_status(&self, job_id: &str) -> Result<StatusReport, ClientError>;

    fn fetch_results(&self, job_id: &str) -> Result<Vec<JobListing>, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Submit,
    Status,
    Results,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Submit => write!(f, "analyze request"),
            Operation::Status => write!(f, "status check"),
            Operation::Results => write!(f, "results fetch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Analysis request failed with status {status}: {detail}")]
    Submission { status: u16, detail: String },

    #[error("Job {job_id} not found (404)")]
    NotFound { job_id: String },

    #[error("Status check failed with status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Results fetch failed with status {status}: {detail}")]
    Results { status: u16, detail: String },

    #[error("Failed to send {op}: {message}")]
    Transport { op: Operation, message: String },

    #[error("Failed to parse {op} response: {message}")]
    Decode { op: Operation, message: String },
}

impl ClientError {
    /// True when the backend has no record of the polled job, typically
    /// because it restarted and lost its in-memory store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

// --- HTTP client ---

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    #[serde(default)]
    jobs: Option<Vec<JobListing>>,
}

#[derive(Debug)]
pub struct RemoteJobClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl RemoteJobClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl JobBackend for RemoteJobClient {
    fn submit(
        &self,
        resume: &UploadFile,
        cover_letter: Option<&UploadFile>,
        job_type: JobType,
    ) -> Result<String, ClientError> {
        let op = Operation::Submit;
        let mut form = Form::new()
            .part("resume", file_part(resume))
            // Title selection is server-driven; the client always sends none.
            .text("job_titles", "[]")
            .text("job_type", job_type.as_str());
        if let Some(cover) = cover_letter {
            form = form.part("cover_letter", file_part(cover));
        }

        tracing::debug!(file = %resume.file_name, job_type = job_type.as_str(), "POST /analyze");
        let response = self
            .client
            .post(self.endpoint("analyze"))
            .multipart(form)
            .send()
            .map_err(|e| transport(op, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(ClientError::Submission {
                status: status.as_u16(),
                detail,
            });
        }

        let body: SubmitResponse = response.json().map_err(|e| decode(op, e))?;
        Ok(body.job_id)
    }

    fn poll_status(&self, job_id: &str) -> Result<StatusReport, ClientError> {
        let op = Operation::Status;
        let response = self
            .client
            .get(self.endpoint(&format!("status/{}", job_id)))
            .send()
            .map_err(|e| transport(op, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                job_id: job_id.to_string(),
            });
        }
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        response.json().map_err(|e| decode(op, e))
    }

    fn fetch_results(&self, job_id: &str) -> Result<Vec<JobListing>, ClientError> {
        let op = Operation::Results;
        let response = self
            .client
            .get(self.endpoint(&format!("results/{}", job_id)))
            .send()
            .map_err(|e| transport(op, e))?;

        let status = response.status();
        // The backend answers 202 while the workflow is still running.
        if !status.is_success() || status == StatusCode::ACCEPTED {
            let detail = response.text().unwrap_or_default();
            return Err(ClientError::Results {
                status: status.as_u16(),
                detail,
            });
        }

        let body: ResultsResponse = response.json().map_err(|e| decode(op, e))?;
        Ok(body.jobs.unwrap_or_default())
    }
}

fn file_part(file: &UploadFile) -> Part {
    Part::bytes(file.bytes.clone()).file_name(file.file_name.clone())
}

fn transport(op: Operation, err: reqwest::Error) -> ClientError {
    ClientError::Transport {
        op,
        message: err.to_string(),
    }
}

fn decode(op: Operation, err: reqwest::Error) -> ClientError {
    ClientError::Decode {
        op,
        message: err.to_string(),
    }
}
