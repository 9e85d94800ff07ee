use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A matched job listing as returned by `GET /results/{job_id}`.
///
/// `saved` and `applied` are client-only flags; the backend always sends
/// them as `false` and the synchronizer overlays the persisted values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListing {
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub company: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub location: String,
    #[serde(rename = "type", default, deserialize_with = "nullable_string")]
    pub job_type: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub salary: String,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default, deserialize_with = "nullable_string")]
    pub posted_date: String,
    #[serde(rename = "posted_at", default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<String>,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub bullet_suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullet_suggestions_by_section: Option<Vec<SectionSuggestion>>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub suggested_projects: Vec<ProjectSuggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub future_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvement_potential: Option<f64>,
    #[serde(default)]
    pub saved: bool,
    #[serde(default)]
    pub applied: bool,
}

impl JobListing {
    pub fn flags(&self) -> JobFlags {
        JobFlags {
            saved: self.saved,
            applied: self.applied,
        }
    }

    pub fn apply_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSuggestion {
    pub section: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSuggestion {
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub title: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, deserialize_with = "nullable_string")]
    pub estimated_time: String,
    #[serde(default)]
    pub score_boost: i64,
    #[serde(default, deserialize_with = "nullable_string")]
    pub brief: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub explanation: String,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub tech_stack: Vec<String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

/// Overall run status reported by `GET /status/{job_id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
    /// Anything the backend reports that we don't recognise; not terminal.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: RunStatus,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub steps: Vec<AgentStep>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFlags {
    #[serde(default)]
    pub saved: bool,
    #[serde(default)]
    pub applied: bool,
}

pub type FlagsRecord = BTreeMap<String, JobFlags>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum JobType {
    #[default]
    #[value(name = "full_time")]
    FullTime,
    #[value(name = "internship")]
    Internship,
    #[value(name = "both")]
    Both,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FullTime => "full_time",
            JobType::Internship => "internship",
            JobType::Both => "both",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self { file_name, bytes })
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_listing_from_backend_shape() {
        let raw = r#"{
            "id": "1",
            "title": "Backend Engineer",
            "company": "Acme",
            "location": "Remote",
            "type": "Full-time",
            "salary": null,
            "relevanceScore": 91,
            "postedDate": "2 days ago",
            "posted_at": "2026-10-17T09:00:00",
            "description": "Build things",
            "relevanceSummary": null,
            "url": "https://example.com/apply",
            "source": "linkedin",
            "bulletSuggestions": ["Quantify impact"],
            "suggestedProjects": [{
                "id": "p1_0",
                "title": "Queue service",
                "difficulty": "Advanced",
                "estimatedTime": "2 weeks",
                "scoreBoost": 3,
                "brief": "A durable queue",
                "explanation": "Shows systems depth",
                "techStack": ["Rust", "Postgres"],
                "steps": ["Design schema", "Write worker"]
            }],
            "futureScore": 95,
            "improvementPotential": 4,
            "saved": false,
            "applied": false,
            "bulletSuggestionsBySection": [{"section": "Experience", "suggestion": "Lead with metrics"}]
        }"#;

        let job: JobListing = serde_json::from_str(raw).unwrap();
        assert_eq!(job.id, "1");
        assert_eq!(job.job_type, "Full-time");
        assert_eq!(job.salary, "");
        assert_eq!(job.relevance_score, 91.0);
        assert_eq!(job.posted_at.as_deref(), Some("2026-10-17T09:00:00"));
        assert!(job.relevance_summary.is_none());
        assert_eq!(job.suggested_projects[0].difficulty, Difficulty::Advanced);
        assert_eq!(job.suggested_projects[0].steps.len(), 2);
        assert_eq!(
            job.bullet_suggestions_by_section.as_ref().map(Vec::len),
            Some(1)
        );
        assert_eq!(job.apply_url(), Some("https://example.com/apply"));
    }

    #[test]
    fn test_job_listing_minimal_defaults_flags_to_false() {
        let job: JobListing = serde_json::from_str(r#"{"id": "7"}"#).unwrap();
        assert!(!job.saved);
        assert!(!job.applied);
        assert!(job.bullet_suggestions.is_empty());
        assert!(job.apply_url().is_none());
    }

    #[test]
    fn test_empty_url_is_not_an_apply_link() {
        let job: JobListing = serde_json::from_str(r#"{"id": "7", "url": "  "}"#).unwrap();
        assert!(job.apply_url().is_none());
    }

    #[test]
    fn test_status_report_unknown_status_is_other() {
        let report: StatusReport =
            serde_json::from_str(r#"{"status": "queued", "steps": null}"#).unwrap();
        assert_eq!(report.status, RunStatus::Other);
        assert!(report.steps.is_empty());
    }

    #[test]
    fn test_agent_step_decodes_pipeline_entry() {
        let raw = r#"{
            "id": "1",
            "name": "Job Acquisition Agent",
            "description": "Scraping and scoring",
            "status": "running",
            "duration": null,
            "logs": ["Searching", "Scoring 12 jobs"]
        }"#;
        let step: AgentStep = serde_json::from_str(raw).unwrap();
        assert_eq!(step.status, StepStatus::Running);
        assert_eq!(step.logs, vec!["Searching", "Scoring 12 jobs"]);
    }

    #[test]
    fn test_job_type_wire_names() {
        assert_eq!(JobType::FullTime.as_str(), "full_time");
        assert_eq!(JobType::Internship.as_str(), "internship");
        assert_eq!(JobType::Both.as_str(), "both");
    }

    #[test]
    fn test_upload_file_from_missing_path_fails() {
        let result = UploadFile::from_path(Path::new("/definitely/not/here.pdf"));
        assert!(result.is_err());
    }
}
