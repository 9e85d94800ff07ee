mod client;
mod config;
mod controller;
mod db;
mod logging;
mod models;
mod scheduler;
mod sync;
mod tui;
mod views;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::{JobBackend, RemoteJobClient};
use config::Config;
use controller::{AnalysisController, RunEvent, RunPhase, SESSION_LOST};
use db::Database;
use logging::LogConfig;
use models::{AgentStep, JobListing, JobType, StepStatus, UploadFile};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sync::JobSynchronizer;
use tui::truncate;
use views::{SortKey, Suggestions, ViewKind};

#[derive(Parser)]
#[command(name = "joblens")]
#[command(about = "Resume-driven job matching - run the agent, then review, save, and track listings")]
struct Cli {
    /// Backend base URL (overrides JOBLENS_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Directory for local state and logs (overrides JOBLENS_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a resume and run the matching agent
    Analyze {
        /// Resume file (PDF, DOCX, or text)
        #[arg(short, long)]
        resume: Option<PathBuf>,

        /// Optional cover letter file
        #[arg(short, long)]
        cover_letter: Option<PathBuf>,

        /// Kind of roles to search for
        #[arg(short, long, value_enum, default_value = "full_time")]
        job_type: JobType,

        /// Don't open the dashboard when the analysis completes
        #[arg(long)]
        no_browse: bool,
    },

    /// Resume polling the active analysis
    Watch {
        /// Don't open the dashboard when the analysis completes
        #[arg(long)]
        no_browse: bool,
    },

    /// Show the active analysis and local state
    Status,

    /// List job listings
    List {
        /// Which listings to show
        #[arg(long, value_enum, default_value = "all")]
        view: ViewKind,

        /// Filter by title or company (all view only)
        #[arg(short, long)]
        query: Option<String>,

        /// Sort order (all view only)
        #[arg(short, long, value_enum, default_value = "relevance")]
        sort: SortKey,
    },

    /// Show job listing details
    Show {
        /// Listing ID
        id: String,
    },

    /// Toggle the saved flag on a listing
    Save {
        /// Listing ID
        id: String,
    },

    /// Mark a listing as applied
    Apply {
        /// Listing ID
        id: String,
    },

    /// Open the interactive dashboard
    Browse {
        /// Tab to open on
        #[arg(long, value_enum, default_value = "all")]
        view: ViewKind,
    },

    /// Forget the active analysis and its cached results
    Reset,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().with_overrides(cli.api_url.clone(), cli.data_dir.clone());

    let tui_mode = match &cli.command {
        Commands::Browse { .. } => true,
        Commands::Analyze { no_browse, .. } | Commands::Watch { no_browse } => !no_browse,
        _ => false,
    };
    logging::init_logging(LogConfig {
        verbose: cli.verbose,
        tui_mode,
        data_dir: &config.data_dir,
    })?;

    let db = Database::open(&config.data_dir)?;
    let backend: Arc<dyn JobBackend> = Arc::new(RemoteJobClient::new(&config.api_url));
    tracing::debug!(api_url = %config.api_url, db = %db.path().display(), "Starting");

    match cli.command {
        Commands::Analyze {
            resume,
            cover_letter,
            job_type,
            no_browse,
        } => {
            let resume = resume.as_deref().map(UploadFile::from_path).transpose()?;
            let cover_letter = cover_letter
                .as_deref()
                .map(UploadFile::from_path)
                .transpose()?;

            let mut controller =
                AnalysisController::new(Arc::clone(&backend), &db, config.poll.clone());
            match controller.launch(resume, cover_letter, job_type)? {
                RunPhase::Polling => {}
                RunPhase::Failed => {
                    println!("Analysis failed: {}", controller.error().unwrap_or_default());
                    return Ok(());
                }
                _ => {
                    if let Some(notice) = controller.notice() {
                        println!("{}", notice);
                    }
                    return Ok(());
                }
            }

            println!(
                "Analysis started (job {}). Checking progress every {:.1}s...",
                controller.job_id().unwrap_or("?"),
                config.poll.interval.as_secs_f64()
            );
            if drive_run(&mut controller) && !no_browse {
                drop(controller);
                tui::run_dashboard(&db, backend.as_ref(), ViewKind::All)?;
            }
        }

        Commands::Watch { no_browse } => {
            let mut controller =
                AnalysisController::new(Arc::clone(&backend), &db, config.poll.clone());
            if !controller.resume_polling() {
                println!("No active analysis. Start one with: joblens analyze --resume <file>");
                return Ok(());
            }
            println!(
                "Watching job {}...",
                controller.job_id().unwrap_or("?")
            );
            if drive_run(&mut controller) && !no_browse {
                drop(controller);
                tui::run_dashboard(&db, backend.as_ref(), ViewKind::All)?;
            }
        }

        Commands::Status => {
            let Some(job_id) = db.active_job_id() else {
                println!("No active analysis.");
                return Ok(());
            };
            println!("Active job: {}", job_id);
            match db.load_cached_jobs(&job_id) {
                Some(jobs) => println!("Cached listings: {}", jobs.len()),
                None => println!("Cached listings: none"),
            }
            let flags = db.load_flags();
            println!(
                "Saved: {}  Applied: {}",
                flags.values().filter(|f| f.saved).count(),
                flags.values().filter(|f| f.applied).count()
            );

            match backend.poll_status(&job_id) {
                Ok(report) => {
                    println!("Backend status: {:?}", report.status);
                    for step in &report.steps {
                        println!("  {}", step_line(step));
                    }
                    if let Some(error) = &report.error {
                        println!("Error: {}", error);
                    }
                }
                Err(e) if e.is_not_found() => println!("{}", SESSION_LOST),
                Err(e) => println!("Backend unreachable: {}", e),
            }
        }

        Commands::List { view, query, sort } => {
            let sync = JobSynchronizer::activate(&db, backend.as_ref());
            tracing::debug!(source = ?sync.source(), job_id = ?sync.job_id(), "Listings loaded");
            let shown = views::select(sync.jobs(), view, query.as_deref().unwrap_or(""), sort);
            if let Some(empty) =
                views::empty_state(sync.has_job(), sync.jobs().len(), shown.len(), view)
            {
                println!("{}", empty.message());
            } else {
                println!(
                    "{:<6} {:>5} {:<5} {:<30} {:<20} {:<12}",
                    "ID", "SCORE", "FLAGS", "TITLE", "COMPANY", "POSTED"
                );
                println!("{}", "-".repeat(83));
                for job in shown {
                    println!(
                        "{:<6} {:>5.0} {:<5} {:<30} {:<20} {:<12}",
                        truncate(&job.id, 6),
                        job.relevance_score,
                        flag_marks(job),
                        truncate(&job.title, 28),
                        truncate(&job.company, 18),
                        truncate(&job.posted_date, 12)
                    );
                }
            }
        }

        Commands::Show { id } => {
            let sync = JobSynchronizer::activate(&db, backend.as_ref());
            match sync.get(&id) {
                Some(job) => print_job(job),
                None => println!("Job {} not found.", id),
            }
        }

        Commands::Save { id } => {
            let mut sync = JobSynchronizer::activate(&db, backend.as_ref());
            if sync.toggle_save(&id)? {
                let saved = sync.get(&id).is_some_and(|j| j.saved);
                println!(
                    "{} job {}.",
                    if saved { "Saved" } else { "Unsaved" },
                    id
                );
            } else {
                println!("Job {} not found.", id);
            }
        }

        Commands::Apply { id } => {
            let mut sync = JobSynchronizer::activate(&db, backend.as_ref());
            if sync.mark_applied(&id)? {
                println!("Marked job {} as applied.", id);
            } else {
                println!("Job {} not found.", id);
            }
        }

        Commands::Browse { view } => {
            tui::run_dashboard(&db, backend.as_ref(), view)?;
        }

        Commands::Reset => {
            let mut controller =
                AnalysisController::new(Arc::clone(&backend), &db, config.poll.clone());
            controller.reset()?;
            println!("Cleared the active analysis and cached results.");
        }
    }

    Ok(())
}

/// Prints progress until the run ends. True once the dashboard hand-off fires.
fn drive_run(controller: &mut AnalysisController<'_>) -> bool {
    let mut printer = ProgressPrinter::default();
    loop {
        match controller.wait_event(Duration::from_secs(1)) {
            Some(RunEvent::Progress) => printer.print(controller.steps()),
            Some(RunEvent::Completed) => {
                printer.print(controller.steps());
                println!("Analysis complete.");
            }
            Some(RunEvent::Failed(message)) => {
                printer.print(controller.steps());
                println!("Analysis failed: {}", message);
                return false;
            }
            Some(RunEvent::DashboardReady) => {
                tracing::debug!(phase = controller.phase().as_str(), "Handing over to the dashboard");
                return true;
            }
            None if !controller.is_polling() && controller.phase() != RunPhase::Completed => {
                return false;
            }
            None => {}
        }
    }
}

/// Prints each step status change and each new log line once.
#[derive(Default)]
struct ProgressPrinter {
    seen: HashMap<String, (StepStatus, usize)>,
}

impl ProgressPrinter {
    fn print(&mut self, steps: &[AgentStep]) {
        for step in steps {
            let (status, logged) = self
                .seen
                .entry(step.id.clone())
                .or_insert((StepStatus::Pending, 0));
            if *status != step.status {
                *status = step.status;
                println!("{}", step_line(step));
            }
            for line in step.logs.iter().skip(*logged) {
                println!("    {}", line);
            }
            *logged = step.logs.len().max(*logged);
        }
    }
}

fn step_line(step: &AgentStep) -> String {
    let icon = match step.status {
        StepStatus::Pending => " ",
        StepStatus::Running => "~",
        StepStatus::Completed => "+",
        StepStatus::Error => "x",
    };
    match &step.duration {
        Some(duration) => format!("[{}] {} ({})", icon, step.name, duration),
        None => format!("[{}] {}", icon, step.name),
    }
}

fn flag_marks(job: &JobListing) -> String {
    format!(
        "{}{}",
        if job.saved { "S" } else { "-" },
        if job.applied { "A" } else { "-" }
    )
}

fn print_job(job: &JobListing) {
    println!("Job {}", job.id);
    println!("Title: {}", job.title);
    println!("Company: {}", job.company);
    if !job.location.is_empty() {
        println!("Location: {}", job.location);
    }
    if !job.job_type.is_empty() {
        println!("Type: {}", job.job_type);
    }
    if !job.salary.is_empty() {
        println!("Salary: {}", job.salary);
    }
    println!("Match: {:.0}", job.relevance_score);
    if let Some(future) = job.future_score {
        println!("Match with projects: {:.0}", future);
    }
    if let Some(gain) = job.improvement_potential {
        println!("Improvement potential: +{:.0}", gain);
    }
    if let Some(posted) = tui::posted_line(job) {
        println!("{}", posted);
    }
    println!("Saved: {}  Applied: {}", job.saved, job.applied);
    if let Some(url) = job.apply_url() {
        println!("Apply: {}", url);
    }

    if let Some(summary) = job.relevance_summary.as_deref() {
        let sections = views::summary_sections(summary);
        println!("\n--- Why it matches ---");
        if let Some(overview) = &sections.overview {
            println!("{}", textwrap::fill(overview, 80));
        }
        if let Some(working) = &sections.working {
            println!("\nWhat is working:\n{}", textwrap::indent(&textwrap::fill(working, 76), "  "));
        }
        if let Some(not_working) = &sections.not_working {
            println!(
                "\nWhat is not working:\n{}",
                textwrap::indent(&textwrap::fill(not_working, 76), "  ")
            );
        }
    }

    match views::suggestions(job) {
        Suggestions::BySection(items) => {
            println!("\n--- Resume suggestions ---");
            for item in items {
                println!("[{}] {}", item.section, item.suggestion);
            }
        }
        Suggestions::Plain(items) => {
            println!("\n--- Resume suggestions ---");
            for item in items {
                println!("- {}", item);
            }
        }
        Suggestions::None => {}
    }

    if !job.suggested_projects.is_empty() {
        println!("\n--- Suggested projects ---");
        for project in &job.suggested_projects {
            println!(
                "{} ({}, {}, +{} points)",
                project.title,
                project.difficulty.as_str(),
                project.estimated_time,
                project.score_boost
            );
            if !project.brief.is_empty() {
                println!("  {}", project.brief);
            }
            if !project.explanation.is_empty() {
                println!("  Why: {}", project.explanation);
            }
            if !project.tech_stack.is_empty() {
                println!("  Stack: {}", project.tech_stack.join(", "));
            }
            for (i, step) in project.steps.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
        }
    }

    if !job.description.is_empty() {
        println!("\n--- Description ---\n{}", job.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{listing, step};

    #[test]
    fn test_cli_parses_analyze_without_resume() {
        let cli = Cli::try_parse_from(["joblens", "analyze", "--job-type", "internship"]).unwrap();
        match cli.command {
            Commands::Analyze {
                resume, job_type, ..
            } => {
                assert!(resume.is_none());
                assert_eq!(job_type, JobType::Internship);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_cli_parses_list_options() {
        let cli = Cli::try_parse_from([
            "joblens", "list", "--view", "saved", "--sort", "recent", "-q", "rust",
        ])
        .unwrap();
        match cli.command {
            Commands::List { view, query, sort } => {
                assert_eq!(view, ViewKind::Saved);
                assert_eq!(sort, SortKey::Recent);
                assert_eq!(query.as_deref(), Some("rust"));
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_job_type() {
        assert!(Cli::try_parse_from(["joblens", "analyze", "--job-type", "contract"]).is_err());
    }

    #[test]
    fn test_step_line_includes_duration() {
        let mut done = step("1", StepStatus::Completed);
        done.duration = Some("12.3s".to_string());
        assert_eq!(step_line(&done), "[+] Step 1 (12.3s)");
        assert_eq!(step_line(&step("2", StepStatus::Running)), "[~] Step 2");
    }

    #[test]
    fn test_progress_printer_tracks_new_logs() {
        let mut printer = ProgressPrinter::default();
        let mut running = step("1", StepStatus::Running);
        running.logs = vec!["a".to_string()];
        printer.print(std::slice::from_ref(&running));
        running.logs.push("b".to_string());
        printer.print(std::slice::from_ref(&running));

        assert_eq!(printer.seen["1"], (StepStatus::Running, 2));
    }

    #[test]
    fn test_flag_marks() {
        let mut job = listing("1", 50.0);
        assert_eq!(flag_marks(&job), "--");
        job.saved = true;
        job.applied = true;
        assert_eq!(flag_marks(&job), "SA");
    }
}
