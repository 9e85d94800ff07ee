use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

use crate::models::{JobListing, SectionSuggestion};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ViewKind {
    #[default]
    All,
    Saved,
    Applied,
}

impl ViewKind {
    pub fn title(&self) -> &'static str {
        match self {
            ViewKind::All => "All Jobs",
            ViewKind::Saved => "Saved",
            ViewKind::Applied => "Applied",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            ViewKind::All => ViewKind::Saved,
            ViewKind::Saved => ViewKind::Applied,
            ViewKind::Applied => ViewKind::All,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    #[default]
    Relevance,
    Recent,
}

impl SortKey {
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::Relevance => "relevance",
            SortKey::Recent => "most recent",
        }
    }

    pub fn toggle(&self) -> Self {
        match self {
            SortKey::Relevance => SortKey::Recent,
            SortKey::Recent => SortKey::Relevance,
        }
    }
}

pub fn matches_query(job: &JobListing, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    needle.is_empty()
        || job.title.to_lowercase().contains(&needle)
        || job.company.to_lowercase().contains(&needle)
}

/// Stable sort. Recency compares `posted_at` lexically, newest first, with
/// missing timestamps after every present one.
pub fn sort_jobs(jobs: &mut [&JobListing], key: SortKey) {
    match key {
        SortKey::Relevance => {
            jobs.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        }
        SortKey::Recent => jobs.sort_by(|a, b| compare_posted(a, b)),
    }
}

fn compare_posted(a: &JobListing, b: &JobListing) -> Ordering {
    let a = a.posted_at.as_deref().filter(|s| !s.is_empty());
    let b = b.posted_at.as_deref().filter(|s| !s.is_empty());
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// The listings a view shows. Query and sort apply to the all-jobs view;
/// saved and applied views are plain filters in synchronized order.
pub fn select<'a>(
    jobs: &'a [JobListing],
    view: ViewKind,
    query: &str,
    sort: SortKey,
) -> Vec<&'a JobListing> {
    match view {
        ViewKind::All => {
            let mut shown: Vec<&JobListing> =
                jobs.iter().filter(|j| matches_query(j, query)).collect();
            sort_jobs(&mut shown, sort);
            shown
        }
        ViewKind::Saved => jobs.iter().filter(|j| j.saved).collect(),
        ViewKind::Applied => jobs.iter().filter(|j| j.applied).collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    NoAnalysis,
    /// An analysis ran but produced nothing (or results are unavailable).
    NoResults,
    NoMatches,
    NothingSaved,
    NothingApplied,
}

impl EmptyState {
    pub fn message(&self) -> &'static str {
        match self {
            EmptyState::NoAnalysis => {
                "No analysis yet. Run `joblens analyze --resume <file>` to find matching jobs."
            }
            EmptyState::NoResults => {
                "No jobs to show yet. The agent may still need to run; try `joblens watch` or launch a new analysis."
            }
            EmptyState::NoMatches => "No jobs match your search. Try a different title or company.",
            EmptyState::NothingSaved => "No saved jobs yet. Save listings from the All Jobs view to keep them here.",
            EmptyState::NothingApplied => {
                "You haven't applied anywhere yet. Mark a listing as applied to track it here."
            }
        }
    }
}

pub fn empty_state(has_job: bool, total: usize, shown: usize, view: ViewKind) -> Option<EmptyState> {
    if shown > 0 {
        return None;
    }
    if !has_job {
        return Some(EmptyState::NoAnalysis);
    }
    if total == 0 {
        return Some(EmptyState::NoResults);
    }
    Some(match view {
        ViewKind::All => EmptyState::NoMatches,
        ViewKind::Saved => EmptyState::NothingSaved,
        ViewKind::Applied => EmptyState::NothingApplied,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummarySections {
    pub overview: Option<String>,
    pub working: Option<String>,
    pub not_working: Option<String>,
}

fn section_label() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    LABEL.get_or_init(|| {
        Regex::new(r"(?i)[*_#\s]*\bwhat\s+is\s+(not\s+)?working[*_\s]*:?[*_]*")
            .expect("section label regex is valid")
    })
}

/// Splits a relevance summary into its "What is working" and "What is not
/// working" subsections. Text before the first label is the overview; a
/// summary without labels is all overview.
pub fn summary_sections(summary: &str) -> SummarySections {
    let mut sections = SummarySections::default();
    let mut cursor = 0;
    let mut current: Option<bool> = None;

    for caps in section_label().captures_iter(summary) {
        let Some(whole) = caps.get(0) else { continue };
        store_section(&mut sections, current, &summary[cursor..whole.start()]);
        current = Some(caps.get(1).is_some());
        cursor = whole.end();
    }
    store_section(&mut sections, current, &summary[cursor..]);
    sections
}

fn store_section(sections: &mut SummarySections, kind: Option<bool>, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    let slot = match kind {
        None => &mut sections.overview,
        Some(false) => &mut sections.working,
        Some(true) => &mut sections.not_working,
    };
    *slot = Some(text.to_string());
}

pub enum Suggestions<'a> {
    BySection(&'a [SectionSuggestion]),
    Plain(&'a [String]),
    None,
}

/// Section-based suggestions take precedence over plain bullets.
pub fn suggestions(job: &JobListing) -> Suggestions<'_> {
    match job.bullet_suggestions_by_section.as_deref() {
        Some(by_section) if !by_section.is_empty() => Suggestions::BySection(by_section),
        _ if !job.bullet_suggestions.is_empty() => Suggestions::Plain(&job.bullet_suggestions),
        _ => Suggestions::None,
    }
}
