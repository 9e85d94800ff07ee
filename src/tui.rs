use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use std::io::stdout;

use crate::client::JobBackend;
use crate::db::Database;
use crate::models::JobListing;
use crate::sync::JobSynchronizer;
use crate::views::{self, SortKey, Suggestions, ViewKind};

struct AppState<'a> {
    db: &'a Database,
    backend: &'a dyn JobBackend,
    view: ViewKind,
    sync: JobSynchronizer<'a>,
    query: String,
    editing_query: bool,
    sort: SortKey,
    selected: usize,
    scroll_offset: u16,
    message: Option<String>,
}

impl<'a> AppState<'a> {
    fn new(db: &'a Database, backend: &'a dyn JobBackend, view: ViewKind) -> Self {
        Self {
            db,
            backend,
            view,
            sync: JobSynchronizer::activate(db, backend),
            query: String::new(),
            editing_query: false,
            sort: SortKey::default(),
            selected: 0,
            scroll_offset: 0,
            message: None,
        }
    }

    fn shown(&self) -> Vec<&JobListing> {
        views::select(self.sync.jobs(), self.view, &self.query, self.sort)
    }

    fn current_id(&self) -> Option<String> {
        self.shown().get(self.selected).map(|j| j.id.clone())
    }

    /// Each tab is its own mount: a fresh synchronizer over the shared store.
    fn switch_view(&mut self, view: ViewKind) {
        self.view = view;
        self.sync = JobSynchronizer::activate(self.db, self.backend);
        self.selected = 0;
        self.scroll_offset = 0;
    }

    fn clamp_selection(&mut self) {
        let len = self.shown().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn next(&mut self) {
        let len = self.shown().len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn toggle_save(&mut self) {
        let Some(id) = self.current_id() else { return };
        self.message = match self.sync.toggle_save(&id) {
            Ok(_) => None,
            Err(e) => Some(format!("Could not save: {}", e)),
        };
        self.clamp_selection();
    }

    fn mark_applied(&mut self) {
        let Some(id) = self.current_id() else { return };
        self.message = match self.sync.mark_applied(&id) {
            Ok(_) => None,
            Err(e) => Some(format!("Could not mark applied: {}", e)),
        };
        self.clamp_selection();
    }
}

pub fn run_dashboard(db: &Database, backend: &dyn JobBackend, view: ViewKind) -> Result<()> {
    let mut state = AppState::new(db, backend, view);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState<'_>,
) -> Result<()> {
    let mut list_state = ListState::default();

    loop {
        list_state.select(if state.shown().is_empty() {
            None
        } else {
            Some(state.selected)
        });
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if state.editing_query {
            match key.code {
                KeyCode::Enter | KeyCode::Esc => state.editing_query = false,
                KeyCode::Backspace => {
                    state.query.pop();
                    state.selected = 0;
                }
                KeyCode::Char(c) => {
                    state.query.push(c);
                    state.selected = 0;
                }
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Down | KeyCode::Char('j') => state.next(),
            KeyCode::Up | KeyCode::Char('k') => state.prev(),
            KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
            KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
            KeyCode::Tab => state.switch_view(state.view.next()),
            KeyCode::Char('1') => state.switch_view(ViewKind::All),
            KeyCode::Char('2') => state.switch_view(ViewKind::Saved),
            KeyCode::Char('3') => state.switch_view(ViewKind::Applied),
            KeyCode::Char('/') if state.view == ViewKind::All => state.editing_query = true,
            KeyCode::Char('o') if state.view == ViewKind::All => {
                state.sort = state.sort.toggle();
                state.selected = 0;
            }
            KeyCode::Char('s') => state.toggle_save(),
            KeyCode::Char('a') => state.mark_applied(),
            _ => {}
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, state: &AppState<'_>, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let tab_titles: Vec<&str> = [ViewKind::All, ViewKind::Saved, ViewKind::Applied]
        .iter()
        .map(ViewKind::title)
        .collect();
    let selected_tab = match state.view {
        ViewKind::All => 0,
        ViewKind::Saved => 1,
        ViewKind::Applied => 2,
    };
    let tabs = Tabs::new(tab_titles)
        .block(Block::default().borders(Borders::ALL).title(" JobLens "))
        .select(selected_tab)
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    let shown = state.shown();
    let empty = views::empty_state(
        state.sync.has_job(),
        state.sync.jobs().len(),
        shown.len(),
        state.view,
    );

    // Left panel: job list
    let mut list_title = format!(" {} ({}) ", state.view.title(), shown.len());
    if state.view == ViewKind::All {
        list_title.push_str(&format!("[sort: {}] ", state.sort.label()));
        if !state.query.is_empty() || state.editing_query {
            list_title.push_str(&format!("[/{}] ", state.query));
        }
    }

    if let Some(empty) = empty {
        let placeholder = Paragraph::new(empty.message())
            .block(Block::default().borders(Borders::ALL).title(list_title))
            .style(Style::default().fg(Color::DarkGray))
            .wrap(Wrap { trim: true });
        frame.render_widget(placeholder, chunks[0]);
    } else {
        let items: Vec<ListItem> = shown
            .iter()
            .map(|job| {
                let saved_icon = if job.saved { "*" } else { " " };
                let applied_icon = if job.applied { "+" } else { " " };
                let title = truncate(&job.title, 32);
                ListItem::new(format!(
                    "{}{} {:>3.0} {} | {}",
                    saved_icon, applied_icon, job.relevance_score, title, job.company
                ))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(list_title))
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
            .highlight_symbol("> ");

        frame.render_stateful_widget(list, chunks[0], list_state);
    }

    // Right panel: job detail
    let detail = match shown.get(state.selected) {
        Some(job) => build_detail(job),
        None => Text::raw(""),
    };
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(detail_widget, chunks[1]);

    // Footer help
    let help = match (&state.message, state.editing_query) {
        (Some(message), _) => message.clone(),
        (None, true) => " type to filter by title or company  enter/esc:done".to_string(),
        (None, false) => {
            " tab/1-3:view  j/k:navigate  J/K:scroll  /:filter  o:sort  s:save  a:applied  q:quit"
                .to_string()
        }
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        rows[2],
    );
}

fn heading(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    ))
}

fn wrapped(lines: &mut Vec<Line<'static>>, text: &str, indent: &str) {
    for line in textwrap::fill(text, 70).lines() {
        lines.push(Line::from(format!("{}{}", indent, line)));
    }
}

/// "Posted: 3 days ago via LinkedIn", either half optional.
pub fn posted_line(job: &JobListing) -> Option<String> {
    let source = job.source.as_deref().filter(|s| !s.trim().is_empty());
    match (job.posted_date.is_empty(), source) {
        (true, None) => None,
        (true, Some(source)) => Some(format!("Found via {}", source)),
        (false, None) => Some(format!("Posted: {}", job.posted_date)),
        (false, Some(source)) => Some(format!("Posted: {} via {}", job.posted_date, source)),
    }
}

fn build_detail(job: &JobListing) -> Text<'static> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    // Header
    lines.push(heading(&job.title));
    lines.push(Line::from(format!("at {}", job.company)));
    let meta: Vec<&str> = [job.location.as_str(), job.job_type.as_str(), job.salary.as_str()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
    if !meta.is_empty() {
        lines.push(Line::from(meta.join(" | ")));
    }

    let score_style = match job.relevance_score {
        s if s >= 85.0 => Style::default().fg(Color::Green),
        s if s >= 70.0 => Style::default().fg(Color::Yellow),
        _ => Style::default().fg(Color::Red),
    };
    let mut score = format!("Match: {:.0}", job.relevance_score);
    match (job.future_score, job.improvement_potential) {
        (Some(future), Some(gain)) => {
            score.push_str(&format!(" (up to {:.0} with projects, +{:.0})", future, gain))
        }
        (Some(future), None) => score.push_str(&format!(" (up to {:.0} with projects)", future)),
        _ => {}
    }
    lines.push(Line::from(Span::styled(score, score_style)));

    if let Some(posted) = posted_line(job) {
        lines.push(Line::from(posted));
    }
    let mut flags = Vec::new();
    if job.saved {
        flags.push("saved");
    }
    if job.applied {
        flags.push("applied");
    }
    if !flags.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("Status: {}", flags.join(", ")),
            Style::default().fg(Color::Cyan),
        )));
    }
    if let Some(url) = job.apply_url() {
        lines.push(Line::from(format!("Apply: {}", url)));
    }
    lines.push(Line::from(""));

    if let Some(summary) = job.relevance_summary.as_deref() {
        let sections = views::summary_sections(summary);
        lines.push(heading("WHY IT MATCHES"));
        if let Some(overview) = &sections.overview {
            wrapped(&mut lines, overview, "  ");
        }
        if let Some(working) = &sections.working {
            lines.push(Line::from(Span::styled("  What is working", Style::default().fg(Color::Green))));
            wrapped(&mut lines, working, "    ");
        }
        if let Some(not_working) = &sections.not_working {
            lines.push(Line::from(Span::styled(
                "  What is not working",
                Style::default().fg(Color::Red),
            )));
            wrapped(&mut lines, not_working, "    ");
        }
        lines.push(Line::from(""));
    }

    match views::suggestions(job) {
        Suggestions::BySection(items) => {
            lines.push(heading("RESUME SUGGESTIONS"));
            for item in items {
                lines.push(Line::from(Span::styled(
                    format!("  [{}]", item.section),
                    Style::default().fg(Color::Cyan),
                )));
                wrapped(&mut lines, &item.suggestion, "    ");
            }
            lines.push(Line::from(""));
        }
        Suggestions::Plain(items) => {
            lines.push(heading("RESUME SUGGESTIONS"));
            for item in items {
                wrapped(&mut lines, &format!("- {}", item), "  ");
            }
            lines.push(Line::from(""));
        }
        Suggestions::None => {}
    }

    if !job.suggested_projects.is_empty() {
        lines.push(heading("SUGGESTED PROJECTS"));
        for project in &job.suggested_projects {
            lines.push(Line::from(Span::styled(
                format!(
                    "  {} ({}, {}, +{})",
                    project.title,
                    project.difficulty.as_str(),
                    project.estimated_time,
                    project.score_boost
                ),
                Style::default().fg(Color::Cyan),
            )));
            if !project.brief.is_empty() {
                wrapped(&mut lines, &project.brief, "    ");
            }
            if !project.tech_stack.is_empty() {
                lines.push(Line::from(format!("    Stack: {}", project.tech_stack.join(", "))));
            }
            for (i, step) in project.steps.iter().enumerate() {
                wrapped(&mut lines, &format!("{}. {}", i + 1, step), "    ");
            }
        }
        lines.push(Line::from(""));
    }

    if !job.description.is_empty() {
        lines.push(heading("DESCRIPTION"));
        wrapped(&mut lines, &job.description, "  ");
    }

    Text::from(lines)
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
