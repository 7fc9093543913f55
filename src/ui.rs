use anyhow::Result;
use chrono::FixedOffset;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use division_admin::export::format_datetime;
use division_admin::hierarchy::{build_forest, PanchayathGroup, RowKind, TreeRow, TreeView};
use division_admin::stats::{fetch_admin_stats, AdminStats, LoadState, StatsTracker};
use division_admin::{DataStore, RequestContext};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use tokio::runtime::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    AgentTree,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Dashboard => Page::AgentTree,
            Page::AgentTree => Page::Dashboard,
        }
    }

    pub fn previous(&self) -> Self {
        // Two pages: previous is next
        self.next()
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::AgentTree => "Agent Hierarchy",
        }
    }
}

pub struct App {
    store: Arc<dyn DataStore>,
    ctx: RequestContext,
    runtime: Handle,
    pub offset: FixedOffset,
    pub stats: StatsTracker<AdminStats>,
    pub forest: Vec<PanchayathGroup>,
    pub tree: TreeView,
    pub tree_state: TableState,
    pub current_page: Page,
    pub message: Option<String>,
}

impl App {
    pub fn new(store: Arc<dyn DataStore>, ctx: RequestContext, runtime: Handle, offset: FixedOffset) -> Self {
        Self {
            store,
            ctx,
            runtime,
            offset,
            stats: StatsTracker::new(),
            forest: Vec::new(),
            tree: TreeView::new(),
            tree_state: TableState::default(),
            current_page: Page::Dashboard,
            message: None,
        }
    }

    /// Reload stats and the agent forest
    pub fn refresh(&mut self) {
        self.runtime
            .block_on(self.stats.refresh(fetch_admin_stats(self.store.as_ref(), &self.ctx)));

        match self.runtime.block_on(self.store.agents()) {
            Ok(agents) => {
                self.forest = build_forest(&agents);
                self.message = Some(format!("Loaded {} agents", agents.len()));
            }
            Err(e) => self.message = Some(format!("Failed to load agents: {}", e)),
        }

        let len = self.tree_rows().len();
        match self.tree_state.selected() {
            _ if len == 0 => self.tree_state.select(None),
            Some(i) if i >= len => self.tree_state.select(Some(len - 1)),
            None => self.tree_state.select(Some(0)),
            _ => {}
        }
    }

    pub fn tree_rows(&self) -> Vec<TreeRow> {
        self.tree.rows(&self.forest)
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    /// Expand or collapse the selected row
    pub fn toggle_selected(&mut self) {
        let rows = self.tree_rows();
        if let Some(row) = self.tree_state.selected().and_then(|i| rows.get(i)) {
            if row.has_children {
                self.tree.toggle(&row.key);
            }
        }
    }

    pub fn collapse_all(&mut self) {
        self.tree.collapse_all(&self.forest);
        self.tree_state.select(Some(0));
    }

    pub fn expand_all(&mut self) {
        self.tree.expand_all();
    }

    pub fn next(&mut self) {
        let len = self.tree_rows().len();
        if len == 0 {
            return;
        }
        let i = match self.tree_state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.tree_state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.tree_rows().len();
        if len == 0 {
            return;
        }
        let i = match self.tree_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.tree_state.select(Some(i));
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    app.refresh();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('r') => app.refresh(),
                KeyCode::Enter | KeyCode::Char(' ') if app.current_page == Page::AgentTree => {
                    app.toggle_selected()
                }
                KeyCode::Char('c') if app.current_page == Page::AgentTree => app.collapse_all(),
                KeyCode::Char('e') if app.current_page == Page::AgentTree => app.expand_all(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Dashboard => render_dashboard(f, chunks[1], app),
        Page::AgentTree => render_tree(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Dashboard, Page::AgentTree].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        app.ctx.role.label().to_string(),
        Style::default().fg(Color::White),
    ));
    if let Some(division) = &app.ctx.division_id {
        tab_spans.push(Span::raw("  "));
        tab_spans.push(Span::styled(division.clone(), Style::default().fg(Color::Cyan)));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&str]) -> Row<'static> {
    let cells: Vec<Cell> = titles
        .iter()
        .map(|h| {
            Cell::from(h.to_string()).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        })
        .collect();
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn bordered(title: &str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(format!(" {} ", title))
}

fn render_dashboard(f: &mut Frame, area: Rect, app: &App) {
    let stats = match app.stats.snapshot() {
        LoadState::Loading => {
            f.render_widget(Paragraph::new("Loading dashboard...").block(bordered("Dashboard")), area);
            return;
        }
        LoadState::Failed(error) => {
            let text = Paragraph::new(Span::styled(
                format!("Failed to load stats: {}", error),
                Style::default().fg(Color::Red),
            ))
            .block(bordered("Dashboard"));
            f.render_widget(text, area);
            return;
        }
        LoadState::Ready(stats) => stats,
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Percentage(55), Constraint::Min(0)])
        .split(area);

    let summary = Line::from(vec![
        Span::styled("Programs ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{} ({} active)", stats.total_programs, stats.active_programs),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled("Registrations ", Style::default().fg(Color::DarkGray)),
        Span::styled(stats.total_registrations.to_string(), Style::default().fg(Color::Green)),
        Span::raw("   "),
        Span::styled("Members ", Style::default().fg(Color::DarkGray)),
        Span::styled(stats.total_members.to_string(), Style::default().fg(Color::Cyan)),
    ]);
    f.render_widget(Paragraph::new(summary).block(bordered("Summary")), chunks[0]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    let panchayath_rows = stats.panchayath_stats.iter().map(|p| {
        Row::new(vec![
            Cell::from(truncate(&p.name, 28)),
            Cell::from(p.registrations.to_string()).style(Style::default().fg(Color::Green)),
            Cell::from(p.programs.to_string()),
        ])
    });
    let panchayaths = Table::new(
        panchayath_rows,
        [Constraint::Min(20), Constraint::Length(14), Constraint::Length(10)],
    )
    .header(header_row(&["Panchayath", "Registrations", "Programs"]))
    .block(bordered("Panchayaths"));
    f.render_widget(panchayaths, middle[0]);

    let cluster_rows = stats.cluster_stats.iter().map(|c| {
        Row::new(vec![
            Cell::from(truncate(&c.name, 24)),
            Cell::from(truncate(&c.panchayath_name, 20)),
            Cell::from(c.members.to_string()).style(Style::default().fg(Color::Cyan)),
        ])
    });
    let clusters = Table::new(
        cluster_rows,
        [Constraint::Min(16), Constraint::Length(22), Constraint::Length(9)],
    )
    .header(header_row(&["Cluster", "Panchayath", "Members"]))
    .block(bordered("Clusters"));
    f.render_widget(clusters, middle[1]);

    let recent_rows = stats.recent_registrations.iter().map(|r| {
        Row::new(vec![
            Cell::from(format_datetime(&r.created_at, &app.offset)),
            Cell::from(truncate(&r.registrant_name, 28)),
            Cell::from(truncate(&r.program_name, 40)),
        ])
    });
    let recent = Table::new(
        recent_rows,
        [Constraint::Length(24), Constraint::Length(30), Constraint::Min(20)],
    )
    .header(header_row(&["When", "Name", "Program"]))
    .block(bordered("Recent Registrations"));
    f.render_widget(recent, chunks[2]);
}

fn render_tree(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.tree_rows();

    let table_rows = rows.iter().map(|row| {
        let marker = match (row.has_children, row.expanded) {
            (false, _) => "  ",
            (true, true) => "▾ ",
            (true, false) => "▸ ",
        };
        let label = format!("{}{}{}", "  ".repeat(row.depth), marker, row.label);

        let (label_style, role, detail) = match &row.kind {
            RowKind::Panchayath { agent_count } => (
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                String::new(),
                format!("{} agents", agent_count),
            ),
            RowKind::Agent { role, mobile, .. } => (
                Style::default().fg(Color::White),
                role.label().to_string(),
                mobile.clone(),
            ),
        };

        Row::new(vec![
            Cell::from(label).style(label_style),
            Cell::from(role).style(Style::default().fg(Color::Yellow)),
            Cell::from(detail),
            Cell::from(row.ward_tag().unwrap_or_default()),
            Cell::from(row.customers.map(|c| c.to_string()).unwrap_or_default())
                .style(Style::default().fg(Color::Green)),
        ])
    });

    let table = Table::new(
        table_rows,
        [
            Constraint::Min(30),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(6),
            Constraint::Length(10),
        ],
    )
    .header(header_row(&["Agent", "Role", "Mobile", "Ward", "Customers"]))
    .block(bordered("Agents"))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.tree_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    if let Some(message) = &app.message {
        status_spans.push(Span::styled(format!(" {} ", message), Style::default().fg(Color::Cyan)));
        status_spans.push(Span::raw(" | "));
    }

    if app.current_page == Page::AgentTree {
        status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Toggle | "));
        status_spans.push(Span::styled("c/e", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Collapse/Expand all | "));
        status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Nav | "));
    }
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Refresh | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
