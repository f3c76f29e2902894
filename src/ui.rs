use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use poker_streaks::{AuditEvent, PlayerStreakRecord, ReferralRecord, StreakStatus};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Leaderboard,
    Referrals,
    Activity,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Leaderboard => Page::Referrals,
            Page::Referrals => Page::Activity,
            Page::Activity => Page::Leaderboard,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Leaderboard => Page::Activity,
            Page::Referrals => Page::Leaderboard,
            Page::Activity => Page::Referrals,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Leaderboard => "Leaderboard",
            Page::Referrals => "Referrals",
            Page::Activity => "Activity",
        }
    }
}

pub struct App {
    /// Sorted longest current streak first
    pub players: Vec<PlayerStreakRecord>,
    pub referrals: Vec<ReferralRecord>,
    pub events: Vec<AuditEvent>,
    pub milestone: u64,
    pub state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
}

impl App {
    pub fn new(
        players: Vec<PlayerStreakRecord>,
        referrals: Vec<ReferralRecord>,
        events: Vec<AuditEvent>,
        milestone: u64,
    ) -> Self {
        let mut state = TableState::default();
        if !players.is_empty() {
            state.select(Some(0));
        }

        Self {
            players,
            referrals,
            events,
            milestone,
            state,
            current_page: Page::Leaderboard,
            show_detail: false,
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_player(&self) -> Option<&PlayerStreakRecord> {
        if self.current_page != Page::Leaderboard {
            return None;
        }
        self.state.selected().and_then(|i| self.players.get(i))
    }

    fn row_count(&self) -> usize {
        match self.current_page {
            Page::Leaderboard => self.players.len(),
            Page::Referrals => self.referrals.len(),
            Page::Activity => self.events.len(),
        }
    }

    fn reset_selection(&mut self) {
        let selected = if self.row_count() == 0 { None } else { Some(0) };
        self.state.select(selected);
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        self.reset_selection();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
        self.reset_selection();
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let i = self.state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn stats(&self) -> BoardStats {
        BoardStats {
            players: self.players.len(),
            active: self.players.iter().filter(|p| p.has_active_streak()).count(),
            best: self.players.iter().map(|p| p.highest_streak).max().unwrap_or(0),
            bonuses: self.referrals.iter().filter(|r| r.bonus_earned).count(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BoardStats {
    pub players: usize,
    pub active: usize,
    pub best: u32,
    pub bonuses: usize,
}

pub fn run_ui(app: &mut App) -> Result<()> {
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

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.state.select(Some(0)),
                KeyCode::End => {
                    let len = app.row_count();
                    if len > 0 {
                        app.state.select(Some(len - 1));
                    }
                }
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

    if app.show_detail && app.current_page == Page::Leaderboard {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_leaderboard(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Leaderboard => render_leaderboard(f, chunks[1], app),
            Page::Referrals => render_referrals(f, chunks[1], app),
            Page::Activity => render_activity(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let stats = app.stats();

    let mut tab_spans = vec![];
    for (i, page) in [Page::Leaderboard, Page::Referrals, Page::Activity].iter().enumerate() {
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
        format!("Players: {}", stats.players),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("🔥 {}", stats.active),
        Style::default().fg(Color::Green),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("🏆 {}", stats.best),
        Style::default().fg(Color::Yellow),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("🎁 {}", stats.bonuses),
        Style::default().fg(Color::Magenta),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
    });
    Row::new(cells).style(Style::default().bg(Color::DarkGray)).height(1)
}

fn table_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(title)
}

fn status_color(status: StreakStatus) -> Color {
    match status {
        StreakStatus::New => Color::Cyan,
        StreakStatus::Increased => Color::Green,
        StreakStatus::Reset => Color::Red,
        StreakStatus::Unchanged => Color::DarkGray,
        StreakStatus::Revived => Color::Magenta,
    }
}

fn render_leaderboard(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.players.iter().enumerate().map(|(rank, p)| {
        let color = status_color(p.last_status);
        Row::new(vec![
            Cell::from(format!("{}", rank + 1)),
            Cell::from(truncate(&p.username, 24)),
            Cell::from(format!("{}", p.current_streak)).style(Style::default().fg(color)),
            Cell::from(format!("{}", p.highest_streak)),
            Cell::from(p.last_status.as_str()).style(Style::default().fg(color)),
            Cell::from(p.updated_on.map(|d| d.to_string()).unwrap_or_default()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(26),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(11),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["#", "Player", "Streak", "Best", "Status", "Updated"]))
    .block(table_block(" Streak Leaderboard "))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_referrals(f: &mut Frame, area: Rect, app: &mut App) {
    let milestone = app.milestone;
    let rows = app.referrals.iter().map(|r| {
        let (status, color) = if r.reached(milestone) {
            ("BONUS EARNED".to_string(), Color::Green)
        } else {
            (format!("{} to go", r.hands_to_bonus(milestone)), Color::White)
        };

        Row::new(vec![
            Cell::from(truncate(&r.referred_player, 24)),
            Cell::from(truncate(&r.referrer_player, 24)),
            Cell::from(format!("{}", r.hands_played)),
            Cell::from(status).style(Style::default().fg(color)),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(26),
            Constraint::Length(26),
            Constraint::Length(10),
            Constraint::Length(16),
        ],
    )
    .header(header_row(&["Referred", "Referrer", "Hands", "Bonus"]))
    .block(table_block(" Referrals "))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_activity(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.events.iter().map(|e| {
        Row::new(vec![
            Cell::from(e.timestamp.format("%Y-%m-%d %H:%M").to_string()),
            Cell::from(e.event_type.clone()),
            Cell::from(truncate(&e.entity_id, 24)),
            Cell::from(e.actor.clone()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(18),
            Constraint::Length(24),
            Constraint::Length(26),
            Constraint::Length(16),
        ],
    )
    .header(header_row(&["When", "Event", "Subject", "Actor"]))
    .block(table_block(" Recent Activity "))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let lines = match app.selected_player() {
        Some(p) => vec![
            Line::from(Span::styled(
                p.username.clone(),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(format!("Current streak: {}", p.current_streak)),
            Line::from(format!("Highest streak: {}", p.highest_streak)),
            Line::from(Span::styled(
                format!("Status: {}", p.last_status.as_str()),
                Style::default().fg(status_color(p.last_status)),
            )),
            Line::from(""),
            Line::from(p.last_update.clone()),
        ],
        None => vec![Line::from("No player selected")],
    };

    let panel = Paragraph::new(lines).block(table_block(" Player "));
    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let status_spans = vec![
        Span::styled(
            format!(" Row: {}/{} ", selected, app.row_count()),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" | "),
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" Details | "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" Page | "),
        Span::styled("↑/↓", Style::default().fg(Color::Yellow)),
        Span::raw(" Nav | "),
        Span::styled("q", Style::default().fg(Color::Red)),
        Span::raw(" Quit"),
    ];

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
