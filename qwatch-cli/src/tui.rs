//! Interactive terminal UI for watch mode
//!
//! A keyboard-driven tree of serverless jobs and their runtime jobs. The
//! background engine keeps the cache fresh; the UI loop only reads snapshots,
//! reconciles its persistent tree, and draws. Logs and stop requests run as
//! one-off tasks whose results come back over the event channel, never by
//! mutating UI state from another task.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Frame;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use qwatch_client::JobProvider;
use qwatch_core::domain::job::UNKNOWN_BACKEND;
use qwatch_core::status::{StatusColor, combined_status, is_terminal, status_color};
use qwatch_core::timefmt::relative_created;
use qwatch_engine::WatchState;

use crate::config::{WatchOptions, build_provider};
use crate::tree::{JobNode, JobTree};
use crate::watch::{classify_rows, fetch_rows};

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK: Duration = Duration::from_millis(200);

enum AppEvent {
    Input(KeyEvent),
    FetchDone(Result<Vec<qwatch_core::domain::job::JobRow>, String>),
    LogsLoaded { job_id: String, text: String },
    StopDone { job_id: String, error: Option<String> },
}

enum Modal {
    Logs {
        job_id: String,
        text: Option<String>,
        scroll: u16,
    },
    StopConfirm {
        job_id: String,
        is_runtime: bool,
    },
    Stopping {
        job_id: String,
        is_runtime: bool,
    },
    StopResult {
        job_id: String,
        is_runtime: bool,
        error: Option<String>,
    },
}

/// One selectable line in the flattened tree.
#[derive(Debug, Clone)]
enum VisibleRow {
    Job(String),
    Runtime {
        job_id: String,
        runtime_job_id: String,
    },
}

/// Run the interactive watch UI until the user quits.
pub async fn run_tui(options: WatchOptions) -> Result<()> {
    let provider: Arc<dyn JobProvider> = Arc::new(build_provider(&options));
    let state = WatchState::new(provider.clone(), options.interval);
    state.start();

    // Restore the terminal even when a draw panics mid-frame.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    spawn_input_reader(events_tx.clone());

    let mut app = TuiApp::new(options, provider, state.clone(), events_tx, events_rx);
    let result = app.run_loop(&mut terminal).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    state.stop().await;

    result
}

fn spawn_input_reader(tx: mpsc::UnboundedSender<AppEvent>) {
    std::thread::spawn(move || {
        loop {
            if tx.is_closed() {
                break;
            }
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => {
                    if let Ok(Event::Key(key)) = event::read() {
                        if key.kind == KeyEventKind::Press
                            && tx.send(AppEvent::Input(key)).is_err()
                        {
                            break;
                        }
                    }
                }
                Ok(false) => {}
                Err(_) => break,
            }
        }
    });
}

struct TuiApp {
    options: WatchOptions,
    provider: Arc<dyn JobProvider>,
    state: WatchState,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    rows: Vec<qwatch_core::domain::job::JobRow>,
    tree: JobTree,
    selected: usize,
    fetch_inflight: bool,
    next_fetch_at: Instant,
    first_fetch: bool,
    last_error: Option<String>,
    status_text: String,
    spinner_frame: usize,
    modal: Option<Modal>,
}

impl TuiApp {
    fn new(
        options: WatchOptions,
        provider: Arc<dyn JobProvider>,
        state: WatchState,
        events_tx: mpsc::UnboundedSender<AppEvent>,
        events_rx: mpsc::UnboundedReceiver<AppEvent>,
    ) -> Self {
        Self {
            options,
            provider,
            state,
            events_tx,
            events_rx,
            rows: Vec::new(),
            tree: JobTree::default(),
            selected: 0,
            fetch_inflight: false,
            next_fetch_at: Instant::now(),
            first_fetch: true,
            last_error: None,
            status_text: "Connecting to job services...".to_string(),
            spinner_frame: 0,
            modal: None,
        }
    }

    async fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> Result<()> {
        let mut tick = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                _ = tick.tick() => self.on_tick(),
                Some(event) = self.events_rx.recv() => {
                    if self.on_event(event) {
                        break;
                    }
                }
            }
            terminal.draw(|frame| self.draw(frame))?;
        }
        Ok(())
    }

    fn on_tick(&mut self) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
        self.state.attach_runtime_rows(&mut self.rows);
        self.kick_fetch_if_due();

        let state = self.state.clone();
        let effects = self
            .tree
            .reconcile(&self.rows, self.options.limit, |job_id| {
                state.runtime_count(job_id)
            });
        for job_id in effects.newly_terminal {
            self.state.mark_job_terminal(&job_id);
        }

        let visible = self.visible_rows();
        if !visible.is_empty() && self.selected >= visible.len() {
            self.selected = visible.len() - 1;
        }
    }

    fn kick_fetch_if_due(&mut self) {
        if self.fetch_inflight || Instant::now() < self.next_fetch_at {
            return;
        }
        self.fetch_inflight = true;
        if self.first_fetch {
            self.status_text = "Loading serverless jobs...".to_string();
        }

        let provider = self.provider.clone();
        let options = self.options.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = fetch_rows(&provider, &options)
                .await
                .map_err(|error| format!("{error:#}"));
            let _ = tx.send(AppEvent::FetchDone(result));
        });
    }

    /// Handle one event; returns true to quit.
    fn on_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Input(key) => self.on_key(key),
            AppEvent::FetchDone(Ok(rows)) => {
                self.fetch_inflight = false;
                self.last_error = None;
                self.status_text.clear();

                let (active, terminal) = classify_rows(&rows);
                if self.first_fetch {
                    self.state.freeze_initial_terminal_set(&terminal);
                    self.tree.set_initial_terminal(&terminal);
                    self.first_fetch = false;
                }
                self.state.enqueue_discovery(&active, false);
                self.state.enqueue_discovery(&terminal, true);

                self.rows = rows;
                self.next_fetch_at = Instant::now() + self.options.interval;
                false
            }
            AppEvent::FetchDone(Err(error)) => {
                debug!("Job listing failed: {}", error);
                self.fetch_inflight = false;
                self.status_text = format!("Error: {error}");
                self.last_error = Some(error);
                // Keep previously rendered rows; retry after one interval.
                self.next_fetch_at = Instant::now() + self.options.interval;
                false
            }
            AppEvent::LogsLoaded { job_id, text } => {
                if let Some(Modal::Logs {
                    job_id: current,
                    text: slot,
                    ..
                }) = &mut self.modal
                {
                    if *current == job_id {
                        *slot = Some(text);
                    }
                }
                false
            }
            AppEvent::StopDone { job_id, error } => {
                if let Some(Modal::Stopping {
                    job_id: current,
                    is_runtime,
                }) = &self.modal
                {
                    if *current == job_id {
                        self.modal = Some(Modal::StopResult {
                            job_id,
                            is_runtime: *is_runtime,
                            error,
                        });
                    }
                }
                false
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }
        if self.modal.is_some() {
            self.on_modal_key(key);
            return false;
        }
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                let len = self.visible_rows().len();
                if len > 0 && self.selected + 1 < len {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => self.toggle_selected(),
            KeyCode::Char('l') => self.show_logs(),
            KeyCode::Char('s') => self.confirm_stop(),
            _ => {}
        }
        false
    }

    fn on_modal_key(&mut self, key: KeyEvent) {
        match &mut self.modal {
            Some(Modal::Logs { text, scroll, .. }) => match key.code {
                // Dismissal waits for the fetch so the result is never lost.
                KeyCode::Esc if text.is_some() => self.modal = None,
                KeyCode::Up => *scroll = scroll.saturating_sub(1),
                KeyCode::Down => *scroll = scroll.saturating_add(1),
                KeyCode::PageUp => *scroll = scroll.saturating_sub(20),
                KeyCode::PageDown => *scroll = scroll.saturating_add(20),
                _ => {}
            },
            Some(Modal::StopConfirm { job_id, is_runtime }) => match key.code {
                KeyCode::Enter => {
                    let job_id = job_id.clone();
                    let is_runtime = *is_runtime;
                    self.start_stop(job_id, is_runtime);
                }
                KeyCode::Esc => self.modal = None,
                _ => {}
            },
            Some(Modal::Stopping { .. }) => {}
            Some(Modal::StopResult { .. }) => {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                    self.modal = None;
                }
            }
            None => {}
        }
    }

    fn visible_rows(&self) -> Vec<VisibleRow> {
        let mut out = Vec::new();
        for node in self.tree.iter() {
            out.push(VisibleRow::Job(node.job_id().to_string()));
            if node.expanded {
                for child in &node.children {
                    out.push(VisibleRow::Runtime {
                        job_id: node.job_id().to_string(),
                        runtime_job_id: child.runtime_job_id.clone(),
                    });
                }
            }
        }
        out
    }

    fn selected_row(&self) -> Option<VisibleRow> {
        self.visible_rows().get(self.selected).cloned()
    }

    fn toggle_selected(&mut self) {
        let Some(VisibleRow::Job(job_id)) = self.selected_row() else {
            return;
        };
        if let Some(expanded) = self.tree.toggle(&job_id) {
            if expanded {
                // Expanding a job requests a one-shot status refresh for its
                // statusless children.
                self.state.request_status_refresh(&job_id);
            }
        }
    }

    fn show_logs(&mut self) {
        let job_id = match self.selected_row() {
            Some(VisibleRow::Job(job_id)) => job_id,
            Some(VisibleRow::Runtime { job_id, .. }) => job_id,
            None => return,
        };
        self.modal = Some(Modal::Logs {
            job_id: job_id.clone(),
            text: None,
            scroll: 0,
        });

        let provider = self.provider.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let text = match provider.job_logs(&job_id).await {
                Ok(logs) if logs.is_empty() => "(empty)".to_string(),
                Ok(logs) => logs,
                Err(error) => format!("Error fetching logs: {error}"),
            };
            let _ = tx.send(AppEvent::LogsLoaded { job_id, text });
        });
    }

    fn confirm_stop(&mut self) {
        match self.selected_row() {
            Some(VisibleRow::Job(job_id)) => {
                let Some(node) = self.tree.get(&job_id) else {
                    return;
                };
                if node.is_terminal {
                    return;
                }
                self.modal = Some(Modal::StopConfirm {
                    job_id,
                    is_runtime: false,
                });
            }
            Some(VisibleRow::Runtime {
                job_id,
                runtime_job_id,
            }) => {
                let terminal = self
                    .tree
                    .get(&job_id)
                    .and_then(|node| {
                        node.children
                            .iter()
                            .find(|child| child.runtime_job_id == runtime_job_id)
                    })
                    .is_some_and(|child| is_terminal(&child.status));
                if terminal {
                    return;
                }
                self.modal = Some(Modal::StopConfirm {
                    job_id: runtime_job_id,
                    is_runtime: true,
                });
            }
            None => {}
        }
    }

    fn start_stop(&mut self, job_id: String, is_runtime: bool) {
        self.modal = Some(Modal::Stopping {
            job_id: job_id.clone(),
            is_runtime,
        });

        let provider = self.provider.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = if is_runtime {
                provider.cancel_runtime_job(&job_id).await
            } else {
                provider.stop_job(&job_id).await
            };
            let _ = tx.send(AppEvent::StopDone {
                job_id,
                error: result.err().map(|error| error.to_string()),
            });
        });
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    fn draw(&mut self, frame: &mut Frame) {
        let [header_area, status_area, list_area, footer_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        let clock = chrono::Local::now().format("%H:%M:%S").to_string();
        let header = Line::from(vec![
            Span::styled("qwatch", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" — serverless jobs  "),
            Span::styled(clock, self.dim_style()),
        ]);
        frame.render_widget(Paragraph::new(header), header_area);

        let status = if self.fetch_inflight && !self.status_text.is_empty() {
            Line::from(vec![
                Span::styled(SPINNER_FRAMES[self.spinner_frame], self.dim_style()),
                Span::raw(" "),
                Span::raw(self.status_text.clone()),
            ])
        } else if self.last_error.is_some() {
            Line::from(Span::styled(
                self.status_text.clone(),
                self.color_style(Color::Red),
            ))
        } else {
            Line::default()
        };
        frame.render_widget(Paragraph::new(status), status_area);

        let visible = self.visible_rows();
        let items: Vec<ListItem> = visible
            .iter()
            .map(|row| ListItem::new(self.row_line(row)))
            .collect();
        let list = List::new(items)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        let mut list_state = ListState::default();
        if !visible.is_empty() {
            list_state.select(Some(self.selected.min(visible.len() - 1)));
        }
        frame.render_stateful_widget(list, list_area, &mut list_state);

        let footer = Line::from(Span::styled(
            " ↑/↓ move   ⏎ expand/collapse   l logs   s stop   q quit",
            self.dim_style(),
        ));
        frame.render_widget(Paragraph::new(footer), footer_area);

        if self.modal.is_some() {
            self.draw_modal(frame);
        }
    }

    fn row_line(&self, row: &VisibleRow) -> Line<'static> {
        match row {
            VisibleRow::Job(job_id) => match self.tree.get(job_id) {
                Some(node) => self.job_line(node),
                None => Line::from(job_id.clone()),
            },
            VisibleRow::Runtime {
                job_id,
                runtime_job_id,
            } => self.runtime_line(job_id, runtime_job_id),
        }
    }

    fn job_line(&self, node: &JobNode) -> Line<'static> {
        let marker = if node.allow_expand {
            if node.expanded { "▼ " } else { "▶ " }
        } else {
            "  "
        };
        let row = &node.row;
        let merged = combined_status(&row.status, row.sub_status.as_deref());

        let mut spans = vec![
            Span::raw(marker.to_string()),
            Span::raw(
                row.function
                    .clone()
                    .unwrap_or_else(|| "(unknown)".to_string()),
            ),
            Span::raw(" "),
            Span::styled(row.job_id.clone(), self.color_style(Color::White)),
            Span::raw(" "),
            Span::styled(merged, self.status_style(&row.status)),
            Span::raw(" "),
            Span::styled(relative_created(row.created.as_ref()), self.dim_style()),
        ];
        if !node.is_terminal {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(
                SPINNER_FRAMES[self.spinner_frame].to_string(),
                self.dim_style(),
            ));
        } else if node.discovery_pending {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(
                format!("{} discovering", SPINNER_FRAMES[self.spinner_frame]),
                self.dim_style(),
            ));
        }
        Line::from(spans)
    }

    fn runtime_line(&self, job_id: &str, runtime_job_id: &str) -> Line<'static> {
        let child = self
            .tree
            .get(job_id)
            .and_then(|node| {
                node.children
                    .iter()
                    .find(|child| child.runtime_job_id == runtime_job_id)
            });
        let Some(child) = child else {
            return Line::from(format!("   {runtime_job_id}"));
        };

        let mut spans = vec![
            Span::raw("   "),
            Span::styled(child.runtime_job_id.clone(), self.color_style(Color::White)),
        ];
        if child.status.is_empty() {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(
                SPINNER_FRAMES[self.spinner_frame].to_string(),
                self.dim_style(),
            ));
            return Line::from(spans);
        }

        let spinning = !is_terminal(&child.status);
        let backend = child.backend.trim();
        let backend_display = if spinning && (backend.is_empty() || backend == UNKNOWN_BACKEND) {
            UNKNOWN_BACKEND.to_string()
        } else {
            child.backend.clone()
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            child.status.clone(),
            self.status_style(&child.status),
        ));
        spans.push(Span::raw(" "));
        spans.push(Span::styled(backend_display, self.dim_style()));
        if spinning {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(
                SPINNER_FRAMES[self.spinner_frame].to_string(),
                self.dim_style(),
            ));
        }
        Line::from(spans)
    }

    fn draw_modal(&self, frame: &mut Frame) {
        match &self.modal {
            Some(Modal::Logs {
                job_id,
                text,
                scroll,
            }) => {
                let area = centered_rect(frame.area(), 90, 90);
                frame.render_widget(Clear, area);
                let body = match text {
                    Some(text) => text.clone(),
                    None => format!(
                        "{} Loading logs...",
                        SPINNER_FRAMES[self.spinner_frame]
                    ),
                };
                let block = Block::default()
                    .borders(Borders::ALL)
                    .title(format!(" Logs — {job_id} "));
                frame.render_widget(
                    Paragraph::new(body)
                        .block(block)
                        .wrap(Wrap { trim: false })
                        .scroll((*scroll, 0)),
                    area,
                );
            }
            Some(Modal::StopConfirm { job_id, is_runtime }) => {
                self.draw_stop_box(
                    frame,
                    &format!(
                        "Stop {}?\n\n{job_id}\n\nEnter = Ok   Esc = Cancel",
                        stop_label(*is_runtime)
                    ),
                );
            }
            Some(Modal::Stopping { job_id, is_runtime }) => {
                self.draw_stop_box(
                    frame,
                    &format!(
                        "{} Stopping {}...\n\n{job_id}",
                        SPINNER_FRAMES[self.spinner_frame],
                        stop_label(*is_runtime)
                    ),
                );
            }
            Some(Modal::StopResult {
                job_id,
                is_runtime,
                error,
            }) => {
                let message = match error {
                    None => format!(
                        "{} stopped\n\n{job_id}\n\nEnter = Close",
                        capitalized_stop_label(*is_runtime)
                    ),
                    Some(error) => format!(
                        "Failed to stop {}\n\n{job_id}\n\n{error}\n\nEnter = Close",
                        stop_label(*is_runtime)
                    ),
                };
                self.draw_stop_box(frame, &message);
            }
            None => {}
        }
    }

    fn draw_stop_box(&self, frame: &mut Frame, message: &str) {
        let area = centered_rect(frame.area(), 60, 40);
        frame.render_widget(Clear, area);
        let block = Block::default().borders(Borders::ALL).title(" Stop job ");
        frame.render_widget(
            Paragraph::new(message.to_string())
                .block(block)
                .wrap(Wrap { trim: false }),
            area,
        );
    }

    fn status_style(&self, status: &str) -> Style {
        if self.options.no_color {
            return Style::default();
        }
        let color = match status_color(status) {
            StatusColor::Yellow => Color::Yellow,
            StatusColor::Green => Color::Green,
            StatusColor::Red => Color::Red,
            StatusColor::Magenta => Color::Magenta,
            StatusColor::Cyan => Color::Cyan,
            StatusColor::Blue => Color::Blue,
            StatusColor::Dim => Color::DarkGray,
        };
        Style::default().fg(color)
    }

    fn color_style(&self, color: Color) -> Style {
        if self.options.no_color {
            Style::default()
        } else {
            Style::default().fg(color)
        }
    }

    fn dim_style(&self) -> Style {
        self.color_style(Color::DarkGray)
    }
}

fn stop_label(is_runtime: bool) -> &'static str {
    if is_runtime { "runtime job" } else { "job" }
}

fn capitalized_stop_label(is_runtime: bool) -> &'static str {
    if is_runtime { "Runtime job" } else { "Job" }
}

fn centered_rect(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let [_, vertical, _] = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .areas(area);
    let [_, horizontal, _] = Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .areas(vertical);
    horizontal
}
