//! Main TUI application state and logic

use super::panes::{
    self, SourceRenderData, SourceScrollState, StatusRenderData, VariableRow, VariablesRenderData,
    VariablesScrollState,
};
use crate::debuggee::program::breakpoint_lines;
use crate::session::Session;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use rustc_hash::FxHashSet;
use std::io;
use std::time::Duration;
use tracing::warn;

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Source,
    Variables,
    Console,
}

impl FocusedPane {
    /// Move focus to the next pane (source -> variables -> console)
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Source => FocusedPane::Variables,
            FocusedPane::Variables => FocusedPane::Console,
            FocusedPane::Console => FocusedPane::Source,
        }
    }
}

pub struct App {
    pub session: Session,
    pub focused_pane: FocusedPane,
    pub source_scroll: SourceScrollState,
    pub variables_scroll: VariablesScrollState,
    pub console_scroll: usize,
    /// Index of the selected top-level variable
    pub selected: usize,
    /// Names of expanded variables; kept across stops
    pub expanded: FxHashSet<String>,
    pub console: Vec<String>,
    pub should_quit: bool,
    pub status_message: String,
    pub status_is_error: bool,
    breakpoints: Vec<usize>,
    rows: Vec<VariableRow>,
}

impl App {
    pub fn new(session: Session) -> Self {
        let mut app = App {
            session,
            focused_pane: FocusedPane::Variables,
            source_scroll: SourceScrollState::default(),
            variables_scroll: VariablesScrollState::default(),
            console_scroll: 0,
            selected: 0,
            expanded: FxHashSet::default(),
            console: Vec::new(),
            should_quit: false,
            status_message: String::from("Stopped at first breakpoint"),
            status_is_error: false,
            breakpoints: breakpoint_lines(),
            rows: Vec::new(),
        };
        app.refresh();
        app
    }

    /// Run the TUI application
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        Ok(())
    }

    /// Rows currently shown in the variables pane
    pub fn rows(&self) -> &[VariableRow] {
        &self.rows
    }

    /// Recompute the variable rows for the current stop and frame
    pub fn refresh(&mut self) {
        let names: Vec<String> = self
            .session
            .variables()
            .iter()
            .map(|v| v.name.clone())
            .collect();
        self.selected = self.selected.min(names.len().saturating_sub(1));

        let mut rows = Vec::new();
        for (owner, name) in names.iter().enumerate() {
            let expanded = self.expanded.contains(name);
            match self.session.evaluate(name, expanded) {
                Ok(node) => rows.extend(panes::variable_rows(owner, &node, expanded)),
                Err(err) => {
                    warn!(%name, error = %err, "cannot evaluate variable");
                    rows.push(VariableRow {
                        owner,
                        depth: 0,
                        name: name.clone(),
                        type_name: None,
                        value: format!("<{}>", err),
                        expander: panes::Expander::Leaf,
                    });
                }
            }
        }
        self.rows = rows;
    }

    fn render(&mut self, frame: &mut Frame) {
        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(frame.area());

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(main_chunks[0]);

        let right_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(columns[1]);

        panes::render_source_pane(
            frame,
            columns[0],
            SourceRenderData {
                source: self.session.source(),
                current_line: self.session.stop_line(),
                breakpoints: &self.breakpoints,
            },
            self.focused_pane == FocusedPane::Source,
            &mut self.source_scroll,
        );

        let frame_index = self.session.selected_frame();
        let function = self
            .session
            .frames()
            .get(frame_index)
            .map(|f| f.function.as_str())
            .unwrap_or_default();
        panes::render_variables_pane(
            frame,
            right_rows[0],
            VariablesRenderData {
                rows: &self.rows,
                selected: self.selected,
                function,
                frame_index,
            },
            self.focused_pane == FocusedPane::Variables,
            &mut self.variables_scroll,
        );

        panes::render_console_pane(
            frame,
            right_rows[1],
            &self.console,
            self.focused_pane == FocusedPane::Console,
            &mut self.console_scroll,
        );

        panes::render_status_bar(
            frame,
            main_chunks[1],
            StatusRenderData {
                message: &self.status_message,
                is_error: self.status_is_error,
                library: self.session.library().name(),
                stop: self.session.stop_index(),
                total_stops: self.session.total_stops(),
            },
        );
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::Right | KeyCode::Char('c') => self.continue_forward(),
            KeyCode::Left | KeyCode::Char('r') => self.continue_backward(),
            KeyCode::Char('f') => self.cycle_frame(),
            KeyCode::Char('p') => self.print_selected(),
            KeyCode::Enter => self.toggle_selected(),
            KeyCode::Up => match self.focused_pane {
                FocusedPane::Source => {
                    if let Some(row) = self.source_scroll.target_line_row {
                        self.source_scroll.target_line_row = Some(row.saturating_add(1));
                    }
                }
                FocusedPane::Variables => {
                    self.selected = self.selected.saturating_sub(1);
                }
                FocusedPane::Console => {
                    self.console_scroll = self.console_scroll.saturating_sub(1);
                }
            },
            KeyCode::Down => match self.focused_pane {
                FocusedPane::Source => {
                    if let Some(row) = self.source_scroll.target_line_row {
                        self.source_scroll.target_line_row = Some(row.saturating_sub(1));
                    }
                }
                FocusedPane::Variables => {
                    let count = self.session.variables().len();
                    if self.selected + 1 < count {
                        self.selected += 1;
                    }
                }
                FocusedPane::Console => {
                    self.console_scroll = self.console_scroll.saturating_add(1);
                }
            },
            _ => {}
        }
    }

    fn continue_forward(&mut self) {
        match self.session.continue_to_breakpoint() {
            Ok(line) => self.set_status(format!("Stopped at line {}", line), false),
            Err(err) => self.set_status(format!("Cannot continue: {}", err), true),
        }
        self.refresh();
    }

    fn continue_backward(&mut self) {
        match self.session.reverse_continue() {
            Ok(line) => self.set_status(format!("Reversed to line {}", line), false),
            Err(err) => self.set_status(format!("Cannot reverse: {}", err), true),
        }
        self.refresh();
    }

    fn cycle_frame(&mut self) {
        let count = self.session.frames().len().max(1);
        let next = (self.session.selected_frame() + 1) % count;
        match self.session.select_frame(next) {
            Ok(()) => self.set_status(format!("Selected frame #{}", next), false),
            Err(err) => self.set_status(err.to_string(), true),
        }
        self.selected = 0;
        self.refresh();
    }

    fn selected_name(&self) -> Option<String> {
        self.session
            .variables()
            .get(self.selected)
            .map(|v| v.name.clone())
    }

    fn toggle_selected(&mut self) {
        let Some(name) = self.selected_name() else {
            return;
        };
        if !self.expanded.remove(&name) {
            self.expanded.insert(name);
        }
        self.refresh();
    }

    fn print_selected(&mut self) {
        let Some(name) = self.selected_name() else {
            return;
        };
        self.console.push(format!("(lldb) frame variable {}", name));
        match self.session.frame_variable(&name) {
            Ok(text) => self.console.extend(text.lines().map(str::to_string)),
            Err(err) => self.console.push(format!("error: {}", err)),
        }
        self.console_scroll = usize::MAX;
    }

    fn set_status(&mut self, message: String, is_error: bool) {
        self.status_message = message;
        self.status_is_error = is_error;
    }
}
