//! # Console Interface Module
//!
//! Terminal front end for the run loop. It embeds a [`Runloop`], implements its
//! [`Hooks`], and routes `log` output into an on-screen pane.
//!
//! ## Features
//! - Live status: lifecycle state, cycle and frame counters, realised FPS, speed
//! - Command line driving the host-facing run loop API
//! - Speed presets on F1, run/stop toggle on F5
//! - In-memory snapshot slot (`snap` / `restore`)

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle},
};
use log::{info, warn, LevelFilter, Log, Metadata, Record};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::RunloopError;
use crate::hooks::Hooks;
use crate::runloop::Runloop;
use crate::types::{RunState, CYCLES_PER_FRAME};

/// Console configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub refresh_rate_ms: u64,
    pub log_lines: usize,
    /// Multipliers F1 cycles through
    pub speed_presets: Vec<f64>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: 100,
            log_lines: 200,
            speed_presets: vec![20.0, 1.0],
        }
    }
}

/// What the hooks have told us.
#[derive(Debug, Default, Clone)]
pub struct ConsoleStatus {
    pub fps: Option<u32>,
    pub title: String,
    pub title_changed: bool,
    pub last_error: Option<String>,
    pub episodes_started: u64,
    pub episodes_stopped: u64,
}

#[derive(Debug, Default, Clone)]
pub struct ConsoleHooks {
    status: Arc<Mutex<ConsoleStatus>>,
}

impl ConsoleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConsoleStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut ConsoleStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *status);
    }

    fn take_title_change(&self) -> Option<String> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if status.title_changed {
            status.title_changed = false;
            Some(status.title.clone())
        } else {
            None
        }
    }
}

impl Hooks for ConsoleHooks {
    fn did_start(&self) {
        self.update(|status| status.episodes_started += 1);
    }

    fn did_stop(&self) {
        self.update(|status| {
            status.episodes_stopped += 1;
            status.fps = None;
        });
    }

    fn update_fps(&self, fps: u32) {
        self.update(|status| status.fps = Some(fps));
    }

    fn report_error(&self, error: &RunloopError) {
        self.update(|status| status.last_error = Some(error.to_string()));
    }

    fn set_title(&self, title: &str) {
        self.update(|status| {
            status.title = title.to_string();
            status.title_changed = true;
        });
    }
}

/// `log` sink keeping the most recent lines for the log pane.
pub struct ConsoleLogger {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    level: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(capacity: usize, level: LevelFilter) -> Self {
        ConsoleLogger {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            level,
        }
    }

    /// Install as the global logger.
    pub fn install(capacity: usize, level: LevelFilter) -> Result<&'static ConsoleLogger, log::SetLoggerError> {
        let logger: &'static ConsoleLogger = Box::leak(Box::new(ConsoleLogger::new(capacity, level)));
        log::set_logger(logger)?;
        log::set_max_level(level);
        Ok(logger)
    }

    pub fn recent(&self, count: usize) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().skip(lines.len().saturating_sub(count)).cloned().collect()
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(format!("{:<5} {}", record.level(), record.args()));
    }

    fn flush(&self) {}
}

/// A parsed console command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run,
    Stop,
    StopAfterFrame,
    Reset,
    Speed(f64),
    CycleSpeed,
    Type(String),
    TypePet(String),
    UntilPc { address: Option<u16>, fast: bool },
    Snap,
    Restore,
    Help,
    Quit,
}

/// Parse `$E5CD`, `0xE5CD` or `E5CD`.
pub fn parse_address(text: &str) -> Option<u16> {
    let digits = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).ok()
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(' ') {
        Some((word, rest)) => (word, rest),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "run" | "r" => Ok(Command::Run),
        "stop" | "s" => Ok(Command::Stop),
        "frame" | "f" => Ok(Command::StopAfterFrame),
        "reset" => Ok(Command::Reset),
        "speed" => rest
            .trim()
            .parse::<f64>()
            .map(Command::Speed)
            .map_err(|_| format!("speed needs a number, got '{}'", rest.trim())),
        "cycle" => Ok(Command::CycleSpeed),
        "type" => Ok(Command::Type(format!("{}\r", rest))),
        "pet" => Ok(Command::TypePet(format!("{}\n", rest))),
        "until" | "u" => {
            let mut args = rest.split_whitespace();
            let address = match args.next() {
                Some(arg) => Some(parse_address(arg).ok_or_else(|| format!("bad address '{}'", arg))?),
                None => None,
            };
            let fast = matches!(args.next(), Some("fast"));
            Ok(Command::UntilPc { address, fast })
        }
        "snap" => Ok(Command::Snap),
        "restore" => Ok(Command::Restore),
        "help" | "h" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        _ => Err(format!("unknown command '{}'", word)),
    }
}

/// Console UI application state
pub struct ConsoleApp {
    runloop: Runloop,
    hooks: ConsoleHooks,
    logger: Option<&'static ConsoleLogger>,
    config: ConsoleConfig,
    running: bool,
    command_buffer: String,
    show_help: bool,
    snapshot: Option<String>,
    speed_index: usize,
}

impl ConsoleApp {
    pub fn new(
        runloop: Runloop,
        hooks: ConsoleHooks,
        logger: Option<&'static ConsoleLogger>,
        config: ConsoleConfig,
    ) -> Self {
        Self {
            runloop,
            hooks,
            logger,
            config,
            running: false,
            command_buffer: String::new(),
            show_help: false,
            snapshot: None,
            speed_index: 0,
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Setup terminal
        enable_raw_mode().map_err(|e| format!("Failed to enable raw mode: {}", e))?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)
            .map_err(|e| format!("Failed to enter alternate screen: {}", e))?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        self.running = true;
        let refresh = Duration::from_millis(self.config.refresh_rate_ms);
        let mut last_draw: Option<Instant> = None;

        while self.running {
            while event::poll(Duration::ZERO)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key.code);
                    }
                }
            }

            if let Some(title) = self.hooks.take_title_change() {
                let title = if title.is_empty() { "rusty_c64".to_string() } else { format!("{} (rusty_c64)", title) };
                execute!(terminal.backend_mut(), SetTitle(title))?;
            }

            let now = Instant::now();
            if last_draw.map_or(true, |at| now.duration_since(at) >= refresh) {
                terminal.draw(|f| self.draw_ui(f))?;
                last_draw = Some(now);
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        self.runloop.stop();

        // Restore terminal
        disable_raw_mode().map_err(|e| format!("Failed to disable raw mode: {}", e))?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)
            .map_err(|e| format!("Failed to leave alternate screen: {}", e))?;
        terminal
            .show_cursor()
            .map_err(|e| format!("Failed to show cursor: {}", e))?;

        Ok(())
    }

    fn handle_key_event(&mut self, key: KeyCode) {
        if self.show_help {
            self.show_help = false;
            return;
        }

        match key {
            KeyCode::Esc => self.running = false,
            KeyCode::F(1) => self.cycle_speed(),
            KeyCode::F(2) => self.show_help = true,
            KeyCode::F(5) => {
                if self.runloop.is_running() {
                    self.runloop.stop();
                } else {
                    self.start();
                }
            }
            KeyCode::Backspace => {
                self.command_buffer.pop();
            }
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.command_buffer);
                if !line.trim().is_empty() {
                    match parse_command(&line) {
                        Ok(command) => self.execute_command(command),
                        Err(message) => warn!("{}", message),
                    }
                }
            }
            KeyCode::Char(c) => self.command_buffer.push(c),
            _ => {}
        }
    }

    fn start(&self) {
        if let Err(e) = self.runloop.run_default() {
            warn!("Could not start: {}", e);
        }
    }

    fn cycle_speed(&mut self) {
        if self.config.speed_presets.is_empty() {
            return;
        }
        let speed = self.config.speed_presets[self.speed_index % self.config.speed_presets.len()];
        self.speed_index = (self.speed_index + 1) % self.config.speed_presets.len();
        match self.runloop.set_speed(speed) {
            Ok(()) => info!("Speed set to {}x", speed),
            Err(e) => warn!("{}", e),
        }
    }

    fn execute_command(&mut self, command: Command) {
        match command {
            Command::Run => self.start(),
            Command::Stop => self.runloop.stop(),
            Command::StopAfterFrame => self.runloop.stop_after_frame(),
            Command::Reset => self.runloop.reset(),
            Command::Speed(multiplier) => {
                if let Err(e) = self.runloop.set_speed(multiplier) {
                    warn!("{}", e);
                }
            }
            Command::CycleSpeed => self.cycle_speed(),
            Command::Type(text) => {
                if let Err(e) = self.runloop.type_text(&text) {
                    warn!("{}", e);
                }
            }
            Command::TypePet(text) => {
                let runloop = self.runloop.clone();
                tokio::spawn(async move {
                    if let Err(e) = runloop.type_pet(&text).await {
                        warn!("{}", e);
                    }
                });
            }
            Command::UntilPc { address, fast } => {
                let runloop = self.runloop.clone();
                tokio::spawn(async move {
                    match runloop.until_pc(address, fast).await {
                        Ok(handle) => info!("until: stopped ({:?}) at cycle {}", handle.await, runloop.cycle()),
                        Err(e) => warn!("until: {}", e),
                    }
                });
            }
            Command::Snap => match self.runloop.serialize() {
                Ok(json) => {
                    info!("Snapshot taken ({} bytes) at cycle {}", json.len(), self.runloop.cycle());
                    self.snapshot = Some(json);
                }
                Err(e) => warn!("{}", e),
            },
            Command::Restore => match &self.snapshot {
                Some(json) => {
                    if let Err(e) = self.runloop.deserialize(json) {
                        warn!("{}", e);
                    }
                }
                None => warn!("No snapshot taken yet"),
            },
            Command::Help => self.show_help = true,
            Command::Quit => self.running = false,
        }
    }

    fn draw_ui(&self, f: &mut Frame) {
        let size = f.size();

        if self.show_help {
            self.draw_help_screen(f);
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4), // Title bar
                Constraint::Min(8),    // Main content
                Constraint::Length(3), // Command bar
            ])
            .split(size);

        let status = self.hooks.status();
        let title = if status.title.is_empty() { "rusty_c64" } else { status.title.as_str() };
        let title_text = vec![
            Line::from(vec![Span::styled(
                title.to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )]),
            Line::from(vec![
                Span::styled("F1", Style::default().fg(Color::Yellow)),
                Span::raw("=speed, "),
                Span::styled("F2", Style::default().fg(Color::Yellow)),
                Span::raw("=help, "),
                Span::styled("F5", Style::default().fg(Color::Yellow)),
                Span::raw("=run/stop, "),
                Span::styled("Esc", Style::default().fg(Color::Yellow)),
                Span::raw("=quit"),
            ]),
        ];
        let title_bar = Paragraph::new(title_text)
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .wrap(Wrap { trim: true });
        f.render_widget(title_bar, chunks[0]);

        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(chunks[1]);

        self.draw_machine_state(f, content_chunks[0], &status);
        self.draw_log(f, content_chunks[1]);

        let command_text: &str = if self.command_buffer.is_empty() {
            "Enter command (F2 for help)..."
        } else {
            &self.command_buffer
        };
        let command_bar = Paragraph::new(command_text)
            .style(Style::default().fg(Color::White))
            .block(Block::default().borders(Borders::ALL).title("Command"));
        f.render_widget(command_bar, chunks[2]);
    }

    fn draw_machine_state(&self, f: &mut Frame, area: Rect, status: &ConsoleStatus) {
        let layout = self.runloop.config().keyboard;
        let (cycle, pc, pending) = self
            .runloop
            .with_machine(|machine| (machine.cycle(), machine.program_counter(), layout.pending(machine.wires_mut())));

        let state = match self.runloop.state() {
            RunState::Running => Span::styled("Running", Style::default().fg(Color::Green)),
            RunState::Stopped => Span::styled("Stopped", Style::default().fg(Color::Red)),
        };
        let fps = status.fps.map_or_else(|| "-".to_string(), |fps| fps.to_string());

        let mut lines = vec![
            Line::from(vec![Span::raw("State: "), state]),
            Line::from(vec![Span::raw(format!("Cycle: {}", cycle))]),
            Line::from(vec![Span::raw(format!("Frame: {}", cycle / CYCLES_PER_FRAME))]),
            Line::from(vec![Span::raw(format!("FPS: {}", fps))]),
            Line::from(vec![Span::raw(format!("Speed: {}x", self.runloop.speed()))]),
            Line::from(vec![Span::raw(format!("PC: ${:04X}", pc))]),
            Line::from(vec![Span::raw(format!("Keys pending: {}/{}", pending, layout.capacity))]),
            Line::from(vec![Span::raw(format!(
                "Snapshot: {}",
                self.snapshot.as_ref().map_or("none".to_string(), |s| format!("{} bytes", s.len()))
            ))]),
        ];
        if let Some(error) = &status.last_error {
            lines.push(Line::from(vec![Span::styled(
                format!("Error: {}", error),
                Style::default().fg(Color::Red),
            )]));
        }

        let widget = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Machine"))
            .wrap(Wrap { trim: true });
        f.render_widget(widget, area);
    }

    fn draw_log(&self, f: &mut Frame, area: Rect) {
        let visible = usize::from(area.height.saturating_sub(2));
        let lines: Vec<Line> = match self.logger {
            Some(logger) => logger
                .recent(visible)
                .into_iter()
                .map(|line| Line::from(vec![Span::raw(line)]))
                .collect(),
            None => vec![Line::from(vec![Span::raw("Logging not captured")])],
        };

        let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Log"));
        f.render_widget(widget, area);
    }

    fn draw_help_screen(&self, f: &mut Frame) {
        let size = f.size();
        let entry = |name: &'static str, text: &'static str| {
            Line::from(vec![
                Span::styled(name, Style::default().fg(Color::Yellow)),
                Span::raw(text),
            ])
        };
        let help_text = vec![
            Line::from(vec![Span::styled(
                "Run Loop Console Help",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )]),
            Line::from(""),
            entry("  run, r", " - Run at the configured frame rate"),
            entry("  stop, s", " - Stop at the next cycle"),
            entry("  frame, f", " - Stop at the end of the current frame"),
            entry("  reset", " - Power-on reset"),
            entry("  speed N", " - Set the speed multiplier"),
            entry("  cycle", " - Next speed preset (also F1)"),
            entry("  type TEXT", " - Put TEXT and RETURN in the keyboard buffer"),
            entry("  pet TEXT", " - Type TEXT as PETSCII, waiting for buffer space"),
            entry("  until ADDR [fast]", " - Run until the PC reaches ADDR"),
            entry("  snap / restore", " - Take / restore an in-memory snapshot"),
            entry("  quit, q", " - Exit (also Esc)"),
            Line::from(""),
            Line::from(vec![Span::raw("Press any key to return to main view...")]),
        ];

        let help = Paragraph::new(help_text)
            .style(Style::default().fg(Color::White))
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Help"));
        f.render_widget(help, size);
    }
}

/// Public interface for launching the console
pub async fn run_console(
    runloop: Runloop,
    hooks: ConsoleHooks,
    logger: Option<&'static ConsoleLogger>,
    config: ConsoleConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut app = ConsoleApp::new(runloop, hooks, logger, config);
    app.run().await
}
