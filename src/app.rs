//! The single and dual chat applications: layout, focus and key handling.

use crate::chat::ChatSession;
use crate::config::Config;
use crate::controls::{AppKind, ControlId, Controls};
use crate::events::{EventHandler, TuiEvent};
use crate::export::{write_export, ExportFormat};
use crate::llm::LlmClient;
use crate::relay::AutoConverse;
use crate::tui::Tui;
use crate::ui::conversation::{ConversationAction, ConversationManager, ParsedCommand, SlashCommand};
use crate::ui::Sidebar;
use anyhow::{anyhow, bail, Result};
use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use tokio::task::JoinHandle;

const PLACEHOLDER: &str = "Ask anything, or type / for commands";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Panel(usize),
    Sidebar,
}

pub struct App {
    config: Config,
    controls: Controls,
    panels: Vec<ConversationManager>,
    relay: Option<JoinHandle<()>>,
    focus: Focus,
    selected_control: usize,
    status: Option<String>,
    should_quit: bool,
}

impl App {
    /// One conversation with the full set of controls
    pub fn single(config: Config) -> Result<Self> {
        let client = LlmClient::new(config.clone())?;
        let controls = Controls::new(AppKind::Single, &config, false)?;
        let session = ChatSession::spawn("chat", controls.settings(), client);

        Ok(Self::with_panels(
            config,
            controls,
            vec![ConversationManager::new(session, PLACEHOLDER)],
            None,
        ))
    }

    /// Two conversations that can feed each other's replies
    pub fn dual(config: Config, auto_converse: bool) -> Result<Self> {
        let client = LlmClient::new(config.clone())?;
        let controls = Controls::new(AppKind::Dual, &config, auto_converse)?;
        let first = ChatSession::spawn("chat1", controls.settings(), client.clone());
        let second = ChatSession::spawn("chat2", controls.settings(), client);

        let converse = AutoConverse::new(controls.auto_converse_rx(), controls.converse_delay_rx());
        let relay = tokio::spawn(converse.run(first.link(), second.link()));

        Ok(Self::with_panels(
            config,
            controls,
            vec![
                ConversationManager::new(first, PLACEHOLDER),
                ConversationManager::new(second, PLACEHOLDER),
            ],
            Some(relay),
        ))
    }

    fn with_panels(
        config: Config,
        controls: Controls,
        panels: Vec<ConversationManager>,
        relay: Option<JoinHandle<()>>,
    ) -> Self {
        let mut app = Self {
            config,
            controls,
            panels,
            relay,
            focus: Focus::Panel(0),
            selected_control: 0,
            status: None,
            should_quit: false,
        };
        app.apply_focus();
        app
    }

    pub fn kind(&self) -> AppKind {
        self.controls.kind()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Draw and dispatch events until the user quits
    pub async fn run(&mut self, terminal: &mut Tui, events: &mut EventHandler) -> Result<()> {
        while !self.should_quit {
            terminal.draw(|frame| self.draw(frame))?;

            match events.next().await {
                Some(event) => self.handle_event(event),
                None => break,
            }
        }
        Ok(())
    }

    pub fn handle_event(&mut self, event: TuiEvent) {
        match event {
            TuiEvent::Key(key) => self.handle_key(key),
            TuiEvent::Paste(text) => {
                if let Focus::Panel(index) = self.focus {
                    self.panels[index].handle_paste(&text);
                }
            }
            TuiEvent::Resize(_, _) => {}
            TuiEvent::Tick => {
                for panel in &mut self.panels {
                    panel.refresh();
                }
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => {
                    self.should_quit = true;
                    return;
                }
                KeyCode::Char('s') => {
                    let outcome = self.export(None);
                    self.report(outcome);
                    return;
                }
                _ => {}
            }
        }

        let palette_open = matches!(self.focus, Focus::Panel(index) if self.panels[index].captures_tab());
        if matches!(key.code, KeyCode::Tab | KeyCode::BackTab) && !palette_open {
            self.cycle_focus(key.code == KeyCode::Tab);
            return;
        }

        match self.focus {
            Focus::Sidebar => self.handle_sidebar_key(key),
            Focus::Panel(index) => match self.panels[index].handle_key(key) {
                ConversationAction::None => {}
                ConversationAction::Exit => self.should_quit = true,
                ConversationAction::Command(command) => {
                    let outcome = self.apply_command(command);
                    self.report(outcome);
                }
            },
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        let ids = self.controls.ids();
        match key.code {
            KeyCode::Up => self.selected_control = self.selected_control.saturating_sub(1),
            KeyCode::Down => self.selected_control = (self.selected_control + 1).min(ids.len() - 1),
            KeyCode::Left => self.controls.adjust(ids[self.selected_control], false),
            KeyCode::Right | KeyCode::Char(' ') => self.controls.adjust(ids[self.selected_control], true),
            KeyCode::Enter if ids[self.selected_control] == ControlId::SystemPrompt => {
                // prefill the composer so the prompt can be edited in place
                self.focus = Focus::Panel(0);
                self.apply_focus();
                let prompt = format!("/system {}", self.controls.system_prompt);
                self.panels[0].prefill(prompt);
            }
            KeyCode::Esc => {
                self.focus = Focus::Panel(0);
                self.apply_focus();
            }
            _ => {}
        }
    }

    fn cycle_focus(&mut self, forward: bool) {
        let stops = self.panels.len() + 1;
        let current = match self.focus {
            Focus::Panel(index) => index,
            Focus::Sidebar => self.panels.len(),
        };
        let next = if forward {
            (current + 1) % stops
        } else {
            (current + stops - 1) % stops
        };
        self.focus = if next == self.panels.len() {
            Focus::Sidebar
        } else {
            Focus::Panel(next)
        };
        self.apply_focus();
    }

    fn apply_focus(&mut self) {
        for (index, panel) in self.panels.iter_mut().enumerate() {
            panel.set_focus(self.focus == Focus::Panel(index));
        }
    }

    fn report(&mut self, outcome: Result<String>) {
        let message = match outcome {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("command failed: {e:#}");
                format!("Error: {e}")
            }
        };
        self.status = Some(message);
    }

    fn require(&self, id: ControlId, command: SlashCommand) -> Result<()> {
        if self.controls.ids().contains(&id) {
            Ok(())
        } else {
            Err(anyhow!("/{} is not available in this app", command.command()))
        }
    }

    /// Apply a slash command to the controls and return a status message
    fn apply_command(&mut self, command: ParsedCommand) -> Result<String> {
        tracing::debug!(command = command.command.command(), "slash command");
        match command.command {
            SlashCommand::Export => {
                let format = command.format_target().transpose()?;
                self.export(format)
            }
            SlashCommand::Format => {
                self.require(ControlId::DownloadFormat, command.command)?;
                let Some(format) = command.format_target().transpose()? else {
                    bail!("Usage: /format md|json");
                };
                self.controls.download_format = format;
                Ok(format!("Export format: {}", format.display_name()))
            }
            SlashCommand::Model => {
                self.require(ControlId::Model, command.command)?;
                match command.argument() {
                    Some(model) => {
                        self.controls.set_model(model)?;
                        Ok(format!("Model: {model}"))
                    }
                    None => Ok(format!("Models: {}", self.controls.model.choices().join(", "))),
                }
            }
            SlashCommand::Temperature => {
                let value = number_argument(&command)?;
                let value = self.controls.set_temperature(value)?;
                Ok(format!("Temperature: {value:.2}"))
            }
            SlashCommand::Throttle => {
                self.require(ControlId::Throttle, command.command)?;
                let value = number_argument(&command)?;
                let value = self.controls.set_throttle(value)?;
                Ok(format!("Throttle interval: {value:.2}s"))
            }
            SlashCommand::System => {
                self.require(ControlId::SystemPrompt, command.command)?;
                match command.argument() {
                    Some(prompt) => {
                        self.controls.set_system_prompt(prompt);
                        Ok("System prompt updated".to_string())
                    }
                    None => Ok(format!("System prompt: {}", self.controls.system_prompt)),
                }
            }
            SlashCommand::Auto => {
                self.require(ControlId::AutoConverse, command.command)?;
                let on = match command.argument() {
                    None => !self.controls.auto_converse,
                    Some(_) => command
                        .switch_target()
                        .ok_or_else(|| anyhow!("Usage: /auto on|off"))?,
                };
                self.controls.set_auto_converse(on);
                Ok(format!("Converse with self: {}", if on { "on" } else { "off" }))
            }
            SlashCommand::Delay => {
                self.require(ControlId::ConverseDelay, command.command)?;
                let value = number_argument(&command)?;
                let value = self.controls.set_converse_delay(value)?;
                Ok(format!("Conversation delay: {value:.1}s"))
            }
            SlashCommand::Help | SlashCommand::Bye => Ok(String::new()),
        }
    }

    /// Write the single app's conversation to the export directory
    fn export(&mut self, format: Option<ExportFormat>) -> Result<String> {
        if self.kind() != AppKind::Single {
            bail!("Export is only available in the single chat");
        }

        let format = format.unwrap_or(self.controls.download_format);
        let messages = self.panels[0].session().messages();
        let path = write_export(&self.config.resolved_export_dir(), &messages, format, Local::now())?;
        Ok(format!("Saved {}", path.display()))
    }

    pub fn draw(&self, frame: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(8), Constraint::Length(1)])
            .split(frame.size());

        let columns = match self.kind() {
            AppKind::Single => vec![Constraint::Percentage(75), Constraint::Percentage(25)],
            AppKind::Dual => vec![
                Constraint::Percentage(40),
                Constraint::Percentage(40),
                Constraint::Percentage(20),
            ],
        };
        let areas = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(columns)
            .split(rows[0]);

        for (panel, area) in self.panels.iter().zip(areas.iter()) {
            frame.render_widget(panel, *area);
        }

        let export_dir = self.config.resolved_export_dir();
        let sidebar = Sidebar {
            title: match self.kind() {
                AppKind::Single => "Duet",
                AppKind::Dual => "Duet: dual chat",
            },
            controls: &self.controls,
            selected: self.selected_control,
            has_focus: self.focus == Focus::Sidebar,
            export_dir: (self.kind() == AppKind::Single).then_some(export_dir.as_path()),
        };
        frame.render_widget(sidebar, areas[areas.len() - 1]);

        self.draw_status(frame, rows[1]);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let line = match &self.status {
            Some(status) => Line::from(Span::styled(status.as_str(), Style::default().fg(Color::Yellow))),
            None => Line::from(Span::styled(
                "Tab switch focus · PgUp/PgDn scroll · /help commands · Ctrl+C quit",
                Style::default().fg(Color::DarkGray),
            )),
        };
        frame.render_widget(Paragraph::new(line), area);
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
    }
}

fn number_argument(command: &ParsedCommand) -> Result<f32> {
    command
        .number()
        .ok_or_else(|| anyhow!("Usage: /{} <number>", command.command.command()))
}
