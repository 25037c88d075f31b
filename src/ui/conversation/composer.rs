use crate::ui::conversation::commands::{command_entries, parse_slash_command, CommandEntry, ParsedCommand};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Widget},
};

/// Result returned when the user interacts with the conversation composer
#[derive(Debug, PartialEq)]
pub enum ConversationResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// State for the text area within the composer. `cursor` is a byte offset
/// that always sits on a char boundary.
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    pub cursor: usize,
}

/// Conversation composer for user input
#[derive(Clone)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    has_focus: bool,
    command_entries: Vec<CommandEntry>,
    filtered_commands: Vec<CommandEntry>,
    show_command_palette: bool,
    selected_command: Option<usize>,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            has_focus: false,
            command_entries: command_entries(),
            filtered_commands: Vec::new(),
            show_command_palette: false,
            selected_command: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationResult {
        if key.kind != KeyEventKind::Press {
            return ConversationResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char('\n');
                } else if self.show_command_palette
                    && parse_slash_command(&self.state.content).is_none()
                    && self.apply_selected_command()
                {
                    return ConversationResult::None;
                } else if !self.state.content.trim().is_empty() {
                    let content = std::mem::take(&mut self.state.content);
                    self.state.cursor = 0;
                    self.close_command_palette();
                    return match parse_slash_command(&content) {
                        Some(command) => ConversationResult::Command(command),
                        None => ConversationResult::Submitted(content),
                    };
                }
            }
            KeyCode::Up if self.show_command_palette => self.move_command_selection(-1),
            KeyCode::Down if self.show_command_palette => self.move_command_selection(1),
            KeyCode::Esc if self.show_command_palette => self.close_command_palette(),
            KeyCode::Tab if self.show_command_palette => {
                self.apply_selected_command();
            }
            KeyCode::Char(c) => {
                self.insert_char(c);
                self.sync_command_palette();
            }
            KeyCode::Backspace => {
                if self.backspace() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Delete => {
                if self.delete() {
                    self.sync_command_palette();
                }
            }
            KeyCode::Left => {
                if let Some((idx, _)) = self.state.content[..self.state.cursor].char_indices().next_back() {
                    self.state.cursor = idx;
                }
            }
            KeyCode::Right => {
                if let Some(c) = self.state.content[self.state.cursor..].chars().next() {
                    self.state.cursor += c.len_utf8();
                }
            }
            KeyCode::Home => self.state.cursor = 0,
            KeyCode::End => self.state.cursor = self.state.content.len(),
            _ => {}
        }

        ConversationResult::None
    }

    /// Insert pasted text at the cursor
    pub fn insert_str(&mut self, text: &str) {
        self.state.content.insert_str(self.state.cursor, text);
        self.state.cursor += text.len();
        self.sync_command_palette();
    }

    /// Replace the whole content, cursor at the end
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.state.content = content.into();
        self.state.cursor = self.state.content.len();
        self.sync_command_palette();
    }

    /// Whether the palette should capture Tab instead of focus switching
    pub fn palette_open(&self) -> bool {
        self.show_command_palette
    }

    fn insert_char(&mut self, c: char) {
        self.state.content.insert(self.state.cursor, c);
        self.state.cursor += c.len_utf8();
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        match self.state.content[..self.state.cursor].char_indices().next_back() {
            Some((idx, _)) => {
                self.state.content.remove(idx);
                self.state.cursor = idx;
                true
            }
            None => false,
        }
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        if self.state.cursor < self.state.content.len() {
            self.state.content.remove(self.state.cursor);
            true
        } else {
            false
        }
    }

    /// Open, refresh or close the palette to match the current content
    fn sync_command_palette(&mut self) {
        let content = &self.state.content;
        let typing_command = content.starts_with('/') && !content.contains(char::is_whitespace);
        if typing_command {
            if !self.show_command_palette {
                self.show_command_palette = true;
                self.selected_command = Some(0);
            }
            self.refresh_command_palette();
        } else {
            self.close_command_palette();
        }
    }

    fn close_command_palette(&mut self) {
        self.show_command_palette = false;
        self.filtered_commands.clear();
        self.selected_command = None;
    }

    fn refresh_command_palette(&mut self) {
        let query = self.state.content.trim_start_matches('/').to_lowercase();
        self.filtered_commands = self
            .command_entries
            .iter()
            .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
            .copied()
            .collect();

        self.selected_command = if self.filtered_commands.is_empty() {
            None
        } else {
            let index = self.selected_command.unwrap_or(0);
            Some(index.min(self.filtered_commands.len() - 1))
        };
    }

    fn move_command_selection(&mut self, delta: isize) {
        if self.filtered_commands.is_empty() {
            self.selected_command = None;
            return;
        }

        let len = self.filtered_commands.len() as isize;
        let current = self.selected_command.unwrap_or(0) as isize;
        self.selected_command = Some((current + delta).rem_euclid(len) as usize);
    }

    fn apply_selected_command(&mut self) -> bool {
        let Some(entry) = self
            .selected_command
            .and_then(|index| self.filtered_commands.get(index))
            .copied()
        else {
            return false;
        };

        self.state.content = format!("/{} ", entry.keyword);
        self.state.cursor = self.state.content.len();
        self.close_command_palette();
        true
    }

    /// Set focus state
    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    /// Get current content
    pub fn content(&self) -> &str {
        &self.state.content
    }
}

impl Widget for &ConversationComposer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Message (Enter to send, Shift+Enter for newline)")
            .style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.state.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
        } else {
            let mut content = self.state.content.clone();
            if self.has_focus {
                content.insert(self.state.cursor, '▌');
            }

            // keep the cursor line visible when the text is taller than the box
            let lines: Vec<&str> = content.split('\n').collect();
            let skip = lines.len().saturating_sub(inner_area.height as usize);
            for (i, line_text) in lines.iter().skip(skip).enumerate() {
                let line = Line::from(vec![Span::raw(*line_text)]);
                buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
            }
        }

        if self.show_command_palette && !self.filtered_commands.is_empty() {
            let palette_height = (self.filtered_commands.len().min(6) + 2) as u16;
            let palette_area = Rect {
                x: area.x,
                y: area.y.saturating_sub(palette_height),
                width: area.width,
                height: palette_height.min(area.y),
            };
            if palette_area.height < 3 {
                return;
            }

            Clear.render(palette_area, buf);
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Commands")
                .style(Style::default().fg(Color::Blue));
            let inner = block.inner(palette_area);
            block.render(palette_area, buf);

            // scroll the list so the selection stays in view
            let visible = inner.height as usize;
            let selected = self.selected_command.unwrap_or(0);
            let first = selected.saturating_sub(visible.saturating_sub(1));

            for (row, (index, entry)) in self
                .filtered_commands
                .iter()
                .enumerate()
                .skip(first)
                .take(visible)
                .enumerate()
            {
                let style = if self.selected_command == Some(index) {
                    Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };

                let line = Line::from(vec![
                    Span::styled(format!("/{}", entry.keyword), style),
                    Span::styled(" - ", Style::default().fg(Color::DarkGray)),
                    Span::styled(entry.description, Style::default().fg(Color::Gray)),
                ]);

                buf.set_line(inner.x, inner.y + row as u16, &line, inner.width);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::conversation::commands::SlashCommand;

    fn press(composer: &mut ConversationComposer, code: KeyCode) -> ConversationResult {
        composer.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(composer: &mut ConversationComposer, text: &str) {
        for c in text.chars() {
            press(composer, KeyCode::Char(c));
        }
    }

    #[test]
    fn enter_submits_and_clears() {
        let mut composer = ConversationComposer::new("Say something");
        type_str(&mut composer, "héllo");
        assert_eq!(press(&mut composer, KeyCode::Enter), ConversationResult::Submitted("héllo".into()));
        assert_eq!(composer.content(), "");
    }

    #[test]
    fn blank_input_is_not_submitted() {
        let mut composer = ConversationComposer::new("");
        type_str(&mut composer, "   ");
        assert_eq!(press(&mut composer, KeyCode::Enter), ConversationResult::None);
    }

    #[test]
    fn editing_respects_multibyte_characters() {
        let mut composer = ConversationComposer::new("");
        type_str(&mut composer, "añb");
        press(&mut composer, KeyCode::Left);
        press(&mut composer, KeyCode::Backspace);
        assert_eq!(composer.content(), "ab");
        press(&mut composer, KeyCode::Home);
        press(&mut composer, KeyCode::Delete);
        assert_eq!(composer.content(), "b");
    }

    #[test]
    fn palette_completes_commands() {
        let mut composer = ConversationComposer::new("");
        type_str(&mut composer, "/exp");
        assert!(composer.palette_open());

        press(&mut composer, KeyCode::Tab);
        assert_eq!(composer.content(), "/export ");
        assert!(!composer.palette_open());

        type_str(&mut composer, "json");
        match press(&mut composer, KeyCode::Enter) {
            ConversationResult::Command(parsed) => {
                assert_eq!(parsed.command, SlashCommand::Export);
                assert_eq!(parsed.argument(), Some("json"));
            }
            other => panic!("expected command, got {other:?}"),
        }
    }

    #[test]
    fn enter_on_complete_command_submits() {
        let mut composer = ConversationComposer::new("");
        type_str(&mut composer, "/help");
        assert!(composer.palette_open());
        match press(&mut composer, KeyCode::Enter) {
            ConversationResult::Command(parsed) => assert_eq!(parsed.command, SlashCommand::Help),
            other => panic!("expected command, got {other:?}"),
        }

        type_str(&mut composer, "/he");
        assert_eq!(press(&mut composer, KeyCode::Enter), ConversationResult::None);
        assert_eq!(composer.content(), "/help ");
    }

    #[test]
    fn shift_enter_inserts_newline() {
        let mut composer = ConversationComposer::new("");
        type_str(&mut composer, "a");
        composer.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT));
        type_str(&mut composer, "b");
        assert_eq!(composer.content(), "a\nb");
    }
}
