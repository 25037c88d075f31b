//! Conversation history display component

use crate::chat::ChatStatus;
use crate::message::{ChatMessage, ChatRole};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Snapshot of one session's conversation plus local notices, scrolled from the bottom
#[derive(Clone)]
pub struct ConversationHistory {
    title: String,
    messages: Vec<ChatMessage>,
    notices: Vec<String>,
    streaming_message: Option<String>,
    status: ChatStatus,
    scroll_offset: usize,
    has_focus: bool,
}

impl ConversationHistory {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            messages: Vec::new(),
            notices: Vec::new(),
            streaming_message: None,
            status: ChatStatus::Idle,
            scroll_offset: 0,
            has_focus: false,
        }
    }

    /// Replace the displayed snapshot. New turns snap the view back to the bottom.
    pub fn sync(&mut self, messages: Vec<ChatMessage>, streaming: Option<String>, status: ChatStatus) {
        if messages.len() != self.messages.len() || (streaming.is_some() && self.streaming_message.is_none()) {
            self.scroll_to_bottom();
        }
        self.messages = messages;
        self.streaming_message = streaming;
        self.status = status;
    }

    /// Show a local notice (help text, command feedback). Never sent to the model.
    pub fn add_notice(&mut self, notice: impl Into<String>) {
        self.notices.push(notice.into());
        self.scroll_to_bottom();
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    fn status_label(&self) -> Option<Span<'_>> {
        match &self.status {
            ChatStatus::Idle => None,
            ChatStatus::Waiting => Some(Span::styled(" waiting… ", Style::default().fg(Color::Yellow))),
            ChatStatus::Streaming => Some(Span::styled(" streaming… ", Style::default().fg(Color::Green))),
            ChatStatus::Failed(error) => Some(Span::styled(
                format!(" error: {error} "),
                Style::default().fg(Color::Red),
            )),
        }
    }

    /// All lines of the conversation at the given width
    fn lines(&self, width: u16) -> Vec<Line<'_>> {
        let mut all_lines: Vec<Line> = Vec::new();
        for message in &self.messages {
            all_lines.extend(self.render_message(message, width));
            all_lines.push(Line::from(""));
        }

        if let Some(text) = &self.streaming_message {
            all_lines.extend(self.render_streaming_message(text, width));
            all_lines.push(Line::from(""));
        }

        for notice in &self.notices {
            for line in wrap_text(notice, width.saturating_sub(2) as usize) {
                all_lines.push(Line::from(Span::styled(line, Style::default().fg(Color::Yellow))));
            }
            all_lines.push(Line::from(""));
        }

        all_lines
    }

    /// Render a single message into lines
    fn render_message(&self, message: &ChatMessage, width: u16) -> Vec<Line<'_>> {
        let mut lines = vec![header_line(message.role)];

        for content_line in wrap_text(&message.content, width.saturating_sub(2) as usize) {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(content_line, content_style(message.role)),
            ]));
        }

        lines
    }

    /// Render a streaming message with typing indicator
    fn render_streaming_message(&self, text: &str, width: u16) -> Vec<Line<'_>> {
        let mut lines = vec![header_line(ChatRole::Assistant)];

        let content_lines = wrap_text(text, width.saturating_sub(3) as usize);
        let last = content_lines.len().saturating_sub(1);
        for (i, content_line) in content_lines.into_iter().enumerate() {
            let cursor = if i == last { "▋" } else { "" };
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(content_line, content_style(ChatRole::Assistant)),
                Span::styled(cursor, Style::default().fg(Color::Yellow)),
            ]));
        }

        lines
    }
}

impl Widget for &ConversationHistory {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut title = vec![Span::styled(
            format!(" {} ", self.title),
            Style::default().add_modifier(Modifier::BOLD),
        )];
        title.extend(self.status_label());

        let block = Block::default()
            .borders(Borders::ALL)
            .title(Line::from(title))
            .border_style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.messages.is_empty() && self.streaming_message.is_none() && self.notices.is_empty() {
            let welcome = Line::from(Span::styled(
                "No messages yet. Type below and press Enter.",
                Style::default().fg(Color::DarkGray),
            ));
            buf.set_line(inner_area.x, inner_area.y, &welcome, inner_area.width);
            return;
        }

        let all_lines = self.lines(inner_area.width);
        let height = inner_area.height as usize;
        let max_offset = all_lines.len().saturating_sub(height);
        let offset = self.scroll_offset.min(max_offset);
        let start = max_offset - offset;

        for (i, line) in all_lines.iter().skip(start).take(height).enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }

        if offset > 0 {
            let hint = Line::from(Span::styled(
                format!(" ↓ {offset} more "),
                Style::default().fg(Color::Black).bg(Color::Yellow),
            ));
            let hint_width = hint.width() as u16;
            let x = inner_area.right().saturating_sub(hint_width);
            buf.set_line(x, inner_area.bottom().saturating_sub(1), &hint, hint_width);
        }
    }
}

fn header_line(role: ChatRole) -> Line<'static> {
    Line::from(Span::styled(
        format!("{} {}", role.display_name(), "─".repeat(20)),
        Style::default().fg(Color::DarkGray),
    ))
}

fn content_style(role: ChatRole) -> Style {
    match role {
        ChatRole::User => Style::default().fg(Color::Blue),
        ChatRole::Assistant => Style::default().fg(Color::Green),
        ChatRole::System => Style::default().fg(Color::Yellow),
    }
}

/// Wrap text to fit within the given width, keeping explicit line breaks
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        let mut current_width = 0;

        for word in paragraph.split_whitespace() {
            let word_width = word.chars().count();
            if current_width > 0 && current_width + 1 + word_width > width {
                lines.push(std::mem::take(&mut current_line));
                current_width = 0;
            }
            if current_width > 0 {
                current_line.push(' ');
                current_width += 1;
            }
            current_line.push_str(word);
            current_width += word_width;
        }

        lines.push(current_line);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_to_string(history: &ConversationHistory, width: u16, height: u16) -> String {
        let area = Rect::new(0, 0, width, height);
        let mut buf = Buffer::empty(area);
        history.render(area, &mut buf);

        (0..height)
            .map(|y| (0..width).map(|x| buf.get(x, y).symbol().to_string()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn wraps_on_word_boundaries_and_newlines() {
        assert_eq!(wrap_text("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap_text("a\n\nb", 10), vec!["a", "", "b"]);
        assert_eq!(wrap_text("ééé ééé", 3), vec!["ééé", "ééé"]);
    }

    #[test]
    fn renders_messages_and_streaming_text() {
        let mut history = ConversationHistory::new("chat1");
        history.sync(
            vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hello!")],
            Some("partial".to_string()),
            ChatStatus::Streaming,
        );

        let screen = render_to_string(&history, 40, 12);
        assert!(screen.contains("chat1"));
        assert!(screen.contains("streaming"));
        assert!(screen.contains("User"));
        assert!(screen.contains("Hello!"));
        assert!(screen.contains("partial▋"));
    }

    #[test]
    fn shows_failure_in_title() {
        let mut history = ConversationHistory::new("chat2");
        history.sync(vec![ChatMessage::user("Hi")], None, ChatStatus::Failed("boom".into()));
        assert!(render_to_string(&history, 40, 6).contains("error: boom"));
    }

    #[test]
    fn scrolling_reveals_older_lines_and_new_turns_snap_back() {
        let mut history = ConversationHistory::new("chat1");
        let messages: Vec<ChatMessage> = (0..10).map(|i| ChatMessage::user(format!("message {i}"))).collect();
        history.sync(messages.clone(), None, ChatStatus::Idle);

        let bottom = render_to_string(&history, 30, 6);
        assert!(bottom.contains("message 9"));
        assert!(!bottom.contains("message 0"));

        history.scroll_up(100);
        let top = render_to_string(&history, 30, 6);
        assert!(top.contains("message 0"));

        let mut more = messages;
        more.push(ChatMessage::assistant("latest"));
        history.sync(more, None, ChatStatus::Idle);
        assert!(render_to_string(&history, 30, 6).contains("latest"));
    }
}
