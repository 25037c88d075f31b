use crate::chat::ChatSession;
use crate::ui::conversation::composer::ConversationResult;
use crate::ui::conversation::{
    get_help_text, ConversationComposer, ConversationHistory, ParsedCommand, SlashCommand,
};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    widgets::Widget,
};
use std::time::Duration;

const PAGE: usize = 10;

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationAction {
    None,
    Exit,
    /// A command that changes application state (controls, export)
    Command(ParsedCommand),
}

/// One conversation panel: a chat session with its history and composer
pub struct ConversationManager {
    session: ChatSession,
    history: ConversationHistory,
    composer: ConversationComposer,
}

impl ConversationManager {
    pub fn new(session: ChatSession, placeholder: &str) -> Self {
        Self {
            history: ConversationHistory::new(session.id()),
            composer: ConversationComposer::new(placeholder),
            session,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Pull the session's latest state into the history view (called every tick)
    pub fn refresh(&mut self) {
        self.history.sync(
            self.session.messages(),
            self.session.streaming_text(),
            self.session.status(),
        );
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind == KeyEventKind::Press {
            match key.code {
                KeyCode::PageUp => {
                    self.history.scroll_up(PAGE);
                    return ConversationAction::None;
                }
                KeyCode::PageDown => {
                    self.history.scroll_down(PAGE);
                    return ConversationAction::None;
                }
                _ => {}
            }
        }

        match self.composer.handle_key(key) {
            ConversationResult::Submitted(input) => {
                self.session.ask_question(input, Duration::ZERO);
                ConversationAction::None
            }
            ConversationResult::Command(command) => self.handle_slash_command(command),
            ConversationResult::None => ConversationAction::None,
        }
    }

    pub fn handle_paste(&mut self, text: &str) {
        self.composer.insert_str(text);
    }

    /// Put `text` in the composer for the user to edit and send
    pub fn prefill(&mut self, text: impl Into<String>) {
        self.composer.set_content(text);
    }

    /// Whether Tab belongs to the composer's command palette right now
    pub fn captures_tab(&self) -> bool {
        self.composer.palette_open()
    }

    /// Set focus state
    pub fn set_focus(&mut self, has_focus: bool) {
        self.composer.set_focus(has_focus);
        self.history.set_focus(has_focus);
    }

    /// Handle slash commands local to the panel; the rest go to the app
    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        match command.command {
            SlashCommand::Bye => ConversationAction::Exit,
            SlashCommand::Help => {
                self.history.add_notice(get_help_text());
                ConversationAction::None
            }
            _ => ConversationAction::Command(command),
        }
    }
}

impl Widget for &ConversationManager {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),    // History
                Constraint::Length(5), // Composer
            ])
            .split(area);

        self.history.render(chunks[0], buf);
        self.composer.render(chunks[1], buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatSettings;
    use crate::llm::tests::{sse_body, test_config};
    use crate::llm::LlmClient;
    use crossterm::event::KeyModifiers;
    use tokio::sync::watch;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn panel(server: &MockServer) -> (watch::Sender<ChatSettings>, ConversationManager) {
        let (settings_tx, settings_rx) = watch::channel(ChatSettings {
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: String::new(),
            temperature: 0.7,
            throttle: Duration::ZERO,
        });
        let client = LlmClient::new(test_config(&server.uri())).unwrap();
        let session = ChatSession::spawn("chat1", settings_rx, client);
        (settings_tx, ConversationManager::new(session, "Type a message"))
    }

    fn type_line(manager: &mut ConversationManager, text: &str) -> ConversationAction {
        for c in text.chars() {
            manager.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
        manager.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE))
    }

    #[tokio::test]
    async fn submitted_text_is_asked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(&["hey"]), "text/event-stream"))
            .mount(&server)
            .await;
        let (_settings, mut manager) = panel(&server).await;

        assert_eq!(type_line(&mut manager, "Hi"), ConversationAction::None);

        let mut rx = manager.session().subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            while rx.borrow_and_update().len() < 2 {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        manager.refresh();
        assert_eq!(manager.history.message_count(), 2);
    }

    #[tokio::test]
    async fn commands_are_routed() {
        let server = MockServer::start().await;
        let (_settings, mut manager) = panel(&server).await;

        assert_eq!(type_line(&mut manager, "/help"), ConversationAction::None);
        assert_eq!(type_line(&mut manager, "/bye"), ConversationAction::Exit);
        match type_line(&mut manager, "/temperature 1.5") {
            ConversationAction::Command(parsed) => {
                assert_eq!(parsed.command, SlashCommand::Temperature);
                assert_eq!(parsed.number(), Some(1.5));
            }
            other => panic!("expected command, got {other:?}"),
        }
        assert!(manager.session().messages().is_empty());
    }
}
