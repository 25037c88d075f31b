use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString, IntoStaticStr};

/// Role of a chat turn
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    /// Capitalized name used in headings and panel labels
    pub fn display_name(&self) -> &'static str {
        match self {
            ChatRole::System => "System",
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        }
    }
}

/// A single turn of a conversation.
///
/// `content_html` caches the rendered form of assistant replies. It is never
/// serialized, so exports and API payloads only ever carry `role` and `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip)]
    pub content_html: Option<String>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            content_html: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    /// Assistant reply with its Markdown content rendered into the HTML cache
    pub fn assistant(content: impl Into<String>) -> Self {
        let content = content.into();
        let content_html = Some(render_html(&content));
        Self {
            role: ChatRole::Assistant,
            content,
            content_html,
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == ChatRole::Assistant
    }
}

fn render_html(markdown: &str) -> String {
    let parser = pulldown_cmark::Parser::new(markdown);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn assistant_messages_cache_rendered_html() {
        let message = ChatMessage::assistant("**bold** move");
        assert_eq!(message.content, "**bold** move");
        assert_eq!(
            message.content_html.as_deref(),
            Some("<p><strong>bold</strong> move</p>\n")
        );
        assert!(ChatMessage::user("hi").content_html.is_none());
    }

    #[test]
    fn serialization_skips_html_cache() {
        let message = ChatMessage::assistant("Hello!");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "Hello!"}));
    }

    #[test]
    fn roles_parse_and_display() {
        assert_eq!(ChatRole::from_str("assistant").unwrap(), ChatRole::Assistant);
        assert_eq!(ChatRole::User.as_ref(), "user");
        assert_eq!(ChatRole::System.display_name(), "System");
    }
}
