//! Auto-converse: each side's assistant replies are asked on the other side.

use crate::chat::{Asker, SessionLink};
use crate::message::ChatMessage;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;

/// One of the two panels of the dual chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }
}

/// Which side produced the most recently relayed assistant turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MostRecent {
    #[default]
    None,
    First,
    Second,
}

impl From<Side> for MostRecent {
    fn from(side: Side) -> Self {
        match side {
            Side::First => MostRecent::First,
            Side::Second => MostRecent::Second,
        }
    }
}

/// A reply to forward to the other side
#[derive(Debug, Clone, PartialEq)]
pub struct Relay {
    pub target: Side,
    pub content: String,
    pub delay: Duration,
}

/// Coordination state of one dual-chat app instance
pub struct AutoConverse {
    enabled: watch::Receiver<bool>,
    delay: watch::Receiver<Duration>,
    most_recent: MostRecent,
}

impl AutoConverse {
    pub fn new(enabled: watch::Receiver<bool>, delay: watch::Receiver<Duration>) -> Self {
        Self {
            enabled,
            delay,
            most_recent: MostRecent::None,
        }
    }

    pub fn most_recent(&self) -> MostRecent {
        self.most_recent
    }

    /// Handle a change of `side`'s conversation.
    ///
    /// The toggle and delay are read in isolation: flipping them never runs
    /// this handler, only conversation changes do.
    pub fn on_messages_changed(&mut self, side: Side, messages: &[ChatMessage]) -> Option<Relay> {
        if !*self.enabled.borrow() || self.most_recent == MostRecent::from(side) {
            return None;
        }

        let last = messages.last().filter(|message| message.is_assistant())?;
        let relay = Relay {
            target: side.other(),
            content: last.content.clone(),
            delay: *self.delay.borrow(),
        };
        self.most_recent = side.into();

        tracing::info!(from = ?side, to = ?relay.target, delay_ms = relay.delay.as_millis() as u64, "relaying reply");
        Some(relay)
    }

    /// Handle every append of both conversations, one at a time, until either session ends
    pub async fn run(mut self, mut first: SessionLink, mut second: SessionLink) {
        loop {
            let changed = tokio::select! {
                res = first.appended.recv() => res.map(|messages| (Side::First, messages)),
                res = second.appended.recv() => res.map(|messages| (Side::Second, messages)),
            };
            let (side, messages) = match changed {
                Ok(change) => change,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auto-converse fell behind, some changes were skipped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if let Some(relay) = self.on_messages_changed(side, &messages) {
                let target: &Asker = match relay.target {
                    Side::First => &first.asker,
                    Side::Second => &second.asker,
                };
                target.ask_question(relay.content, relay.delay);
            }
        }

        tracing::debug!(first = %first.id, second = %second.id, "auto-converse stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converse(enabled: bool) -> (watch::Sender<bool>, watch::Sender<Duration>, AutoConverse) {
        let (enabled_tx, enabled_rx) = watch::channel(enabled);
        let (delay_tx, delay_rx) = watch::channel(Duration::from_secs(1));
        (enabled_tx, delay_tx, AutoConverse::new(enabled_rx, delay_rx))
    }

    #[test]
    fn relays_assistant_reply_to_other_side() {
        let (_on, _delay, mut auto) = converse(true);
        let messages = vec![ChatMessage::user("Hi"), ChatMessage::assistant("hi")];

        let relay = auto.on_messages_changed(Side::First, &messages);

        assert_eq!(
            relay,
            Some(Relay {
                target: Side::Second,
                content: "hi".to_string(),
                delay: Duration::from_secs(1),
            })
        );
        assert_eq!(auto.most_recent(), MostRecent::First);
    }

    #[test]
    fn same_side_does_not_relay_twice() {
        let (_on, _delay, mut auto) = converse(true);
        let messages = vec![ChatMessage::assistant("hi")];

        assert!(auto.on_messages_changed(Side::First, &messages).is_some());
        assert!(auto.on_messages_changed(Side::First, &messages).is_none());
        assert_eq!(auto.most_recent(), MostRecent::First);
    }

    #[test]
    fn sides_alternate() {
        let (_on, _delay, mut auto) = converse(true);

        let a = vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hello")];
        assert_eq!(auto.on_messages_changed(Side::First, &a).unwrap().target, Side::Second);

        let b = vec![ChatMessage::user("Hello"), ChatMessage::assistant("How are you?")];
        let relay = auto.on_messages_changed(Side::Second, &b).unwrap();
        assert_eq!(relay.target, Side::First);
        assert_eq!(relay.content, "How are you?");
        assert_eq!(auto.most_recent(), MostRecent::Second);
    }

    #[test]
    fn toggle_off_never_relays() {
        let (_on, _delay, mut auto) = converse(false);
        let messages = vec![ChatMessage::assistant("hi")];

        assert!(auto.on_messages_changed(Side::First, &messages).is_none());
        assert!(auto.on_messages_changed(Side::Second, &messages).is_none());
        assert_eq!(auto.most_recent(), MostRecent::None);
    }

    #[test]
    fn user_turn_leaves_state_unchanged() {
        let (_on, _delay, mut auto) = converse(true);

        assert!(auto.on_messages_changed(Side::First, &[ChatMessage::user("typed")]).is_none());
        assert!(auto.on_messages_changed(Side::First, &[]).is_none());
        assert_eq!(auto.most_recent(), MostRecent::None);
    }

    #[tokio::test]
    async fn run_forwards_replies_between_sessions() {
        use crate::chat::{ChatSession, ChatSettings};
        use crate::llm::LlmClient;
        use crate::llm::tests::{sse_body, test_config};
        use crate::message::ChatRole;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body(&["pong"]), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let (_settings_tx, settings_rx) = watch::channel(ChatSettings {
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: String::new(),
            temperature: 0.7,
            throttle: Duration::ZERO,
        });
        let client = LlmClient::new(test_config(&server.uri())).unwrap();
        let first = ChatSession::spawn("chat1", settings_rx.clone(), client.clone());
        let second = ChatSession::spawn("chat2", settings_rx, client);

        let (_on, enabled) = watch::channel(true);
        let (_delay, delay) = watch::channel(Duration::ZERO);
        let relay = tokio::spawn(AutoConverse::new(enabled, delay).run(first.link(), second.link()));

        first.ask_question("Hi", Duration::ZERO);

        let mut rx = second.subscribe();
        let relayed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if rx.borrow_and_update().len() >= 2 {
                    return rx.borrow().clone();
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        assert_eq!(relayed[0].role, ChatRole::User);
        assert_eq!(relayed[0].content, "pong");
        assert_eq!(relayed[1].role, ChatRole::Assistant);

        relay.abort();
    }

    #[tokio::test]
    async fn reply_followed_by_queued_question_is_still_relayed() {
        use crate::chat::{ChatSession, ChatSettings};
        use crate::llm::LlmClient;
        use crate::llm::tests::{sse_body, test_config};
        use crate::message::ChatRole;
        use wiremock::matchers::{body_string_contains, method};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("q1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body(&["r1"]), "text/event-stream"),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("q2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body(&["r2"]), "text/event-stream"),
            )
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body(&["from b"]), "text/event-stream"),
            )
            .with_priority(3)
            .mount(&server)
            .await;

        let (_settings_tx, settings_rx) = watch::channel(ChatSettings {
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: String::new(),
            temperature: 0.7,
            throttle: Duration::ZERO,
        });
        let client = LlmClient::new(test_config(&server.uri())).unwrap();
        let first = ChatSession::spawn("chat1", settings_rx.clone(), client.clone());
        let second = ChatSession::spawn("chat2", settings_rx, client);

        let (_on, enabled) = watch::channel(true);
        let (_delay, delay) = watch::channel(Duration::from_millis(300));
        let relay = tokio::spawn(AutoConverse::new(enabled, delay).run(first.link(), second.link()));

        // q2 is queued behind q1, so r1 and q2 are appended back to back
        first.ask_question("q1", Duration::ZERO);
        first.ask_question("q2", Duration::ZERO);

        let mut rx = second.subscribe();
        let received = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(message) = rx.borrow_and_update().first() {
                    return message.clone();
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        assert_eq!(received.role, ChatRole::User);
        assert_eq!(received.content, "r1");

        relay.abort();
    }

    #[test]
    fn toggle_and_delay_are_read_at_handling_time() {
        let (on, delay, mut auto) = converse(false);
        let messages = vec![ChatMessage::assistant("hi")];
        assert!(auto.on_messages_changed(Side::First, &messages).is_none());

        on.send_replace(true);
        delay.send_replace(Duration::from_millis(400));
        let relay = auto.on_messages_changed(Side::First, &messages).unwrap();
        assert_eq!(relay.delay, Duration::from_millis(400));
    }
}
