//! One chat session talking to the completion API, run on its own task.

use crate::llm::{LlmClient, LlmEvent, LlmMessage, LlmRequest};
use crate::message::ChatMessage;
use crate::streaming::{StreamController, StreamUpdate};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Inputs a session reads whenever it starts a request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub throttle: Duration,
}

/// Request state shown in the panel header
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ChatStatus {
    #[default]
    Idle,
    Waiting,
    Streaming,
    Failed(String),
}

/// Schedules user turns into a session. Cheap to clone.
#[derive(Clone)]
pub struct Asker {
    tx: mpsc::UnboundedSender<String>,
    timers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Asker {
    /// Queue `content` as the next user turn once `delay` has passed.
    /// Never blocks; a delayed question is a timer task owned by the session.
    pub fn ask_question(&self, content: impl Into<String>, delay: Duration) {
        let content = content.into();

        if delay.is_zero() {
            send_question(&self.tx, content);
            return;
        }

        let tx = self.tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            send_question(&tx, content);
        });

        if let Ok(mut timers) = self.timers.lock() {
            timers.retain(|timer| !timer.is_finished());
            timers.push(timer);
        }
    }

    /// Abort every question still waiting on its delay
    pub fn cancel_pending(&self) {
        if let Ok(mut timers) = self.timers.lock() {
            for timer in timers.drain(..) {
                timer.abort();
            }
        }
    }
}

fn send_question(tx: &mpsc::UnboundedSender<String>, content: String) {
    if tx.send(content).is_err() {
        tracing::debug!("session ended, question dropped");
    }
}

/// Snapshots kept for slow `SessionLink` readers before they start lagging
const APPEND_BACKLOG: usize = 64;

/// What another component needs to observe a session and feed it questions.
/// `appended` yields the conversation after every single append, in order.
pub struct SessionLink {
    pub id: String,
    pub appended: broadcast::Receiver<Vec<ChatMessage>>,
    pub asker: Asker,
}

/// A running conversation
pub struct ChatSession {
    id: String,
    messages: watch::Receiver<Vec<ChatMessage>>,
    appended: broadcast::Sender<Vec<ChatMessage>>,
    streaming: watch::Receiver<Option<String>>,
    status: watch::Receiver<ChatStatus>,
    asker: Asker,
    worker: JoinHandle<()>,
}

impl ChatSession {
    /// Start a session. `settings` is read (without waiting on changes) each time
    /// a request is built, so edits apply from the next turn on.
    pub fn spawn(id: impl Into<String>, settings: watch::Receiver<ChatSettings>, client: LlmClient) -> Self {
        let id = id.into();
        let (question_tx, question_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = watch::channel(Vec::new());
        let (appended_tx, _) = broadcast::channel(APPEND_BACKLOG);
        let (streaming_tx, streaming_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(ChatStatus::Idle);

        let worker = Worker {
            id: id.clone(),
            settings,
            client,
            messages: messages_tx,
            appended: appended_tx.clone(),
            streaming: streaming_tx,
            status: status_tx,
        };
        let worker = tokio::spawn(worker.run(question_rx));

        tracing::info!(session = %id, "chat session started");

        Self {
            id,
            messages: messages_rx,
            appended: appended_tx,
            streaming: streaming_rx,
            status: status_rx,
            asker: Asker {
                tx: question_tx,
                timers: Arc::new(Mutex::new(Vec::new())),
            },
            worker,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current conversation
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.borrow().clone()
    }

    /// Receiver notified every time a message is appended
    pub fn subscribe(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.messages.clone()
    }

    /// Partial text of the reply currently streaming in
    pub fn streaming_text(&self) -> Option<String> {
        self.streaming.borrow().clone()
    }

    pub fn status(&self) -> ChatStatus {
        self.status.borrow().clone()
    }

    pub fn ask_question(&self, content: impl Into<String>, delay: Duration) {
        self.asker.ask_question(content, delay);
    }

    pub fn cancel_pending(&self) {
        self.asker.cancel_pending();
    }

    pub fn link(&self) -> SessionLink {
        SessionLink {
            id: self.id.clone(),
            appended: self.appended.subscribe(),
            asker: self.asker.clone(),
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.asker.cancel_pending();
        self.worker.abort();
        tracing::debug!(session = %self.id, "chat session closed");
    }
}

struct Worker {
    id: String,
    settings: watch::Receiver<ChatSettings>,
    client: LlmClient,
    messages: watch::Sender<Vec<ChatMessage>>,
    appended: broadcast::Sender<Vec<ChatMessage>>,
    streaming: watch::Sender<Option<String>>,
    status: watch::Sender<ChatStatus>,
}

impl Worker {
    async fn run(self, mut questions: mpsc::UnboundedReceiver<String>) {
        while let Some(question) = questions.recv().await {
            if question.trim().is_empty() {
                continue;
            }

            self.append(ChatMessage::user(question));

            let settings = self.settings.borrow().clone();
            let request = build_request(&settings, &self.messages.borrow());
            self.status.send_replace(ChatStatus::Waiting);

            let outcome = match self.client.stream_response(request).await {
                Ok(events) => self.stream_reply(events, settings.throttle).await,
                Err(e) => Err(e.to_string()),
            };
            self.streaming.send_replace(None);

            match outcome {
                Ok(reply) => {
                    tracing::debug!(session = %self.id, chars = reply.len(), "assistant reply complete");
                    self.append(ChatMessage::assistant(reply));
                    self.status.send_replace(ChatStatus::Idle);
                }
                Err(error) => {
                    tracing::error!(session = %self.id, "completion failed: {error}");
                    self.status.send_replace(ChatStatus::Failed(error));
                }
            }
        }
    }

    /// Drive one streamed reply, publishing partial text at most once per `throttle`
    async fn stream_reply(
        &self,
        mut events: mpsc::Receiver<LlmEvent>,
        throttle: Duration,
    ) -> Result<String, String> {
        let mut controller = StreamController::new(throttle);
        controller.start_streaming();

        loop {
            let event = if controller.has_pending() {
                tokio::select! {
                    event = events.recv() => event,
                    _ = tokio::time::sleep(throttle) => {
                        self.publish(controller.flush(Instant::now()));
                        continue;
                    }
                }
            } else {
                events.recv().await
            };

            let Some(event) = event else {
                return Err("Response stream ended unexpectedly".to_string());
            };

            match controller.process_event(event, Instant::now()) {
                StreamUpdate::Complete(text) => return Ok(text),
                StreamUpdate::Failed(error) => return Err(error),
                update => self.publish(update),
            }
        }
    }

    /// Publish the grown conversation to both the latest-value and the per-append channel
    fn append(&self, message: ChatMessage) {
        self.messages.send_modify(|messages| messages.push(message));
        // Err only means nobody is linked
        let _ = self.appended.send(self.messages.borrow().clone());
    }

    fn publish(&self, update: StreamUpdate) {
        if let StreamUpdate::Partial(text) = update {
            self.status.send_replace(ChatStatus::Streaming);
            self.streaming.send_replace(Some(text));
        }
    }
}

/// System prompt first, then the whole visible conversation
fn build_request(settings: &ChatSettings, messages: &[ChatMessage]) -> LlmRequest {
    let mut payload = Vec::with_capacity(messages.len() + 1);
    if !settings.system_prompt.trim().is_empty() {
        payload.push(LlmMessage::from(&ChatMessage::system(settings.system_prompt.clone())));
    }
    payload.extend(messages.iter().map(LlmMessage::from));

    LlmRequest::new(settings.model.clone(), payload).with_temperature(settings.temperature)
}
