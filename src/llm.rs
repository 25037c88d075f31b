use crate::config::{Config, ModelProvider};
use crate::errors::DuetError;
use crate::message::ChatMessage;
use anyhow::Result;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Events emitted during LLM streaming
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// Text delta from streaming response
    TextDelta(String),
    /// Complete response text
    ResponseComplete(String),
    /// Stream completed
    StreamComplete,
    /// Error occurred
    Error(String),
}

/// Request to send to LLM
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<LlmMessage>,
    pub temperature: Option<f32>,
}

/// Message in API payload form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl From<&ChatMessage> for LlmMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_ref().to_string(),
            content: message.content.clone(),
        }
    }
}

/// LLM client for streaming responses
#[derive(Clone)]
pub struct LlmClient {
    config: Config,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self { config, client })
    }

    /// Stream a response from the configured LLM provider
    pub async fn stream_response(&self, request: LlmRequest) -> Result<mpsc::Receiver<LlmEvent>> {
        let (tx, rx) = mpsc::channel(1000);

        let Some(api_key) = self.config.get_api_key() else {
            let err = DuetError::MissingApiKey(self.config.api_key_env());
            let _ = tx.send(LlmEvent::Error(err.to_string())).await;
            return Ok(rx);
        };

        let provider = self
            .config
            .current_provider()
            .ok_or_else(|| DuetError::UnsupportedProvider(self.config.provider.clone()))?
            .clone();

        let client = self.client.clone();
        let tx_clone = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = Self::stream_from_provider(client, provider, api_key, request, tx).await {
                tracing::warn!("completion stream failed: {e}");
                let _ = tx_clone.send(LlmEvent::Error(e.to_string())).await;
            }
        });

        Ok(rx)
    }

    /// Stream from specific provider
    async fn stream_from_provider(
        client: reqwest::Client,
        provider: ModelProvider,
        api_key: String,
        request: LlmRequest,
        tx: mpsc::Sender<LlmEvent>,
    ) -> Result<()> {
        let url = format!("{}/v1/chat/completions", provider.base_url.trim_end_matches('/'));

        let payload = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "stream": true,
            "temperature": request.temperature.unwrap_or(0.7)
        });

        let mut builder = client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json");

        builder = match provider.name.to_lowercase().as_str() {
            "openai" => builder,
            "openrouter" => builder
                .header("HTTP-Referer", "https://github.com/duet-chat/duet")
                .header("X-Title", "Duet"),
            _ => return Err(DuetError::UnsupportedProvider(provider.name).into()),
        };

        tracing::debug!(%url, model = %request.model, messages = request.messages.len(), "sending completion request");

        let response = builder.json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DuetError::Api { status, body }.into());
        }

        Self::process_sse_stream(response, tx).await
    }

    /// Process Server-Sent Events stream. Stops early once the receiver is gone.
    async fn process_sse_stream(response: reqwest::Response, tx: mpsc::Sender<LlmEvent>) -> Result<()> {
        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut assistant_text = String::new();

        while let Some(chunk) = stream.next().await {
            lines.push(&chunk?);

            while let Some(line) = lines.next_line() {
                match parse_sse_line(&line) {
                    SseLine::Done => {
                        Self::send_completion(&tx, assistant_text).await;
                        return Ok(());
                    }
                    SseLine::Delta(content) => {
                        assistant_text.push_str(&content);
                        if tx.send(LlmEvent::TextDelta(content)).await.is_err() {
                            tracing::debug!("completion receiver dropped, abandoning stream");
                            return Ok(());
                        }
                    }
                    SseLine::Skip => {}
                }
            }
        }

        // Flush any remaining buffer line (without newline)
        if let SseLine::Delta(content) = parse_sse_line(&lines.finish()) {
            assistant_text.push_str(&content);
            if tx.send(LlmEvent::TextDelta(content)).await.is_err() {
                return Ok(());
            }
        }

        Self::send_completion(&tx, assistant_text).await;
        Ok(())
    }

    async fn send_completion(tx: &mpsc::Sender<LlmEvent>, text: String) {
        if tx.send(LlmEvent::ResponseComplete(text)).await.is_ok() {
            let _ = tx.send(LlmEvent::StreamComplete).await;
        }
    }
}

/// Raw response bytes split into lines. Bytes are only decoded once a whole
/// line has arrived, so characters split across network chunks survive.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }

    /// Whatever is left once the stream ended
    fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.bytes);
        String::from_utf8_lossy(&rest).trim().to_string()
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    serde_json::from_str::<serde_json::Value>(data)
        .ok()
        .and_then(|chunk| {
            chunk
                .get("choices")?
                .get(0)?
                .get("delta")?
                .get("content")?
                .as_str()
                .map(str::to_string)
        })
        .filter(|content| !content.is_empty())
        .map(SseLine::Delta)
        .unwrap_or(SseLine::Skip)
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<LlmMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}
