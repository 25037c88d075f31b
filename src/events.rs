use crossterm::event::{Event, EventStream, KeyEvent, KeyEventKind};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Redraw cadence; also how often panels pull session state
pub const TICK_RATE: Duration = Duration::from_millis(50);

/// TUI-specific events (keyboard, paste, resize, redraw tick)
#[derive(Debug, Clone, PartialEq)]
pub enum TuiEvent {
    /// Key press event
    Key(KeyEvent),

    /// Bracketed paste
    Paste(String),

    /// Terminal resize
    Resize(u16, u16),

    /// Redraw request
    Tick,
}

impl TuiEvent {
    /// Map a raw terminal event; key releases and repeats are dropped
    pub fn from_crossterm(event: Event) -> Option<Self> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => Some(TuiEvent::Key(key)),
            Event::Paste(text) => Some(TuiEvent::Paste(text)),
            Event::Resize(w, h) => Some(TuiEvent::Resize(w, h)),
            _ => None,
        }
    }
}

/// Merges terminal input with a periodic tick on one channel
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<TuiEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let tx_events = tx.clone();
        let reader = tokio::spawn(async move {
            let mut reader = EventStream::new();
            while let Some(event) = reader.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("terminal event error: {e}");
                        continue;
                    }
                };
                if let Some(event) = TuiEvent::from_crossterm(event) {
                    if tx_events.send(event).is_err() {
                        break;
                    }
                }
            }
        });

        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_rate);
            loop {
                interval.tick().await;
                if tx.send(TuiEvent::Tick).is_err() {
                    break;
                }
            }
        });

        Self {
            rx,
            tasks: vec![reader, ticker],
        }
    }

    pub async fn next(&mut self) -> Option<TuiEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
