use crate::llm::LlmEvent;
use std::time::{Duration, Instant};

/// Rate limiter for UI updates while a reply streams in
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Whether an update may be published at `now`. Records the emission when it may.
    pub fn ready(&mut self, now: Instant) -> bool {
        let ready = match self.last_emit {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if ready {
            self.last_emit = Some(now);
        }
        ready
    }

    pub fn reset(&mut self) {
        self.last_emit = None;
    }
}

/// What the UI should do after an LLM event was processed
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// Nothing to publish yet
    Pending,
    /// Publish the partial text
    Partial(String),
    /// The reply is complete
    Complete(String),
    /// The stream failed
    Failed(String),
}

/// Accumulates streamed deltas and decides when partial text is published
#[derive(Debug, Clone)]
pub struct StreamController {
    text_buffer: String,
    throttle: Throttle,
    is_streaming: bool,
    dirty: bool,
}

impl StreamController {
    pub fn new(throttle: Duration) -> Self {
        Self {
            text_buffer: String::new(),
            throttle: Throttle::new(throttle),
            is_streaming: false,
            dirty: false,
        }
    }

    /// Start streaming
    pub fn start_streaming(&mut self) {
        self.text_buffer.clear();
        self.throttle.reset();
        self.is_streaming = true;
        self.dirty = false;
    }

    /// Process an LLM event
    pub fn process_event(&mut self, event: LlmEvent, now: Instant) -> StreamUpdate {
        match event {
            LlmEvent::TextDelta(delta) => {
                self.text_buffer.push_str(&delta);
                self.dirty = true;
                self.flush(now)
            }
            LlmEvent::ResponseComplete(content) => {
                // Providers that do not stream deltas only send the full text
                if self.text_buffer.is_empty() {
                    self.text_buffer = content;
                }
                StreamUpdate::Pending
            }
            LlmEvent::StreamComplete => {
                self.is_streaming = false;
                self.dirty = false;
                StreamUpdate::Complete(std::mem::take(&mut self.text_buffer))
            }
            LlmEvent::Error(error) => {
                self.is_streaming = false;
                self.dirty = false;
                self.text_buffer.clear();
                StreamUpdate::Failed(error)
            }
        }
    }

    /// Publish buffered text if the throttle allows it
    pub fn flush(&mut self, now: Instant) -> StreamUpdate {
        if self.dirty && self.throttle.ready(now) {
            self.dirty = false;
            StreamUpdate::Partial(self.text_buffer.clone())
        } else {
            StreamUpdate::Pending
        }
    }

    /// Whether buffered text is waiting for the throttle
    pub fn has_pending(&self) -> bool {
        self.dirty
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_spaces_emissions() {
        let start = Instant::now();
        let mut throttle = Throttle::new(Duration::from_millis(100));

        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_millis(50)));
        assert!(throttle.ready(start + Duration::from_millis(100)));
        assert!(!throttle.ready(start + Duration::from_millis(150)));
    }

    #[test]
    fn zero_interval_never_throttles() {
        let start = Instant::now();
        let mut throttle = Throttle::new(Duration::ZERO);
        assert!(throttle.ready(start));
        assert!(throttle.ready(start));
    }

    #[test]
    fn partial_updates_are_throttled_and_final_text_is_kept() {
        let start = Instant::now();
        let mut controller = StreamController::new(Duration::from_millis(100));
        controller.start_streaming();

        assert_eq!(
            controller.process_event(LlmEvent::TextDelta("Hel".into()), start),
            StreamUpdate::Partial("Hel".into())
        );
        assert_eq!(
            controller.process_event(LlmEvent::TextDelta("lo".into()), start + Duration::from_millis(10)),
            StreamUpdate::Pending
        );
        assert!(controller.has_pending());
        assert_eq!(
            controller.flush(start + Duration::from_millis(120)),
            StreamUpdate::Partial("Hello".into())
        );
        assert!(!controller.has_pending());

        controller.process_event(LlmEvent::TextDelta("!".into()), start + Duration::from_millis(130));
        controller.process_event(
            LlmEvent::ResponseComplete("Hello!".into()),
            start + Duration::from_millis(131),
        );
        assert_eq!(
            controller.process_event(LlmEvent::StreamComplete, start + Duration::from_millis(132)),
            StreamUpdate::Complete("Hello!".into())
        );
        assert!(!controller.is_streaming());
    }

    #[test]
    fn full_response_without_deltas_is_used() {
        let now = Instant::now();
        let mut controller = StreamController::new(Duration::ZERO);
        controller.start_streaming();
        controller.process_event(LlmEvent::ResponseComplete("whole".into()), now);
        assert_eq!(
            controller.process_event(LlmEvent::StreamComplete, now),
            StreamUpdate::Complete("whole".into())
        );
    }

    #[test]
    fn errors_discard_partial_text() {
        let now = Instant::now();
        let mut controller = StreamController::new(Duration::ZERO);
        controller.start_streaming();
        controller.process_event(LlmEvent::TextDelta("part".into()), now);
        assert_eq!(
            controller.process_event(LlmEvent::Error("boom".into()), now),
            StreamUpdate::Failed("boom".into())
        );
        assert!(!controller.is_streaming());
    }
}
