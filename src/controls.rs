//! Sidebar inputs and the `watch` channels they publish into.

use crate::chat::ChatSettings;
use crate::config::Config;
use crate::errors::{DuetError, DuetResult};
use crate::export::ExportFormat;
use std::time::Duration;
use tokio::sync::watch;

/// Numeric input with a range and a step grid
#[derive(Debug, Clone, PartialEq)]
pub struct Slider {
    pub label: &'static str,
    min: f32,
    max: f32,
    step: f32,
    value: f32,
}

impl Slider {
    pub fn new(label: &'static str, min: f32, max: f32, step: f32, value: f32) -> DuetResult<Self> {
        let mut slider = Self {
            label,
            min,
            max,
            step,
            value: min,
        };
        slider.try_set(value)?;
        Ok(slider)
    }

    pub fn temperature(value: f32) -> DuetResult<Self> {
        Self::new("Temperature", 0.0, 2.0, 0.05, value)
    }

    pub fn throttle(value: f32) -> DuetResult<Self> {
        Self::new("Throttle interval (seconds)", 0.0, 1.0, 0.05, value)
    }

    pub fn converse_delay(value: f32) -> DuetResult<Self> {
        Self::new("Conversation delay (seconds)", 0.0, 3.0, 0.2, value)
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Clamp into range and snap to the nearest step
    pub fn set(&mut self, value: f32) -> f32 {
        let value = if value.is_finite() { value } else { self.min };
        let steps = ((value.clamp(self.min, self.max) - self.min) / self.step).round();
        let snapped = (self.min + steps * self.step).clamp(self.min, self.max);
        // keep 0.05-style steps free of float noise
        self.value = (snapped * 1000.0).round() / 1000.0;
        self.value
    }

    /// Like `set`, but rejects values outside the range
    pub fn try_set(&mut self, value: f32) -> DuetResult<f32> {
        if !value.is_finite() || value < self.min || value > self.max {
            return Err(DuetError::OutOfRange {
                name: self.label,
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(self.set(value))
    }

    pub fn increment(&mut self) -> f32 {
        self.set(self.value + self.step)
    }

    pub fn decrement(&mut self) -> f32 {
        self.set(self.value - self.step)
    }
}

/// Single choice out of a fixed list
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub label: &'static str,
    choices: Vec<String>,
    index: usize,
}

impl Select {
    pub fn new(label: &'static str, choices: Vec<String>, selected: &str) -> DuetResult<Self> {
        let index = choices
            .iter()
            .position(|choice| choice == selected)
            .ok_or_else(|| DuetError::UnknownModel(selected.to_string()))?;
        Ok(Self { label, choices, index })
    }

    pub fn value(&self) -> &str {
        &self.choices[self.index]
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    pub fn set(&mut self, choice: &str) -> DuetResult<()> {
        self.index = self
            .choices
            .iter()
            .position(|c| c == choice)
            .ok_or_else(|| DuetError::UnknownModel(choice.to_string()))?;
        Ok(())
    }

    /// Move the selection by `delta`, wrapping around
    pub fn cycle(&mut self, delta: isize) {
        let len = self.choices.len() as isize;
        self.index = (self.index as isize + delta).rem_euclid(len) as usize;
    }
}

/// Which application the controls belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    Single,
    Dual,
}

/// Inputs that can be focused in the sidebar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlId {
    Model,
    Temperature,
    Throttle,
    SystemPrompt,
    DownloadFormat,
    AutoConverse,
    ConverseDelay,
}

const SINGLE_CONTROLS: &[ControlId] = &[
    ControlId::Model,
    ControlId::Temperature,
    ControlId::Throttle,
    ControlId::SystemPrompt,
    ControlId::DownloadFormat,
];

const DUAL_CONTROLS: &[ControlId] = &[
    ControlId::Temperature,
    ControlId::AutoConverse,
    ControlId::ConverseDelay,
];

/// All sidebar inputs of one application
pub struct Controls {
    kind: AppKind,
    pub model: Select,
    pub temperature: Slider,
    pub throttle: Slider,
    pub system_prompt: String,
    pub download_format: ExportFormat,
    pub auto_converse: bool,
    pub converse_delay: Slider,
    settings: watch::Sender<ChatSettings>,
    auto: watch::Sender<bool>,
    delay: watch::Sender<Duration>,
}

impl Controls {
    pub fn new(kind: AppKind, config: &Config, auto_converse: bool) -> DuetResult<Self> {
        let model = Select::new("Model", config.available_models(), &config.default_model)?;
        let temperature = Slider::temperature(config.temperature)?;
        let throttle = Slider::throttle(config.throttle)?;
        let converse_delay = Slider::converse_delay(config.auto_converse_delay)?;

        let settings = ChatSettings {
            model: model.value().to_string(),
            system_prompt: config.system_prompt.clone(),
            temperature: temperature.value(),
            throttle: Duration::from_secs_f32(throttle.value()),
        };
        let delay = Duration::from_secs_f32(converse_delay.value());

        Ok(Self {
            kind,
            model,
            temperature,
            throttle,
            system_prompt: config.system_prompt.clone(),
            download_format: ExportFormat::default(),
            auto_converse,
            converse_delay,
            settings: watch::channel(settings).0,
            auto: watch::channel(auto_converse).0,
            delay: watch::channel(delay).0,
        })
    }

    pub fn kind(&self) -> AppKind {
        self.kind
    }

    /// Inputs shown in this application's sidebar, in display order
    pub fn ids(&self) -> &'static [ControlId] {
        match self.kind {
            AppKind::Single => SINGLE_CONTROLS,
            AppKind::Dual => DUAL_CONTROLS,
        }
    }

    pub fn settings(&self) -> watch::Receiver<ChatSettings> {
        self.settings.subscribe()
    }

    pub fn auto_converse_rx(&self) -> watch::Receiver<bool> {
        self.auto.subscribe()
    }

    pub fn converse_delay_rx(&self) -> watch::Receiver<Duration> {
        self.delay.subscribe()
    }

    /// Left/Right on a focused input
    pub fn adjust(&mut self, id: ControlId, forward: bool) {
        match id {
            ControlId::Model => self.model.cycle(if forward { 1 } else { -1 }),
            ControlId::Temperature => {
                if forward {
                    self.temperature.increment();
                } else {
                    self.temperature.decrement();
                }
            }
            ControlId::Throttle => {
                if forward {
                    self.throttle.increment();
                } else {
                    self.throttle.decrement();
                }
            }
            ControlId::ConverseDelay => {
                if forward {
                    self.converse_delay.increment();
                } else {
                    self.converse_delay.decrement();
                }
            }
            ControlId::DownloadFormat => {
                self.download_format = match self.download_format {
                    ExportFormat::Markdown => ExportFormat::Json,
                    ExportFormat::Json => ExportFormat::Markdown,
                }
            }
            ControlId::AutoConverse => self.auto_converse = !self.auto_converse,
            ControlId::SystemPrompt => return,
        }
        self.publish();
    }

    pub fn set_model(&mut self, model: &str) -> DuetResult<()> {
        self.model.set(model)?;
        self.publish();
        Ok(())
    }

    pub fn set_temperature(&mut self, value: f32) -> DuetResult<f32> {
        let value = self.temperature.try_set(value)?;
        self.publish();
        Ok(value)
    }

    pub fn set_throttle(&mut self, value: f32) -> DuetResult<f32> {
        let value = self.throttle.try_set(value)?;
        self.publish();
        Ok(value)
    }

    pub fn set_converse_delay(&mut self, value: f32) -> DuetResult<f32> {
        let value = self.converse_delay.try_set(value)?;
        self.publish();
        Ok(value)
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
        self.publish();
    }

    pub fn set_auto_converse(&mut self, on: bool) {
        self.auto_converse = on;
        self.publish();
    }

    /// Push current values to subscribers, notifying only on real changes
    fn publish(&self) {
        let settings = ChatSettings {
            model: self.model.value().to_string(),
            system_prompt: self.system_prompt.clone(),
            temperature: self.temperature.value(),
            throttle: Duration::from_secs_f32(self.throttle.value()),
        };
        self.settings.send_if_modified(|current| replace_if_changed(current, settings));
        self.auto.send_if_modified(|current| replace_if_changed(current, self.auto_converse));
        let delay = Duration::from_secs_f32(self.converse_delay.value());
        self.delay.send_if_modified(|current| replace_if_changed(current, delay));
    }
}

fn replace_if_changed<T: PartialEq>(current: &mut T, next: T) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slider_snaps_to_step_and_clamps() {
        let mut temperature = Slider::temperature(0.7).unwrap();
        assert_eq!(temperature.value(), 0.7);
        assert_eq!(temperature.set(0.73), 0.75);
        assert_eq!(temperature.set(5.0), 2.0);
        assert_eq!(temperature.set(-1.0), 0.0);
        assert_eq!(temperature.increment(), 0.05);

        let mut delay = Slider::converse_delay(1.0).unwrap();
        assert_eq!(delay.increment(), 1.2);
        assert_eq!(delay.set(2.95), 3.0);
        assert_eq!(delay.increment(), 3.0);
    }

    #[test]
    fn slider_rejects_out_of_range_defaults() {
        assert!(matches!(
            Slider::throttle(1.5),
            Err(DuetError::OutOfRange { name: "Throttle interval (seconds)", .. })
        ));
        assert!(Slider::temperature(f32::NAN).is_err());
    }

    #[test]
    fn select_cycles_and_validates() {
        let mut select = Select::new(
            "Model",
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            "b",
        )
        .unwrap();
        select.cycle(1);
        assert_eq!(select.value(), "c");
        select.cycle(1);
        assert_eq!(select.value(), "a");
        select.cycle(-1);
        assert_eq!(select.value(), "c");
        assert_eq!(select.set("zzz"), Err(DuetError::UnknownModel("zzz".to_string())));
    }

    #[test]
    fn edits_reach_subscribers() {
        let mut controls = Controls::new(AppKind::Single, &Config::default(), false).unwrap();
        let mut settings = controls.settings();
        let mut auto = controls.auto_converse_rx();
        assert_eq!(settings.borrow_and_update().temperature, 0.7);

        controls.set_temperature(1.1).unwrap();
        controls.set_system_prompt("Be terse.");
        assert!(settings.has_changed().unwrap());
        let current = settings.borrow_and_update().clone();
        assert_eq!(current.temperature, 1.1);
        assert_eq!(current.system_prompt, "Be terse.");

        // untouched values do not notify
        assert!(!auto.has_changed().unwrap());
        controls.adjust(ControlId::AutoConverse, true);
        assert!(auto.has_changed().unwrap());
        assert!(*auto.borrow_and_update());
    }

    #[test]
    fn format_radio_toggles() {
        let mut controls = Controls::new(AppKind::Single, &Config::default(), false).unwrap();
        assert_eq!(controls.download_format, ExportFormat::Markdown);
        controls.adjust(ControlId::DownloadFormat, true);
        assert_eq!(controls.download_format, ExportFormat::Json);
    }

    #[test]
    fn each_app_lists_its_inputs() {
        let single = Controls::new(AppKind::Single, &Config::default(), false).unwrap();
        let dual = Controls::new(AppKind::Dual, &Config::default(), true).unwrap();
        assert!(single.ids().contains(&ControlId::DownloadFormat));
        assert!(!single.ids().contains(&ControlId::AutoConverse));
        assert_eq!(dual.ids().first(), Some(&ControlId::Temperature));
        assert!(*dual.auto_converse_rx().borrow());
    }
}
