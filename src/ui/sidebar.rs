//! Settings sidebar shared by both applications

use crate::controls::{AppKind, ControlId, Controls, Slider};
use crate::export::ExportFormat;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};
use std::path::Path;

const BAR_WIDTH: usize = 12;

pub struct Sidebar<'a> {
    pub title: &'a str,
    pub controls: &'a Controls,
    pub selected: usize,
    pub has_focus: bool,
    /// Where Ctrl+S writes, shown in the single app
    pub export_dir: Option<&'a Path>,
}

impl Sidebar<'_> {
    fn control_lines(&self) -> Vec<Line<'static>> {
        let mut lines = vec![
            Line::from(Span::styled(
                self.title.to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];

        if self.controls.kind() == AppKind::Dual {
            lines.push(Line::from(Span::styled("Model", Style::default().fg(Color::Gray))));
            lines.push(Line::from(format!("  {}", self.controls.model.value())));
            lines.push(Line::from(""));
        }

        for (index, id) in self.controls.ids().iter().enumerate() {
            let selected = index == self.selected;
            let marker = if selected && self.has_focus { "▶ " } else { "  " };
            let label_style = if selected && self.has_focus {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };

            lines.push(Line::from(vec![
                Span::styled(marker, label_style),
                Span::styled(control_label(*id), label_style),
            ]));
            lines.push(Line::from(format!("  {}", control_value(self.controls, *id))));
            lines.push(Line::from(""));
        }

        if let Some(dir) = self.export_dir {
            lines.push(Line::from(Span::styled(
                format!("Ctrl+S saves to {}", dir.display()),
                Style::default().fg(Color::DarkGray),
            )));
        }
        lines.push(Line::from(Span::styled(
            "Tab focus · ↑↓ select · ←→ adjust",
            Style::default().fg(Color::DarkGray),
        )));

        lines
    }
}

impl Widget for Sidebar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Settings ")
            .border_style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        Paragraph::new(self.control_lines())
            .block(block)
            .wrap(Wrap { trim: false })
            .render(area, buf);
    }
}

pub fn control_label(id: ControlId) -> &'static str {
    match id {
        ControlId::Model => "Model",
        ControlId::Temperature => "Temperature",
        ControlId::Throttle => "Throttle interval (seconds)",
        ControlId::SystemPrompt => "System prompt (/system)",
        ControlId::DownloadFormat => "Download format",
        ControlId::AutoConverse => "Converse with self",
        ControlId::ConverseDelay => "Conversation delay (seconds)",
    }
}

/// Current value of a control as shown in the sidebar
pub fn control_value(controls: &Controls, id: ControlId) -> String {
    match id {
        ControlId::Model => format!("◀ {} ▶", controls.model.value()),
        ControlId::Temperature => slider_bar(&controls.temperature),
        ControlId::Throttle => slider_bar(&controls.throttle),
        ControlId::ConverseDelay => slider_bar(&controls.converse_delay),
        ControlId::SystemPrompt => controls.system_prompt.clone(),
        ControlId::DownloadFormat => ExportFormat::ALL
            .iter()
            .map(|format| {
                let mark = if *format == controls.download_format { "(•)" } else { "( )" };
                format!("{mark} {}", format.display_name())
            })
            .collect::<Vec<_>>()
            .join("  "),
        ControlId::AutoConverse => if controls.auto_converse { "[x] on" } else { "[ ] off" }.to_string(),
    }
}

fn slider_bar(slider: &Slider) -> String {
    let (min, max) = slider.range();
    let fraction = if max > min { (slider.value() - min) / (max - min) } else { 0.0 };
    let filled = (fraction * BAR_WIDTH as f32).round() as usize;
    format!(
        "{}{} {:.2}",
        "█".repeat(filled),
        "░".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)),
        slider.value()
    )
}
