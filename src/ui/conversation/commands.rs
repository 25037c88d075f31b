use std::str::FromStr;

use crate::errors::DuetError;
use crate::export::ExportFormat;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Export the conversation
    Export,
    /// Choose the export format
    Format,
    /// Switch to a different model
    Model,
    /// Set the sampling temperature
    Temperature,
    /// Set the streaming throttle interval
    Throttle,
    /// Replace the system prompt
    System,
    /// Turn auto-converse on or off
    Auto,
    /// Set the auto-converse delay
    Delay,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// Format given to `/export` or `/format`, if any
    pub fn format_target(&self) -> Option<Result<ExportFormat, DuetError>> {
        match self.command {
            SlashCommand::Export | SlashCommand::Format => self.argument().map(str::parse),
            _ => None,
        }
    }

    /// Numeric argument of `/temperature`, `/throttle` and `/delay`
    pub fn number(&self) -> Option<f32> {
        self.argument()?.trim().parse().ok()
    }

    /// `on`/`off` argument of `/auto`; no argument toggles
    pub fn switch_target(&self) -> Option<bool> {
        match self.argument()?.trim().to_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => Some(true),
            "off" | "no" | "false" | "0" => Some(false),
            _ => None,
        }
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Export => "export the conversation (md or json)",
            SlashCommand::Format => "set the export format (md or json)",
            SlashCommand::Model => "switch to a different model",
            SlashCommand::Temperature => "set the temperature (0-2)",
            SlashCommand::Throttle => "set the throttle interval in seconds (0-1)",
            SlashCommand::System => "replace the system prompt",
            SlashCommand::Auto => "turn auto-converse on or off",
            SlashCommand::Delay => "set the conversation delay in seconds (0-3)",
            SlashCommand::Help => "show available commands",
            SlashCommand::Bye => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Return all built-in commands in a Vec paired with their command string.
pub fn built_in_slash_commands() -> Vec<(&'static str, SlashCommand)> {
    SlashCommand::iter().map(|c| (c.command(), c)).collect()
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim_start().strip_prefix('/')?;

    let (head, argument) = match rest.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, Some(tail.trim())),
        None => (rest.trim_end(), None),
    };

    let command = SlashCommand::from_str(head).ok().or_else(|| match head.to_lowercase().as_str() {
        "q" | "quit" | "exit" => Some(SlashCommand::Bye),
        "save" | "download" => Some(SlashCommand::Export),
        "temp" => Some(SlashCommand::Temperature),
        "prompt" => Some(SlashCommand::System),
        "converse" => Some(SlashCommand::Auto),
        _ => None,
    })?;

    let argument = argument.filter(|arg| !arg.is_empty()).map(str::to_string);

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for (command_str, command) in built_in_slash_commands() {
        help.push_str(&format!("/{} - {}\n", command_str, command.description()));
    }

    help.push_str("\nAliases: /q for /bye, /save for /export, /temp for /temperature, /prompt for /system");
    help.push_str("\nKeys: Tab switches focus, Ctrl+S exports, Ctrl+C quits.");

    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_and_argument() {
        let parsed = parse_slash_command("/system You are a pirate.  ").unwrap();
        assert_eq!(parsed.command, SlashCommand::System);
        assert_eq!(parsed.argument(), Some("You are a pirate."));

        let parsed = parse_slash_command("/export").unwrap();
        assert_eq!(parsed.command, SlashCommand::Export);
        assert_eq!(parsed.argument(), None);
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(parse_slash_command("/q").unwrap().command, SlashCommand::Bye);
        assert_eq!(parse_slash_command("/temp 1.2").unwrap().number(), Some(1.2));
        assert_eq!(parse_slash_command("/save json").unwrap().command, SlashCommand::Export);
    }

    #[test]
    fn unknown_or_plain_text_is_not_a_command() {
        assert!(parse_slash_command("/frobnicate").is_none());
        assert!(parse_slash_command("hello /export").is_none());
    }

    #[test]
    fn arguments_convert() {
        let parsed = parse_slash_command("/export json").unwrap();
        assert_eq!(parsed.format_target(), Some(Ok(ExportFormat::Json)));
        assert!(matches!(
            parse_slash_command("/format pdf").unwrap().format_target(),
            Some(Err(DuetError::UnknownFormat(_)))
        ));
        assert_eq!(parse_slash_command("/auto off").unwrap().switch_target(), Some(false));
        assert_eq!(parse_slash_command("/auto").unwrap().switch_target(), None);
    }

    #[test]
    fn help_lists_every_command() {
        let help = get_help_text();
        for (keyword, _) in built_in_slash_commands() {
            assert!(help.contains(&format!("/{keyword} ")));
        }
    }
}
