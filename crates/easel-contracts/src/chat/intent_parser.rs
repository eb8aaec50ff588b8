use super::command_registry::{find_action, CommandAction};

/// One line of chat input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Noop,
    Help,
    ClearMemory,
    /// `None` toggles the current setting.
    Feedback(Option<bool>),
    History,
    Exit,
    Generate(String),
    Invalid { command: String, message: String },
    Unknown { command: String, arg: String },
}

fn parse_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" | "enable" | "enabled" => Some(true),
        "off" | "false" | "no" | "0" | "disable" | "disabled" => Some(false),
        _ => None,
    }
}

pub fn parse_chat_input(text: &str) -> ChatInput {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ChatInput::Noop;
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            return match find_action(&command) {
                Some(CommandAction::Help) => ChatInput::Help,
                Some(CommandAction::ClearMemory) => ChatInput::ClearMemory,
                Some(CommandAction::History) => ChatInput::History,
                Some(CommandAction::Exit) => ChatInput::Exit,
                Some(CommandAction::Feedback) => {
                    let args = parse_args(arg);
                    match args.first() {
                        None => ChatInput::Feedback(None),
                        Some(value) => match parse_switch(value) {
                            Some(enabled) => ChatInput::Feedback(Some(enabled)),
                            None => ChatInput::Invalid {
                                command,
                                message: format!("expected on or off, got '{value}'"),
                            },
                        },
                    }
                }
                None => ChatInput::Unknown {
                    command,
                    arg: arg.to_string(),
                },
            };
        }
    }

    ChatInput::Generate(raw_trimmed.to_string())
}
