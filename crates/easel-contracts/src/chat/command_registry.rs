#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandAction {
    Help,
    ClearMemory,
    Feedback,
    History,
    Exit,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: CommandAction,
}

pub(crate) const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: CommandAction::Help,
    },
    CommandSpec {
        command: "clear",
        action: CommandAction::ClearMemory,
    },
    CommandSpec {
        command: "feedback",
        action: CommandAction::Feedback,
    },
    CommandSpec {
        command: "history",
        action: CommandAction::History,
    },
    CommandSpec {
        command: "exit",
        action: CommandAction::Exit,
    },
    CommandSpec {
        command: "quit",
        action: CommandAction::Exit,
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/help",
    "/clear",
    "/feedback [on|off]",
    "/history",
    "/exit",
];

pub(crate) fn find_action(command: &str) -> Option<CommandAction> {
    COMMANDS
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}
