use crate::tools::PermissionLevel;

pub const HELP_TEXT: &str = "Commands:
  /help                 show this help
  /clear                forget the conversation (keeps the system prompt)
  /permission [level]   show or set the permission level: write-only, read-and-write, auto-accept
  /quit                 exit
Press Ctrl-C while a request runs to cancel it.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    /// `None` shows the current level.
    Permission(Option<PermissionLevel>),
    Quit,
    Invalid(String),
    Unknown(String),
}

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut words = trimmed.split_whitespace();
    let command = words.next().unwrap_or(trimmed).to_string();
    let argument = words.next();

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/clear" => SlashCommand::Clear,
        "/quit" | "/exit" => SlashCommand::Quit,
        "/permission" => match argument.map(str::parse::<PermissionLevel>) {
            None => SlashCommand::Permission(None),
            Some(Ok(level)) => SlashCommand::Permission(Some(level)),
            Some(Err(message)) => SlashCommand::Invalid(message),
        },
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}
