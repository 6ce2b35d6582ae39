#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    Cancel,
    Prompts,
    /// One-based index into the quick prompt list.
    Prompt(Option<usize>),
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands:
  /help         show this help
  /prompts      list quick prompts
  /prompt <n>   send quick prompt number n
  /cancel       stop the reply in progress
  /clear        forget the conversation
  /quit         exit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut words = trimmed.split_whitespace();
    let command = words.next().unwrap_or(trimmed).to_string();

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/clear" => SlashCommand::Clear,
        "/cancel" => SlashCommand::Cancel,
        "/prompts" => SlashCommand::Prompts,
        "/prompt" => SlashCommand::Prompt(
            words
                .next()
                .and_then(|raw| raw.parse::<usize>().ok())
                .filter(|index| *index > 0),
        ),
        "/quit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}
