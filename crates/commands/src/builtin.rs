//! Commands every team has without registering anything. They answer
//! locally and never leave the process.

use chrono::{DateTime, Utc};

use slashgate_core::domain::command::{Command, CommandMethod};
use slashgate_core::domain::response::{CommandResponse, ResponseType};
use slashgate_core::ids::{CommandId, TeamId, UserId};

const SHRUG: &str = "¯\\_(ツ)_/¯";

pub struct BuiltinCommand {
    pub trigger: &'static str,
    pub display_name: &'static str,
    pub hint: &'static str,
    pub description: &'static str,
    respond: fn(&str) -> CommandResponse,
}

impl BuiltinCommand {
    pub fn respond(&self, text: &str) -> CommandResponse {
        (self.respond)(text)
    }

    /// Listing shape shared with custom commands. Ids and token are empty.
    pub fn listing(&self, team_id: &TeamId) -> Command {
        let epoch = DateTime::<Utc>::default();
        Command {
            id: CommandId(String::new()),
            token: String::new(),
            creator_id: UserId(String::new()),
            team_id: team_id.clone(),
            trigger: self.trigger.to_owned(),
            method: CommandMethod::Post,
            url: String::new(),
            username: String::new(),
            icon_url: String::new(),
            auto_complete: true,
            auto_complete_desc: self.description.to_owned(),
            auto_complete_hint: self.hint.to_owned(),
            display_name: self.display_name.to_owned(),
            description: self.description.to_owned(),
            created_at: epoch,
            updated_at: epoch,
            deleted_at: None,
        }
    }
}

fn echo(text: &str) -> CommandResponse {
    let message = text.trim();
    let message = message
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(message);
    if message.is_empty() {
        return CommandResponse {
            text: "A message must be provided with the /echo command.".to_owned(),
            ..CommandResponse::default()
        };
    }
    CommandResponse {
        text: message.to_owned(),
        response_type: ResponseType::InChannel,
        ..CommandResponse::default()
    }
}

fn shrug(text: &str) -> CommandResponse {
    let message = text.trim();
    CommandResponse {
        text: if message.is_empty() { SHRUG.to_owned() } else { format!("{message} {SHRUG}") },
        response_type: ResponseType::InChannel,
        ..CommandResponse::default()
    }
}

pub static BUILTIN_COMMANDS: &[BuiltinCommand] = &[
    BuiltinCommand {
        trigger: "echo",
        display_name: "echo",
        hint: "[message]",
        description: "Echo back text from your account",
        respond: echo,
    },
    BuiltinCommand {
        trigger: "shrug",
        display_name: "shrug",
        hint: "[message]",
        description: "Adds ¯\\_(ツ)_/¯ to your message",
        respond: shrug,
    },
];

/// Case-insensitive lookup by trigger.
pub fn find_builtin(trigger: &str) -> Option<&'static BuiltinCommand> {
    let trigger = trigger.trim().to_lowercase();
    BUILTIN_COMMANDS.iter().find(|builtin| builtin.trigger == trigger)
}

#[cfg(test)]
mod tests {
    use slashgate_core::domain::response::ResponseType;
    use slashgate_core::ids::TeamId;

    use super::find_builtin;

    #[test]
    fn echo_repeats_the_message_in_channel() {
        let echo = find_builtin("ECHO").expect("echo is built in");
        let reply = echo.respond(" \"hello there\" ");
        assert_eq!(reply.text, "hello there");
        assert_eq!(reply.response_type, ResponseType::InChannel);

        let empty = echo.respond("   ");
        assert_eq!(empty.response_type, ResponseType::Ephemeral);
    }

    #[test]
    fn shrug_appends_the_shrug() {
        let shrug = find_builtin("shrug").expect("shrug is built in");
        assert_eq!(shrug.respond("oh well").text, "oh well ¯\\_(ツ)_/¯");
        assert_eq!(shrug.respond("").text, "¯\\_(ツ)_/¯");
    }

    #[test]
    fn listing_carries_autocomplete_fields_and_no_secrets() {
        let team = TeamId::generate();
        let listed = find_builtin("echo").expect("echo").listing(&team);
        assert_eq!(listed.team_id, team);
        assert!(listed.auto_complete);
        assert!(listed.token.is_empty());
        assert_eq!(listed.auto_complete_hint, "[message]");
        assert!(find_builtin("deploy").is_none());
    }
}
