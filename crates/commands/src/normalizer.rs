use slashgate_core::domain::command::Command;
use slashgate_core::domain::response::CommandResponse;
use slashgate_core::ids::TriggerId;

/// A fresh id for one execution, sent to the integration and echoed back to
/// the caller.
pub fn mint_trigger_id() -> TriggerId {
    TriggerId::generate()
}

/// Fills presentation defaults from the command and stamps the execution's
/// trigger id. Values the integration set win.
pub fn normalize(
    mut response: CommandResponse,
    command: &Command,
    trigger_id: TriggerId,
) -> CommandResponse {
    if response.username.is_empty() {
        response.username = command.username.clone();
    }
    if response.icon_url.is_empty() {
        response.icon_url = command.icon_url.clone();
    }
    response.trigger_id = Some(trigger_id);
    response
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use slashgate_core::domain::command::{Command, CommandDefinition};
    use slashgate_core::domain::response::{CommandResponse, ResponseType};
    use slashgate_core::ids::{is_valid_id, TeamId, UserId};

    use super::{mint_trigger_id, normalize};

    fn command() -> Command {
        let definition = CommandDefinition {
            team_id: TeamId::generate().0,
            trigger: "echo".to_owned(),
            method: "G".to_owned(),
            url: "https://hooks.example.com/echo".to_owned(),
            username: "echo-bot".to_owned(),
            icon_url: "https://hooks.example.com/icon.png".to_owned(),
            ..CommandDefinition::default()
        };
        Command::create(UserId::generate(), &definition, Utc::now()).expect("command")
    }

    #[test]
    fn empty_reply_gets_command_defaults() {
        let command = command();
        let trigger_id = mint_trigger_id();

        let normalized = normalize(CommandResponse::default(), &command, trigger_id.clone());

        assert_eq!(normalized.username, "echo-bot");
        assert_eq!(normalized.icon_url, command.icon_url);
        assert_eq!(normalized.response_type, ResponseType::Ephemeral);
        assert_eq!(normalized.trigger_id, Some(trigger_id));
    }

    #[test]
    fn integration_values_are_kept() {
        let reply = CommandResponse {
            text: "hi".to_owned(),
            username: "custom".to_owned(),
            response_type: ResponseType::InChannel,
            ..CommandResponse::default()
        };

        let normalized = normalize(reply, &command(), mint_trigger_id());

        assert_eq!(normalized.username, "custom");
        assert_eq!(normalized.text, "hi");
        assert_eq!(normalized.response_type, ResponseType::InChannel);
    }

    #[test]
    fn trigger_ids_are_fresh_ids() {
        let first = mint_trigger_id();
        let second = mint_trigger_id();
        assert!(is_valid_id(first.as_str()));
        assert_eq!(first.as_str().len(), 26);
        assert_ne!(first, second);
    }
}
