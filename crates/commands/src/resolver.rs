//! Turns raw typed text plus a channel into a trigger and a team scope.

use slashgate_core::domain::command::Command;
use slashgate_core::domain::directory::Channel;
use slashgate_core::errors::CommandError;
use slashgate_core::ids::TeamId;

use crate::registry::CommandRegistry;

/// Slash-command text split into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Trigger as the user typed it, without the leading `/`.
    pub typed_trigger: String,
    /// Everything after the first whitespace, untouched. Empty if none.
    pub text: String,
}

/// Splits `/trigger rest of text`.
pub fn parse_command_text(raw: &str) -> Result<ParsedCommand, CommandError> {
    let Some(body) = raw.strip_prefix('/') else {
        return Err(CommandError::InvalidInput(
            "command text must start with `/`".to_owned(),
        ));
    };

    let (typed_trigger, text) = match body.find(char::is_whitespace) {
        Some(index) => {
            let separator_len = body[index..].chars().next().map_or(1, char::len_utf8);
            (&body[..index], &body[index + separator_len..])
        }
        None => (body, ""),
    };

    if typed_trigger.is_empty() {
        return Err(CommandError::InvalidInput("command text has no trigger".to_owned()));
    }

    Ok(ParsedCommand { typed_trigger: typed_trigger.to_owned(), text: text.to_owned() })
}

/// Where a trigger is looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TeamScope {
    /// Regular channel: always the channel's own team.
    Channel(TeamId),
    /// Direct or group channel: the team the caller named. Membership in it
    /// still has to be checked.
    Explicit(TeamId),
}

impl TeamScope {
    pub fn team_id(&self) -> &TeamId {
        match self {
            Self::Channel(team_id) | Self::Explicit(team_id) => team_id,
        }
    }
}

/// Decides the team scope. A team id supplied for a regular channel is
/// ignored so commands of other teams can never be reached from it.
pub fn resolve_team_scope(
    channel: &Channel,
    explicit_team: Option<&str>,
) -> Result<TeamScope, CommandError> {
    if !channel.channel_type.is_team_less() {
        return channel.team_id.clone().map(TeamScope::Channel).ok_or_else(|| {
            CommandError::Persistence(format!("channel `{}` has no team", channel.id))
        });
    }

    let raw = explicit_team.map(str::trim).filter(|value| !value.is_empty()).ok_or_else(|| {
        CommandError::InvalidInput(
            "a team id is required to run commands in direct or group messages".to_owned(),
        )
    })?;
    Ok(TeamScope::Explicit(TeamId::parse(raw)?))
}

#[derive(Clone)]
pub struct TriggerResolver {
    registry: CommandRegistry,
}

impl TriggerResolver {
    pub fn new(registry: CommandRegistry) -> Self {
        Self { registry }
    }

    /// Unknown trigger and trigger owned by another team look the same.
    pub async fn lookup(
        &self,
        parsed: &ParsedCommand,
        scope: &TeamScope,
    ) -> Result<Command, CommandError> {
        self.registry.find_by_trigger_and_team(&parsed.typed_trigger, scope.team_id()).await
    }
}
