//! Permission-gated management of command definitions.
//!
//! Commands on a team the caller cannot manage are reported as not found, so
//! their existence is not revealed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use slashgate_core::domain::command::{Command, CommandDefinition};
use slashgate_core::errors::CommandError;
use slashgate_core::ids::{CommandId, TeamId};
use slashgate_core::permissions::{Permission, PermissionOracle, Session};
use slashgate_db::repositories::DirectoryRepository;

use crate::authz::AuthorizationGate;
use crate::builtin::BUILTIN_COMMANDS;
use crate::registry::{persistence_error, CommandRegistry, MutationContext};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompleteSuggestion {
    pub complete: String,
    pub suggestion: String,
    pub hint: String,
    pub description: String,
}

#[derive(Clone)]
pub struct CommandService {
    registry: CommandRegistry,
    directory: Arc<dyn DirectoryRepository>,
    oracle: Arc<dyn PermissionOracle>,
    enabled: bool,
}

impl CommandService {
    pub fn new(
        registry: CommandRegistry,
        directory: Arc<dyn DirectoryRepository>,
        oracle: Arc<dyn PermissionOracle>,
        enabled: bool,
    ) -> Self {
        Self { registry, directory, oracle, enabled }
    }

    fn caller<'a>(&self, session: Option<&'a Session>) -> Result<&'a Session, CommandError> {
        AuthorizationGate::ensure_enabled(self.enabled)?;
        AuthorizationGate::require_session(session)
    }

    async fn can(&self, session: &Session, team_id: &TeamId, permission: Permission) -> bool {
        self.oracle.has_permission_to_team(session, team_id, permission).await
    }

    async fn require_team(&self, team_id: &TeamId) -> Result<(), CommandError> {
        self.directory
            .find_team(team_id)
            .await
            .map_err(persistence_error)?
            .map(|_| ())
            .ok_or_else(|| CommandError::NotFound(format!("team `{team_id}`")))
    }

    /// Loads a command the caller may edit.
    async fn manageable(&self, session: &Session, id: &CommandId) -> Result<Command, CommandError> {
        let command = self.registry.get(id).await?;
        if !self.can(session, &command.team_id, Permission::ManageSlashCommands).await {
            debug!(
                event_name = "command.service.hidden",
                user_id = %session.user_id,
                command_id = %id,
                "caller cannot manage the command's team"
            );
            return Err(CommandError::NotFound(format!("command `{id}`")));
        }
        if command.creator_id != session.user_id
            && !self.can(session, &command.team_id, Permission::ManageOthersSlashCommands).await
        {
            return Err(CommandError::Forbidden(format!(
                "user `{}` cannot manage commands created by others",
                session.user_id
            )));
        }
        Ok(command)
    }

    pub async fn create(
        &self,
        session: Option<&Session>,
        correlation_id: &str,
        definition: &CommandDefinition,
    ) -> Result<Command, CommandError> {
        let session = self.caller(session)?;
        let team_id = TeamId::parse(definition.team_id.trim())?;
        if !self.can(session, &team_id, Permission::ManageSlashCommands).await {
            return Err(CommandError::Forbidden(format!(
                "user `{}` cannot manage commands on team `{team_id}`",
                session.user_id
            )));
        }
        self.require_team(&team_id).await?;

        let context = MutationContext::new(session.user_id.clone(), correlation_id);
        self.registry.create(&context, definition).await
    }

    pub async fn get(
        &self,
        session: Option<&Session>,
        id: &CommandId,
    ) -> Result<Command, CommandError> {
        let session = self.caller(session)?;
        self.manageable(session, id).await
    }

    pub async fn update(
        &self,
        session: Option<&Session>,
        correlation_id: &str,
        id: &CommandId,
        definition: &CommandDefinition,
    ) -> Result<Command, CommandError> {
        let session = self.caller(session)?;
        self.manageable(session, id).await?;
        let context = MutationContext::new(session.user_id.clone(), correlation_id);
        self.registry.update(&context, id, definition).await
    }

    pub async fn move_command(
        &self,
        session: Option<&Session>,
        correlation_id: &str,
        id: &CommandId,
        destination: &TeamId,
    ) -> Result<Command, CommandError> {
        let session = self.caller(session)?;
        self.manageable(session, id).await?;
        self.require_team(destination).await?;
        if !self.can(session, destination, Permission::ManageSlashCommands).await {
            return Err(CommandError::NotFound(format!("team `{destination}`")));
        }

        let context = MutationContext::new(session.user_id.clone(), correlation_id);
        self.registry.move_to_team(&context, id, destination).await
    }

    pub async fn regenerate_token(
        &self,
        session: Option<&Session>,
        correlation_id: &str,
        id: &CommandId,
    ) -> Result<String, CommandError> {
        let session = self.caller(session)?;
        self.manageable(session, id).await?;
        let context = MutationContext::new(session.user_id.clone(), correlation_id);
        self.registry.regenerate_token(&context, id).await
    }

    pub async fn delete(
        &self,
        session: Option<&Session>,
        correlation_id: &str,
        id: &CommandId,
    ) -> Result<(), CommandError> {
        let session = self.caller(session)?;
        self.manageable(session, id).await?;
        let context = MutationContext::new(session.user_id.clone(), correlation_id);
        self.registry.delete(&context, id).await
    }

    /// Built-in commands plus the team's own definitions. Only managers see
    /// the custom ones; asking for custom ones only without that right is
    /// `Forbidden`.
    pub async fn list(
        &self,
        session: Option<&Session>,
        team_id: &TeamId,
        custom_only: bool,
    ) -> Result<Vec<Command>, CommandError> {
        let session = self.caller(session)?;
        self.require_view(session, team_id).await?;

        let manager = self.can(session, team_id, Permission::ManageSlashCommands).await;
        if custom_only {
            if !manager {
                return Err(CommandError::Forbidden(format!(
                    "user `{}` cannot list custom commands on team `{team_id}`",
                    session.user_id
                )));
            }
            return self.registry.list_for_team(team_id).await;
        }

        let custom =
            if manager { self.registry.list_for_team(team_id).await? } else { Vec::new() };
        Ok(with_builtins(team_id, custom))
    }

    pub async fn list_autocomplete(
        &self,
        session: Option<&Session>,
        team_id: &TeamId,
    ) -> Result<Vec<Command>, CommandError> {
        let session = self.caller(session)?;
        self.require_view(session, team_id).await?;
        let custom = self
            .registry
            .list_for_team(team_id)
            .await?
            .iter()
            .filter(|command| command.auto_complete)
            .map(Command::without_token)
            .collect();
        Ok(with_builtins(team_id, custom))
    }

    pub async fn autocomplete_suggestions(
        &self,
        session: Option<&Session>,
        team_id: &TeamId,
        user_input: &str,
    ) -> Result<Vec<AutocompleteSuggestion>, CommandError> {
        let commands = self.list_autocomplete(session, team_id).await?;

        let Some(typed) = user_input.trim_start().strip_prefix('/') else {
            return Ok(Vec::new());
        };
        let prefix = typed.split(char::is_whitespace).next().unwrap_or_default().to_lowercase();

        Ok(commands
            .into_iter()
            .filter(|command| command.trigger.starts_with(&prefix))
            .map(|command| AutocompleteSuggestion {
                complete: format!("/{}", command.trigger),
                suggestion: command.trigger,
                hint: command.auto_complete_hint,
                description: command.auto_complete_desc,
            })
            .collect())
    }

    async fn require_view(&self, session: &Session, team_id: &TeamId) -> Result<(), CommandError> {
        if self.can(session, team_id, Permission::ViewTeam).await {
            Ok(())
        } else {
            Err(CommandError::Forbidden(format!(
                "user `{}` cannot view team `{team_id}`",
                session.user_id
            )))
        }
    }
}

/// Merges built-ins into a team's commands. A custom command shadows a
/// built-in with the same trigger. Sorted by trigger.
fn with_builtins(team_id: &TeamId, mut commands: Vec<Command>) -> Vec<Command> {
    let shadowed: Vec<String> = commands.iter().map(|command| command.trigger.clone()).collect();
    commands.extend(
        BUILTIN_COMMANDS
            .iter()
            .filter(|builtin| !shadowed.iter().any(|trigger| trigger == builtin.trigger))
            .map(|builtin| builtin.listing(team_id)),
    );
    commands.sort_by(|left, right| left.trigger.cmp(&right.trigger));
    commands
}
