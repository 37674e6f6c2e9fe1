use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use slashgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use slashgate_core::domain::command::{canonical_trigger, Command, CommandDefinition};
use slashgate_core::errors::{CommandError, DomainError};
use slashgate_core::ids::{new_id, CommandId, TeamId, UserId};
use slashgate_db::repositories::{CommandRepository, RepositoryError};

/// Who is changing the registry, carried into audit events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationContext {
    pub actor: UserId,
    pub correlation_id: String,
}

impl MutationContext {
    pub fn new(actor: UserId, correlation_id: impl Into<String>) -> Self {
        Self { actor, correlation_id: correlation_id.into() }
    }
}

/// Owns stored command definitions. Writes go straight to the repository, so
/// every change is visible to the next lookup.
#[derive(Clone)]
pub struct CommandRegistry {
    repository: Arc<dyn CommandRepository>,
    audit: Arc<dyn AuditSink>,
}

pub(crate) fn persistence_error(error: RepositoryError) -> CommandError {
    match error {
        RepositoryError::Conflict { trigger, .. } => {
            CommandError::from(DomainError::DuplicateTrigger { trigger })
        }
        other => CommandError::Persistence(other.to_string()),
    }
}

fn not_found(id: &CommandId) -> CommandError {
    CommandError::NotFound(format!("command `{id}`"))
}

impl CommandRegistry {
    pub fn new(repository: Arc<dyn CommandRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { repository, audit }
    }

    pub async fn create(
        &self,
        context: &MutationContext,
        definition: &CommandDefinition,
    ) -> Result<Command, CommandError> {
        let command = Command::create(context.actor.clone(), definition, Utc::now())?;
        self.repository.insert(command.clone()).await.map_err(persistence_error)?;

        info!(
            event_name = "command.registry.created",
            correlation_id = %context.correlation_id,
            command_id = %command.id,
            team_id = %command.team_id,
            trigger = %command.trigger,
            "slash command created"
        );
        self.record(context, "command.registry.created", &command, |event| {
            event
                .with_metadata("trigger", command.trigger.as_str())
                .with_metadata("method", command.method.as_str())
                .with_metadata("url", command.url.as_str())
        });
        Ok(command)
    }

    pub async fn get(&self, id: &CommandId) -> Result<Command, CommandError> {
        self.repository
            .find_by_id(id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| not_found(id))
    }

    /// Applies a definition patch. Id, creator, token and team are kept.
    pub async fn update(
        &self,
        context: &MutationContext,
        id: &CommandId,
        definition: &CommandDefinition,
    ) -> Result<Command, CommandError> {
        let existing = self.get(id).await?;
        let updated = existing.updated_with(definition, Utc::now())?;
        self.store(&updated).await?;

        info!(
            event_name = "command.registry.updated",
            correlation_id = %context.correlation_id,
            command_id = %updated.id,
            team_id = %updated.team_id,
            "slash command updated"
        );
        self.record(context, "command.registry.updated", &updated, |event| {
            event
                .with_metadata("trigger", updated.trigger.as_str())
                .with_metadata("method", updated.method.as_str())
                .with_metadata("url", updated.url.as_str())
                .with_metadata("display_name", updated.display_name.as_str())
        });
        Ok(updated)
    }

    pub async fn move_to_team(
        &self,
        context: &MutationContext,
        id: &CommandId,
        destination: &TeamId,
    ) -> Result<Command, CommandError> {
        let existing = self.get(id).await?;
        let source = existing.team_id.clone();
        let moved = Command { team_id: destination.clone(), updated_at: Utc::now(), ..existing };
        self.store(&moved).await?;

        info!(
            event_name = "command.registry.moved",
            correlation_id = %context.correlation_id,
            command_id = %moved.id,
            from_team_id = %source,
            team_id = %moved.team_id,
            "slash command moved"
        );
        self.record(context, "command.registry.moved", &moved, |event| {
            event.with_metadata("from_team_id", source.as_str())
        });
        Ok(moved)
    }

    /// Replaces the secret and returns the new value. It is not retrievable
    /// again except by callers allowed to see tokens.
    pub async fn regenerate_token(
        &self,
        context: &MutationContext,
        id: &CommandId,
    ) -> Result<String, CommandError> {
        let existing = self.get(id).await?;
        let rotated = Command { token: new_id(), updated_at: Utc::now(), ..existing };
        self.store(&rotated).await?;

        info!(
            event_name = "command.registry.token_regenerated",
            correlation_id = %context.correlation_id,
            command_id = %rotated.id,
            team_id = %rotated.team_id,
            "slash command token regenerated"
        );
        self.record(context, "command.registry.token_regenerated", &rotated, |event| event);
        Ok(rotated.token)
    }

    pub async fn delete(
        &self,
        context: &MutationContext,
        id: &CommandId,
    ) -> Result<(), CommandError> {
        let existing = self.get(id).await?;
        let deleted =
            self.repository.soft_delete(id, Utc::now()).await.map_err(persistence_error)?;
        if !deleted {
            return Err(not_found(id));
        }

        info!(
            event_name = "command.registry.deleted",
            correlation_id = %context.correlation_id,
            command_id = %existing.id,
            team_id = %existing.team_id,
            "slash command deleted"
        );
        self.record(context, "command.registry.deleted", &existing, |event| event);
        Ok(())
    }

    /// Case-insensitive match among live commands of one team.
    pub async fn find_by_trigger_and_team(
        &self,
        trigger: &str,
        team_id: &TeamId,
    ) -> Result<Command, CommandError> {
        let canonical = canonical_trigger(trigger)
            .map_err(|_| CommandError::NotFound(format!("trigger `{trigger}`")))?;
        self.repository
            .find_by_team_and_trigger(team_id, &canonical)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| CommandError::NotFound(format!("trigger `{canonical}`")))
    }

    pub async fn list_for_team(&self, team_id: &TeamId) -> Result<Vec<Command>, CommandError> {
        self.repository.list_by_team(team_id).await.map_err(persistence_error)
    }

    async fn store(&self, command: &Command) -> Result<(), CommandError> {
        let updated = self.repository.update(command.clone()).await.map_err(persistence_error)?;
        if !updated {
            warn!(
                event_name = "command.registry.write_lost",
                command_id = %command.id,
                "command vanished between read and write"
            );
            return Err(not_found(&command.id));
        }
        Ok(())
    }

    fn record(
        &self,
        context: &MutationContext,
        event_type: &str,
        command: &Command,
        decorate: impl FnOnce(AuditEvent) -> AuditEvent,
    ) {
        let event = AuditEvent::new(
            context.correlation_id.clone(),
            event_type,
            AuditCategory::Registry,
            context.actor.as_str(),
            AuditOutcome::Success,
        )
        .for_command(&command.id, &command.team_id);
        self.audit.emit(decorate(event));
    }
}
