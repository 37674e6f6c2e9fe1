//! End-to-end execution of one slash command.
//!
//! Order of checks: service switch, session, text, channel access, team
//! scope (with the team permission for direct and group channels), trigger
//! lookup, dispatch. Team access is settled before the lookup so a team the
//! caller cannot reach never reveals whether a trigger exists on it.
//!
//! A trigger the team has not registered falls back to the built-in
//! commands, which answer without a webhook.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use slashgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use slashgate_core::domain::command::Command;
use slashgate_core::domain::response::CommandResponse;
use slashgate_core::errors::CommandError;
use slashgate_core::ids::ChannelId;
use slashgate_core::permissions::Session;
use slashgate_db::repositories::DirectoryRepository;

use crate::authz::AuthorizationGate;
use crate::builtin::find_builtin;
use crate::dispatcher::{OutboundParams, WebhookDispatcher};
use crate::normalizer::{mint_trigger_id, normalize};
use crate::registry::{persistence_error, CommandRegistry};
use crate::resolver::{parse_command_text, resolve_team_scope, TeamScope, TriggerResolver};

/// Inbound execution request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteRequest {
    pub channel_id: String,
    /// Only consulted for direct and group channels.
    pub team_id: Option<String>,
    /// Raw text as typed, including the leading `/`.
    pub command: String,
}

/// Read-only process settings threaded into every execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub enabled: bool,
    pub site_url: Option<String>,
}

pub struct CommandExecutor {
    settings: ExecutionSettings,
    resolver: TriggerResolver,
    gate: AuthorizationGate,
    directory: Arc<dyn DirectoryRepository>,
    dispatcher: WebhookDispatcher,
    audit: Arc<dyn AuditSink>,
}

impl CommandExecutor {
    pub fn new(
        settings: ExecutionSettings,
        registry: CommandRegistry,
        gate: AuthorizationGate,
        directory: Arc<dyn DirectoryRepository>,
        dispatcher: WebhookDispatcher,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            settings,
            resolver: TriggerResolver::new(registry),
            gate,
            directory,
            dispatcher,
            audit,
        }
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub async fn execute(
        &self,
        session: Option<&Session>,
        request: &ExecuteRequest,
        correlation_id: &str,
    ) -> Result<CommandResponse, CommandError> {
        let mut resolved = None;
        let result = self.run(session, request, &mut resolved).await;
        let actor = session.map_or("anonymous", |session| session.user_id.as_str());

        let (outcome, event_type) = match &result {
            Ok(response) => {
                info!(
                    event_name = "command.execution.completed",
                    correlation_id = %correlation_id,
                    user_id = %actor,
                    channel_id = %request.channel_id,
                    command_id = resolved.as_ref().map(|c: &Command| c.id.as_str()).unwrap_or(""),
                    trigger_id = response.trigger_id.as_ref().map(|id| id.as_str()).unwrap_or(""),
                    "slash command executed"
                );
                (AuditOutcome::Success, "command.execution.completed")
            }
            Err(error @ (CommandError::Integration(_) | CommandError::Persistence(_))) => {
                warn!(
                    event_name = "command.execution.failed",
                    correlation_id = %correlation_id,
                    user_id = %actor,
                    channel_id = %request.channel_id,
                    error_kind = error.kind(),
                    error = %error,
                    "slash command failed"
                );
                (AuditOutcome::Failed, "command.execution.failed")
            }
            Err(error) => {
                info!(
                    event_name = "command.execution.rejected",
                    correlation_id = %correlation_id,
                    user_id = %actor,
                    channel_id = %request.channel_id,
                    error_kind = error.kind(),
                    "slash command rejected"
                );
                (AuditOutcome::Rejected, "command.execution.rejected")
            }
        };

        let category = match &result {
            Err(CommandError::Unauthorized | CommandError::Forbidden(_)) => {
                AuditCategory::Authorization
            }
            Err(CommandError::Integration(_)) => AuditCategory::Integration,
            _ => AuditCategory::Execution,
        };
        let mut event = AuditEvent::new(correlation_id, event_type, category, actor, outcome)
            .with_metadata("channel_id", request.channel_id.as_str());
        if let Some(command) = &resolved {
            event = event.for_command(&command.id, &command.team_id);
        }
        if let Err(error) = &result {
            event = event.with_metadata("error_kind", error.kind());
        }
        self.audit.emit(event);

        result
    }

    async fn run(
        &self,
        session: Option<&Session>,
        request: &ExecuteRequest,
        resolved: &mut Option<Command>,
    ) -> Result<CommandResponse, CommandError> {
        AuthorizationGate::ensure_enabled(self.settings.enabled)?;
        let session = AuthorizationGate::require_session(session)?;
        let parsed = parse_command_text(&request.command)?;

        let channel_id = ChannelId::parse(request.channel_id.trim())?;
        let channel = self
            .directory
            .find_channel(&channel_id)
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| CommandError::NotFound(format!("channel `{channel_id}`")))?;
        self.gate.authorize_channel(session, &channel).await?;

        let scope = resolve_team_scope(&channel, request.team_id.as_deref())?;
        if let TeamScope::Explicit(team_id) = &scope {
            self.gate.authorize_team(session, team_id).await?;
        }

        let team = self
            .directory
            .find_team(scope.team_id())
            .await
            .map_err(persistence_error)?
            .ok_or_else(|| CommandError::NotFound(format!("team `{}`", scope.team_id())))?;
        let user = self
            .directory
            .find_user(&session.user_id)
            .await
            .map_err(persistence_error)?
            .ok_or(CommandError::Unauthorized)?;

        let command = match self.resolver.lookup(&parsed, &scope).await {
            Ok(command) => command,
            Err(CommandError::NotFound(detail)) => {
                let builtin = find_builtin(&parsed.typed_trigger)
                    .ok_or(CommandError::NotFound(detail))?;
                let reply = builtin.respond(&parsed.text);
                return Ok(normalize(reply, &builtin.listing(&team.id), mint_trigger_id()));
            }
            Err(error) => return Err(error),
        };
        *resolved = Some(command.clone());

        let trigger_id = mint_trigger_id();
        let params = OutboundParams {
            token: command.token.clone(),
            team_id: team.id.0.clone(),
            team_domain: team.name.clone(),
            channel_id: channel.id.0.clone(),
            channel_name: channel.name.clone(),
            user_id: user.id.0.clone(),
            user_name: user.username.clone(),
            command: parsed.typed_trigger.clone(),
            text: parsed.text.clone(),
            trigger_id: trigger_id.0.clone(),
            site_url: self.settings.site_url.clone(),
        };

        let reply = self.dispatcher.dispatch(&command, &params).await?;
        Ok(normalize(reply, &command, trigger_id))
    }
}
