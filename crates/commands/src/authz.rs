use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use slashgate_core::domain::directory::Channel;
use slashgate_core::errors::CommandError;
use slashgate_core::ids::TeamId;
use slashgate_core::permissions::{Permission, PermissionOracle, Session};
use slashgate_db::repositories::DirectoryRepository;

use crate::registry::persistence_error;

/// Permission oracle backed by the directory tables. System admins hold
/// everything; team members may use commands and view the team; team admins
/// may also manage commands.
pub struct MembershipPermissionOracle {
    directory: Arc<dyn DirectoryRepository>,
}

impl MembershipPermissionOracle {
    pub fn new(directory: Arc<dyn DirectoryRepository>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl PermissionOracle for MembershipPermissionOracle {
    async fn has_permission(&self, session: &Session, _permission: Permission) -> bool {
        session.system_admin
    }

    async fn has_permission_to_team(
        &self,
        session: &Session,
        team_id: &TeamId,
        permission: Permission,
    ) -> bool {
        if session.system_admin {
            return true;
        }

        let member = match self.directory.find_team_member(team_id, &session.user_id).await {
            Ok(member) => member,
            Err(error) => {
                warn!(
                    event_name = "command.authz.membership_lookup_failed",
                    user_id = %session.user_id,
                    team_id = %team_id,
                    error = %error,
                    "treating failed membership lookup as no permission"
                );
                return false;
            }
        };

        match (member, permission) {
            (None, _) => false,
            (Some(_), Permission::UseSlashCommands | Permission::ViewTeam) => true,
            (Some(member), Permission::ManageSlashCommands | Permission::ManageOthersSlashCommands) => {
                member.admin
            }
        }
    }
}

/// Decides whether an already resolved call may proceed.
#[derive(Clone)]
pub struct AuthorizationGate {
    directory: Arc<dyn DirectoryRepository>,
    oracle: Arc<dyn PermissionOracle>,
}

impl AuthorizationGate {
    pub fn new(directory: Arc<dyn DirectoryRepository>, oracle: Arc<dyn PermissionOracle>) -> Self {
        Self { directory, oracle }
    }

    pub fn oracle(&self) -> &Arc<dyn PermissionOracle> {
        &self.oracle
    }

    /// Service-wide switch, checked before anything else.
    pub fn ensure_enabled(enabled: bool) -> Result<(), CommandError> {
        if enabled {
            Ok(())
        } else {
            Err(CommandError::NotImplemented("slash commands are disabled".to_owned()))
        }
    }

    pub fn require_session(session: Option<&Session>) -> Result<&Session, CommandError> {
        session.ok_or(CommandError::Unauthorized)
    }

    /// Current channel membership, read live. Holders of the global use
    /// permission pass without membership.
    pub async fn authorize_channel(
        &self,
        session: &Session,
        channel: &Channel,
    ) -> Result<(), CommandError> {
        let member = self
            .directory
            .is_channel_member(&channel.id, &session.user_id)
            .await
            .map_err(persistence_error)?;
        if member {
            return Ok(());
        }
        if self.oracle.has_permission(session, Permission::UseSlashCommands).await {
            debug!(
                event_name = "command.authz.channel_global_override",
                user_id = %session.user_id,
                channel_id = %channel.id,
                "caller is not a channel member but holds the global permission"
            );
            return Ok(());
        }

        Err(CommandError::Forbidden(format!(
            "user `{}` cannot run commands in channel `{}`",
            session.user_id, channel.id
        )))
    }

    /// Team permission for calls from direct or group channels, read live so
    /// removal from the team takes effect immediately.
    pub async fn authorize_team(
        &self,
        session: &Session,
        team_id: &TeamId,
    ) -> Result<(), CommandError> {
        if self.oracle.has_permission_to_team(session, team_id, Permission::UseSlashCommands).await
        {
            Ok(())
        } else {
            Err(CommandError::Forbidden(format!(
                "user `{}` cannot run commands for team `{team_id}`",
                session.user_id
            )))
        }
    }
}
