use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ids::{TeamId, UserId};

/// Authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub system_admin: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    UseSlashCommands,
    ManageSlashCommands,
    ManageOthersSlashCommands,
    ViewTeam,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UseSlashCommands => "use_slash_commands",
            Self::ManageSlashCommands => "manage_slash_commands",
            Self::ManageOthersSlashCommands => "manage_others_slash_commands",
            Self::ViewTeam => "view_team",
        }
    }
}

/// Opaque permission check. Answers are read live on every call; nothing
/// here may be cached across invocations.
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    async fn has_permission(&self, session: &Session, permission: Permission) -> bool;

    async fn has_permission_to_team(
        &self,
        session: &Session,
        team_id: &TeamId,
        permission: Permission,
    ) -> bool;
}
