use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use slashgate_core::domain::command::Command;
use slashgate_core::domain::directory::{Channel, Team, TeamMember, User};
use slashgate_core::ids::{ChannelId, CommandId, TeamId, UserId};

pub mod command;
pub mod directory;
pub mod memory;

pub use command::SqlCommandRepository;
pub use directory::SqlDirectoryRepository;
pub use memory::{InMemoryCommandRepository, InMemoryDirectoryRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// A live command on the same team already uses the trigger.
    #[error("trigger `{trigger}` already in use on team `{team_id}`")]
    Conflict { team_id: String, trigger: String },
}

/// Storage for command definitions. Lookups never return soft-deleted rows.
#[async_trait]
pub trait CommandRepository: Send + Sync {
    async fn insert(&self, command: Command) -> Result<(), RepositoryError>;

    /// Replaces a live record in place. Returns `false` when no live record
    /// with that id exists.
    async fn update(&self, command: Command) -> Result<bool, RepositoryError>;

    async fn find_by_id(&self, id: &CommandId) -> Result<Option<Command>, RepositoryError>;

    /// `trigger` must already be canonical (lower-cased).
    async fn find_by_team_and_trigger(
        &self,
        team_id: &TeamId,
        trigger: &str,
    ) -> Result<Option<Command>, RepositoryError>;

    async fn list_by_team(&self, team_id: &TeamId) -> Result<Vec<Command>, RepositoryError>;

    async fn soft_delete(
        &self,
        id: &CommandId,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

/// Teams, channels, users and their memberships.
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn find_team(&self, id: &TeamId) -> Result<Option<Team>, RepositoryError>;
    async fn find_channel(&self, id: &ChannelId) -> Result<Option<Channel>, RepositoryError>;
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_team_member(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<Option<TeamMember>, RepositoryError>;
    async fn is_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError>;

    async fn save_team(&self, team: Team) -> Result<(), RepositoryError>;
    async fn save_channel(&self, channel: Channel) -> Result<(), RepositoryError>;
    async fn save_user(&self, user: User) -> Result<(), RepositoryError>;
    async fn save_team_member(&self, member: TeamMember) -> Result<(), RepositoryError>;
    async fn remove_team_member(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError>;
    async fn add_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError>;
    async fn remove_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError>;
}
