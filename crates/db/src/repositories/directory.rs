use sqlx::Row;

use slashgate_core::domain::directory::{Channel, ChannelType, Team, TeamMember, User};
use slashgate_core::ids::{ChannelId, TeamId, UserId};

use super::{DirectoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDirectoryRepository {
    pool: DbPool,
}

impl SqlDirectoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn row_to_team(row: &sqlx::sqlite::SqliteRow) -> Result<Team, RepositoryError> {
    Ok(Team {
        id: TeamId(row.try_get("id").map_err(decode_error)?),
        name: row.try_get("name").map_err(decode_error)?,
        display_name: row.try_get("display_name").map_err(decode_error)?,
    })
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(row.try_get("id").map_err(decode_error)?),
        username: row.try_get("username").map_err(decode_error)?,
        system_admin: row.try_get("system_admin").map_err(decode_error)?,
    })
}

fn row_to_team_member(row: &sqlx::sqlite::SqliteRow) -> Result<TeamMember, RepositoryError> {
    Ok(TeamMember {
        team_id: TeamId(row.try_get("team_id").map_err(decode_error)?),
        user_id: UserId(row.try_get("user_id").map_err(decode_error)?),
        admin: row.try_get("admin").map_err(decode_error)?,
    })
}

fn row_to_channel(row: &sqlx::sqlite::SqliteRow) -> Result<Channel, RepositoryError> {
    let channel_type: String = row.try_get("channel_type").map_err(decode_error)?;
    let channel_type = ChannelType::parse(&channel_type).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown channel type `{channel_type}`"))
    })?;
    let team_id: Option<String> = row.try_get("team_id").map_err(decode_error)?;

    Ok(Channel {
        id: ChannelId(row.try_get("id").map_err(decode_error)?),
        team_id: team_id.map(TeamId),
        name: row.try_get("name").map_err(decode_error)?,
        channel_type,
    })
}

#[async_trait::async_trait]
impl DirectoryRepository for SqlDirectoryRepository {
    async fn find_team(&self, id: &TeamId) -> Result<Option<Team>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, display_name FROM team WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_team).transpose()
    }

    async fn find_channel(&self, id: &ChannelId) -> Result<Option<Channel>, RepositoryError> {
        let row = sqlx::query("SELECT id, team_id, name, channel_type FROM channel WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_channel).transpose()
    }

    async fn find_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, username, system_admin FROM app_user WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_team_member(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<Option<TeamMember>, RepositoryError> {
        let row = sqlx::query(
            "SELECT team_id, user_id, admin FROM team_member WHERE team_id = ? AND user_id = ?",
        )
        .bind(&team_id.0)
        .bind(&user_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_team_member).transpose()
    }

    async fn is_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM channel_member WHERE channel_id = ? AND user_id = ?",
        )
        .bind(&channel_id.0)
        .bind(&user_id.0)
        .fetch_one(&self.pool)
        .await?
        .try_get("count")
        .map_err(decode_error)?;

        Ok(count > 0)
    }

    async fn save_team(&self, team: Team) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO team (id, name, display_name) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 display_name = excluded.display_name",
        )
        .bind(&team.id.0)
        .bind(&team.name)
        .bind(&team.display_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_channel(&self, channel: Channel) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO channel (id, team_id, name, channel_type) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 team_id = excluded.team_id,
                 name = excluded.name,
                 channel_type = excluded.channel_type",
        )
        .bind(&channel.id.0)
        .bind(channel.team_id.as_ref().map(|id| id.0.clone()))
        .bind(&channel.name)
        .bind(channel.channel_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, username, system_admin) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 system_admin = excluded.system_admin",
        )
        .bind(&user.id.0)
        .bind(&user.username)
        .bind(user.system_admin)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_team_member(&self, member: TeamMember) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO team_member (team_id, user_id, admin) VALUES (?, ?, ?)
             ON CONFLICT(team_id, user_id) DO UPDATE SET admin = excluded.admin",
        )
        .bind(&member.team_id.0)
        .bind(&member.user_id.0)
        .bind(member.admin)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_team_member(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM team_member WHERE team_id = ? AND user_id = ?")
            .bind(&team_id.0)
            .bind(&user_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn add_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO channel_member (channel_id, user_id) VALUES (?, ?)
             ON CONFLICT(channel_id, user_id) DO NOTHING",
        )
        .bind(&channel_id.0)
        .bind(&user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM channel_member WHERE channel_id = ? AND user_id = ?")
            .bind(&channel_id.0)
            .bind(&user_id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
