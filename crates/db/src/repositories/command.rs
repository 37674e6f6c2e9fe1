use chrono::{DateTime, Utc};
use sqlx::Row;

use slashgate_core::domain::command::{Command, CommandMethod};
use slashgate_core::ids::{CommandId, TeamId, UserId};

use super::{CommandRepository, RepositoryError};
use crate::DbPool;

const COMMAND_COLUMNS: &str = "id, token, creator_id, team_id, trigger_word, method, url,
    username, icon_url, auto_complete, auto_complete_desc, auto_complete_hint,
    display_name, description, created_at, updated_at, deleted_at";

pub struct SqlCommandRepository {
    pool: DbPool,
}

impl SqlCommandRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_command(row: &sqlx::sqlite::SqliteRow) -> Result<Command, RepositoryError> {
    let method: String = decode(row.try_get("method"))?;
    let method = method
        .parse::<CommandMethod>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let updated_at: String = decode(row.try_get("updated_at"))?;
    let deleted_at: Option<String> = decode(row.try_get("deleted_at"))?;

    Ok(Command {
        id: CommandId(decode(row.try_get("id"))?),
        token: decode(row.try_get("token"))?,
        creator_id: UserId(decode(row.try_get("creator_id"))?),
        team_id: TeamId(decode(row.try_get("team_id"))?),
        trigger: decode(row.try_get("trigger_word"))?,
        method,
        url: decode(row.try_get("url"))?,
        username: decode(row.try_get("username"))?,
        icon_url: decode(row.try_get("icon_url"))?,
        auto_complete: decode(row.try_get("auto_complete"))?,
        auto_complete_desc: decode(row.try_get("auto_complete_desc"))?,
        auto_complete_hint: decode(row.try_get("auto_complete_hint"))?,
        display_name: decode(row.try_get("display_name"))?,
        description: decode(row.try_get("description"))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        deleted_at: deleted_at.map(|value| parse_timestamp("deleted_at", &value)).transpose()?,
    })
}

fn map_write_error(error: sqlx::Error, command: &Command) -> RepositoryError {
    match &error {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
            RepositoryError::Conflict {
                team_id: command.team_id.0.clone(),
                trigger: command.trigger.clone(),
            }
        }
        _ => RepositoryError::Database(error),
    }
}

#[async_trait::async_trait]
impl CommandRepository for SqlCommandRepository {
    async fn insert(&self, command: Command) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO command (id, token, creator_id, team_id, trigger_word, method, url,
                                  username, icon_url, auto_complete, auto_complete_desc,
                                  auto_complete_hint, display_name, description,
                                  created_at, updated_at, deleted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&command.id.0)
        .bind(&command.token)
        .bind(&command.creator_id.0)
        .bind(&command.team_id.0)
        .bind(&command.trigger)
        .bind(command.method.as_str())
        .bind(&command.url)
        .bind(&command.username)
        .bind(&command.icon_url)
        .bind(command.auto_complete)
        .bind(&command.auto_complete_desc)
        .bind(&command.auto_complete_hint)
        .bind(&command.display_name)
        .bind(&command.description)
        .bind(command.created_at.to_rfc3339())
        .bind(command.updated_at.to_rfc3339())
        .bind(command.deleted_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|error| map_write_error(error, &command))?;

        Ok(())
    }

    async fn update(&self, command: Command) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE command SET
                 token = ?,
                 team_id = ?,
                 trigger_word = ?,
                 method = ?,
                 url = ?,
                 username = ?,
                 icon_url = ?,
                 auto_complete = ?,
                 auto_complete_desc = ?,
                 auto_complete_hint = ?,
                 display_name = ?,
                 description = ?,
                 updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&command.token)
        .bind(&command.team_id.0)
        .bind(&command.trigger)
        .bind(command.method.as_str())
        .bind(&command.url)
        .bind(&command.username)
        .bind(&command.icon_url)
        .bind(command.auto_complete)
        .bind(&command.auto_complete_desc)
        .bind(&command.auto_complete_hint)
        .bind(&command.display_name)
        .bind(&command.description)
        .bind(command.updated_at.to_rfc3339())
        .bind(&command.id.0)
        .execute(&self.pool)
        .await
        .map_err(|error| map_write_error(error, &command))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: &CommandId) -> Result<Option<Command>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {COMMAND_COLUMNS} FROM command WHERE id = ? AND deleted_at IS NULL"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_command).transpose()
    }

    async fn find_by_team_and_trigger(
        &self,
        team_id: &TeamId,
        trigger: &str,
    ) -> Result<Option<Command>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {COMMAND_COLUMNS} FROM command
             WHERE team_id = ? AND trigger_word = ? AND deleted_at IS NULL"
        ))
        .bind(&team_id.0)
        .bind(trigger)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_command).transpose()
    }

    async fn list_by_team(&self, team_id: &TeamId) -> Result<Vec<Command>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMAND_COLUMNS} FROM command
             WHERE team_id = ? AND deleted_at IS NULL
             ORDER BY trigger_word ASC"
        ))
        .bind(&team_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_command).collect::<Result<Vec<_>, _>>()
    }

    async fn soft_delete(
        &self,
        id: &CommandId,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let stamp = deleted_at.to_rfc3339();
        let result = sqlx::query(
            "UPDATE command SET deleted_at = ?, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&stamp)
        .bind(&stamp)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
