use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use slashgate_core::domain::command::Command;
use slashgate_core::domain::directory::{Channel, Team, TeamMember, User};
use slashgate_core::ids::{ChannelId, CommandId, TeamId, UserId};

use super::{CommandRepository, DirectoryRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryCommandRepository {
    commands: RwLock<HashMap<String, Command>>,
}

fn live_collision(
    commands: &HashMap<String, Command>,
    candidate: &Command,
) -> Option<RepositoryError> {
    commands
        .values()
        .any(|existing| {
            !existing.is_deleted()
                && existing.id != candidate.id
                && existing.team_id == candidate.team_id
                && existing.trigger == candidate.trigger
        })
        .then(|| RepositoryError::Conflict {
            team_id: candidate.team_id.0.clone(),
            trigger: candidate.trigger.clone(),
        })
}

#[async_trait::async_trait]
impl CommandRepository for InMemoryCommandRepository {
    async fn insert(&self, command: Command) -> Result<(), RepositoryError> {
        let mut commands = self.commands.write().await;
        if let Some(conflict) = live_collision(&commands, &command) {
            return Err(conflict);
        }
        commands.insert(command.id.0.clone(), command);
        Ok(())
    }

    async fn update(&self, command: Command) -> Result<bool, RepositoryError> {
        let mut commands = self.commands.write().await;
        let live = commands.get(&command.id.0).is_some_and(|existing| !existing.is_deleted());
        if !live {
            return Ok(false);
        }
        if let Some(conflict) = live_collision(&commands, &command) {
            return Err(conflict);
        }
        commands.insert(command.id.0.clone(), command);
        Ok(true)
    }

    async fn find_by_id(&self, id: &CommandId) -> Result<Option<Command>, RepositoryError> {
        let commands = self.commands.read().await;
        Ok(commands.get(&id.0).filter(|command| !command.is_deleted()).cloned())
    }

    async fn find_by_team_and_trigger(
        &self,
        team_id: &TeamId,
        trigger: &str,
    ) -> Result<Option<Command>, RepositoryError> {
        let commands = self.commands.read().await;
        Ok(commands
            .values()
            .find(|command| {
                !command.is_deleted() && &command.team_id == team_id && command.trigger == trigger
            })
            .cloned())
    }

    async fn list_by_team(&self, team_id: &TeamId) -> Result<Vec<Command>, RepositoryError> {
        let commands = self.commands.read().await;
        let mut listed: Vec<Command> = commands
            .values()
            .filter(|command| !command.is_deleted() && &command.team_id == team_id)
            .cloned()
            .collect();
        listed.sort_by(|left, right| left.trigger.cmp(&right.trigger));
        Ok(listed)
    }

    async fn soft_delete(
        &self,
        id: &CommandId,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut commands = self.commands.write().await;
        match commands.get_mut(&id.0) {
            Some(command) if !command.is_deleted() => {
                command.deleted_at = Some(deleted_at);
                command.updated_at = deleted_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryDirectoryRepository {
    teams: RwLock<HashMap<String, Team>>,
    channels: RwLock<HashMap<String, Channel>>,
    users: RwLock<HashMap<String, User>>,
    team_members: RwLock<HashMap<(String, String), TeamMember>>,
    channel_members: RwLock<HashSet<(String, String)>>,
}

#[async_trait::async_trait]
impl DirectoryRepository for InMemoryDirectoryRepository {
    async fn find_team(&self, id: &TeamId) -> Result<Option<Team>, RepositoryError> {
        Ok(self.teams.read().await.get(&id.0).cloned())
    }

    async fn find_channel(&self, id: &ChannelId) -> Result<Option<Channel>, RepositoryError> {
        Ok(self.channels.read().await.get(&id.0).cloned())
    }

    async fn find_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id.0).cloned())
    }

    async fn find_team_member(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<Option<TeamMember>, RepositoryError> {
        let members = self.team_members.read().await;
        Ok(members.get(&(team_id.0.clone(), user_id.0.clone())).cloned())
    }

    async fn is_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let members = self.channel_members.read().await;
        Ok(members.contains(&(channel_id.0.clone(), user_id.0.clone())))
    }

    async fn save_team(&self, team: Team) -> Result<(), RepositoryError> {
        self.teams.write().await.insert(team.id.0.clone(), team);
        Ok(())
    }

    async fn save_channel(&self, channel: Channel) -> Result<(), RepositoryError> {
        self.channels.write().await.insert(channel.id.0.clone(), channel);
        Ok(())
    }

    async fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        self.users.write().await.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn save_team_member(&self, member: TeamMember) -> Result<(), RepositoryError> {
        let key = (member.team_id.0.clone(), member.user_id.0.clone());
        self.team_members.write().await.insert(key, member);
        Ok(())
    }

    async fn remove_team_member(
        &self,
        team_id: &TeamId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError> {
        self.team_members.write().await.remove(&(team_id.0.clone(), user_id.0.clone()));
        Ok(())
    }

    async fn add_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError> {
        self.channel_members.write().await.insert((channel_id.0.clone(), user_id.0.clone()));
        Ok(())
    }

    async fn remove_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), RepositoryError> {
        self.channel_members.write().await.remove(&(channel_id.0.clone(), user_id.0.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use slashgate_core::domain::command::{Command, CommandDefinition};
    use slashgate_core::ids::{TeamId, UserId};

    use crate::repositories::{CommandRepository, InMemoryCommandRepository, RepositoryError};

    fn command(team_id: &TeamId, trigger: &str) -> Command {
        let definition = CommandDefinition {
            team_id: team_id.0.clone(),
            trigger: trigger.to_owned(),
            method: "P".to_owned(),
            url: "https://hooks.example.com/run".to_owned(),
            ..CommandDefinition::default()
        };
        Command::create(UserId::generate(), &definition, Utc::now()).expect("valid command")
    }

    #[tokio::test]
    async fn in_memory_command_repo_enforces_live_trigger_uniqueness() {
        let repo = InMemoryCommandRepository::default();
        let team = TeamId::generate();
        let first = command(&team, "deploy");

        repo.insert(first.clone()).await.expect("insert first");
        let error = repo.insert(command(&team, "deploy")).await.expect_err("collision");
        assert!(matches!(error, RepositoryError::Conflict { .. }));

        repo.soft_delete(&first.id, Utc::now()).await.expect("delete");
        repo.insert(command(&team, "deploy")).await.expect("trigger freed by delete");
    }

    #[tokio::test]
    async fn renaming_onto_a_taken_trigger_is_rejected() {
        let repo = InMemoryCommandRepository::default();
        let team = TeamId::generate();
        let deploy = command(&team, "deploy");
        let status = command(&team, "status");
        repo.insert(deploy).await.expect("insert deploy");
        repo.insert(status.clone()).await.expect("insert status");

        let renamed = Command { trigger: "deploy".to_owned(), ..status.clone() };
        assert!(matches!(
            repo.update(renamed).await,
            Err(RepositoryError::Conflict { .. })
        ));

        let unchanged = Command { description: "health".to_owned(), ..status };
        assert_eq!(repo.update(unchanged).await.ok(), Some(true));
    }

    #[tokio::test]
    async fn lookups_skip_deleted_and_other_teams() {
        let repo = InMemoryCommandRepository::default();
        let team = TeamId::generate();
        let other_team = TeamId::generate();
        let stored = command(&team, "echo");
        repo.insert(stored.clone()).await.expect("insert");

        assert!(repo.find_by_team_and_trigger(&other_team, "echo").await.expect("find").is_none());
        assert_eq!(repo.list_by_team(&team).await.expect("list").len(), 1);

        repo.soft_delete(&stored.id, Utc::now()).await.expect("delete");
        assert!(repo.find_by_id(&stored.id).await.expect("find").is_none());
        assert!(repo.find_by_team_and_trigger(&team, "echo").await.expect("find").is_none());
    }
}
