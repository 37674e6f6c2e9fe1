use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::DomainError;
use crate::ids::{new_id, CommandId, TeamId, UserId};

pub const TRIGGER_MAX_LENGTH: usize = 128;
pub const URL_MAX_LENGTH: usize = 1024;
pub const USERNAME_MAX_LENGTH: usize = 64;
pub const DISPLAY_NAME_MAX_LENGTH: usize = 64;
pub const DESCRIPTION_MAX_LENGTH: usize = 128;
pub const AUTOCOMPLETE_TEXT_MAX_LENGTH: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CommandMethod {
    Get,
    Post,
}

impl CommandMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "G",
            Self::Post => "P",
        }
    }
}

impl std::str::FromStr for CommandMethod {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "G" | "GET" => Ok(Self::Get),
            "P" | "POST" => Ok(Self::Post),
            other => Err(DomainError::invalid("method", format!("`{other}` is not GET or POST"))),
        }
    }
}

impl TryFrom<String> for CommandMethod {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CommandMethod> for String {
    fn from(value: CommandMethod) -> Self {
        value.as_str().to_owned()
    }
}

/// Caller-editable part of a command, as submitted on create and update.
///
/// Fields are kept raw so a bad value surfaces as a validation error rather
/// than a decoding failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandDefinition {
    pub team_id: String,
    pub trigger: String,
    pub method: String,
    pub url: String,
    pub username: String,
    pub icon_url: String,
    pub auto_complete: bool,
    pub auto_complete_desc: String,
    pub auto_complete_hint: String,
    pub display_name: String,
    pub description: String,
}

/// A registered integration bound to a trigger within a team.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub token: String,
    pub creator_id: UserId,
    pub team_id: TeamId,
    pub trigger: String,
    pub method: CommandMethod,
    pub url: String,
    pub username: String,
    pub icon_url: String,
    pub auto_complete: bool,
    pub auto_complete_desc: String,
    pub auto_complete_hint: String,
    pub display_name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Command {
    /// Builds a brand new record: fresh id and token, timestamps reset.
    pub fn create(
        creator_id: UserId,
        definition: &CommandDefinition,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let team_id = TeamId::parse(definition.team_id.trim())
            .map_err(|_| DomainError::invalid("team_id", "must be a valid team id"))?;
        let fields = ValidatedFields::from_definition(definition)?;

        Ok(Self {
            id: CommandId::generate(),
            token: new_id(),
            creator_id,
            team_id,
            trigger: fields.trigger,
            method: fields.method,
            url: fields.url,
            username: fields.username,
            icon_url: fields.icon_url,
            auto_complete: definition.auto_complete,
            auto_complete_desc: fields.auto_complete_desc,
            auto_complete_hint: fields.auto_complete_hint,
            display_name: fields.display_name,
            description: fields.description,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Merges an update into this record. Id, creator, token, team and
    /// creation time never change through this path.
    pub fn updated_with(
        &self,
        definition: &CommandDefinition,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let requested_team = definition.team_id.trim();
        if !requested_team.is_empty() && requested_team != self.team_id.as_str() {
            return Err(DomainError::TeamChangeNotAllowed);
        }
        let fields = ValidatedFields::from_definition(definition)?;

        Ok(Self {
            trigger: fields.trigger,
            method: fields.method,
            url: fields.url,
            username: fields.username,
            icon_url: fields.icon_url,
            auto_complete: definition.auto_complete,
            auto_complete_desc: fields.auto_complete_desc,
            auto_complete_hint: fields.auto_complete_hint,
            display_name: fields.display_name,
            description: fields.description,
            updated_at: now,
            ..self.clone()
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Copy safe to hand to callers who may not see the secret.
    pub fn without_token(&self) -> Self {
        Self { token: String::new(), ..self.clone() }
    }
}

pub fn canonical_trigger(raw: &str) -> Result<String, DomainError> {
    let trigger = raw.trim();
    if trigger.is_empty() {
        return Err(DomainError::invalid("trigger", "must not be empty"));
    }
    if trigger.chars().count() > TRIGGER_MAX_LENGTH {
        return Err(DomainError::invalid(
            "trigger",
            format!("must be at most {TRIGGER_MAX_LENGTH} characters"),
        ));
    }
    if trigger.contains('/') {
        return Err(DomainError::invalid("trigger", "must not contain `/`"));
    }
    if trigger.chars().any(char::is_whitespace) {
        return Err(DomainError::invalid("trigger", "must be a single word"));
    }
    Ok(trigger.to_lowercase())
}

struct ValidatedFields {
    trigger: String,
    method: CommandMethod,
    url: String,
    username: String,
    icon_url: String,
    auto_complete_desc: String,
    auto_complete_hint: String,
    display_name: String,
    description: String,
}

impl ValidatedFields {
    fn from_definition(definition: &CommandDefinition) -> Result<Self, DomainError> {
        let trigger = canonical_trigger(&definition.trigger)?;
        let method = definition.method.parse::<CommandMethod>()?;

        let url = definition.url.trim().to_owned();
        check_length("url", &url, URL_MAX_LENGTH)?;
        check_http_url("url", &url)?;

        let username = definition.username.trim().to_owned();
        check_length("username", &username, USERNAME_MAX_LENGTH)?;

        let icon_url = definition.icon_url.trim().to_owned();
        check_length("icon_url", &icon_url, URL_MAX_LENGTH)?;
        if !icon_url.is_empty() {
            check_http_url("icon_url", &icon_url)?;
        }

        check_length("display_name", &definition.display_name, DISPLAY_NAME_MAX_LENGTH)?;
        check_length("description", &definition.description, DESCRIPTION_MAX_LENGTH)?;
        check_length(
            "auto_complete_desc",
            &definition.auto_complete_desc,
            AUTOCOMPLETE_TEXT_MAX_LENGTH,
        )?;
        check_length(
            "auto_complete_hint",
            &definition.auto_complete_hint,
            AUTOCOMPLETE_TEXT_MAX_LENGTH,
        )?;

        Ok(Self {
            trigger,
            method,
            url,
            username,
            icon_url,
            auto_complete_desc: definition.auto_complete_desc.clone(),
            auto_complete_hint: definition.auto_complete_hint.clone(),
            display_name: definition.display_name.clone(),
            description: definition.description.clone(),
        })
    }
}

fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), DomainError> {
    if value.chars().count() > max {
        return Err(DomainError::invalid(field, format!("must be at most {max} characters")));
    }
    Ok(())
}

fn check_http_url(field: &'static str, value: &str) -> Result<(), DomainError> {
    let parsed = Url::parse(value)
        .map_err(|_| DomainError::invalid(field, "must be an absolute URL"))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(DomainError::invalid(field, "must be an http(s) URL with a host"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{canonical_trigger, Command, CommandDefinition, CommandMethod};
    use crate::errors::DomainError;
    use crate::ids::{is_valid_id, new_id, UserId};

    fn definition(trigger: &str) -> CommandDefinition {
        CommandDefinition {
            team_id: new_id(),
            trigger: trigger.to_owned(),
            method: "P".to_owned(),
            url: "http://nowhere.com".to_owned(),
            ..CommandDefinition::default()
        }
    }

    #[test]
    fn create_assigns_id_token_and_lowercases_trigger() {
        let command = Command::create(UserId(new_id()), &definition("Echo"), Utc::now())
            .expect("valid definition");

        assert!(is_valid_id(command.id.as_str()));
        assert!(is_valid_id(&command.token));
        assert_eq!(command.trigger, "echo");
        assert_eq!(command.method, CommandMethod::Post);
        assert_eq!(command.created_at, command.updated_at);
        assert!(!command.is_deleted());
    }

    #[test]
    fn trigger_rules_reject_empty_slash_space_and_overlong() {
        let overlong = "x".repeat(129);
        for bad in ["", "   ", "/echo", "ec/ho", "two words", overlong.as_str()] {
            assert!(
                matches!(canonical_trigger(bad), Err(DomainError::InvalidCommand { field: "trigger", .. })),
                "`{bad}` should be rejected"
            );
        }
        assert_eq!(canonical_trigger(&"x".repeat(128)).map(|t| t.len()), Ok(128));
    }

    #[test]
    fn method_must_be_get_or_post() {
        let mut def = definition("trigger");
        def.method = "Wrong".to_owned();
        let error = Command::create(UserId(new_id()), &def, Utc::now()).expect_err("bad method");
        assert!(matches!(error, DomainError::InvalidCommand { field: "method", .. }));

        for accepted in ["G", "get", "GET", "p", "Post"] {
            assert!(accepted.parse::<CommandMethod>().is_ok(), "{accepted} should parse");
        }
    }

    #[test]
    fn url_must_be_absolute_http() {
        for bad in ["", "nowhere.com", "ftp://nowhere.com/x", "http://"] {
            let mut def = definition("trigger");
            def.url = bad.to_owned();
            let error = Command::create(UserId(new_id()), &def, Utc::now())
                .expect_err("bad url should fail");
            assert!(matches!(error, DomainError::InvalidCommand { field: "url", .. }), "{bad}");
        }
    }

    #[test]
    fn update_keeps_identity_creator_and_token() {
        let original = Command::create(UserId(new_id()), &definition("trigger1"), Utc::now())
            .expect("create");
        let mut change = definition("trigger2");
        change.team_id = original.team_id.0.clone();
        change.method = "G".to_owned();
        change.url = "http://nowhere.com/change".to_owned();

        let updated = original.updated_with(&change, Utc::now()).expect("update");

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.creator_id, original.creator_id);
        assert_eq!(updated.token, original.token);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.trigger, "trigger2");
        assert_eq!(updated.method, CommandMethod::Get);
        assert_eq!(updated.url, "http://nowhere.com/change");
    }

    #[test]
    fn update_rejects_team_change() {
        let original = Command::create(UserId(new_id()), &definition("trigger1"), Utc::now())
            .expect("create");
        let change = definition("trigger1");

        assert_eq!(
            original.updated_with(&change, Utc::now()),
            Err(DomainError::TeamChangeNotAllowed)
        );
    }

    #[test]
    fn method_serializes_as_single_letter() {
        let json = serde_json::to_string(&CommandMethod::Get).expect("serialize");
        assert_eq!(json, "\"G\"");
        let parsed: CommandMethod = serde_json::from_str("\"post\"").expect("deserialize");
        assert_eq!(parsed, CommandMethod::Post);
    }
}
