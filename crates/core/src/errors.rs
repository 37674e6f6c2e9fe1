use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid command {field}: {reason}")]
    InvalidCommand { field: &'static str, reason: String },
    #[error("trigger `{trigger}` is already used by another command on this team")]
    DuplicateTrigger { trigger: String },
    #[error("a command's team can only be changed by moving it")]
    TeamChangeNotAllowed,
    #[error("malformed identifier `{0}`")]
    MalformedId(String),
}

impl DomainError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidCommand { field, reason: reason.into() }
    }
}

/// Outcome categories of every slash-command operation. None of them are retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Validation(DomainError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no authenticated session")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<DomainError> for CommandError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::MalformedId(raw) => Self::InvalidInput(format!("malformed id `{raw}`")),
            other => Self::Validation(other),
        }
    }
}

impl CommandError {
    /// Stable machine-readable label, used in logs and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotImplemented(_) => "not_implemented",
            Self::Integration(_) => "integration",
            Self::Persistence(_) => "persistence",
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::NotImplemented { correlation_id: id, .. }
            | InterfaceError::BadGateway { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("not implemented: {message}")]
    NotImplemented { message: String, correlation_id: String },
    #[error("bad gateway: {message}")]
    BadGateway { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "You must be signed in to do that.",
            Self::Forbidden { .. } => "You do not have permission to do that.",
            Self::NotFound { .. } => "The requested command could not be found.",
            Self::NotImplemented { .. } => "Slash commands are disabled on this server.",
            Self::BadGateway { .. } => "The command's integration failed to respond correctly.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::NotImplemented { .. } => 501,
            Self::BadGateway { .. } => 502,
            Self::ServiceUnavailable { .. } => 503,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::NotImplemented { correlation_id, .. }
            | Self::BadGateway { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}

impl From<CommandError> for InterfaceError {
    fn from(value: CommandError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            CommandError::InvalidInput(message) => Self::BadRequest { message, correlation_id },
            CommandError::Validation(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            CommandError::NotFound(message) => Self::NotFound { message, correlation_id },
            CommandError::Unauthorized => {
                Self::Unauthorized { message: "missing session".to_owned(), correlation_id }
            }
            CommandError::Forbidden(message) => Self::Forbidden { message, correlation_id },
            CommandError::NotImplemented(message) => {
                Self::NotImplemented { message, correlation_id }
            }
            // Upstream detail stays in the logs.
            CommandError::Integration(_) => Self::BadGateway {
                message: "integration request failed".to_owned(),
                correlation_id,
            },
            CommandError::Persistence(_) => Self::ServiceUnavailable {
                message: "storage unavailable".to_owned(),
                correlation_id,
            },
        }
    }
}
