pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ids;
pub mod permissions;

pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use domain::command::{Command, CommandDefinition, CommandMethod};
pub use domain::directory::{Channel, ChannelType, Team, TeamMember, User};
pub use domain::response::{CommandResponse, ResponseType};
pub use errors::{CommandError, DomainError, InterfaceError};
pub use ids::{ChannelId, CommandId, TeamId, TriggerId, UserId};
pub use permissions::{Permission, PermissionOracle, Session};
