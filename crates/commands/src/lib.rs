//! Slash-command execution and management.

pub mod authz;
pub mod builtin;
pub mod dispatcher;
pub mod executor;
pub mod network;
pub mod normalizer;
pub mod registry;
pub mod resolver;
pub mod service;

pub use authz::{AuthorizationGate, MembershipPermissionOracle};
pub use builtin::{find_builtin, BuiltinCommand, BUILTIN_COMMANDS};
pub use dispatcher::{decode_reply, DispatchError, OutboundParams, WebhookDispatcher};
pub use executor::{CommandExecutor, ExecuteRequest, ExecutionSettings};
pub use network::{is_reserved, NetworkPolicy};
pub use normalizer::{mint_trigger_id, normalize};
pub use registry::{CommandRegistry, MutationContext};
pub use resolver::{parse_command_text, resolve_team_scope, ParsedCommand, TeamScope, TriggerResolver};
pub use service::{AutocompleteSuggestion, CommandService};
