//! Slash-command HTTP endpoints.
//!
//! The caller is identified by the `X-User-Id` header set by a trusted
//! upstream. Unknown or malformed ids mean there is no session.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use slashgate_commands::{AutocompleteSuggestion, CommandExecutor, CommandService, ExecuteRequest};
use slashgate_core::domain::command::{Command, CommandDefinition};
use slashgate_core::domain::response::CommandResponse;
use slashgate_core::errors::{CommandError, InterfaceError};
use slashgate_core::ids::{CommandId, TeamId, UserId};
use slashgate_core::permissions::Session;
use slashgate_db::repositories::DirectoryRepository;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct ApiState {
    executor: Arc<CommandExecutor>,
    service: CommandService,
    directory: Arc<dyn DirectoryRepository>,
}

impl ApiState {
    pub fn new(
        executor: Arc<CommandExecutor>,
        service: CommandService,
        directory: Arc<dyn DirectoryRepository>,
    ) -> Self {
        Self { executor, service, directory }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v4/commands/execute", post(execute_command))
        .route("/api/v4/commands", post(create_command).get(list_commands))
        .route(
            "/api/v4/commands/{command_id}",
            get(get_command).put(update_command).delete(delete_command),
        )
        .route("/api/v4/commands/{command_id}/move", put(move_command))
        .route("/api/v4/commands/{command_id}/regen_token", put(regenerate_token))
        .route("/api/v4/teams/{team_id}/commands/autocomplete", get(list_autocomplete))
        .route(
            "/api/v4/teams/{team_id}/commands/autocomplete_suggestions",
            get(autocomplete_suggestions),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn new(error: CommandError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(
                event_name = "system.api.request_failed",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "request failed"
            );
        }

        let (error, detail) = match self.0.to_string().split_once(": ") {
            Some((error, detail)) => (error.to_owned(), detail.to_owned()),
            None => (self.0.to_string(), String::new()),
        };
        let body = ErrorBody {
            error,
            message: self.0.user_message(),
            detail,
            correlation_id: self.0.correlation_id().to_owned(),
        };
        (status, Json(body)).into_response()
    }
}

/// Session and correlation id of one request.
struct RequestContext {
    session: Option<Session>,
    correlation_id: String,
}

impl RequestContext {
    fn fail(&self) -> impl Fn(CommandError) -> ApiError + '_ {
        move |error| ApiError::new(error, &self.correlation_id)
    }
}

async fn request_context(state: &ApiState, headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    let correlation_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| UserId::parse(value.trim()).ok());

    let session = match user_id {
        Some(user_id) => state
            .directory
            .find_user(&user_id)
            .await
            .map_err(|error| {
                ApiError::new(CommandError::Persistence(error.to_string()), &correlation_id)
            })?
            .map(|user| Session { user_id: user.id, system_admin: user.system_admin }),
        None => None,
    };

    Ok(RequestContext { session, correlation_id })
}

fn parse_command_id(raw: &str) -> Result<CommandId, CommandError> {
    CommandId::parse(raw).map_err(CommandError::from)
}

fn parse_team_id(raw: &str) -> Result<TeamId, CommandError> {
    TeamId::parse(raw.trim()).map_err(CommandError::from)
}

async fn execute_command(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let ctx = request_context(&state, &headers).await?;
    let response = state
        .executor
        .execute(ctx.session.as_ref(), &request, &ctx.correlation_id)
        .await
        .map_err(ctx.fail())?;
    Ok(Json(response))
}

async fn create_command(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(definition): Json<CommandDefinition>,
) -> Result<(StatusCode, Json<Command>), ApiError> {
    let ctx = request_context(&state, &headers).await?;
    let command = state
        .service
        .create(ctx.session.as_ref(), &ctx.correlation_id, &definition)
        .await
        .map_err(ctx.fail())?;
    Ok((StatusCode::CREATED, Json(command)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub team_id: String,
    pub custom_only: bool,
}

async fn list_commands(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Command>>, ApiError> {
    let ctx = request_context(&state, &headers).await?;
    let team_id = parse_team_id(&query.team_id).map_err(ctx.fail())?;
    let commands = state
        .service
        .list(ctx.session.as_ref(), &team_id, query.custom_only)
        .await
        .map_err(ctx.fail())?;
    Ok(Json(commands))
}

async fn get_command(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(command_id): Path<String>,
) -> Result<Json<Command>, ApiError> {
    let ctx = request_context(&state, &headers).await?;
    let id = parse_command_id(&command_id).map_err(ctx.fail())?;
    let command = state.service.get(ctx.session.as_ref(), &id).await.map_err(ctx.fail())?;
    Ok(Json(command))
}

async fn update_command(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(command_id): Path<String>,
    Json(definition): Json<CommandDefinition>,
) -> Result<Json<Command>, ApiError> {
    let ctx = request_context(&state, &headers).await?;
    let id = parse_command_id(&command_id).map_err(ctx.fail())?;
    let command = state
        .service
        .update(ctx.session.as_ref(), &ctx.correlation_id, &id, &definition)
        .await
        .map_err(ctx.fail())?;
    Ok(Json(command))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

async fn delete_command(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(command_id): Path<String>,
) -> Result<Json<StatusBody>, ApiError> {
    let ctx = request_context(&state, &headers).await?;
    let id = parse_command_id(&command_id).map_err(ctx.fail())?;
    state
        .service
        .delete(ctx.session.as_ref(), &ctx.correlation_id, &id)
        .await
        .map_err(ctx.fail())?;
    Ok(Json(StatusBody { status: "OK".to_owned() }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MoveRequest {
    pub team_id: String,
}

async fn move_command(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(command_id): Path<String>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<Command>, ApiError> {
    let ctx = request_context(&state, &headers).await?;
    let id = parse_command_id(&command_id).map_err(ctx.fail())?;
    let destination = parse_team_id(&request.team_id).map_err(ctx.fail())?;
    let command = state
        .service
        .move_command(ctx.session.as_ref(), &ctx.correlation_id, &id, &destination)
        .await
        .map_err(ctx.fail())?;
    Ok(Json(command))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenBody {
    pub token: String,
}

async fn regenerate_token(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(command_id): Path<String>,
) -> Result<Json<TokenBody>, ApiError> {
    let ctx = request_context(&state, &headers).await?;
    let id = parse_command_id(&command_id).map_err(ctx.fail())?;
    let token = state
        .service
        .regenerate_token(ctx.session.as_ref(), &ctx.correlation_id, &id)
        .await
        .map_err(ctx.fail())?;
    Ok(Json(TokenBody { token }))
}

async fn list_autocomplete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(team_id): Path<String>,
) -> Result<Json<Vec<Command>>, ApiError> {
    let ctx = request_context(&state, &headers).await?;
    let team_id = parse_team_id(&team_id).map_err(ctx.fail())?;
    let commands = state
        .service
        .list_autocomplete(ctx.session.as_ref(), &team_id)
        .await
        .map_err(ctx.fail())?;
    Ok(Json(commands))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SuggestionQuery {
    pub user_input: String,
}

async fn autocomplete_suggestions(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(team_id): Path<String>,
    Query(query): Query<SuggestionQuery>,
) -> Result<Json<Vec<AutocompleteSuggestion>>, ApiError> {
    let ctx = request_context(&state, &headers).await?;
    let team_id = parse_team_id(&team_id).map_err(ctx.fail())?;
    let suggestions = state
        .service
        .autocomplete_suggestions(ctx.session.as_ref(), &team_id, &query.user_input)
        .await
        .map_err(ctx.fail())?;
    Ok(Json(suggestions))
}
