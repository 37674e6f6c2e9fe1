use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use thiserror::Error;
use tracing::{info, warn};
use url::{Host, Url};

use slashgate_core::domain::command::{Command, CommandMethod};
use slashgate_core::domain::response::{CommandResponse, ResponseType};
use slashgate_core::errors::CommandError;

use crate::network::NetworkPolicy;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("could not build http client: {0}")]
    Client(String),
    #[error("invalid integration url: {0}")]
    InvalidUrl(String),
    #[error("could not resolve integration host {0}")]
    Resolve(String),
    #[error("destination {0} is an internal address that is not allow-listed")]
    Blocked(IpAddr),
    #[error("integration request timed out")]
    Timeout,
    #[error("integration request failed: {0}")]
    Transport(String),
    #[error("integration responded with status {0}")]
    Status(u16),
    #[error("integration reply could not be decoded: {0}")]
    Decode(String),
}

impl From<DispatchError> for CommandError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Blocked(_) => CommandError::Forbidden(
                "integration destination is not permitted".to_owned(),
            ),
            other => CommandError::Integration(other.to_string()),
        }
    }
}

/// Parameters sent to the integration on every call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutboundParams {
    pub token: String,
    pub team_id: String,
    pub team_domain: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
    pub command: String,
    pub text: String,
    pub trigger_id: String,
    pub site_url: Option<String>,
}

impl OutboundParams {
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("token", self.token.as_str()),
            ("team_id", self.team_id.as_str()),
            ("team_domain", self.team_domain.as_str()),
            ("channel_id", self.channel_id.as_str()),
            ("channel_name", self.channel_name.as_str()),
            ("user_id", self.user_id.as_str()),
            ("user_name", self.user_name.as_str()),
            ("command", self.command.as_str()),
            ("text", self.text.as_str()),
            ("trigger_id", self.trigger_id.as_str()),
        ];
        if let Some(site_url) = &self.site_url {
            pairs.push(("site_url", site_url.as_str()));
        }
        pairs
    }
}

fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder().timeout(timeout).redirect(reqwest::redirect::Policy::none())
}

fn transport_error(error: reqwest::Error) -> DispatchError {
    if error.is_timeout() {
        DispatchError::Timeout
    } else {
        DispatchError::Transport(error.to_string())
    }
}

/// Sends exactly one request per execution. Nothing is retried; dropping the
/// returned future aborts the call in flight.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    policy: NetworkPolicy,
    timeout: Duration,
}

impl WebhookDispatcher {
    pub fn new(policy: NetworkPolicy, timeout: Duration) -> Result<Self, DispatchError> {
        let client =
            client_builder(timeout).build().map_err(|e| DispatchError::Client(e.to_string()))?;
        Ok(Self { client, policy, timeout })
    }

    pub async fn dispatch(
        &self,
        command: &Command,
        params: &OutboundParams,
    ) -> Result<CommandResponse, DispatchError> {
        let started = Instant::now();
        // Covers host resolution as well as the request itself.
        let result = match tokio::time::timeout(self.timeout, self.send(command, params)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(
                event_name = "command.webhook.completed",
                command_id = %command.id,
                team_id = %command.team_id,
                method = command.method.as_str(),
                trigger_id = %params.trigger_id,
                elapsed_ms,
                "integration call succeeded"
            ),
            Err(error) => warn!(
                event_name = "command.webhook.failed",
                command_id = %command.id,
                team_id = %command.team_id,
                method = command.method.as_str(),
                trigger_id = %params.trigger_id,
                elapsed_ms,
                error = %error,
                "integration call failed"
            ),
        }
        result
    }

    async fn send(
        &self,
        command: &Command,
        params: &OutboundParams,
    ) -> Result<CommandResponse, DispatchError> {
        let mut url =
            Url::parse(&command.url).map_err(|e| DispatchError::InvalidUrl(e.to_string()))?;
        let addresses = self.policy.check(&url).await?;
        let client = self.client_for(&url, &addresses)?;
        let pairs = params.pairs();

        let request = match command.method {
            CommandMethod::Get => {
                url.query_pairs_mut().extend_pairs(pairs.iter());
                client.get(url)
            }
            CommandMethod::Post => {
                let body = serde_urlencoded::to_string(&pairs)
                    .map_err(|e| DispatchError::InvalidUrl(e.to_string()))?;
                client
                    .post(url)
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body)
            }
        };

        let response = request
            .header(AUTHORIZATION, format!("Token {}", params.token))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        let body = response.text().await.map_err(transport_error)?;
        decode_reply(&content_type, &body)
    }

    /// Domain hosts get a client pinned to the addresses that passed the
    /// policy, so a second lookup cannot redirect the connection.
    fn client_for(
        &self,
        url: &Url,
        addresses: &[SocketAddr],
    ) -> Result<reqwest::Client, DispatchError> {
        match url.host() {
            Some(Host::Domain(domain)) => client_builder(self.timeout)
                .resolve_to_addrs(domain, addresses)
                .build()
                .map_err(|e| DispatchError::Client(e.to_string())),
            _ => Ok(self.client.clone()),
        }
    }
}

/// Decodes an integration reply. JSON and form bodies map onto fields; any
/// other content type becomes plain text.
pub fn decode_reply(content_type: &str, body: &str) -> Result<CommandResponse, DispatchError> {
    if body.trim().is_empty() {
        return Ok(CommandResponse::default());
    }

    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if mime == "application/json" || mime.ends_with("+json") {
        return serde_json::from_str(body).map_err(|e| DispatchError::Decode(e.to_string()));
    }

    if mime == "application/x-www-form-urlencoded" {
        let mut fields: HashMap<String, String> =
            serde_urlencoded::from_str(body).map_err(|e| DispatchError::Decode(e.to_string()))?;
        let mut take = |key: &str| fields.remove(key).unwrap_or_default();
        return Ok(CommandResponse {
            text: take("text"),
            response_type: ResponseType::from_wire(&take("response_type")),
            username: take("username"),
            icon_url: take("icon_url"),
            message_type: take("type"),
            goto_location: take("goto_location"),
            ..CommandResponse::default()
        });
    }

    Ok(CommandResponse { text: body.to_owned(), ..CommandResponse::default() })
}
