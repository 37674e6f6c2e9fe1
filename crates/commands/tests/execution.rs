use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use slashgate_commands::{
    AuthorizationGate, CommandExecutor, CommandRegistry, ExecuteRequest, ExecutionSettings,
    MembershipPermissionOracle, MutationContext, NetworkPolicy, WebhookDispatcher,
};
use slashgate_core::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
use slashgate_core::domain::command::{Command, CommandDefinition};
use slashgate_core::domain::directory::{Channel, ChannelType, Team, TeamMember, User};
use slashgate_core::domain::response::ResponseType;
use slashgate_core::errors::CommandError;
use slashgate_core::ids::{is_valid_id, ChannelId, TeamId, UserId};
use slashgate_core::permissions::Session;
use slashgate_db::repositories::{
    DirectoryRepository, InMemoryCommandRepository, InMemoryDirectoryRepository,
};

struct Harness {
    executor: CommandExecutor,
    registry: CommandRegistry,
    directory: Arc<InMemoryDirectoryRepository>,
    audit: InMemoryAuditSink,
    team_one: Team,
    team_two: Team,
    channel: Channel,
    direct: Channel,
    caller: Session,
}

fn enabled() -> ExecutionSettings {
    ExecutionSettings { enabled: true, site_url: None }
}

fn loopback_allowed() -> NetworkPolicy {
    NetworkPolicy::from_allow_list("127.0.0.0/8")
}

async fn harness(settings: ExecutionSettings, policy: NetworkPolicy) -> Harness {
    harness_with_timeout(settings, policy, Duration::from_secs(5)).await
}

async fn harness_with_timeout(
    settings: ExecutionSettings,
    policy: NetworkPolicy,
    timeout: Duration,
) -> Harness {
    let directory = Arc::new(InMemoryDirectoryRepository::default());
    let audit = InMemoryAuditSink::default();
    let registry =
        CommandRegistry::new(Arc::new(InMemoryCommandRepository::default()), Arc::new(audit.clone()));

    let team_one =
        Team { id: TeamId::generate(), name: "team-one".to_owned(), display_name: "One".to_owned() };
    let team_two =
        Team { id: TeamId::generate(), name: "team-two".to_owned(), display_name: "Two".to_owned() };
    let user = User { id: UserId::generate(), username: "alice".to_owned(), system_admin: false };
    let channel = Channel {
        id: ChannelId::generate(),
        team_id: Some(team_one.id.clone()),
        name: "town-square".to_owned(),
        channel_type: ChannelType::Open,
    };
    let direct = Channel {
        id: ChannelId::generate(),
        team_id: None,
        name: "alice__bob".to_owned(),
        channel_type: ChannelType::Direct,
    };

    directory.save_team(team_one.clone()).await.expect("team one");
    directory.save_team(team_two.clone()).await.expect("team two");
    directory.save_user(user.clone()).await.expect("user");
    for team in [&team_one, &team_two] {
        directory
            .save_team_member(TeamMember {
                team_id: team.id.clone(),
                user_id: user.id.clone(),
                admin: false,
            })
            .await
            .expect("team membership");
    }
    for joined in [&channel, &direct] {
        directory.save_channel(joined.clone()).await.expect("channel");
        directory.add_channel_member(&joined.id, &user.id).await.expect("channel membership");
    }

    let shared: Arc<dyn DirectoryRepository> = directory.clone();
    let gate =
        AuthorizationGate::new(shared.clone(), Arc::new(MembershipPermissionOracle::new(shared.clone())));
    let dispatcher =
        WebhookDispatcher::new(policy, timeout).expect("dispatcher builds");
    let executor = CommandExecutor::new(
        settings,
        registry.clone(),
        gate,
        shared,
        dispatcher,
        Arc::new(audit.clone()),
    );

    Harness {
        executor,
        registry,
        directory,
        audit,
        team_one,
        team_two,
        channel,
        direct,
        caller: Session { user_id: user.id, system_admin: false },
    }
}

async fn register(harness: &Harness, team: &Team, trigger: &str, method: &str, url: String) -> Command {
    let definition = CommandDefinition {
        team_id: team.id.0.clone(),
        trigger: trigger.to_owned(),
        method: method.to_owned(),
        url,
        username: "hookbot".to_owned(),
        ..CommandDefinition::default()
    };
    harness
        .registry
        .create(&MutationContext::new(UserId::generate(), "req-setup"), &definition)
        .await
        .expect("register command")
}

fn in_channel(channel: &Channel, text: &str) -> ExecuteRequest {
    ExecuteRequest { channel_id: channel.id.0.clone(), team_id: None, command: text.to_owned() }
}

fn in_direct(channel: &Channel, team: Option<&Team>, text: &str) -> ExecuteRequest {
    ExecuteRequest {
        channel_id: channel.id.0.clone(),
        team_id: team.map(|team| team.id.0.clone()),
        command: text.to_owned(),
    }
}

async fn ok_json(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "ok"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn get_command_sends_query_parameters_and_returns_reply_with_trigger_id() {
    let server = MockServer::start().await;
    let h = harness(enabled(), loopback_allowed()).await;
    let command = register(&h, &h.team_one, "echo", "G", format!("{}/echo?cmd=echo", server.uri())).await;

    Mock::given(method("GET"))
        .and(path("/echo"))
        .and(query_param("cmd", "echo"))
        .and(query_param("command", "echo"))
        .and(query_param("text", "hello"))
        .and(query_param("token", command.token.as_str()))
        .and(query_param("team_domain", "team-one"))
        .and(query_param("user_name", "alice"))
        .and(header("authorization", format!("Token {}", command.token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "hello",
            "response_type": "in_channel",
            "props": {"from_integration": "yes"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/echo hello"), "req-echo")
        .await
        .expect("execution succeeds");

    assert_eq!(response.text, "hello");
    assert_eq!(response.response_type, ResponseType::InChannel);
    assert_eq!(response.props["from_integration"], json!("yes"));
    assert_eq!(response.username, "hookbot");
    let trigger_id = response.trigger_id.expect("trigger id minted");
    assert!(is_valid_id(trigger_id.as_str()));

    let events = h.audit.events();
    let last = events.last().expect("execution audited");
    assert_eq!(last.event_type, "command.execution.completed");
    assert_eq!(last.outcome, AuditOutcome::Success);
    assert_eq!(last.command_id.as_ref(), Some(&command.id));
}

#[tokio::test]
async fn bare_trigger_is_dispatched_with_empty_text() {
    let server = MockServer::start().await;
    let h = harness(enabled(), loopback_allowed()).await;
    register(&h, &h.team_one, "echo", "G", format!("{}/echo", server.uri())).await;

    Mock::given(method("GET"))
        .and(query_param("text", ""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let response = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/echo"), "req-bare")
        .await
        .expect("execution succeeds");

    assert!(response.text.is_empty());
    assert_eq!(response.response_type, ResponseType::Ephemeral);
    assert!(response.trigger_id.is_some());
}

#[tokio::test]
async fn post_command_sends_form_body_and_accepts_form_reply() {
    let server = MockServer::start().await;
    let h = harness(
        ExecutionSettings { enabled: true, site_url: Some("https://chat.example.com".to_owned()) },
        loopback_allowed(),
    )
    .await;
    let command = register(&h, &h.team_one, "deploy", "P", format!("{}/deploy", server.uri())).await;

    Mock::given(method("POST"))
        .and(path("/deploy"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                "text=queued&response_type=in_channel",
                "application/x-www-form-urlencoded",
            ),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/Deploy api  --fast"), "req-post")
        .await
        .expect("execution succeeds");
    assert_eq!(response.text, "queued");
    assert_eq!(response.response_type, ResponseType::InChannel);

    let requests = server.received_requests().await.expect("requests recorded");
    let form: HashMap<String, String> =
        serde_urlencoded::from_bytes(&requests[0].body).expect("form body");
    assert_eq!(form["command"], "Deploy");
    assert_eq!(form["text"], "api  --fast");
    assert_eq!(form["token"], command.token);
    assert_eq!(form["channel_name"], "town-square");
    assert_eq!(form["site_url"], "https://chat.example.com");
    assert_eq!(
        form.get("trigger_id").map(String::as_str),
        response.trigger_id.as_ref().map(|id| id.as_str())
    );
}

#[tokio::test]
async fn unknown_trigger_is_not_found() {
    let h = harness(enabled(), loopback_allowed()).await;

    let error = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/nonexistent"), "req-missing")
        .await
        .expect_err("unknown trigger");

    assert!(matches!(error, CommandError::NotFound(_)));
    let events = h.audit.events();
    assert_eq!(events.last().map(|e| e.outcome), Some(AuditOutcome::Rejected));
}

#[tokio::test]
async fn malformed_text_and_channel_are_invalid_input() {
    let h = harness(enabled(), loopback_allowed()).await;

    for text in ["", "/", "getcommand"] {
        let error = h
            .executor
            .execute(Some(&h.caller), &in_channel(&h.channel, text), "req-bad")
            .await
            .expect_err("malformed text");
        assert!(matches!(error, CommandError::InvalidInput(_)), "`{text}`");
    }

    let error = h
        .executor
        .execute(
            Some(&h.caller),
            &ExecuteRequest {
                channel_id: "junk".to_owned(),
                team_id: None,
                command: "/echo".to_owned(),
            },
            "req-bad-channel",
        )
        .await
        .expect_err("malformed channel id");
    assert!(matches!(error, CommandError::InvalidInput(_)));
}

#[tokio::test]
async fn command_of_another_team_cannot_be_reached_from_a_channel() {
    let server = MockServer::start().await;
    ok_json(&server).await;
    let h = harness(enabled(), loopback_allowed()).await;
    register(&h, &h.team_two, "teamtwo", "G", format!("{}/two", server.uri())).await;

    let mut request = in_channel(&h.channel, "/teamtwo");
    request.team_id = Some(h.team_two.id.0.clone());
    let error = h
        .executor
        .execute(Some(&h.caller), &request, "req-cross")
        .await
        .expect_err("other team's command");

    assert!(matches!(error, CommandError::NotFound(_)));
    assert!(server.received_requests().await.expect("recorded").is_empty());
}

#[tokio::test]
async fn direct_channel_uses_the_supplied_team() {
    let server = MockServer::start().await;
    ok_json(&server).await;
    let h = harness(enabled(), loopback_allowed()).await;
    register(&h, &h.team_two, "teamtwo", "G", format!("{}/two", server.uri())).await;

    h.executor
        .execute(Some(&h.caller), &in_direct(&h.direct, Some(&h.team_two), "/teamtwo"), "req-dm")
        .await
        .expect("team two supplied");

    let missing = h
        .executor
        .execute(Some(&h.caller), &in_direct(&h.direct, None, "/teamtwo"), "req-dm-none")
        .await
        .expect_err("no team supplied");
    assert!(matches!(missing, CommandError::InvalidInput(_)));

    let wrong = h
        .executor
        .execute(Some(&h.caller), &in_direct(&h.direct, Some(&h.team_one), "/teamtwo"), "req-dm-one")
        .await
        .expect_err("wrong team supplied");
    assert!(matches!(wrong, CommandError::NotFound(_)));
}

#[tokio::test]
async fn channel_removal_blocks_execution_immediately() {
    let server = MockServer::start().await;
    ok_json(&server).await;
    let h = harness(enabled(), loopback_allowed()).await;
    register(&h, &h.team_one, "echo", "G", format!("{}/echo", server.uri())).await;

    h.executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/echo"), "req-before")
        .await
        .expect("member may execute");

    h.directory.remove_channel_member(&h.channel.id, &h.caller.user_id).await.expect("leave");
    let error = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/echo"), "req-after")
        .await
        .expect_err("removed from channel");
    assert!(matches!(error, CommandError::Forbidden(_)));
}

#[tokio::test]
async fn team_removal_blocks_direct_channel_execution() {
    let server = MockServer::start().await;
    ok_json(&server).await;
    let h = harness(enabled(), loopback_allowed()).await;
    register(&h, &h.team_two, "teamtwo", "G", format!("{}/two", server.uri())).await;
    let request = in_direct(&h.direct, Some(&h.team_two), "/teamtwo");

    h.executor.execute(Some(&h.caller), &request, "req-before").await.expect("member of team two");

    h.directory.remove_team_member(&h.team_two.id, &h.caller.user_id).await.expect("leave team");
    let error = h
        .executor
        .execute(Some(&h.caller), &request, "req-after")
        .await
        .expect_err("removed from team");
    assert!(matches!(error, CommandError::Forbidden(_)));
}

#[tokio::test]
async fn disabled_service_rejects_everything() {
    let h = harness(ExecutionSettings { enabled: false, site_url: None }, loopback_allowed()).await;

    for request in [in_channel(&h.channel, "/echo"), in_channel(&h.channel, "")] {
        let error = h
            .executor
            .execute(Some(&h.caller), &request, "req-disabled")
            .await
            .expect_err("disabled");
        assert!(matches!(error, CommandError::NotImplemented(_)));
    }
    assert!(matches!(
        h.executor.execute(None, &in_channel(&h.channel, "/echo"), "req-anon").await,
        Err(CommandError::NotImplemented(_))
    ));
}

#[tokio::test]
async fn missing_session_is_unauthorized() {
    let h = harness(enabled(), loopback_allowed()).await;

    let error = h
        .executor
        .execute(None, &in_channel(&h.channel, "/echo"), "req-anon")
        .await
        .expect_err("anonymous");
    assert_eq!(error, CommandError::Unauthorized);
}

#[tokio::test]
async fn every_execution_gets_a_fresh_trigger_id() {
    let server = MockServer::start().await;
    ok_json(&server).await;
    let h = harness(enabled(), loopback_allowed()).await;
    register(&h, &h.team_one, "echo", "G", format!("{}/echo", server.uri())).await;

    let mut ids = Vec::new();
    for attempt in 0..2 {
        let response = h
            .executor
            .execute(Some(&h.caller), &in_channel(&h.channel, "/echo"), &format!("req-{attempt}"))
            .await
            .expect("execution succeeds");
        let trigger_id = response.trigger_id.expect("trigger id");
        assert_eq!(trigger_id.as_str().len(), 26);
        ids.push(trigger_id);
    }
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn regenerated_token_is_sent_on_later_calls() {
    let server = MockServer::start().await;
    ok_json(&server).await;
    let h = harness(enabled(), loopback_allowed()).await;
    let command = register(&h, &h.team_one, "echo", "G", format!("{}/echo", server.uri())).await;

    let token = h
        .registry
        .regenerate_token(&MutationContext::new(UserId::generate(), "req-regen"), &command.id)
        .await
        .expect("regenerate");
    h.executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/echo"), "req-after-regen")
        .await
        .expect("execution succeeds");

    let requests = server.received_requests().await.expect("recorded");
    let sent: HashMap<String, String> = requests[0].url.query_pairs().into_owned().collect();
    assert_eq!(sent["token"], token);
    assert_ne!(sent["token"], command.token);
}

#[tokio::test]
async fn failing_integration_is_an_integration_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    let h = harness(enabled(), loopback_allowed()).await;
    register(&h, &h.team_one, "echo", "G", format!("{}/echo", server.uri())).await;

    let error = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/echo"), "req-500")
        .await
        .expect_err("integration failed");

    assert!(matches!(error, CommandError::Integration(_)));
    assert_eq!(h.audit.events().last().map(|e| e.outcome), Some(AuditOutcome::Failed));
}

#[tokio::test]
async fn unparsable_reply_is_an_integration_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("{not json", "application/json"),
        )
        .mount(&server)
        .await;
    let h = harness(enabled(), loopback_allowed()).await;
    register(&h, &h.team_one, "echo", "G", format!("{}/echo", server.uri())).await;

    let error = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/echo"), "req-garbage")
        .await
        .expect_err("bad payload");
    assert!(matches!(error, CommandError::Integration(_)));
}

#[tokio::test]
async fn internal_destination_is_blocked_without_allow_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let h = harness(enabled(), NetworkPolicy::default()).await;
    register(&h, &h.team_one, "echo", "G", format!("{}/echo", server.uri())).await;

    let error = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/echo"), "req-blocked")
        .await
        .expect_err("loopback blocked");
    match error {
        CommandError::Forbidden(detail) => assert!(!detail.contains("127.0.0.1"), "{detail}"),
        other => panic!("expected forbidden, got {other:?}"),
    }
    assert_eq!(h.audit.events().last().map(|e| e.category), Some(AuditCategory::Authorization));
}

#[tokio::test]
async fn slow_integration_times_out_within_the_configured_bound() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"text": "too late"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let h = harness_with_timeout(enabled(), loopback_allowed(), Duration::from_secs(1)).await;
    register(&h, &h.team_one, "echo", "G", format!("{}/echo", server.uri())).await;

    let started = std::time::Instant::now();
    let error = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/echo"), "req-slow")
        .await
        .expect_err("slow integration");

    assert!(matches!(error, CommandError::Integration(_)));
    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    let last = h.audit.events().last().cloned().expect("audit event");
    assert_eq!(last.outcome, AuditOutcome::Failed);
    assert_eq!(last.category, AuditCategory::Integration);
}

#[tokio::test]
async fn reply_with_null_collections_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"response_type":"","text":"","username":"","channel_id":"","icon_url":"","type":"","props":null,"goto_location":"","trigger_id":"","skip_slack_parsing":false,"attachments":null,"extra_responses":null}"#,
            "application/json",
        ))
        .mount(&server)
        .await;
    let h = harness(enabled(), loopback_allowed()).await;
    register(&h, &h.team_one, "echo", "G", format!("{}/echo", server.uri())).await;

    let response = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/echo"), "req-nulls")
        .await
        .expect("null fields decode to defaults");

    assert_eq!(response.response_type, ResponseType::Ephemeral);
    assert!(response.props.is_empty());
    assert_eq!(response.username, "hookbot");
    let trigger_id = response.trigger_id.expect("trigger id minted");
    assert!(is_valid_id(trigger_id.as_str()));
}

#[tokio::test]
async fn unregistered_builtin_answers_without_a_webhook() {
    let h = harness(enabled(), NetworkPolicy::default()).await;

    let response = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/Shrug oh well"), "req-shrug")
        .await
        .expect("built-in runs");

    assert_eq!(response.text, "oh well ¯\\_(ツ)_/¯");
    assert_eq!(response.response_type, ResponseType::InChannel);
    let trigger_id = response.trigger_id.expect("trigger id minted");
    assert!(is_valid_id(trigger_id.as_str()));
    let last = h.audit.events().last().cloned().expect("audit event");
    assert_eq!(last.outcome, AuditOutcome::Success);
    assert!(last.command_id.is_none());
}

#[tokio::test]
async fn registered_command_takes_precedence_over_builtin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shrug"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "from webhook"})))
        .expect(1)
        .mount(&server)
        .await;
    let h = harness(enabled(), loopback_allowed()).await;
    register(&h, &h.team_one, "shrug", "G", format!("{}/shrug", server.uri())).await;

    let response = h
        .executor
        .execute(Some(&h.caller), &in_channel(&h.channel, "/shrug"), "req-shadow")
        .await
        .expect("custom command runs");
    assert_eq!(response.text, "from webhook");
}
