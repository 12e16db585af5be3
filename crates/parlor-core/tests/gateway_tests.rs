//! End-to-end gateway scenarios
//!
//! Drive the full façade against the scripted runtime: block lifecycle on
//! first contact, cache behavior around writes, rate-limit surfacing,
//! ownership isolation, and transcript shaping.

use parlor_core::{
    Gateway, GatewayConfig, GatewayError, Identity, MemoryBlockStore, OperationClass, RateQuota,
};
use parlor_test_utils::MockRuntime;
use parlor_upstream::{AgentMessage, MessageKind, Passage, UpstreamError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn gateway_with(config: GatewayConfig) -> (Arc<Gateway>, Arc<MockRuntime>) {
    let runtime = Arc::new(MockRuntime::new());
    let gateway = Gateway::new(
        config,
        Arc::clone(&runtime) as Arc<dyn parlor_upstream::AgentRuntime>,
        Arc::new(MemoryBlockStore::new()) as Arc<dyn parlor_core::BlockStore>,
    );
    (Arc::new(gateway), runtime)
}

fn gateway() -> (Arc<Gateway>, Arc<MockRuntime>) {
    gateway_with(GatewayConfig::default())
}

fn message(kind: MessageKind, content: &str, ts: i64) -> AgentMessage {
    use chrono::TimeZone;
    AgentMessage {
        id: None,
        message_type: kind,
        content: content.to_string(),
        reasoning: None,
        date: Some(chrono::Utc.timestamp_opt(ts, 0).unwrap()),
    }
}

#[tokio::test]
async fn first_send_runs_the_full_block_lifecycle() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);
    runtime.set_reply(MockRuntime::assistant_reply("hello u1"));

    assert!(gateway.block_record(&identity).unwrap().is_none());

    let receipt = gateway
        .send_message_for_identity(&identity, &agent, "hi")
        .await
        .unwrap();

    assert_eq!(receipt.messages.len(), 1);
    assert_eq!(receipt.messages[0].content, "hello u1");
    assert!(!receipt.detach_warning);

    assert_eq!(runtime.calls.create_block.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.calls.attach_block.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.calls.send_message.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.calls.detach_block.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.live_attachments(), 0);

    // The record is now persisted; a second send reuses the block
    gateway
        .send_message_for_identity(&identity, &agent, "again")
        .await
        .unwrap();
    assert_eq!(runtime.calls.create_block.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_send_detaches_and_reports_unavailable() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);

    runtime.fail_send_message(Some(UpstreamError::Transport("connection reset".to_string())));

    let err = gateway
        .send_message_for_identity(&identity, &agent, "hi")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::UpstreamUnavailable(_)));
    assert_eq!(runtime.calls.attach_block.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.calls.detach_block.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.live_attachments(), 0);
}

#[tokio::test]
async fn detach_failure_surfaces_as_warning_not_error() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);
    runtime.set_reply(MockRuntime::assistant_reply("ok"));
    runtime.fail_detach_block(Some(UpstreamError::Timeout));

    let receipt = gateway
        .send_message_for_identity(&identity, &agent, "hi")
        .await
        .unwrap();

    assert!(receipt.detach_warning);
    assert_eq!(receipt.messages[0].content, "ok");
}

#[tokio::test]
async fn listings_are_cached_within_the_ttl() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    runtime.seed_agent("helper", &["user:u1"]);

    let first = gateway.list_agents_for_identity(&identity).await.unwrap();
    let second = gateway.list_agents_for_identity(&identity).await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(runtime.calls.list_agents.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn agent_create_invalidates_the_listing_before_returning() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    runtime.seed_agent("existing", &["user:u1"]);

    let before = gateway.list_agents_for_identity(&identity).await.unwrap();
    assert_eq!(before.len(), 1);

    gateway
        .create_agent_for_identity(&identity, gateway.default_draft())
        .await
        .unwrap();

    // The next read misses the cache and sees the new agent
    let after = gateway.list_agents_for_identity(&identity).await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(runtime.calls.list_agents.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sends_invalidate_the_listing() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);
    runtime.set_reply(MockRuntime::assistant_reply("ok"));

    gateway.list_agents_for_identity(&identity).await.unwrap();
    gateway
        .send_message_for_identity(&identity, &agent, "hi")
        .await
        .unwrap();
    gateway.list_agents_for_identity(&identity).await.unwrap();

    assert_eq!(runtime.calls.list_agents.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn spent_send_budget_denies_with_retry_hint() {
    let config = GatewayConfig::default().with_send_quota(RateQuota::new(2, 60));
    let (gateway, runtime) = gateway_with(config);
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);
    runtime.set_reply(MockRuntime::assistant_reply("ok"));

    for _ in 0..2 {
        gateway
            .send_message_for_identity(&identity, &agent, "hi")
            .await
            .unwrap();
    }

    let err = gateway
        .send_message_for_identity(&identity, &agent, "hi")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::RateLimited { .. }));
    assert!(err.retry_after().unwrap() > 0);
    // The denied request never touched the block lifecycle
    assert_eq!(runtime.calls.attach_block.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limited_and_unavailable_stay_distinguishable() {
    let config = GatewayConfig::default().with_send_quota(RateQuota::new(1, 60));
    let (gateway, runtime) = gateway_with(config);
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);

    runtime.fail_send_message(Some(UpstreamError::Timeout));
    let unavailable = gateway
        .send_message_for_identity(&identity, &agent, "hi")
        .await
        .unwrap_err();
    let limited = gateway
        .send_message_for_identity(&identity, &agent, "hi")
        .await
        .unwrap_err();

    assert!(unavailable.retry_after().is_none());
    assert!(limited.retry_after().is_some());
}

#[tokio::test]
async fn foreign_agents_read_as_not_found() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    let foreign = runtime.seed_agent("theirs", &["user:u2"]);

    let err = gateway
        .send_message_for_identity(&identity, &foreign, "hi")
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::AgentNotFound(_)));
    assert_eq!(runtime.calls.attach_block.load(Ordering::SeqCst), 0);

    let err = gateway
        .get_agent_for_identity(&identity, &foreign)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::AgentNotFound(_)));
}

#[tokio::test]
async fn shared_identity_mode_sees_every_agent() {
    let config = GatewayConfig::default().with_cookie_auth(false);
    let (gateway, runtime) = gateway_with(config);

    runtime.seed_agent("a", &["user:u1"]);
    runtime.seed_agent("b", &[]);

    let resolved = gateway.resolve_identity(Some("ignored-marker"));
    assert_eq!(resolved.identity.as_str(), parlor_core::SHARED_IDENTITY);
    assert!(resolved.set_marker.is_none());

    let agents = gateway
        .list_agents_for_identity(&resolved.identity)
        .await
        .unwrap();
    assert_eq!(agents.len(), 2);
}

#[tokio::test]
async fn invalid_messages_never_reach_upstream() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);

    let empty = gateway
        .send_message_for_identity(&identity, &agent, "   ")
        .await
        .unwrap_err();
    assert!(matches!(empty, GatewayError::InvalidInput(_)));

    let oversized = "x".repeat(4001);
    let too_long = gateway
        .send_message_for_identity(&identity, &agent, &oversized)
        .await
        .unwrap_err();
    assert!(matches!(too_long, GatewayError::InvalidInput(_)));

    assert_eq!(runtime.calls.get_agent.load(Ordering::SeqCst), 0);
    assert_eq!(runtime.calls.send_message.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn drafts_are_validated_and_scoped_to_the_identity() {
    let (gateway, _runtime) = gateway();
    let identity = Identity::new("u1");

    let mut bad = gateway.default_draft();
    bad.model = "mystery/model".to_string();
    let err = gateway
        .create_agent_for_identity(&identity, bad)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidInput(_)));

    let created = gateway
        .create_agent_for_identity(&identity, gateway.default_draft())
        .await
        .unwrap();
    assert!(created.tags.contains(&"user:u1".to_string()));
}

#[tokio::test]
async fn conversation_hides_runtime_internal_traffic() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);

    runtime.seed_messages(
        &agent,
        vec![
            message(MessageKind::SystemMessage, "boot prompt", 1),
            message(
                MessageKind::UserMessage,
                r#"{"type":"heartbeat","reason":"timer"}"#,
                2,
            ),
            message(MessageKind::AssistantMessage, "welcome back", 4),
            message(MessageKind::UserMessage, "hello", 3),
        ],
    );

    let transcript = gateway
        .conversation_for_identity(&identity, &agent)
        .await
        .unwrap();

    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].content, "hello");
    assert_eq!(transcript[1].content, "welcome back");
}

#[tokio::test]
async fn archival_memory_degrades_to_empty_when_missing() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);

    runtime.fail_list_archival(Some(UpstreamError::NotFound("no archival".to_string())));
    let passages = gateway
        .archival_memory_for_identity(&identity, &agent)
        .await
        .unwrap();
    assert!(passages.is_empty());

    // A transport failure is not a missing archive
    runtime.fail_list_archival(Some(UpstreamError::Timeout));
    let err = gateway
        .archival_memory_for_identity(&identity, &agent)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UpstreamUnavailable(_)));

    runtime.fail_list_archival(None);
    runtime.seed_passages(
        &agent,
        vec![Passage {
            id: Some("p1".to_string()),
            text: "remembered fact".to_string(),
            created_at: None,
        }],
    );
    let passages = gateway
        .archival_memory_for_identity(&identity, &agent)
        .await
        .unwrap();
    assert_eq!(passages.len(), 1);
}

#[tokio::test]
async fn concurrent_sends_for_one_identity_hold_one_lease() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);
    runtime.set_reply(MockRuntime::assistant_reply("ok"));
    runtime.set_send_delay(Duration::from_millis(15));

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let gateway = Arc::clone(&gateway);
            let identity = identity.clone();
            let agent = agent.clone();
            tokio::spawn(async move {
                gateway
                    .send_message_for_identity(&identity, &agent, "hi")
                    .await
                    .unwrap()
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(runtime.max_live_attachments(), 1);
    assert_eq!(runtime.calls.attach_block.load(Ordering::SeqCst), 6);
    assert_eq!(runtime.calls.detach_block.load(Ordering::SeqCst), 6);
    assert!(gateway.active_lease(&identity).is_none());
}

#[tokio::test]
async fn teardown_forgets_the_block_record() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);
    runtime.set_reply(MockRuntime::assistant_reply("ok"));

    gateway
        .send_message_for_identity(&identity, &agent, "hi")
        .await
        .unwrap();
    assert!(gateway.block_record(&identity).unwrap().is_some());

    gateway.teardown_identity(&identity).unwrap();
    assert!(gateway.block_record(&identity).unwrap().is_none());

    // The next exchange mints a fresh block
    gateway
        .send_message_for_identity(&identity, &agent, "hi")
        .await
        .unwrap();
    assert_eq!(runtime.calls.create_block.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn persona_updates_flow_through_the_registry() {
    let (gateway, runtime) = gateway();
    let identity = Identity::new("u1");

    let record = gateway
        .update_persona_for_identity(&identity, "prefers formal tone")
        .await
        .unwrap();
    assert_eq!(record.identity, identity);
    assert_eq!(runtime.calls.update_block.load(Ordering::SeqCst), 1);

    let oversized = "x".repeat(1001);
    let err = gateway
        .update_persona_for_identity(&identity, &oversized)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidInput(_)));
}

#[tokio::test]
async fn remaining_budget_is_reported_per_class() {
    let config = GatewayConfig::default()
        .with_read_quota(RateQuota::new(10, 60))
        .with_send_quota(RateQuota::new(3, 60));
    let (gateway, runtime) = gateway_with(config);
    let identity = Identity::new("u1");
    let agent = runtime.seed_agent("helper", &["user:u1"]);
    runtime.set_reply(MockRuntime::assistant_reply("ok"));

    gateway
        .send_message_for_identity(&identity, &agent, "hi")
        .await
        .unwrap();

    assert_eq!(gateway.remaining_budget(&identity, OperationClass::Send), 2);
    assert_eq!(
        gateway.remaining_budget(&identity, OperationClass::Read),
        10
    );
}

#[tokio::test]
async fn runtime_info_passes_through() {
    let (gateway, _runtime) = gateway();
    let info = gateway.runtime_info().await.unwrap();
    assert_eq!(info.base_url, "mock://runtime");
}
