use std::time::Duration;

use hostbridge::codec::{checksum, parse_exec_anchor};
use hostbridge::config::BridgeMode;
use hostbridge::consumer::{Consumer, simulate};
use hostbridge::document::{BRIDGE_FILE, SyncStatus, parse};
use hostbridge::heartbeat::{HEARTBEAT_FILE, is_peer_alive};
use hostbridge::orchestrator::Orchestrator;
use hostbridge::poll::AdaptivePoller;
use hostbridge::profile::PROFILE_FILE;

use crate::bridge_harness::BridgeFixture;

async fn run_with_simulator(fixture: &BridgeFixture, mode: BridgeMode, answer_index: usize) {
    let dir = fixture.bridge_dir();
    let consumer = Consumer::new(&dir, mode, fixture.store());
    let poller = AdaptivePoller::from_config(&fixture.config.polling);
    let host = tokio::spawn(async move {
        simulate(&consumer, &poller, answer_index, Duration::from_secs(10)).await
    });

    let report = Orchestrator::new(fixture.config.clone())
        .run(mode)
        .await
        .expect("session completes");
    let simulated = host.await.unwrap().unwrap();

    assert!(report.acked);
    assert_eq!(report.answers.len(), 8);
    assert!(simulated.completed);
    assert_eq!(simulated.checksum.as_deref(), Some(report.profile.checksum.as_str()));

    let expected = checksum(
        report
            .profile
            .dimensions
            .iter()
            .map(|(k, v)| (k.as_str(), *v)),
    );
    assert_eq!(report.profile.checksum, expected);

    let anchor = parse_exec_anchor(&report.anchor).expect("anchor parses");
    assert_eq!(anchor.checksum, report.profile.checksum);

    let exported = std::fs::read_to_string(dir.join(PROFILE_FILE)).unwrap();
    assert!(exported.contains(&format!("[TRANSLATORS:{}]", report.profile.checksum)));
}

#[tokio::test]
async fn document_session_end_to_end() {
    let mut fixture = BridgeFixture::new();
    fixture.config.heartbeat.enabled = true;
    fixture.config.heartbeat.interval_secs = 1;
    run_with_simulator(&fixture, BridgeMode::Document, 2).await;

    let dir = fixture.bridge_dir();
    let doc = parse(&std::fs::read_to_string(dir.join(BRIDGE_FILE)).unwrap()).unwrap();
    assert_eq!(doc.sync_status, SyncStatus::Complete);
    assert!(doc.finale.message.contains("[EXEC:"));
    assert!(is_peer_alive(&dir.join(HEARTBEAT_FILE), &fixture.config.heartbeat));
}

#[tokio::test]
async fn legacy_session_end_to_end() {
    let fixture = BridgeFixture::new();
    run_with_simulator(&fixture, BridgeMode::LegacyJson, 0).await;

    let state: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(fixture.bridge_dir().join("state.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(state["type"], "finale");
    assert_eq!(state["questions_answered"], 8);
}

#[tokio::test]
async fn missing_consumer_times_out_after_ready() {
    let mut fixture = BridgeFixture::new();
    fixture.config.bridge.ack_timeout_secs = 0;
    fixture.config.bridge.answer_timeout_secs = 1;

    let err = Orchestrator::new(fixture.config.clone())
        .run(BridgeMode::Document)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no answer"));

    let doc = parse(&std::fs::read_to_string(fixture.bridge_dir().join(BRIDGE_FILE)).unwrap()).unwrap();
    assert_eq!(doc.sync_status, SyncStatus::QuestionPending);
    assert_eq!(doc.message.question_id, "load");
}
