use hostbridge::channel::{BridgeChannel, DocumentChannel};
use hostbridge::config::BridgeMode;
use hostbridge::consumer::Consumer;
use hostbridge::document::{SyncStatus, UNANSWERED, parse};
use hostbridge::profile::default_questions;

use crate::bridge_harness::BridgeFixture;

#[test]
fn answer_is_observed_cleared_and_not_reread() {
    let fixture = BridgeFixture::new();
    let dir = fixture.bridge_dir();
    let channel = DocumentChannel::new(&dir, fixture.store());
    let consumer = Consumer::new(&dir, BridgeMode::Document, fixture.store());
    let questions = default_questions();
    let load = &questions[0];
    assert_eq!(load.id, "load");

    channel.post_ready(8, &load.scene).unwrap();
    channel.post_question(load, 0, 8).unwrap();
    assert!(channel.read_answer().unwrap().is_none());

    let pending = consumer.pending_question().unwrap().expect("question visible");
    assert_eq!(pending.options.len(), 3);
    consumer.write_answer(&pending.question_id, 1, 1_250.0).unwrap();

    let answer = channel.read_answer().unwrap().expect("answer visible");
    assert_eq!(answer.question_id, "load");
    assert_eq!(answer.option_index, 1);
    assert_eq!(answer.selected_label, load.options[1].label);

    channel.acknowledge_answer().unwrap();
    assert!(channel.read_answer().unwrap().is_none());

    channel.post_question(&questions[1], 1, 8).unwrap();
    assert!(channel.read_answer().unwrap().is_none());
}

#[test]
fn new_question_never_carries_previous_answer() {
    let fixture = BridgeFixture::new();
    let dir = fixture.bridge_dir();
    let channel = DocumentChannel::new(&dir, fixture.store());
    let consumer = Consumer::new(&dir, BridgeMode::Document, fixture.store());
    let questions = default_questions();

    channel.post_question(&questions[0], 0, 8).unwrap();
    consumer.write_answer("load", 2, 300.0).unwrap();
    // Orchestrator moves on without acknowledging.
    channel.post_question(&questions[1], 1, 8).unwrap();

    let text = std::fs::read_to_string(channel.state_path()).unwrap();
    let doc = parse(&text).unwrap();
    assert_eq!(doc.message.question_id, "pace");
    assert_eq!(doc.answer.option_index, UNANSWERED);
    assert_eq!(doc.sync_status, SyncStatus::QuestionPending);
}

#[test]
fn host_written_compact_answer_is_read() {
    let fixture = BridgeFixture::new();
    let dir = fixture.bridge_dir();
    let channel = DocumentChannel::new(&dir, fixture.store());
    channel.post_question(&default_questions()[0], 0, 8).unwrap();

    // The host rewrites the Answer prim on a single line.
    let original = std::fs::read_to_string(channel.state_path()).unwrap();
    let start = original.find("    def Xform \"Answer\"").unwrap();
    let end = start + original[start..].find("    }\n").unwrap() + "    }\n".len();
    let compact = format!(
        "{}    def Xform \"Answer\" {{ string question_id = \"load\"; int option_index = 0; double response_time_ms = 420.0 }}\n{}",
        &original[..start],
        &original[end..]
    );
    std::fs::write(channel.state_path(), compact).unwrap();

    let answer = channel.read_answer().unwrap().expect("compact answer visible");
    assert_eq!(answer.question_id, "load");
    assert_eq!(answer.option_index, 0);
    assert!((answer.response_time_ms - 420.0).abs() < f64::EPSILON);
}
