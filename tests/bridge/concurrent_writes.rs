use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use hostbridge::document::{BridgeDocument, parse, render};
use hostbridge::error::StoreError;
use hostbridge::profile::default_questions;
use hostbridge::store::{AtomicStore, ReadOutcome, acquire_lock, lock_path_for};

use crate::bridge_harness::BridgeFixture;

fn document_for(index: usize) -> String {
    let questions = default_questions();
    let mut doc = BridgeDocument::ready(8, "forest_edge", "t0");
    let question = &questions[index % questions.len()];
    doc.install_question(question, index as u32, 8, &format!("t{index}"))
        .unwrap();
    render(&doc)
}

#[test]
fn readers_never_observe_partial_documents() {
    let fixture = BridgeFixture::new();
    let path = fixture.bridge_dir().join("bridge_state.usda");
    fixture.store().write(&path, &document_for(0)).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let path = path.clone();
        let done = Arc::clone(&done);
        let store = fixture.store();
        thread::spawn(move || {
            let mut observed = 0usize;
            while !done.load(Ordering::Relaxed) {
                if let ReadOutcome::Content(text) = store.read(&path) {
                    parse(&text).expect("reader saw a torn document");
                    observed += 1;
                }
            }
            observed
        })
    };

    let writers: Vec<_> = (0..2)
        .map(|w| {
            let path = path.clone();
            let store = fixture.store();
            thread::spawn(move || {
                for i in 0..25 {
                    store.write(&path, &document_for(w * 25 + i)).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::Relaxed);

    assert!(reader.join().unwrap() > 0);
    assert!(!lock_path_for(&path).exists());
    let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn competing_writer_waits_for_lock_then_succeeds() {
    let fixture = BridgeFixture::new();
    let path = fixture.bridge_dir().join("bridge_state.usda");
    let guard = acquire_lock(&path, Duration::from_secs(1), Duration::from_secs(30)).unwrap();

    let writer = {
        let path = path.clone();
        let store = fixture.store().with_lock_timeout(Duration::from_secs(5));
        thread::spawn(move || store.write(&path, &document_for(3)))
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!path.exists());
    drop(guard);

    writer.join().unwrap().unwrap();
    let doc = parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc.message.question_id, "feedback");
}

#[test]
fn competing_writer_times_out_cleanly() {
    let fixture = BridgeFixture::new();
    let path = fixture.bridge_dir().join("bridge_state.usda");
    fixture.store().write(&path, &document_for(0)).unwrap();
    let _guard = acquire_lock(&path, Duration::from_secs(1), Duration::from_secs(30)).unwrap();

    let store = AtomicStore::default().with_lock_timeout(Duration::from_millis(50));
    let err = store.write(&path, &document_for(1)).unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout { .. }));

    let doc = parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc.message.question_id, "load");
}
