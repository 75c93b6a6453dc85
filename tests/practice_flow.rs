//! Practice flow tests
//!
//! These tests drive the tool-call interpreter and practice tracker through
//! whole tutoring exchanges, the way calls arrive over a live session.

use parking_lot::Mutex;
use parla::live::wire::FunctionCall;
use parla::session::{
    PracticeState, PracticeTracker, ToolCallInterpreter, ToolResponder, WordStatus,
};
use serde_json::json;

/// Records acknowledgments instead of sending them over a socket
#[derive(Default)]
struct RecordingResponder {
    acks: Mutex<Vec<(String, String, String)>>,
}

impl RecordingResponder {
    fn acks(&self) -> Vec<(String, String, String)> {
        self.acks.lock().clone()
    }
}

impl ToolResponder for RecordingResponder {
    fn respond(&self, call_id: &str, name: &str, result: &str) -> parla::Result<()> {
        self.acks
            .lock()
            .push((call_id.to_string(), name.to_string(), result.to_string()));
        Ok(())
    }
}

fn call(id: &str, name: &str, args: serde_json::Value) -> FunctionCall {
    serde_json::from_value(json!({ "id": id, "name": name, "args": args })).unwrap()
}

#[test]
fn test_full_sentence_practice_flow() {
    let interpreter = ToolCallInterpreter::new();
    let responder = RecordingResponder::default();
    let mut tracker = PracticeTracker::new();

    assert_eq!(
        tracker.state(),
        PracticeState::NoSentence,
        "A fresh session has no sentence"
    );

    interpreter.handle(
        &mut tracker,
        &call(
            "c1",
            "setTargetSentence",
            json!({"sentence": "I am happy", "translation": "أنا سعيد"}),
        ),
        &responder,
    );

    assert_eq!(tracker.state(), PracticeState::Practicing);
    let sentence = tracker.sentence().expect("sentence should be set");
    assert_eq!(sentence.word_count(), 3);
    assert_eq!(sentence.translation, "أنا سعيد");

    // The learner works through the words, stumbling on the second
    let updates = [
        ("c2", 0, "correct"),
        ("c3", 1, "incorrect"),
        ("c4", 1, "correct"),
        ("c5", 2, "correct"),
    ];
    for (id, index, status) in updates {
        interpreter.handle(
            &mut tracker,
            &call(
                id,
                "updatePronunciation",
                json!({"wordIndex": index, "status": status}),
            ),
            &responder,
        );
    }

    assert_eq!(
        tracker.state(),
        PracticeState::Perfect,
        "All words correct should reach Perfect"
    );

    let acks = responder.acks();
    assert_eq!(acks.len(), 5, "Every call is acknowledged exactly once");
    assert_eq!(acks[0].2, "displayed");
    for ack in &acks[1..] {
        assert_eq!(ack.2, "updated");
    }
}

#[test]
fn test_next_sentence_rearms_after_perfect() {
    let interpreter = ToolCallInterpreter::new();
    let responder = RecordingResponder::default();
    let mut tracker = PracticeTracker::new();

    interpreter.handle(
        &mut tracker,
        &call(
            "c1",
            "setTargetSentence",
            json!({"sentence": "go", "translation": "روح"}),
        ),
        &responder,
    );
    interpreter.handle(
        &mut tracker,
        &call(
            "c2",
            "updatePronunciation",
            json!({"wordIndex": 0, "status": "correct"}),
        ),
        &responder,
    );
    assert_eq!(tracker.state(), PracticeState::Perfect);

    // The tutor celebrates and moves on
    interpreter.handle(
        &mut tracker,
        &call(
            "c3",
            "setTargetSentence",
            json!({"sentence": "come back soon", "translation": "ارجع قريب"}),
        ),
        &responder,
    );

    assert_eq!(
        tracker.state(),
        PracticeState::Practicing,
        "A new sentence rearms the perfect latch"
    );
    assert_eq!(tracker.sentence().unwrap().word_count(), 3);
    assert!(tracker
        .sentence()
        .unwrap()
        .words
        .iter()
        .all(|w| w.status == WordStatus::Pending));
}

#[test]
fn test_perfect_survives_late_incorrect_update() {
    let interpreter = ToolCallInterpreter::new();
    let responder = RecordingResponder::default();
    let mut tracker = PracticeTracker::new();

    interpreter.handle(
        &mut tracker,
        &call(
            "c1",
            "setTargetSentence",
            json!({"sentence": "go now", "translation": ""}),
        ),
        &responder,
    );
    for (id, index) in [("c2", 0), ("c3", 1)] {
        interpreter.handle(
            &mut tracker,
            &call(
                id,
                "updatePronunciation",
                json!({"wordIndex": index, "status": "correct"}),
            ),
            &responder,
        );
    }
    assert_eq!(tracker.state(), PracticeState::Perfect);

    // A straggling verdict for the same sentence cannot take it back
    interpreter.handle(
        &mut tracker,
        &call(
            "c4",
            "updatePronunciation",
            json!({"wordIndex": 0, "status": "incorrect"}),
        ),
        &responder,
    );

    assert_eq!(
        tracker.state(),
        PracticeState::Perfect,
        "Perfect is a one-way latch per sentence"
    );
    assert_eq!(
        tracker.sentence().unwrap().words[0].status,
        WordStatus::Incorrect,
        "The word status itself still updates"
    );
}

#[test]
fn test_bad_calls_do_not_derail_the_session() {
    let interpreter = ToolCallInterpreter::new();
    let responder = RecordingResponder::default();
    let mut tracker = PracticeTracker::new();

    // Update before any sentence exists
    interpreter.handle(
        &mut tracker,
        &call(
            "c1",
            "updatePronunciation",
            json!({"wordIndex": 0, "status": "correct"}),
        ),
        &responder,
    );

    interpreter.handle(
        &mut tracker,
        &call(
            "c2",
            "setTargetSentence",
            json!({"sentence": "I am happy", "translation": "أنا سعيد"}),
        ),
        &responder,
    );

    // Out of range, malformed, and unknown calls in the middle of practice
    interpreter.handle(
        &mut tracker,
        &call(
            "c3",
            "updatePronunciation",
            json!({"wordIndex": 10, "status": "correct"}),
        ),
        &responder,
    );
    interpreter.handle(
        &mut tracker,
        &call("c4", "updatePronunciation", json!({"wordIndex": "first"})),
        &responder,
    );
    interpreter.handle(&mut tracker, &call("c5", "dimLights", json!({})), &responder);

    // The session keeps going as if nothing happened
    interpreter.handle(
        &mut tracker,
        &call(
            "c6",
            "updatePronunciation",
            json!({"wordIndex": 0, "status": "correct"}),
        ),
        &responder,
    );

    assert_eq!(tracker.state(), PracticeState::Practicing);
    assert_eq!(
        tracker.sentence().unwrap().words[0].status,
        WordStatus::Correct
    );

    let acks = responder.acks();
    assert_eq!(acks.len(), 6, "Even bad calls are acknowledged");
    assert_eq!(acks[0].2, "updated", "No-sentence update is a no-op but valid");
    assert_eq!(acks[2].2, "updated", "Out-of-range index is a no-op but valid");
    assert_eq!(acks[3].2, "ignored", "Malformed arguments are rejected");
    assert_eq!(acks[4].2, "ignored", "Unknown tools are rejected");
}

#[test]
fn test_punctuation_stripped_for_display() {
    let interpreter = ToolCallInterpreter::new();
    let responder = RecordingResponder::default();
    let mut tracker = PracticeTracker::new();

    interpreter.handle(
        &mut tracker,
        &call(
            "c1",
            "setTargetSentence",
            json!({"sentence": "Hello, how are you?", "translation": "إزيك؟"}),
        ),
        &responder,
    );

    let words: Vec<&str> = tracker
        .sentence()
        .unwrap()
        .words
        .iter()
        .map(|w| w.text.as_str())
        .collect();
    assert_eq!(words, vec!["Hello", "how", "are", "you?"]);
}
