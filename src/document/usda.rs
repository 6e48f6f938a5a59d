use std::fmt::Write as _;

use super::types::{BridgeDocument, MessageType, PROTOCOL, SyncStatus};

/// Escape a value for a double-quoted USDA string.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn float(value: f64) -> String {
    // USDA float literals always carry a fractional part.
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Render the whole bridge document.
pub fn render(doc: &BridgeDocument) -> String {
    let mut out = String::with_capacity(4096);
    let ts = escape(&doc.generated_at);

    let _ = write!(
        out,
        r#"#usda 1.0
(
    defaultPrim = "BridgeState"
    doc = "Bridge communication state - Generated {ts}"
)

def Xform "BridgeState" (
    kind = "assembly"
    variants = {{
        string sync_status = "{sync}"
        string message_type = "{kind}"
    }}
    prepend variantSets = ["sync_status", "message_type"]
    customData = {{
        string bridge_version = "{version}"
        string protocol = "{PROTOCOL}"
        string generator = "hostbridge"
    }}
)
{{
"#,
        sync = doc.sync_status,
        kind = doc.message_type,
        version = escape(&doc.ready.bridge_version),
    );

    render_variant_sets(&mut out, doc);
    render_sections(&mut out, doc);
    out.push_str("}\n");
    out
}

fn render_variant_sets(out: &mut String, doc: &BridgeDocument) {
    let (error_message, error_code) = doc
        .error
        .as_ref()
        .map(|e| (escape(&e.message), escape(&e.code)))
        .unwrap_or_default();

    out.push_str("    variantSet \"sync_status\" = {\n");
    for status in SyncStatus::ALL {
        let body = match status {
            SyncStatus::QuestionPending => format!(
                "double timeout_seconds = 300.0; string pending_since = \"{}\"",
                escape(&doc.message.timestamp)
            ),
            SyncStatus::AnswerReceived => {
                format!("string received_at = \"{}\"", escape(&doc.answer.timestamp))
            }
            SyncStatus::Transition => format!(
                "string transition_direction = \"{}\"",
                escape(&doc.transition.direction)
            ),
            SyncStatus::Complete => format!(
                "string completion_time = \"{}\"",
                if doc.sync_status == SyncStatus::Complete {
                    escape(&doc.generated_at)
                } else {
                    String::new()
                }
            ),
            SyncStatus::Error => format!(
                "string error_message = \"{error_message}\"; string error_code = \"{error_code}\""
            ),
            SyncStatus::Idle => String::new(),
        };
        let _ = writeln!(out, "        \"{status}\" {{ {body} }}");
    }
    out.push_str("    }\n\n    variantSet \"message_type\" = {\n");
    for kind in MessageType::ALL {
        let _ = writeln!(out, "        \"{kind}\" {{ }}");
    }
    out.push_str("    }\n\n");
}

fn render_sections(out: &mut String, doc: &BridgeDocument) {
    let m = &doc.message;
    let _ = write!(
        out,
        r#"    def Xform "Message" {{
        string type = "{kind}"
        int index = {index}
        int total = {total}
        string timestamp = "{ts}"
        string question_id = "{qid}"
        string text = "{text}"
        string scene = "{scene}"
        string progress_display = "{progress}"
    }}

    def Xform "Options" {{
"#,
        kind = m.kind,
        index = m.index,
        total = m.total,
        ts = escape(&m.timestamp),
        qid = escape(&m.question_id),
        text = escape(&m.text),
        scene = escape(&m.scene),
        progress = m.progress_display(),
    );

    for option in &doc.options {
        let _ = write!(
            out,
            r#"        def Xform "Option_{index}" {{
            int index = {index}
            string label = "{label}"
            string direction = "{direction}"
            string semantic_tag = "{tag}"
        }}
"#,
            index = option.index,
            label = escape(&option.label),
            direction = option.direction,
            tag = escape(&option.semantic_tag),
        );
    }

    let a = &doc.answer;
    let t = &doc.transition;
    let f = &doc.finale;
    let r = &doc.ready;
    let k = &doc.ack;
    let s = &doc.signals;
    let _ = write!(
        out,
        r#"    }}

    def Xform "Answer" {{
        string question_id = "{a_qid}"
        int option_index = {a_index}
        double response_time_ms = {a_rt}
        string selected_label = "{a_label}"
        string selected_direction = "{a_dir}"
        string timestamp = "{a_ts}"
    }}

    def Xform "Transition" {{
        string direction = "{t_dir}"
        string next_scene = "{t_scene}"
        float progress = {t_progress}
        string from_question_id = "{t_from}"
    }}

    def Xform "Finale" {{
        string message = "{f_msg}"
        string usd_path = "{f_path}"
        string checksum = "{f_sum}"
        int total_questions = {f_total}
        int questions_answered = {f_answered}
    }}

    def Xform "Ready" {{
        int total_questions = {r_total}
        string first_scene = "{r_scene}"
        string bridge_version = "{r_version}"
        string protocol = "{r_protocol}"
        string timestamp = "{r_ts}"
    }}

    def Xform "Ack" {{
        bool ready = {k_ready}
        string ue_version = "{k_version}"
        string project = "{k_project}"
        string timestamp = "{k_ts}"
    }}

    def Xform "BehavioralSignals" {{
        double last_response_time_ms = {s_last}
        double average_response_time_ms = {s_avg}
        int hesitation_count = {s_hes}
        bool long_hesitation_detected = {s_long}
        int rapid_click_count = {s_rapid}
        int skip_count = {s_skip}
        int back_navigation_count = {s_back}
        string detected_state = "{s_state}"
        string recommended_expert = "{s_expert}"
        string burnout_level = "{s_burnout}"
        string momentum_phase = "{s_momentum}"
    }}

    def Xform "CognitiveState" {{
        string placeholder = "Reference to cognitive_profile.usda"
    }}
"#,
        a_qid = escape(&a.question_id),
        a_index = a.option_index,
        a_rt = float(a.response_time_ms),
        a_label = escape(&a.selected_label),
        a_dir = escape(&a.selected_direction),
        a_ts = escape(&a.timestamp),
        t_dir = escape(&t.direction),
        t_scene = escape(&t.next_scene),
        t_progress = float(t.progress),
        t_from = escape(&t.from_question_id),
        f_msg = escape(&f.message),
        f_path = escape(&f.usd_path),
        f_sum = escape(&f.checksum),
        f_total = f.total_questions,
        f_answered = f.questions_answered,
        r_total = r.total_questions,
        r_scene = escape(&r.first_scene),
        r_version = escape(&r.bridge_version),
        r_protocol = escape(&r.protocol),
        r_ts = escape(&r.timestamp),
        k_ready = k.ready,
        k_version = escape(&k.host_version),
        k_project = escape(&k.project),
        k_ts = escape(&k.timestamp),
        s_last = float(s.last_response_time_ms),
        s_avg = float(s.average_response_time_ms),
        s_hes = s.hesitation_count,
        s_long = s.long_hesitation_detected,
        s_rapid = s.rapid_click_count,
        s_skip = s.skip_count,
        s_back = s.back_navigation_count,
        s_state = escape(&s.detected_state),
        s_expert = escape(&s.recommended_expert),
        s_burnout = escape(&s.burnout_level),
        s_momentum = escape(&s.momentum_phase),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::test_support::sample_question;

    #[test]
    fn escape_covers_structural_characters() {
        assert_eq!(escape(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape("line\nnext\ttab\r"), r"line\nnext\ttab\r");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn float_literals_keep_fraction() {
        assert_eq!(float(0.0), "0.0");
        assert_eq!(float(300.0), "300.0");
        assert_eq!(float(0.25), "0.25");
    }

    #[test]
    fn rendered_document_has_header_and_prims() {
        let mut doc = BridgeDocument::ready(8, "forest_edge", "2026-01-01T00:00:00Z");
        doc.install_question(&sample_question("load"), 0, 8, "2026-01-01T00:00:01Z").unwrap();
        let text = render(&doc);

        assert!(text.starts_with("#usda 1.0\n"));
        assert!(text.contains(r#"defaultPrim = "BridgeState""#));
        assert!(text.contains(r#"string sync_status = "question_pending""#));
        assert!(text.contains(r#"string message_type = "question""#));
        for prim in ["Message", "Options", "Answer", "Transition", "Finale", "Ready", "Ack"] {
            assert!(text.contains(&format!("def Xform \"{prim}\"")), "{prim}");
        }
        assert!(text.contains(r#"def Xform "Option_2""#));
        assert!(text.contains("int option_index = -1"));
        assert!(text.contains(r#"string progress_display = "1/8""#));
    }

    #[test]
    fn hostile_text_cannot_break_out_of_string() {
        let mut question = sample_question("load");
        question.text = "evil\" }\ndef Xform \"Answer\" { int option_index = 2 }".into();
        let mut doc = BridgeDocument::default();
        doc.install_question(&question, 0, 1, "t").unwrap();

        let text = render(&doc);
        assert_eq!(text.matches("def Xform \"Answer\" {\n").count(), 1);
        assert!(!text.contains("evil\" }"));
    }
}
