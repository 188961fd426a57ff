use serde_json::Value;

const TEXT_FIELDS: [&str; 4] = ["stdout", "output", "result", "message"];

/// Turn a code execution response into the text shown in the output pane.
///
/// Accepts the raw backend response, a `{status: "success", data}` envelope,
/// or a bare payload relayed by a peer.
pub fn render_output(response: &Value) -> String {
    let payload = unwrap_envelope(response);

    let text = match payload {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let primary = TEXT_FIELDS
                .iter()
                .find_map(|key| obj.get(*key).and_then(non_empty_str));
            if let Some(text) = primary {
                text.to_string()
            } else if let Some(stderr) = obj.get("stderr").and_then(non_empty_str) {
                stderr.to_string()
            } else {
                let mut parts = Vec::new();
                if let Some(actor) = obj.get("actor").filter(|v| truthy(v)) {
                    parts.push(format!("Run by: {}", plain(actor)));
                }
                for key in ["stdout", "stderr"] {
                    if let Some(v) = obj.get(key).filter(|v| truthy(v)) {
                        parts.push(plain(v));
                    }
                }
                if parts.is_empty() {
                    serde_json::to_string_pretty(payload).unwrap_or_default()
                } else {
                    parts.join("\n")
                }
            }
        }
        Value::Null => "No output".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    };

    text.replace("\r\n", "\n")
}

fn unwrap_envelope(value: &Value) -> &Value {
    let success = value.get("status").and_then(Value::as_str) == Some("success");
    match value.get("data") {
        Some(data) if success && truthy(data) => data,
        _ => value,
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        _ => true,
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stdout_crlf_is_normalized() {
        assert_eq!(render_output(&json!({ "stdout": "hi\r\n" })), "hi\n");
    }

    #[test]
    fn empty_object_renders_as_json() {
        assert_eq!(render_output(&json!({})), "{}");
    }

    #[test]
    fn envelope_is_unwrapped() {
        let resp = json!({ "status": "success", "data": { "output": "42\n" } });
        assert_eq!(render_output(&resp), "42\n");
    }

    #[test]
    fn precedence_falls_through_to_stderr() {
        let resp = json!({ "stdout": "", "stderr": "Traceback\r\nboom" });
        assert_eq!(render_output(&resp), "Traceback\nboom");
    }

    #[test]
    fn message_beats_stderr() {
        let resp = json!({ "message": "timeout", "stderr": "ignored" });
        assert_eq!(render_output(&resp), "timeout");
    }

    #[test]
    fn string_payload_is_shown_as_is() {
        assert_eq!(render_output(&json!("plain text")), "plain text");
    }

    #[test]
    fn actor_line_without_text() {
        assert_eq!(render_output(&json!({ "actor": "Ada", "stdout": 7 })), "Run by: Ada\n7");
    }

    #[test]
    fn null_means_no_output() {
        assert_eq!(render_output(&Value::Null), "No output");
    }
}
