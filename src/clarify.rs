//! Mid-execution clarification requests
//!
//! Backends can answer with a JSON envelope asking for more context
//! instead of a solution. The orchestrator parses those envelopes and
//! re-invokes the strategy with the gathered context, bounded to a fixed
//! number of iterations.

use serde::{Deserialize, Serialize};

/// A backend's request for more context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub question: String,
    #[serde(default)]
    pub files_needed: Vec<String>,
    #[serde(default)]
    pub context_type: Option<String>,
    #[serde(default)]
    pub suggested_next_action: Option<serde_json::Value>,
}

/// Wire envelope: `{"status":"requires_clarification", ...}`
#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    files_needed: Vec<String>,
    #[serde(default)]
    context_type: Option<String>,
    #[serde(default)]
    suggested_next_action: Option<serde_json::Value>,
}

/// Parse a response body for a clarification envelope.
///
/// Returns `None` for ordinary responses. The envelope may be embedded in
/// surrounding prose; the outermost brace span is tried.
pub fn parse_clarification(content: &str) -> Option<ClarificationRequest> {
    if !content.contains("requires_clarification") {
        return None;
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    let envelope: Envelope = serde_json::from_str(&content[start..=end]).ok()?;
    if envelope.status != "requires_clarification" {
        return None;
    }

    Some(ClarificationRequest {
        question: envelope.question,
        files_needed: envelope.files_needed,
        context_type: envelope.context_type,
        suggested_next_action: envelope.suggested_next_action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_response_is_not_clarification() {
        assert_eq!(parse_clarification("Here is the fix: use a mutex."), None);
        assert_eq!(parse_clarification("{\"status\":\"success\"}"), None);
    }

    #[test]
    fn test_parses_envelope() {
        let body = r#"{"status":"requires_clarification","question":"Which database?","files_needed":["db/schema.sql"],"context_type":"schema"}"#;
        let request = parse_clarification(body).unwrap();
        assert_eq!(request.question, "Which database?");
        assert_eq!(request.files_needed, vec!["db/schema.sql".to_string()]);
        assert_eq!(request.context_type.as_deref(), Some("schema"));
    }

    #[test]
    fn test_parses_envelope_embedded_in_prose() {
        let body = concat!(
            "I need more information first.\n",
            r#"{"status":"requires_clarification","question":"Show me the config loader"}"#,
            "\nThanks."
        );
        let request = parse_clarification(body).unwrap();
        assert_eq!(request.question, "Show me the config loader");
        assert!(request.files_needed.is_empty());
    }

    #[test]
    fn test_malformed_envelope_ignored() {
        assert_eq!(
            parse_clarification("requires_clarification but { not json"),
            None
        );
    }
}
