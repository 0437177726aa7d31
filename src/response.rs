use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

/// Envelope returned by every tool. The verdict (or error text) rides in
/// `content` as JSON; transport-level success is always reported so one
/// failed tool call can't cascade into sibling cancellations client-side.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub status: &'static str,
    pub content: serde_json::Value,
    pub metadata: ToolMetadata,
}

#[derive(Debug, Serialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    pub duration_seconds: f64,
}

impl ToolResponse {
    pub fn success(content: serde_json::Value, metadata: ToolMetadata) -> Self {
        Self {
            status: "success",
            content,
            metadata,
        }
    }

    pub fn error(message: String, metadata: ToolMetadata) -> Self {
        Self {
            status: "error",
            content: serde_json::Value::String(message),
            metadata,
        }
    }

    pub fn into_call_tool_result(mut self) -> CallToolResult {
        // Non-finite durations would make serde_json fail the whole reply.
        if !self.metadata.duration_seconds.is_finite() {
            self.metadata.duration_seconds = 0.0;
        }
        match serde_json::to_string(&self) {
            Ok(json) => CallToolResult::success(vec![Content::text(json)]),
            Err(e) => CallToolResult::success(vec![Content::text(format!(
                r#"{{"status":"error","content":"serialization failed: {e}","metadata":{{}}}}"#
            ))]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let resp = ToolResponse::success(
            serde_json::json!({"conclusion": "TRUE"}),
            ToolMetadata {
                tool_name: "check_claim".to_string(),
                duration_seconds: 1.5,
            },
        );
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["content"]["conclusion"], "TRUE");
        assert_eq!(v["metadata"]["tool_name"], "check_claim");
    }

    #[test]
    fn non_finite_duration_clamped() {
        let resp = ToolResponse::error(
            "boom".to_string(),
            ToolMetadata {
                tool_name: "check_claim".to_string(),
                duration_seconds: f64::NAN,
            },
        );
        // Must not panic or produce invalid JSON.
        let _ = resp.into_call_tool_result();
    }
}
