use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::pipeline::Pipeline;
use crate::planner::PlanOptions;
use crate::response::{ToolMetadata, ToolResponse};
use crate::tools::check::CheckClaimRequest;
use crate::tools::feedback::FeedbackRequest;

/// The inbound RPC boundary: three tools over rmcp stdio. The pipeline
/// does all the work; this layer validates input and shapes responses.
#[derive(Clone)]
pub struct AttestServer {
    pipeline: Arc<Pipeline>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl AttestServer {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "check_claim",
        description = "Verify a short news claim (Vietnamese or English). Returns a verdict (TRUE / FALSE / MISLEADING / UNVERIFIED) with a reason and a cited evidence snippet. Idempotent modulo the semantic cache.",
        annotations(read_only_hint = true)
    )]
    async fn check_claim(
        &self,
        Parameters(req): Parameters<CheckClaimRequest>,
    ) -> Result<CallToolResult, McpError> {
        req.validate()
            .map_err(|msg| McpError::invalid_params(msg, None))?;
        let start = Instant::now();

        let opts = PlanOptions {
            flash_mode: req.flash_mode.unwrap_or(false),
            unlimit_mode: req.unlimit_mode.unwrap_or(false),
            model_alias: req.model.clone().filter(|m| !m.trim().is_empty()),
        };
        let verdict = self.pipeline.check_claim(&req.text, &opts).await;

        let metadata = ToolMetadata {
            tool_name: "check_claim".to_string(),
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        let response = match serde_json::to_value(&verdict) {
            Ok(value) => ToolResponse::success(value, metadata),
            Err(e) => ToolResponse::error(format!("verdict serialization failed: {e}"), metadata),
        };
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "feedback",
        description = "Record a human correction for a past verdict. Corrections are embedded and injected into future planner/synthesizer prompts for similar claims."
    )]
    async fn feedback(
        &self,
        Parameters(req): Parameters<FeedbackRequest>,
    ) -> Result<CallToolResult, McpError> {
        req.validate()
            .map_err(|msg| McpError::invalid_params(msg, None))?;
        let start = Instant::now();

        let result = self
            .pipeline
            .record_feedback(
                &req.original_claim,
                &req.system_verdict,
                &req.human_correction,
                req.notes.as_deref().unwrap_or(""),
            )
            .await;

        let metadata = ToolMetadata {
            tool_name: "feedback".to_string(),
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        let response = match result {
            Ok(()) => ToolResponse::success(serde_json::json!({"ok": true}), metadata),
            Err(e) => {
                tracing::warn!("feedback recording failed: {e}");
                ToolResponse::error(e.user_message(), metadata)
            }
        };
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "health",
        description = "Service liveness and version.",
        annotations(read_only_hint = true)
    )]
    async fn health(&self) -> Result<CallToolResult, McpError> {
        let response = ToolResponse::success(
            serde_json::json!({
                "status": "running",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            ToolMetadata {
                tool_name: "health".to_string(),
                duration_seconds: 0.0,
            },
        );
        Ok(response.into_call_tool_result())
    }
}

#[tool_handler]
impl ServerHandler for AttestServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "attest".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Attest: automated claim verification for short news statements.\n\n\
                 Tools:\n\
                 - `check_claim`: Verify one claim. The pipeline plans tool calls, gathers \
                 tiered evidence (structured weather readings, news search, Wikipedia, \
                 fact-check registry), and synthesizes a cited verdict. Weather and other \
                 fast-moving claims are never cached; stable facts are answered from the \
                 semantic cache when a closely similar claim was already verified.\n\
                 - `feedback`: Report a wrong verdict with the correct answer. Nearby \
                 corrections are shown to the agents on future similar claims.\n\
                 - `health`: Liveness and version."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
