use schemars::JsonSchema;
use serde::Deserialize;

/// Maximum accepted claim length. The pipeline verifies short statements,
/// not documents.
pub const MAX_CLAIM_CHARS: usize = 1000;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckClaimRequest {
    /// The claim to verify — a single short statement (Vietnamese or English)
    pub text: String,
    /// Planner model alias (defaults to the flash tier)
    pub model: Option<String>,
    /// Skip per-call LLM timeouts and query caps (batch callers)
    pub flash_mode: Option<bool>,
    /// Ask the planner for a broader tool strategy without query limits
    pub unlimit_mode: Option<bool>,
}

impl CheckClaimRequest {
    /// Validate the inbound claim. Empty input is handled downstream (it
    /// yields UNVERIFIED); oversized input is a caller error.
    pub fn validate(&self) -> Result<(), String> {
        if self.text.chars().count() > MAX_CLAIM_CHARS {
            return Err(format!(
                "claim too long: {} chars (max {MAX_CLAIM_CHARS}); submit a single short statement",
                self.text.chars().count()
            ));
        }
        Ok(())
    }
}
