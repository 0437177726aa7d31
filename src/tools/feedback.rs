use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FeedbackRequest {
    /// The claim the system judged
    pub original_claim: String,
    /// The verdict the system returned (e.g. "TRUE")
    pub system_verdict: String,
    /// The correct verdict according to the human reviewer
    pub human_correction: String,
    /// Optional reviewer notes on why the system was wrong
    pub notes: Option<String>,
}

impl FeedbackRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.original_claim.trim().is_empty() {
            return Err("original_claim must not be empty".to_string());
        }
        if self.human_correction.trim().is_empty() {
            return Err("human_correction must not be empty".to_string());
        }
        Ok(())
    }
}
