pub mod http;
pub mod registry;

use std::time::Duration;

/// Wire format spoken by an LLM endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    /// OpenAI-compatible chat completions (Groq).
    OpenAi,
    /// Gemini `streamGenerateContent?alt=sse`.
    Gemini,
}

/// One generation request, already resolved to a canonical model name.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// None disables the per-call timeout (flash mode); a generous internal
    /// ceiling still applies.
    pub timeout: Option<Duration>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    /// Disable content blocking (verification workloads read hostile text).
    pub safety_off: bool,
    /// Attach the provider's built-in search tool where supported.
    pub enable_browse: bool,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            timeout: Some(Duration::from_secs(30)),
            system_prompt: None,
            temperature: None,
            safety_off: false,
            enable_browse: false,
        }
    }
}

/// Successful generation: accumulated text plus attribution.
#[derive(Debug)]
pub struct GenerateResult {
    pub text: String,
    pub model: String,
    pub provider: String,
}
