use crate::config::Secrets;
use crate::error::AttestError;
use crate::gateway::http::HttpDispatch;
use crate::gateway::{GenerateRequest, GenerateResult};

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Provider routed to for a canonical model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    Groq,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Groq => "groq",
        }
    }
}

/// Map user-facing aliases to canonical provider model names. Unknown
/// aliases pass through untouched.
pub fn normalize_alias(alias: &str) -> String {
    let canonical = match alias.trim() {
        "" => "models/gemini-2.5-flash",
        "gemini_flash" | "gemini flash" | "gemini-1.5-flash" | "gemini-2.5-flash"
        | "models/gemini_flash" => "models/gemini-2.5-flash",
        "gemini_pro" | "gemini-2.5-pro" => "models/gemini-2.5-pro",
        "gemma-3-1b" | "gemma-3-1b-it" | "google/gemma-3-1b" | "models/gemma-3-1b" => {
            "models/gemma-3-1b-it"
        }
        // 2B is not served; route to the 4B sibling.
        "gemma-3-2b" | "google/gemma-3-2b" | "models/gemma-3-2b" => "models/gemma-3-4b-it",
        "gemma-3-4b" | "gemma-3-4b-it" | "google/gemma-3-4b" | "models/gemma-3-4b" => {
            "models/gemma-3-4b-it"
        }
        "gemma-3-12b" | "gemma-3-12b-it" | "google/gemma-3-12b" | "models/gemma-3-12b" => {
            "models/gemma-3-12b-it"
        }
        "gemma-3-27b" | "gemma-3-27b-it" | "google/gemma-3-27b" | "models/gemma-3-27b" => {
            "models/gemma-3-27b-it"
        }
        "compound" | "groq/compound" => "groq/llama-3.3-70b-versatile",
        other => other,
    };
    canonical.to_string()
}

/// Prefix-based provider routing: anything mentioning gemini/gemma speaks
/// the Gemini API, groq/llama names go to Groq's OpenAI-compatible API.
pub fn provider_of(model: &str) -> Provider {
    let lowered = model.to_lowercase();
    if lowered.contains("gemini") || lowered.contains("gemma") {
        Provider::Gemini
    } else if lowered.starts_with("groq/")
        || lowered.contains("llama")
        || lowered.contains("mixtral")
    {
        Provider::Groq
    } else {
        Provider::Gemini
    }
}

/// Uniform async entry into the configured LLM providers.
pub struct ModelRegistry {
    http: HttpDispatch,
    gemini_key: Option<String>,
    groq_key: Option<String>,
}

impl ModelRegistry {
    pub fn new(secrets: &Secrets) -> Self {
        Self {
            http: HttpDispatch::new(),
            gemini_key: secrets.gemini_api_key.clone(),
            groq_key: secrets.groq_api_key.clone(),
        }
    }

    /// Generate with a single model. The model name in `req` may be an
    /// alias; it is normalized here.
    pub async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResult, AttestError> {
        let model = normalize_alias(&req.model);
        let provider = provider_of(&model);
        let resolved = GenerateRequest {
            model: model.clone(),
            ..req.clone()
        };

        let text = match provider {
            Provider::Gemini => {
                let key = self.gemini_key.as_deref().ok_or_else(|| {
                    AttestError::ModelNotFound(format!("{model} (GEMINI_API_KEY missing)"))
                })?;
                self.http.query_gemini(&resolved, key).await?
            }
            Provider::Groq => {
                let key = self.groq_key.as_deref().ok_or_else(|| {
                    AttestError::ModelNotFound(format!("{model} (GROQ_API_KEY missing)"))
                })?;
                let groq_model = model.trim_start_matches("groq/").to_string();
                let groq_req = GenerateRequest {
                    model: groq_model,
                    ..resolved
                };
                self.http
                    .query_openai(&groq_req, "groq", GROQ_CHAT_URL, key)
                    .await?
            }
        };

        Ok(GenerateResult {
            text,
            model,
            provider: provider.as_str().to_string(),
        })
    }

    /// Compound mode: attempt each model of an ordered preference chain.
    ///
    /// A rate-limited provider is skipped wholesale — its remaining models
    /// would only burn the same quota. Other retryable failures advance to
    /// the next member; the last error surfaces if everything fails.
    pub async fn generate_with_fallback(
        &self,
        chain: &[String],
        base: &GenerateRequest,
    ) -> Result<GenerateResult, AttestError> {
        let mut last_error = AttestError::ModelNotFound("empty fallback chain".to_string());
        let mut skip_provider: Option<Provider> = None;

        for alias in chain {
            let model = normalize_alias(alias);
            let provider = provider_of(&model);
            if skip_provider == Some(provider) {
                tracing::debug!(%model, "skipping model on rate-limited provider");
                continue;
            }

            let req = GenerateRequest {
                model,
                ..base.clone()
            };
            match self.generate(&req).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(model = %req.model, error = %e, "fallback chain member failed");
                    if matches!(e, AttestError::RateLimited { .. }) {
                        skip_provider = Some(provider);
                    }
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_normalization() {
        assert_eq!(normalize_alias("gemini_flash"), "models/gemini-2.5-flash");
        assert_eq!(normalize_alias("gemma-3-2b"), "models/gemma-3-4b-it");
        assert_eq!(normalize_alias("models/gemma-3-27b"), "models/gemma-3-27b-it");
        // Unknown aliases forward as-is.
        assert_eq!(normalize_alias("mystery-model-9"), "mystery-model-9");
    }

    #[test]
    fn provider_routing_by_prefix() {
        assert_eq!(provider_of("models/gemini-2.5-pro"), Provider::Gemini);
        assert_eq!(provider_of("models/gemma-3-4b-it"), Provider::Gemini);
        assert_eq!(provider_of("groq/llama-3.3-70b-versatile"), Provider::Groq);
        assert_eq!(provider_of("llama-3.1-8b-instant"), Provider::Groq);
    }

    #[tokio::test]
    async fn missing_key_is_model_not_found() {
        let registry = ModelRegistry::new(&Secrets::default());
        let req = GenerateRequest::new("models/gemini-2.5-flash", "hi");
        let err = registry.generate(&req).await.unwrap_err();
        assert!(matches!(err, AttestError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn fallback_surfaces_last_error() {
        let registry = ModelRegistry::new(&Secrets::default());
        let chain = vec![
            "models/gemini-2.5-flash".to_string(),
            "models/gemma-3-1b-it".to_string(),
        ];
        let base = GenerateRequest::new("", "prompt");
        let err = registry.generate_with_fallback(&chain, &base).await.unwrap_err();
        assert!(matches!(err, AttestError::ModelNotFound(_)));
    }
}
