use std::time::{Duration, Instant};

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;

use crate::error::AttestError;
use crate::gateway::{ApiFormat, GenerateRequest};

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Ceiling applied even when the caller disabled the per-call timeout.
const FLASH_MODE_CEILING: Duration = Duration::from_secs(600);

/// Duration without any SSE chunk before giving up on the stream.
const STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum time to wait for response headers after sending the request.
const HEADERS_TIMEOUT: Duration = Duration::from_secs(30);

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// SSE streaming chunk from an OpenAI-compatible chat completions API.
#[derive(Deserialize)]
struct OpenAiChunk {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    delta: OpenAiDelta,
}

#[derive(Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

/// SSE streaming chunk from the Gemini API.
#[derive(Deserialize)]
struct GeminiChunk {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

/// Result of parsing a single SSE event.
enum ParsedChunk {
    Text(String),
    Done,
    Skip,
}

pub struct HttpDispatch {
    client: Client,
}

#[allow(clippy::new_without_default)]
impl HttpDispatch {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// Stream one generation from an OpenAI-compatible endpoint.
    pub async fn query_openai(
        &self,
        req: &GenerateRequest,
        provider: &str,
        base_url: &str,
        api_key: &str,
    ) -> Result<String, AttestError> {
        let mut messages = Vec::new();
        if let Some(ref system) = req.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": req.prompt}));

        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "stream": true,
        });
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        let builder = self
            .client
            .post(base_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body);

        self.stream_sse(builder, req, provider, ApiFormat::OpenAi).await
    }

    /// Stream one generation from the Gemini API. Model names carry the
    /// `models/` prefix.
    pub async fn query_gemini(
        &self,
        req: &GenerateRequest,
        api_key: &str,
    ) -> Result<String, AttestError> {
        let mut body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": req.prompt}]}],
        });
        if let Some(ref system) = req.system_prompt {
            body["systemInstruction"] = serde_json::json!({"parts": [{"text": system}]});
        }
        if let Some(temp) = req.temperature {
            body["generationConfig"] = serde_json::json!({"temperature": temp});
        }
        if req.safety_off {
            body["safetySettings"] = serde_json::json!([
                {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE"},
                {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_NONE"},
                {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_NONE"},
                {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_NONE"},
            ]);
        }
        if req.enable_browse {
            body["tools"] = serde_json::json!([{"google_search": {}}]);
        }

        let model = req.model.trim_start_matches('/');
        let url = format!("{GEMINI_BASE}/{model}:streamGenerateContent");
        let builder = self
            .client
            .post(&url)
            .query(&[("alt", "sse"), ("key", api_key)])
            .header("Content-Type", "application/json")
            .json(&body);

        self.stream_sse(builder, req, "gemini", ApiFormat::Gemini).await
    }

    /// Send the request and accumulate the SSE stream under three timeout
    /// layers: headers, stall, and the caller's overall deadline.
    async fn stream_sse(
        &self,
        builder: reqwest::RequestBuilder,
        req: &GenerateRequest,
        provider: &str,
        format: ApiFormat,
    ) -> Result<String, AttestError> {
        let start = Instant::now();
        let overall = req.timeout.unwrap_or(FLASH_MODE_CEILING);
        let deadline = tokio::time::Instant::now() + overall;

        let headers_timeout = overall.min(HEADERS_TIMEOUT);
        let response = tokio::time::timeout(headers_timeout, builder.send())
            .await
            .map_err(|_| AttestError::Timeout(start.elapsed().as_millis() as u64))?
            .map_err(AttestError::from)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AttestError::RateLimited {
                provider: provider.to_string(),
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AttestError::AuthFailed {
                provider: provider.to_string(),
                message: status.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(500).collect();
            return Err(classify_upstream(provider, status.as_u16(), truncated));
        }

        let mut stream = response.bytes_stream().eventsource();
        let mut accumulated = String::new();
        let mut last_chunk_at = tokio::time::Instant::now();

        let deadline_sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(deadline_sleep);

        loop {
            let effective = deadline.min(last_chunk_at + STALL_TIMEOUT);
            deadline_sleep.as_mut().reset(effective);

            tokio::select! {
                _ = &mut deadline_sleep => {
                    if accumulated.is_empty() {
                        return Err(AttestError::Timeout(start.elapsed().as_millis() as u64));
                    }
                    // Partial text is still usable by the JSON extractor.
                    tracing::warn!(provider, bytes = accumulated.len(), "stream stalled, returning partial");
                    return Ok(accumulated);
                }
                event = stream.next() => match event {
                    Some(Ok(ev)) => {
                        last_chunk_at = tokio::time::Instant::now();
                        match parse_sse_event(&ev.data, format) {
                            ParsedChunk::Done => break,
                            ParsedChunk::Text(text) => {
                                if accumulated.len() + text.len() > MAX_RESPONSE_BYTES {
                                    return Err(AttestError::Upstream {
                                        provider: provider.to_string(),
                                        message: format!("streaming response too large: >{MAX_RESPONSE_BYTES}B"),
                                        status: None,
                                    });
                                }
                                accumulated.push_str(&text);
                            }
                            ParsedChunk::Skip => {}
                        }
                    }
                    Some(Err(e)) => {
                        if accumulated.is_empty() {
                            tracing::warn!(provider, "SSE stream error with no data: {e}");
                            return Err(AttestError::Other(format!("SSE stream error from {provider}")));
                        }
                        tracing::warn!(provider, bytes = accumulated.len(), "SSE stream error after partial data: {e}");
                        return Ok(accumulated);
                    }
                    // Gemini streams end without a terminator; OpenAI streams
                    // normally break on [DONE] before reaching here.
                    None => break,
                },
            }
        }

        if accumulated.is_empty() {
            return Err(AttestError::Empty {
                provider: provider.to_string(),
            });
        }
        Ok(accumulated)
    }
}

/// Upstream errors whose bodies carry throttling language are rate limits,
/// whatever the status code says.
fn classify_upstream(provider: &str, status: u16, body: String) -> AttestError {
    let lowered = body.to_lowercase();
    if lowered.contains("quota")
        || lowered.contains("resource_exhausted")
        || lowered.contains("rate_limit")
    {
        return AttestError::RateLimited {
            provider: provider.to_string(),
        };
    }
    AttestError::Upstream {
        provider: provider.to_string(),
        message: format!("{status}: {body}"),
        status: Some(status),
    }
}

fn parse_sse_event(data: &str, format: ApiFormat) -> ParsedChunk {
    match format {
        ApiFormat::OpenAi => parse_openai_event(data),
        ApiFormat::Gemini => parse_gemini_event(data),
    }
}

fn parse_openai_event(data: &str) -> ParsedChunk {
    if data.trim() == "[DONE]" {
        return ParsedChunk::Done;
    }
    let Ok(chunk) = serde_json::from_str::<OpenAiChunk>(data) else {
        return ParsedChunk::Skip;
    };
    let Some(choice) = chunk.choices.first() else {
        return ParsedChunk::Skip;
    };

    let mut text = String::new();
    if let Some(ref rc) = choice.delta.reasoning_content
        && !rc.is_empty()
    {
        text.push_str(rc);
    }
    if let Some(ref c) = choice.delta.content
        && !c.is_empty()
    {
        text.push_str(c);
    }
    if text.is_empty() {
        ParsedChunk::Skip
    } else {
        ParsedChunk::Text(text)
    }
}

fn parse_gemini_event(data: &str) -> ParsedChunk {
    let Ok(chunk) = serde_json::from_str::<GeminiChunk>(data) else {
        return ParsedChunk::Skip;
    };
    let text: String = chunk
        .candidates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c.content)
        .filter_map(|c| c.parts)
        .flatten()
        .filter_map(|p| p.text)
        .collect();
    if text.is_empty() {
        ParsedChunk::Skip
    } else {
        ParsedChunk::Text(text)
    }
}
