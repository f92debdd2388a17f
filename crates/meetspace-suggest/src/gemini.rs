use async_trait::async_trait;
use meetspace_core::{SuggestError, UrlSuggester};
use meetspace_settings::SuggestSettings;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::extract::extract_url;

/// Sampling parameters sent with every `generateContent` call.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
}

impl GenerationConfig {
    pub fn from_settings(settings: &SuggestSettings) -> Self {
        Self {
            max_output_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::from_settings(&SuggestSettings::default())
    }
}

/// Minimal client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    generation: GenerationConfig,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: SecretString,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            client: crate::http_client(),
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
            model: model.to_string(),
            api_key,
            generation,
        }
    }

    /// Single-turn text generation. Returns the concatenated text parts of
    /// the first candidate.
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    pub async fn generate(&self, prompt: &str) -> Result<String, SuggestError> {
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": self.generation,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SuggestError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SuggestError::from_status(status, body));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| SuggestError::InvalidResponse(e.to_string()))?;

        candidate_text(&body)
    }
}

fn candidate_text(body: &Value) -> Result<String, SuggestError> {
    let parts = body["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            let reason = body["promptFeedback"]["blockReason"]
                .as_str()
                .unwrap_or("no candidates");
            SuggestError::InvalidResponse(reason.to_string())
        })?;

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.trim().is_empty() {
        return Err(SuggestError::InvalidResponse("empty candidate".into()));
    }
    Ok(text)
}

/// Purely generative adapter: infer what the speaker is interested in, then
/// ask for a matching video or Google Maps link.
pub struct GeminiSuggester {
    gemini: GeminiClient,
}

impl GeminiSuggester {
    pub fn new(gemini: GeminiClient) -> Self {
        Self { gemini }
    }
}

pub(crate) fn interest_prompt(dialogue: &str) -> String {
    format!(
        "Based on the following dialogue:\n{dialogue}\nSummarize in one sentence what kind of \
         website topic, real-world location, or video topic the user might be interested in."
    )
}

fn url_prompt(interest: &str) -> String {
    format!(
        "You are a URL generator. Based on the following user interest:\n{interest}\n\
         Reply with one related video URL or Google Maps location URL the user might want to \
         visit. Reply with the URL only."
    )
}

#[async_trait]
impl UrlSuggester for GeminiSuggester {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn suggest(&self, prompt: &str) -> Result<Option<String>, SuggestError> {
        let interest = self.gemini.generate(&interest_prompt(prompt)).await?;
        debug!(interest = %interest.trim(), "inferred user interest");

        let reply = self.gemini.generate(&url_prompt(interest.trim())).await?;
        let url = extract_url(&reply);
        debug!(url = ?url, "generated URL");
        Ok(url)
    }
}
