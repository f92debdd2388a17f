use async_trait::async_trait;
use meetspace_core::{SuggestError, UrlSuggester};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use crate::gemini::GeminiClient;

const RESULT_COUNT: &str = "5";

/// Generative keyword extraction chained into the Brave web search API.
/// The first result's URL is the suggestion.
pub struct SearchSuggester {
    gemini: GeminiClient,
    client: reqwest::Client,
    search_url: String,
    api_key: SecretString,
}

impl SearchSuggester {
    pub fn new(gemini: GeminiClient, base_url: &str, api_key: SecretString) -> Self {
        Self {
            gemini,
            client: crate::http_client(),
            search_url: format!("{}/res/v1/web/search", base_url.trim_end_matches('/')),
            api_key,
        }
    }

    async fn first_result(&self, query: &str) -> Result<Option<String>, SuggestError> {
        let response = self
            .client
            .get(&self.search_url)
            .header("X-Subscription-Token", self.api_key.expose_secret())
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", RESULT_COUNT)])
            .send()
            .await
            .map_err(|e| SuggestError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SuggestError::from_status(status.as_u16(), body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SuggestError::InvalidResponse(e.to_string()))?;

        Ok(first_result_url(&body))
    }
}

fn keyword_prompt(dialogue: &str) -> String {
    format!(
        "Based on the following dialogue:\n{dialogue}\nReply with a short web search query \
         (at most six keywords) for a website, real-world location, or video the user might be \
         interested in. Reply with the query only."
    )
}

fn first_result_url(body: &Value) -> Option<String> {
    body["web"]["results"]
        .as_array()?
        .iter()
        .filter_map(|r| r["url"].as_str())
        .find(|url| url.starts_with("http"))
        .map(str::to_string)
}

/// Strip quoting and markdown the model sometimes wraps around a query.
fn clean_query(raw: &str) -> String {
    raw.lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`' | '*'))
        .trim()
        .to_string()
}

#[async_trait]
impl UrlSuggester for SearchSuggester {
    fn name(&self) -> &str {
        "search"
    }

    async fn suggest(&self, prompt: &str) -> Result<Option<String>, SuggestError> {
        let query = clean_query(&self.gemini.generate(&keyword_prompt(prompt)).await?);
        if query.is_empty() {
            return Ok(None);
        }
        debug!(query = %query, "search keywords");
        self.first_result(&query).await
    }
}
