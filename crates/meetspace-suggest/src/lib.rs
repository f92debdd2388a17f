pub mod disabled;
pub mod extract;
pub mod gemini;
pub mod mock;
pub mod search;

use std::sync::Arc;
use std::time::Duration;

use meetspace_core::UrlSuggester;
use meetspace_settings::{SuggestSettings, SuggesterKind};
use secrecy::SecretString;

pub use disabled::DisabledSuggester;
pub use gemini::{GeminiClient, GeminiSuggester, GenerationConfig};
pub use mock::{MockResponse, MockSuggester};
pub use search::SearchSuggester;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = "meetspace/0.1";

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// Build the configured suggester. Missing credentials fall back to
/// [`DisabledSuggester`] so the server still starts.
pub fn build_suggester(settings: &SuggestSettings) -> Arc<dyn UrlSuggester> {
    if settings.provider == SuggesterKind::Disabled {
        return Arc::new(DisabledSuggester::new("disabled by configuration"));
    }

    let Some(gemini_key) = settings.gemini_api_key.clone() else {
        tracing::warn!("no Gemini API key configured, URL suggestions disabled");
        return Arc::new(DisabledSuggester::new("missing Gemini API key"));
    };
    let gemini = GeminiClient::new(
        &settings.gemini_base_url,
        &settings.model,
        SecretString::from(gemini_key),
        GenerationConfig::from_settings(settings),
    );

    match settings.provider {
        SuggesterKind::Search => match settings.search_api_key.clone() {
            Some(search_key) => Arc::new(SearchSuggester::new(
                gemini,
                &settings.search_base_url,
                SecretString::from(search_key),
            )),
            None => {
                tracing::warn!("no search API key configured, using generative suggester");
                Arc::new(GeminiSuggester::new(gemini))
            }
        },
        _ => Arc::new(GeminiSuggester::new(gemini)),
    }
}
