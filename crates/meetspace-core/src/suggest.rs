use async_trait::async_trait;

use crate::errors::SuggestError;

/// Turns free conversation text into a suggested URL.
///
/// `Ok(None)` means the adapter ran but produced nothing usable.
#[async_trait]
pub trait UrlSuggester: Send + Sync {
    fn name(&self) -> &str;

    async fn suggest(&self, prompt: &str) -> Result<Option<String>, SuggestError>;
}
