use async_trait::async_trait;
use meetspace_core::{SuggestError, UrlSuggester};

/// Suggester used when no upstream is configured. Every call fails.
pub struct DisabledSuggester {
    reason: String,
}

impl DisabledSuggester {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl UrlSuggester for DisabledSuggester {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn suggest(&self, _prompt: &str) -> Result<Option<String>, SuggestError> {
        Err(SuggestError::NotConfigured(self.reason.clone()))
    }
}
