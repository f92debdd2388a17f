use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use meetspace_core::{SuggestError, UrlSuggester};
use parking_lot::Mutex;

/// Pre-programmed responses for deterministic testing without API calls.
pub enum MockResponse {
    Url(String),
    /// Adapter ran but found nothing.
    Empty,
    Error(SuggestError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn url(url: &str) -> Self {
        Self::Url(url.to_string())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Suggester that answers from a script, in order, and records prompts.
pub struct MockSuggester {
    responses: Mutex<VecDeque<MockResponse>>,
    prompts: Mutex<Vec<String>>,
}

impl MockSuggester {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl UrlSuggester for MockSuggester {
    fn name(&self) -> &str {
        "mock"
    }

    async fn suggest(&self, prompt: &str) -> Result<Option<String>, SuggestError> {
        self.prompts.lock().push(prompt.to_string());
        let next = self.responses.lock().pop_front();

        let mut current = next.ok_or_else(|| {
            SuggestError::InvalidResponse("MockSuggester: no response configured".into())
        })?;
        loop {
            match current {
                MockResponse::Url(url) => return Ok(Some(url)),
                MockResponse::Empty => return Ok(None),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}
