use std::sync::LazyLock;

use regex::Regex;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`\)\]]+"#).unwrap());

/// First `http(s)` URL in free model output, with trailing sentence
/// punctuation stripped.
pub fn extract_url(text: &str) -> Option<String> {
    let found = URL_PATTERN.find(text)?;
    let url = found
        .as_str()
        .trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '*'));
    (url.len() > "https://".len()).then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_url() {
        assert_eq!(
            extract_url("https://www.youtube.com/watch?v=abc123").as_deref(),
            Some("https://www.youtube.com/watch?v=abc123")
        );
    }

    #[test]
    fn url_inside_prose() {
        let text = "You might enjoy this: https://maps.google.com/?q=Eiffel+Tower. Have fun!";
        assert_eq!(
            extract_url(text).as_deref(),
            Some("https://maps.google.com/?q=Eiffel+Tower")
        );
    }

    #[test]
    fn markdown_link() {
        let text = "Try [this video](https://youtu.be/xyz) or **https://example.com**";
        assert_eq!(extract_url(text).as_deref(), Some("https://youtu.be/xyz"));
    }

    #[test]
    fn no_url() {
        assert_eq!(extract_url("I cannot browse the internet."), None);
        assert_eq!(extract_url("https://"), None);
    }
}
