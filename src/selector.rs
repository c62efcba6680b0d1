//! Picks the literal response text for a request.

use std::collections::HashMap;

use crate::openai::Message;

/// Canned response keyed by the exact content of the last message, falling
/// back to `default`.
pub fn select_response_text<'a>(
    messages: &[Message],
    custom: &'a HashMap<String, String>,
    default: &'a str,
) -> &'a str {
    messages
        .last()
        .and_then(Message::text)
        .and_then(|content| custom.get(content))
        .map_or(default, String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom() -> HashMap<String, String> {
        HashMap::from([
            ("ping".to_string(), "pong".to_string()),
            ("empty".to_string(), String::new()),
        ])
    }

    #[test]
    fn test_custom_match_on_last_message() {
        let custom = custom();
        let messages = vec![Message::user("hello"), Message::user("ping")];
        assert_eq!(select_response_text(&messages, &custom, "default"), "pong");
    }

    #[test]
    fn test_only_last_message_counts() {
        let custom = custom();
        let messages = vec![Message::user("ping"), Message::user("hello")];
        assert_eq!(select_response_text(&messages, &custom, "default"), "default");
    }

    #[test]
    fn test_no_messages_uses_default() {
        assert_eq!(select_response_text(&[], &custom(), "default"), "default");
    }

    #[test]
    fn test_match_is_exact() {
        let custom = custom();
        let messages = vec![Message::user("ping ")];
        assert_eq!(select_response_text(&messages, &custom, "default"), "default");
    }

    #[test]
    fn test_empty_custom_response() {
        let custom = custom();
        let messages = vec![Message::user("empty")];
        assert_eq!(select_response_text(&messages, &custom, "default"), "");
    }
}
