//! # Error Sanitization
//!
//! Error text produced by transports and child processes can echo
//! credentials back (request headers, URLs with keys). Everything shown to
//! the operator or written to the interaction log passes through here first.

use once_cell::sync::Lazy;
use regex::Regex;

// Static regex patterns for sensitive information detection
static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // API keys, tokens, credentials given as key=value
        r#"(?i)(api[_-]?key|token|secret|password|credential)s?["']?\s*[=:]\s*["']?([^"'\s&]+)"#,
        // OAuth 2.0 tokens
        r"(?i)bearer\s+([a-zA-Z0-9\._\-]+)",
        // JWTs
        r"eyJ[a-zA-Z0-9\-_]+\.eyJ[a-zA-Z0-9\-_]+\.[a-zA-Z0-9\-_]+",
        // Provider style secret keys
        r"\bsk-[a-zA-Z0-9\-_]{16,}",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Sanitizes a message by removing sensitive information
pub fn sanitize_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    for pattern in SENSITIVE_PATTERNS.iter() {
        sanitized = pattern
            .replace_all(&sanitized, |caps: &regex::Captures| {
                if caps.len() > 2 {
                    // Keep the key name but redact the value
                    format!("{}=[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
    }

    sanitized
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`.
///
/// Counts characters, not bytes, so multi-byte output is never split.
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", trimmed[..byte_idx].trim_end()),
        None => trimmed.to_string(),
    }
}
