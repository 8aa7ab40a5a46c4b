//! Scrubs API keys, bearer tokens and phone numbers from text before it
//! is logged.

use std::sync::LazyLock;

use regex::Regex;

static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(sk-[a-zA-Z0-9_\-]{20,})", "[REDACTED_TOKEN]"),
        (r"(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)", "[REDACTED_TOKEN]"),
        (
            r#"(?i)("?(api[_-]?key|apikey|token|password)"?\s*[:=]\s*)"?[^\s",}]+"?"#,
            "${1}[REDACTED]",
        ),
        (
            r"(?:\+\d{1,3}[-.\s]?)?\(?\b\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b",
            "[REDACTED_PHONE]",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

pub fn redact_sensitive_data(input: &str) -> String {
    RULES
        .iter()
        .fold(input.to_string(), |text, (re, replacement)| {
            re.replace_all(&text, *replacement).into_owned()
        })
}
