use regex::Regex;
use std::sync::OnceLock;

static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

/// Masks personal data and credentials before they reach the logs.
///
/// Collaborator e-mails and the remote store's auth token both pass
/// through log lines; everything user-supplied goes through here first.
pub struct LogRedactor {
    patterns: &'static [(Regex, &'static str)],
}

impl LogRedactor {
    pub fn new() -> Self {
        let patterns = PATTERNS.get_or_init(|| {
            let compile = |pattern: &str| Regex::new(pattern).expect("redaction pattern is valid");
            vec![
                (
                    compile(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"),
                    "***@***.***",
                ),
                (compile(r"(?i)(bearer\s+)[a-zA-Z0-9._~+/=-]+"), "${1}***"),
                (compile(r"(?i)([?&](?:token|access_token|api_key)=)[^&\s]+"), "${1}***"),
            ]
        });

        Self {
            patterns: patterns.as_slice(),
        }
    }

    pub fn redact(&self, message: &str) -> String {
        let mut result = message.to_string();
        for (pattern, replacement) in self.patterns {
            result = pattern.replace_all(&result, *replacement).into_owned();
        }
        result
    }
}

impl Default for LogRedactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for `LogRedactor::new().redact(message)`
pub fn redact(message: &str) -> String {
    LogRedactor::new().redact(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_redaction() {
        let redactor = LogRedactor::new();
        let log = "User joined: grants@example.org";
        assert_eq!(redactor.redact(log), "User joined: ***@***.***");
    }

    #[test]
    fn test_bearer_token_redaction() {
        let log = "Authorization: Bearer abc.def-123";
        assert_eq!(redact(log), "Authorization: Bearer ***");
    }

    #[test]
    fn test_query_token_redaction() {
        let log = "GET https://api.example.org/settings?token=s3cret&scope=user";
        assert_eq!(
            redact(log),
            "GET https://api.example.org/settings?token=***&scope=user"
        );
    }

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(redact("synced 3 items"), "synced 3 items");
    }
}
