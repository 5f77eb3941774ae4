use std::borrow::Cow;

const REDACTED: &str = "REDACTED";

/// JSON fields whose string values are credentials.
const TOKEN_FIELDS: [&str; 4] = ["\"access\"", "\"refresh\"", "\"refresh_token\"", "\"password\""];

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let nee = needle.as_bytes();
    if nee.is_empty() {
        return Some(0);
    }
    if nee.len() > hay.len() {
        return None;
    }

    (0..=hay.len() - nee.len()).find(|&i| {
        hay[i..i + nee.len()]
            .iter()
            .zip(nee)
            .all(|(a, b)| a.to_ascii_lowercase() == b.to_ascii_lowercase())
    })
}

fn is_token_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '~' | '+' | '/' | '=')
}

fn redact_bearer(text: String) -> String {
    const PREFIX: &str = "bearer ";
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(idx) = find_ascii_case_insensitive(rest, PREFIX) {
        let end = idx + PREFIX.len();
        out.push_str(&rest[..end]);
        rest = &rest[end..];

        let consumed: usize = rest
            .chars()
            .take_while(|ch| is_token_char(*ch))
            .map(char::len_utf8)
            .sum();
        if consumed > 0 {
            out.push_str(REDACTED);
        }
        rest = &rest[consumed..];
    }
    out.push_str(rest);
    out
}

fn redact_json_field(text: String, field: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(idx) = rest.find(field) {
        let end = idx + field.len();
        out.push_str(&rest[..end]);
        rest = &rest[end..];

        // Only `"field": "value"`; anything else is left alone.
        let after_colon = rest.trim_start();
        let Some(after_colon) = after_colon.strip_prefix(':') else {
            continue;
        };
        let value = after_colon.trim_start();
        let Some(value) = value.strip_prefix('"') else {
            continue;
        };
        let Some(close) = value.find('"') else {
            continue;
        };

        let head_len = rest.len() - value.len();
        out.push_str(&rest[..head_len]);
        out.push_str(REDACTED);
        rest = &value[close..];
    }
    out.push_str(rest);
    out
}

/// Masks bearer tokens and credential-bearing JSON fields so the result is
/// safe to log or to show in an error message.
pub fn redact_tokens(input: &str) -> Cow<'_, str> {
    let mut value = redact_bearer(input.to_string());
    for field in TOKEN_FIELDS {
        if value.contains(field) {
            value = redact_json_field(value, field);
        }
    }

    if value == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_tokens_masks_bearer_header_line() {
        let input = "Authorization: Bearer eyJhbGciOi.abc-123\nOther: ok\n";
        let out = redact_tokens(input).to_string();
        assert_eq!(out, "Authorization: Bearer REDACTED\nOther: ok\n");
    }

    #[test]
    fn redact_tokens_masks_refresh_json_fields() {
        let input = r#"{"refresh": "R1", "refresh_token":"R2", "detail":"bad"}"#;
        let out = redact_tokens(input).to_string();
        assert!(!out.contains("R1"));
        assert!(!out.contains("R2"));
        assert!(out.contains(r#""detail":"bad""#));
        assert!(out.contains(r#""refresh": "REDACTED""#));
    }

    #[test]
    fn redact_tokens_borrows_when_nothing_to_mask() {
        let input = "campaign not found";
        assert!(matches!(redact_tokens(input), Cow::Borrowed(_)));
    }

    #[test]
    fn redact_tokens_leaves_non_string_fields() {
        let input = r#"{"access": null}"#;
        assert_eq!(redact_tokens(input), input);
    }
}
