//! What of a message ends up in the log: header redaction and body capture.

use serde::Serialize;

use crate::request::Header;

/// Replaces the value of a redacted header.
pub const REDACTED: &str = "*REDACTED*";

/// Appended to a body that was cut at the size limit.
pub const CAPPED_MARKER: &str = "**CAPPED**";

/// One logged header. Serializes as `{"name": …, "value": …}`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct HeaderLog {
    pub name: String,
    pub value: Option<String>,
}

/// Copies `headers` in order, replacing the value of every header whose
/// name is in `policy` (case-insensitive) with [`REDACTED`].
///
/// Duplicate names stay duplicated. A header without value stays without
/// value, even when its name is redacted: there is nothing to hide.
pub fn redact_headers<S: AsRef<str>>(headers: &[Header], policy: &[S]) -> Vec<HeaderLog> {
    headers.iter()
        .map(|(name, value)| {
            let redact = policy.iter().any(|p| p.as_ref().eq_ignore_ascii_case(name));
            HeaderLog {
                name: name.clone(),
                value: match value {
                    Some(_) if redact => Some(REDACTED.to_owned()),
                    other => other.clone(),
                },
            }
        })
        .collect()
}

/// Whether a body with `content_type` should be captured.
///
/// Parameters (`; charset=utf-8`) are ignored and media types compare
/// case-insensitively. A missing content type is captured when
/// `capture_without_content_type` is set.
pub fn should_capture<S: AsRef<str>>(
    content_type: Option<&str>,
    allowlist: &[S],
    capture_without_content_type: bool,
) -> bool {
    match content_type {
        None => capture_without_content_type,
        Some(value) => {
            let media_type = value.split(';').next().unwrap_or("").trim();
            allowlist.iter().any(|t| t.as_ref().trim().eq_ignore_ascii_case(media_type))
        }
    }
}

/// Cuts `body` to at most `limit` bytes and appends [`CAPPED_MARKER`].
///
/// The cut moves back to the previous UTF-8 character boundary, so the
/// kept prefix can be a few bytes shorter than `limit`. Bodies within the
/// limit are returned unchanged.
pub fn cap_body(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_owned();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let mut capped = String::with_capacity(end + CAPPED_MARKER.len());
    capped.push_str(&body[..end]);
    capped.push_str(CAPPED_MARKER);
    capped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;

    fn header(name: &str, value: &str) -> Header {
        (name.to_owned(), Some(value.to_owned()))
    }

    #[test]
    fn default_policy_redacts_authorization() {
        let policy = LoggingConfig::default().redacted_headers;
        let logged = redact_headers(&[header("Authorization", "secret"), header("X-Id", "1")], &policy);

        assert_eq!(
            logged,
            [
                HeaderLog { name: "Authorization".into(), value: Some(REDACTED.into()) },
                HeaderLog { name: "X-Id".into(), value: Some("1".into()) },
            ]
        );
    }

    #[test]
    fn redaction_ignores_case_and_keeps_duplicates() {
        let headers = [
            header("AUTHORIZATION", "a"),
            header("x-api-key", "b"),
            header("Accept", "text/html"),
            header("X-API-KEY", "c"),
        ];
        let logged = redact_headers(&headers, &["authorization", "x-api-key"]);

        let values: Vec<_> = logged.iter().map(|h| h.value.as_deref().unwrap()).collect();
        assert_eq!(values, [REDACTED, REDACTED, "text/html", REDACTED]);
        let names: Vec<_> = logged.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["AUTHORIZATION", "x-api-key", "Accept", "X-API-KEY"]);
    }

    #[test]
    fn absent_values_are_not_turned_into_placeholders() {
        let logged = redact_headers(&[("authorization".to_owned(), None)], &["authorization"]);
        assert_eq!(logged[0].value, None);
    }

    #[test]
    fn capture_follows_allowlist() {
        let allow = ["application/json"];

        assert!(should_capture(Some("application/json"), &allow, true));
        assert!(should_capture(Some("Application/JSON; charset=utf-8"), &allow, true));
        assert!(!should_capture(Some("text/html"), &allow, true));
        assert!(!should_capture(Some("application/jsonp"), &allow, true));
    }

    #[test]
    fn missing_content_type_follows_the_switch() {
        let allow = ["application/json"];
        assert!(should_capture(None, &allow, true));
        assert!(!should_capture(None, &allow, false));
    }

    #[test]
    fn oversized_bodies_are_cut_at_the_limit() {
        let body = "a".repeat(60 * 1024);
        let capped = cap_body(&body, 51200);

        assert_eq!(capped.len(), 51200 + CAPPED_MARKER.len());
        assert!(capped.starts_with(&body[..51200]));
        assert!(capped.ends_with(CAPPED_MARKER));
    }

    #[test]
    fn small_bodies_are_unchanged() {
        let body = "b".repeat(100);
        assert_eq!(cap_body(&body, 51200), body);
        assert_eq!(cap_body("exact", 5), "exact");
    }

    #[test]
    fn cut_never_splits_a_character() {
        // "é" is two bytes; a limit of 3 lands in the middle of the second one.
        let capped = cap_body("éé", 3);
        assert_eq!(capped, format!("é{CAPPED_MARKER}"));
    }
}
