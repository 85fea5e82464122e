//! Request ids and PHI-safe request spans
//!
//! Every request carries an `x-request-id`: the caller's, or a fresh UUID.
//! It is echoed on the response and recorded on the request span. Query
//! strings routinely carry patient identifiers (`?email=`, `?mrn=`), so the
//! span records the URI only after [`redact_query`].

use axum::http::{HeaderName, Request, Uri};
use regex::Regex;
use std::sync::LazyLock;
use tower_http::trace::MakeSpan;
use tracing::Span;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub const REDACTED: &str = "[REDACTED]";

/// Query keys whose values are always dropped
const SENSITIVE_KEYS: &[&str] = &[
    "patient_id",
    "patient_name",
    "first_name",
    "last_name",
    "ssn",
    "social_security_number",
    "medical_record_number",
    "mrn",
    "date_of_birth",
    "dob",
    "birth_date",
    "phone",
    "phone_number",
    "email",
    "address",
];

/// Values that look like PHI whatever their key is
static SENSITIVE_VALUES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // SSN, with or without (encoded) dashes
        r"^\d{3}(?:-|%2[dD])?\d{2}(?:-|%2[dD])?\d{4}$",
        // Email
        r"^[^@\s]+(?:@|%40)[^@\s]+\.[A-Za-z]{2,}$",
        // Phone number
        r"^(?:\+|%2[bB])?(?:[\d().\-+]|%20|%2[dD]){10,24}$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

fn is_sensitive(key: &str, value: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&key.as_str()) || SENSITIVE_VALUES.iter().any(|re| re.is_match(value))
}

/// Replace sensitive values in a raw query string, keeping keys and order
pub fn redact_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !value.is_empty() && is_sensitive(key, value) => {
                format!("{key}={REDACTED}")
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Path plus redacted query
pub fn redacted_uri(uri: &Uri) -> String {
    match uri.query() {
        Some(query) => format!("{}?{}", uri.path(), redact_query(query)),
        None => uri.path().to_string(),
    }
}

/// Request span carrying the request id and the redacted URI
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %redacted_uri(request.uri()),
            request_id = %request_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_keys_are_redacted() {
        assert_eq!(
            redact_query("email=alice%40acme.test&limit=10"),
            "email=[REDACTED]&limit=10"
        );
        assert_eq!(redact_query("MRN=A-7781&format=csv"), "MRN=[REDACTED]&format=csv");
        assert_eq!(redact_query("dob=1980-02-01"), "dob=[REDACTED]");
    }

    #[test]
    fn test_sensitive_values_are_redacted_under_any_key() {
        assert_eq!(redact_query("q=123-45-6789"), "q=[REDACTED]");
        assert_eq!(redact_query("external_ref=bob@example.org"), "external_ref=[REDACTED]");
        assert_eq!(redact_query("contact=%2B1%20555%20010%200199"), "contact=[REDACTED]");
    }

    #[test]
    fn test_ordinary_queries_are_kept() {
        let query = "action=user.created&resource_type=document&limit=50\
                     &since=2024-01-01T00:00:00Z&owner_id=6f1c0a4e-9d1b-4a51-8a33-0f7a2b1d9e10";
        assert_eq!(redact_query(query), query);
        assert_eq!(redact_query("flag&email="), "flag&email=");
    }

    #[test]
    fn test_redacted_uri() {
        let uri: Uri = "/api/v1/users?email=carol%40acme.test".parse().unwrap();
        assert_eq!(redacted_uri(&uri), "/api/v1/users?email=[REDACTED]");
        let uri: Uri = "/api/v1/users".parse().unwrap();
        assert_eq!(redacted_uri(&uri), "/api/v1/users");
    }
}
