//! Middleware for logging requests and responses.

use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

/// The number of bytes of a body that is logged at the `info` level.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

/// Bodies larger than this are not buffered for logging.
const BODY_SIZE_LIMIT: usize = 1024 * 1024;

/// Fields whose values never appear in the logs.
const REDACTED_FIELDS: [&str; 2] = ["password", "confirm_password"];

const REDACTED: &str = "********";

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] bytes, it is
/// truncated and the full body is logged at the `debug` level.
/// Password fields and the `Authorization` header are redacted.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let body_bytes = match to_bytes(body, BODY_SIZE_LIMIT).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!("Could not read request body: {error}");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };
    let body_text = String::from_utf8_lossy(&body_bytes);
    let display_text = redact_body(&parts.headers, &body_text);
    log_request(&parts, &display_text);

    let request = Request::from_parts(parts, Body::from(body_bytes));
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let body_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!("Could not read response body: {error}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    log_response(&parts, &String::from_utf8_lossy(&body_bytes));

    Response::from_parts(parts, Body::from(body_bytes))
}

fn redact_body(headers: &HeaderMap, body_text: &str) -> String {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        redact_form(body_text)
    } else if content_type.starts_with("application/json") {
        redact_json(body_text)
    } else {
        body_text.to_owned()
    }
}

fn redact_form(form_text: &str) -> String {
    form_text
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if REDACTED_FIELDS.contains(&name) => format!("{name}={REDACTED}"),
            _ => pair.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn redact_json(json_text: &str) -> String {
    match serde_json::from_str::<Value>(json_text) {
        Ok(Value::Object(mut object)) => {
            for field in REDACTED_FIELDS {
                if let Some(value) = object.get_mut(field) {
                    *value = Value::String(REDACTED.to_owned());
                }
            }

            Value::Object(object).to_string()
        }
        Ok(_) => json_text.to_owned(),
        // A body that is not valid JSON may still hold a password.
        Err(_) if REDACTED_FIELDS.iter().any(|field| json_text.contains(field)) => {
            REDACTED.to_owned()
        }
        Err(_) => json_text.to_owned(),
    }
}

/// The longest prefix of `text` that fits in `limit` bytes and ends on a character boundary.
fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }

    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    &text[..end]
}

fn without_authorization(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    if headers.remove(AUTHORIZATION).is_some() {
        headers.insert(AUTHORIZATION, HeaderValue::from_static(REDACTED));
    }
    headers
}

fn log_request(parts: &axum::http::request::Parts, body: &str) {
    let method = &parts.method;
    let uri = &parts.uri;
    let headers = without_authorization(&parts.headers);

    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Received request: {method} {uri} {headers:#?}\nbody: {:}...",
            truncate(body, LOG_BODY_LENGTH_LIMIT)
        );
        tracing::debug!("Full request body: {body:?}");
    } else {
        tracing::info!("Received request: {method} {uri} {headers:#?}\nbody: {body:?}");
    }
}

fn log_response(parts: &axum::http::response::Parts, body: &str) {
    let status = parts.status;
    let headers = &parts.headers;

    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "Sending response: {status} {headers:#?}\nbody: {:}...",
            truncate(body, LOG_BODY_LENGTH_LIMIT)
        );
        tracing::debug!("Full response body: {body:?}");
    } else {
        tracing::info!("Sending response: {status} {headers:#?}\nbody: {body:?}");
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{
        HeaderMap, HeaderValue,
        header::{AUTHORIZATION, CONTENT_TYPE},
    };

    use super::{redact_body, redact_form, redact_json, truncate, without_authorization};

    #[test]
    fn form_passwords_are_redacted() {
        let redacted = redact_form("username=jane%40example.com&password=Abcdef12");

        assert_eq!(redacted, "username=jane%40example.com&password=********");
    }

    #[test]
    fn form_fields_that_only_contain_password_in_their_name_are_kept() {
        let redacted = redact_form("password_hint=dog&confirm_password=Abcdef12");

        assert_eq!(redacted, "password_hint=dog&confirm_password=********");
    }

    #[test]
    fn json_passwords_are_redacted() {
        let redacted = redact_json(
            r#"{"email":"jane@example.com","password":"Abcdef12","confirm_password":"Abcdef12"}"#,
        );

        assert!(!redacted.contains("Abcdef12"));
        assert!(redacted.contains("jane@example.com"));
    }

    #[test]
    fn invalid_json_with_password_is_hidden() {
        let redacted = redact_json(r#"{"password":"Abcdef12""#);

        assert!(!redacted.contains("Abcdef12"));
    }

    #[test]
    fn redaction_follows_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        assert_eq!(
            redact_body(&headers, "password=Abcdef12"),
            "password=********"
        );
        assert_eq!(
            redact_body(&HeaderMap::new(), "password=Abcdef12"),
            "password=Abcdef12"
        );
    }

    #[test]
    fn authorization_header_is_hidden() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret.token"));

        let headers = without_authorization(&headers);

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "********");
    }

    #[test]
    fn truncate_respects_character_boundaries() {
        let text = "ééééé";

        assert_eq!(truncate(text, 3), "é");
        assert_eq!(truncate(text, 100), text);
    }
}
