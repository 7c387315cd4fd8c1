//! Middleware that sanitizes query parameter values before they reach a handler.

use axum::{
    extract::{Request, State},
    http::Uri,
    middleware::Next,
    response::Response,
};

use crate::{
    Error,
    sanitize::{FieldClass, Sanitizer},
};

/// Rewrite the query string of every request so that each parameter value has
/// been cleaned with the default policy.
///
/// Parameter names are kept as-is. If the query string cannot be parsed the
/// request is passed on unchanged and the problem is logged.
pub async fn sanitize_query(
    State(sanitizer): State<Sanitizer>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.uri().query().is_some() {
        match sanitize_uri(request.uri(), &sanitizer) {
            Ok(uri) => *request.uri_mut() = uri,
            Err(error) => tracing::warn!("Could not sanitize query string: {error}"),
        }
    }

    next.run(request).await
}

fn sanitize_uri(uri: &Uri, sanitizer: &Sanitizer) -> Result<Uri, Error> {
    let query = uri.query().unwrap_or_default();
    let query = sanitize_query_string(query, sanitizer)?;

    let path_and_query = if query.is_empty() {
        uri.path().to_owned()
    } else {
        format!("{}?{}", uri.path(), query)
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|error| Error::InvalidQuery(format!("{error}")))?,
    );

    Uri::from_parts(parts).map_err(|error| Error::InvalidQuery(error.to_string()))
}

fn sanitize_query_string(query: &str, sanitizer: &Sanitizer) -> Result<String, Error> {
    let parameters: Vec<(String, String)> =
        serde_urlencoded::from_str(query).map_err(|error| Error::InvalidQuery(error.to_string()))?;

    let policy = FieldClass::Default.policy();
    let parameters: Vec<(String, String)> = parameters
        .into_iter()
        .map(|(name, value)| {
            let cleaned = sanitizer.sanitize_with_policy(&name, &value, &policy);
            (name, cleaned.cleaned_value)
        })
        .collect();

    serde_urlencoded::to_string(&parameters).map_err(|error| Error::InvalidQuery(error.to_string()))
}
