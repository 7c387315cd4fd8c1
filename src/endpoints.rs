//! The API endpoints URIs.

/// The root route, which greets the client.
pub const ROOT: &str = "/";
/// The route for checking that the server is up.
pub const HEALTH: &str = "/api/health";
/// The route for creating an account.
pub const REGISTER: &str = "/auth/register";
/// The route for logging in a user.
pub const LOG_IN: &str = "/auth/login";
/// The route for getting the account of the logged in user.
pub const ME: &str = "/auth/me";
/// The route for reading and updating the logged in user's settings.
pub const SETTINGS: &str = "/settings";

// These tests are here so that we know when we call `Uri::from_shared` it will not panic.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok());
    }

    #[test]
    fn endpoints_are_valid_uris() {
        assert_endpoint_is_valid_uri(endpoints::ROOT);
        assert_endpoint_is_valid_uri(endpoints::HEALTH);
        assert_endpoint_is_valid_uri(endpoints::REGISTER);
        assert_endpoint_is_valid_uri(endpoints::LOG_IN);
        assert_endpoint_is_valid_uri(endpoints::ME);
        assert_endpoint_is_valid_uri(endpoints::SETTINGS);
    }
}
