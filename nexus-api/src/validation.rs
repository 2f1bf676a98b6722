//! Request validation helpers shared across route handlers and services.

use crate::error::ApiError;

/// Reject empty or whitespace-only required string fields.
pub fn require_non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::missing_field(field))
    } else {
        Ok(())
    }
}

/// Validate an agent endpoint URL.
///
/// Must parse as an absolute `http`/`https` URL with a host. When
/// `require_https` is set (production), plain `http` is only allowed for
/// loopback hosts.
pub fn validate_endpoint(endpoint: &str, require_https: bool) -> Result<(), ApiError> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| ApiError::invalid_input(format!("endpoint is not a valid URL: {}", e)))?;

    match url.scheme() {
        "https" => {}
        "http" => {
            let host = url.host_str().unwrap_or("");
            if require_https && !is_loopback_host(host) {
                return Err(ApiError::invalid_input(
                    "endpoint must use https outside of loopback",
                ));
            }
        }
        other => {
            return Err(ApiError::invalid_input(format!(
                "endpoint scheme {:?} is not supported",
                other
            )));
        }
    }

    if url.host_str().unwrap_or("").is_empty() {
        return Err(ApiError::invalid_input("endpoint must include a host"));
    }
    Ok(())
}

/// Loopback hosts exempt from the HTTPS requirement.
pub fn is_loopback_host(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host == "[::1]" || host == "::1"
}
