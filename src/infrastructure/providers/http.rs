//! Shared error mapping for HTTP-backed provider adapters.

use reqwest::StatusCode;

use crate::domain::ports::provider::ProviderError;

/// Map a transport-level reqwest failure into the provider taxonomy.
pub fn map_transport_error(error: &reqwest::Error, timeout_ms: u64) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout_ms)
    } else {
        ProviderError::Network(error.to_string())
    }
}

/// Map an HTTP status into the provider taxonomy.
pub fn map_status(status: StatusCode, body: &str) -> ProviderError {
    let detail = format!("{status}: {}", truncate_body(body));
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(detail),
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::PAYLOAD_TOO_LARGE => {
            ProviderError::Unsupported(detail)
        }
        status if status.is_client_error() => ProviderError::InvalidRequest(detail),
        _ => ProviderError::Server(detail),
    }
}

fn truncate_body(body: &str) -> &str {
    let limit = 200.min(body.len());
    let mut end = limit;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, ""),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, ""),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            ProviderError::Server(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, ""),
            ProviderError::Server(_)
        ));
    }

    #[test]
    fn test_retryable_statuses_are_transient() {
        assert!(map_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(map_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(!map_status(StatusCode::NOT_FOUND, "").is_transient());
        assert!(!map_status(StatusCode::UNAUTHORIZED, "").is_transient());
    }
}
