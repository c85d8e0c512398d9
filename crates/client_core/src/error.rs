use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

/// Failure classes of the synchronization core. None of these are fatal to
/// the process; callers keep prior state and surface the error inertly.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api rejected request: {0}")]
    Api(#[from] ApiError),
    #[error("session expired or credentials rejected")]
    Unauthorized,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("no active conversation")]
    NoActiveConversation,
    #[error("a message needs text content or attached media")]
    EmptyMessage,
    #[error("invalid media attachment: {0}")]
    InvalidMedia(String),
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("unsupported base url scheme: {0}")]
    UnsupportedScheme(String),
}

/// Maps an HTTP response to the error taxonomy: 401 is the dedicated
/// logged-out signal, other failures carry the server's error body when it
/// parses and a status-derived code when it does not.
pub(crate) async fn into_api_result(
    response: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    let fallback = ErrorCode::from_status(status.as_u16());
    match response.json::<ApiError>().await {
        Ok(body) => Err(ClientError::Api(body)),
        Err(_) => Err(ClientError::Api(ApiError::new(
            fallback,
            format!("request failed with status {status}"),
        ))),
    }
}
