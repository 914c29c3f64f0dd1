pub mod auth;
pub mod products;

pub use auth::AuthClient;
pub use products::ProductsClient;

use reqwest::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {}", message.as_deref().unwrap_or("no details"))]
    Status { status: u16, message: Option<String> },
    #[error("{0}")]
    Rejected(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
}

impl BackendError {
    /// The backend's own explanation, when it sent one.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            BackendError::Status { message, .. } => message.as_deref(),
            BackendError::Rejected(message) => Some(message),
            _ => None,
        }
    }
}

/// `{ success, data, message }` wrapper used by most endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default = "assume_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

fn assume_success() -> bool {
    true
}

impl<T> Envelope<T> {
    pub fn into_data(self, fallback: &str) -> Result<T, BackendError> {
        if !self.success {
            return Err(BackendError::Rejected(
                self.message.unwrap_or_else(|| fallback.to_string()),
            ));
        }
        self.data
            .ok_or_else(|| BackendError::Deserialize("missing data".into()))
    }
}

/// Maps non-2xx statuses to [`BackendError::Status`], keeping the backend's
/// `message` field if the error body has one.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .ok()
        .and_then(|body| serde_json::from_str::<serde_json::Value>(&body).ok())
        .and_then(|value| {
            value
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });
    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response
        .json()
        .await
        .map_err(|err| BackendError::Deserialize(err.to_string()))
}
