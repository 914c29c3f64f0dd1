use super::{BackendError, ensure_success, read_json};
use crate::config::BackendConfig;
use crate::http::build_client;
use crate::models::User;
use crate::session::Session;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AuthClient {
    http: Client,
    config: BackendConfig,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AuthClient {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let url = self.config.auth_url("/login");
        let body = LoginRequest { email, password };
        let session = self.authenticate(self.http.post(url).json(&body), "Login failed").await?;
        info!(target = "market.auth", user_id = %session.user.id, "login_succeeded");
        Ok(session)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let url = self.config.auth_url("/register");
        let body = RegisterRequest {
            username,
            email,
            password,
        };
        let session = self
            .authenticate(self.http.post(url).json(&body), "Registration failed")
            .await?;
        info!(target = "market.auth", user_id = %session.user.id, "registration_succeeded");
        Ok(session)
    }

    /// `GET /api/auth/verify`. Any failure means the stored session is stale.
    pub async fn verify(&self, token: &str) -> Result<(), BackendError> {
        let url = self.config.auth_url("/verify");
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn authenticate(
        &self,
        request: reqwest::RequestBuilder,
        fallback: &str,
    ) -> Result<Session, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?;
        let response = ensure_success(response).await.map_err(|err| {
            warn!(target = "market.auth", error = %err, "auth_request_failed");
            match err.backend_message() {
                Some(message) => BackendError::Rejected(message.to_string()),
                None => BackendError::Rejected(fallback.to_string()),
            }
        })?;
        let payload: AuthResponse = read_json(response).await?;
        if !payload.success {
            return Err(BackendError::Rejected(
                payload.message.unwrap_or_else(|| fallback.to_string()),
            ));
        }
        match (payload.user, payload.token) {
            (Some(user), Some(token)) => Ok(Session { user, token }),
            _ => Err(BackendError::Deserialize(
                "auth response is missing user or token".into(),
            )),
        }
    }
}
