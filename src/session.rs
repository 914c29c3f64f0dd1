use crate::backend::AuthClient;
use crate::models::User;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unable to write session file {path}: {reason}")]
    Write { path: String, reason: String },
    #[error("unable to remove session file {path}: {reason}")]
    Remove { path: String, reason: String },
}

/// The signed-in user, persisted between runs. `hydrate` on startup,
/// `persist` after login, `clear` on logout or when the backend no longer
/// accepts the token.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    current: Option<Session>,
}

impl SessionStore {
    pub async fn hydrate(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match tokio::fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice::<Session>(&raw) {
                Ok(session) => Some(session),
                Err(err) => {
                    warn!(target = "market.session", path = %path.display(), error = %err, "session_file_unreadable");
                    None
                }
            },
            Err(_) => None,
        };
        Self { path, current }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.token.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    pub async fn persist(&mut self, session: Session) -> Result<(), SessionError> {
        let write_err = |err: std::io::Error| SessionError::Write {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let raw = serde_json::to_vec_pretty(&session).map_err(|err| SessionError::Write {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        })?;
        tokio::fs::write(&self.path, raw).await.map_err(write_err)?;
        info!(target = "market.session", user_id = %session.user.id, "session_persisted");
        self.current = Some(session);
        Ok(())
    }

    pub async fn clear(&mut self) -> Result<(), SessionError> {
        self.current = None;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SessionError::Remove {
                path: self.path.display().to_string(),
                reason: err.to_string(),
            }),
        }
    }

    /// Checks the stored token with the backend and drops the session if it
    /// was refused. Returns whether a valid session remains.
    pub async fn refresh(&mut self, auth: &AuthClient) -> Result<bool, SessionError> {
        let Some(token) = self.token().map(str::to_string) else {
            return Ok(false);
        };
        match auth.verify(&token).await {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(target = "market.session", error = %err, "session_verify_failed");
                self.clear().await?;
                Ok(false)
            }
        }
    }
}
