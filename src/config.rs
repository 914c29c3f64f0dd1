use once_cell::sync::Lazy;
use std::{env, path::PathBuf};

pub static BACKEND_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("MARKET_BACKEND_URL")
        .unwrap_or_else(|_| "http://localhost:5000".to_string())
        .trim_end_matches('/')
        .to_string()
});

pub static GEMINI_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("GEMINI_BASE_URL")
        .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string())
        .trim_end_matches('/')
        .to_string()
});

pub static GEMINI_API_KEY: Lazy<String> =
    Lazy::new(|| env::var("GEMINI_API_KEY").unwrap_or_default());

pub static GEMINI_MODEL: Lazy<String> =
    Lazy::new(|| env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string()));

pub static SESSION_PATH: Lazy<PathBuf> = Lazy::new(|| {
    env::var("MARKET_SESSION_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".campus-market").join("session.json"))
});

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self::new(BACKEND_ROOT.as_str())
    }

    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn product_url(&self, path: &str) -> String {
        format!("{}/api/product{}", self.base_url, path)
    }

    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/api/auth{}", self.base_url, path)
    }

    pub fn user_url(&self, path: &str) -> String {
        format!("{}/api/user{}", self.base_url, path)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: GEMINI_ROOT.clone(),
            api_key: GEMINI_API_KEY.clone(),
            model: GEMINI_MODEL.clone(),
        }
    }
}
