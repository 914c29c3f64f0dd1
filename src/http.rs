use reqwest::Client;
use std::time::Duration;

/// Client for backend and AI calls.
pub fn build_client() -> Client {
    client_with(
        env_secs("HTTP_TIMEOUT_SECS", 15),
        env_secs("HTTP_CONNECT_TIMEOUT_SECS", 5),
    )
}

/// Client for direct-to-storage uploads. Bodies are whole images, so the
/// overall timeout is longer than the API client's.
pub fn build_upload_client() -> Client {
    client_with(
        env_secs("UPLOAD_TIMEOUT_SECS", 60),
        env_secs("HTTP_CONNECT_TIMEOUT_SECS", 5),
    )
}

fn client_with(timeout_secs: u64, connect_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(connect_secs))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn env_secs(key: &str, default: u64) -> u64 {
    parse_secs(std::env::var(key).ok().as_deref(), default)
}

fn parse_secs(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
