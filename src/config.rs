use std::time::Duration;

use anyhow::Context;

/// Edge server settings, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub core_base_url: String,
    pub ws_send_buffer: usize,
    pub core_request_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = std::env::var("EDGE_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
        let core_base_url =
            std::env::var("CORE_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into());
        let ws_send_buffer = std::env::var("WS_SEND_BUFFER")
            .unwrap_or_else(|_| "64".into())
            .parse()
            .context("WS_SEND_BUFFER must be a number")?;
        let core_request_timeout_ms = std::env::var("CORE_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".into())
            .parse()
            .context("CORE_REQUEST_TIMEOUT_MS must be a number")?;

        Ok(Self {
            bind_addr,
            core_base_url: core_base_url.trim_end_matches('/').to_string(),
            ws_send_buffer,
            core_request_timeout_ms,
        })
    }
}

/// Settings for the client half: request layer, mutation feedback and the
/// invalidation listener.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub channel_url: String,
    pub reconnect_backoff: Duration,
    pub redirect_delay: Duration,
    pub login_path: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_base_url: &str) -> Self {
        let api_base_url = api_base_url.trim_end_matches('/').to_string();
        let channel_url = channel_url_for(&api_base_url);
        Self {
            api_base_url,
            channel_url,
            reconnect_backoff: Duration::from_secs(3),
            redirect_delay: Duration::from_millis(500),
            login_path: "/api/login".into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:3000")
    }
}

/// `https://host` becomes `wss://host/ws`, anything else `ws://host/ws`.
fn channel_url_for(api_base_url: &str) -> String {
    if let Some(rest) = api_base_url.strip_prefix("https://") {
        format!("wss://{rest}/ws")
    } else if let Some(rest) = api_base_url.strip_prefix("http://") {
        format!("ws://{rest}/ws")
    } else {
        format!("ws://{api_base_url}/ws")
    }
}
