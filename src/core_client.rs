use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use reqwest::Client;

use crate::config::Config;

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Request headers that carry identity or body format to the API service.
fn forwarded_request_headers() -> [HeaderName; 3] {
    [header::COOKIE, header::AUTHORIZATION, header::CONTENT_TYPE]
}

/// Response headers relayed back to the caller.
fn relayed_response_headers() -> [HeaderName; 2] {
    [header::CONTENT_TYPE, header::SET_COOKIE]
}

fn copy_headers(from: &HeaderMap, names: &[HeaderName]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in names {
        for value in from.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

#[derive(Debug)]
pub struct ForwardRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug)]
pub struct ForwardResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The family API service the edge sits in front of.
#[async_trait]
pub trait CoreClient: Send + Sync {
    async fn forward(&self, request: ForwardRequest) -> Result<ForwardResponse, CoreError>;
}

pub struct HttpCoreClient {
    client: Client,
    base_url: String,
}

impl HttpCoreClient {
    pub fn new(config: &Config) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.core_request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.core_base_url.clone(),
        })
    }
}

#[async_trait]
impl CoreClient for HttpCoreClient {
    async fn forward(&self, request: ForwardRequest) -> Result<ForwardResponse, CoreError> {
        let url = format!("{}{}", self.base_url, request.path_and_query);
        let mut builder = self
            .client
            .request(request.method, &url)
            .headers(copy_headers(&request.headers, &forwarded_request_headers()));
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let resp = builder.send().await?;

        let status = resp.status();
        let headers = copy_headers(resp.headers(), &relayed_response_headers());
        let body = resp.bytes().await?;

        Ok(ForwardResponse {
            status,
            headers,
            body,
        })
    }
}
