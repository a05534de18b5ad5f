use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;

use crate::cache::QueryFetcher;
use crate::config::ClientConfig;
use crate::error::RequestError;
use crate::types::CollectionKey;

/// The request layer every mutation and refetch goes through.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RequestError>;
}

/// reqwest-backed transport. Keeps the session cookie between calls.
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(config: &ClientConfig) -> Result<Self, RequestError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
        })
    }
}

#[async_trait]
impl ApiTransport for HttpApi {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RequestError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "api request");

        let mut builder = self.client.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = builder.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            };
            return Err(RequestError::from_status(status.as_u16(), message));
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Loads a collection by issuing `GET <collection key>`.
pub struct CollectionFetcher<A> {
    api: Arc<A>,
    null_on_unauthorized: HashSet<String>,
}

impl<A: ApiTransport> CollectionFetcher<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            null_on_unauthorized: HashSet::new(),
        }
    }

    /// Keys whose 401 means "nobody is signed in" rather than an error,
    /// e.g. the identity probe.
    pub fn null_on_unauthorized<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_on_unauthorized
            .extend(keys.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl<A: ApiTransport> QueryFetcher<Value> for CollectionFetcher<A> {
    async fn fetch(&self, key: &CollectionKey) -> Result<Option<Value>, RequestError> {
        match self.api.request(Method::GET, key, None).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_unauthorized() && self.null_on_unauthorized.contains(key.as_ref()) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
