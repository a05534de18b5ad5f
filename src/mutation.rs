use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::config::ClientConfig;
use crate::error::{ErrorKind, RequestError};
use crate::request::ApiTransport;
use crate::resources::Resource;
use crate::types::CollectionKey;

/// User-facing outcome of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Unauthorized,
    Failed(String),
}

/// Where mutation outcomes surface: notifications and navigation.
pub trait Feedback: Send + Sync {
    fn notify(&self, notice: Notice);
    fn redirect(&self, location: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackEvent {
    Notice(Notice),
    Redirect(String),
}

/// Forwards feedback to whatever drives the UI.
impl Feedback for mpsc::UnboundedSender<FeedbackEvent> {
    fn notify(&self, notice: Notice) {
        let _ = self.send(FeedbackEvent::Notice(notice));
    }

    fn redirect(&self, location: &str) {
        let _ = self.send(FeedbackEvent::Redirect(location.to_string()));
    }
}

/// A mutating call and the collection whose cached value it affects.
#[derive(Debug, Clone)]
pub struct MutationRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub collection_key: CollectionKey,
    pub success_message: Option<String>,
}

// The only rollback source; taken before the cache is touched.
struct MutationContext {
    snapshot: Option<Value>,
}

/// Runs create/update/delete calls with an optimistic cache write up front,
/// rollback on failure and invalidation on settle.
#[derive(Clone)]
pub struct MutationClient {
    cache: QueryCache<Value>,
    api: Arc<dyn ApiTransport>,
    feedback: Arc<dyn Feedback>,
    redirect_delay: Duration,
    login_path: Arc<str>,
}

impl MutationClient {
    pub fn new(
        cache: QueryCache<Value>,
        api: Arc<dyn ApiTransport>,
        feedback: Arc<dyn Feedback>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            cache,
            api,
            feedback,
            redirect_delay: config.redirect_delay,
            login_path: Arc::from(config.login_path.as_str()),
        }
    }

    pub fn create(&self, resource: &Resource, draft: Value) -> PendingMutation {
        let patch = resource.patch.clone();
        let request = MutationRequest {
            method: Method::POST,
            path: resource.endpoint.to_string(),
            body: Some(draft.clone()),
            collection_key: resource.collection_key.clone(),
            success_message: resource.messages.created.map(String::from),
        };
        self.perform(request, move |old| patch.create(old, &draft))
    }

    pub fn update(&self, resource: &Resource, id: &str, patch: Value) -> PendingMutation {
        let transform = resource.patch.clone();
        let request = MutationRequest {
            method: Method::PATCH,
            path: resource.record_path(id),
            body: Some(patch.clone()),
            collection_key: resource.collection_key.clone(),
            success_message: resource.messages.updated.map(String::from),
        };
        self.perform(request, |old| transform.update(old, id, &patch))
    }

    pub fn remove(&self, resource: &Resource, id: &str) -> PendingMutation {
        let patch = resource.patch.clone();
        let request = MutationRequest {
            method: Method::DELETE,
            path: resource.record_path(id),
            body: None,
            collection_key: resource.collection_key.clone(),
            success_message: resource.messages.deleted.map(String::from),
        };
        self.perform(request, |old| patch.remove(old, id))
    }

    /// Applies `optimistic` to the cached collection before returning, then
    /// sends the request on a background task. The returned handle resolves
    /// once the mutation has settled; dropping it does not stop settlement.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn perform<F>(&self, request: MutationRequest, optimistic: F) -> PendingMutation
    where
        F: FnOnce(Option<Value>) -> Value,
    {
        let key = request.collection_key.clone();

        self.cache.cancel_in_flight(&key);
        let context = MutationContext {
            snapshot: self.cache.get(&key),
        };
        self.cache.update(&key, optimistic);
        debug!(collection_key = %key, method = %request.method, path = %request.path, "optimistic write applied");

        let client = self.clone();
        let task = tokio::spawn(async move { client.settle(request, context).await });
        PendingMutation { task }
    }

    async fn settle(
        &self,
        request: MutationRequest,
        context: MutationContext,
    ) -> Result<Value, RequestError> {
        let key = request.collection_key;
        let result = self
            .api
            .request(request.method, &request.path, request.body.as_ref())
            .await;

        match &result {
            Ok(_) => {
                if let Some(message) = request.success_message {
                    self.feedback.notify(Notice::Success(message));
                }
            }
            Err(e) => {
                self.cache.restore(&key, context.snapshot);
                self.report_failure(e);
            }
        }

        self.cache.invalidate(&key);
        result
    }

    fn report_failure(&self, error: &RequestError) {
        if error.is_unauthorized() {
            info!("session expired, redirecting to login");
            self.feedback.notify(Notice::Unauthorized);
            let feedback = self.feedback.clone();
            let login_path = self.login_path.clone();
            let delay = self.redirect_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                feedback.redirect(&login_path);
            });
        } else {
            warn!(error = %error, "mutation failed, rolled back");
            self.feedback.notify(Notice::Failed(error.message.clone()));
        }
    }
}

/// Resolves to the server's response once the mutation has settled.
pub struct PendingMutation {
    task: JoinHandle<Result<Value, RequestError>>,
}

impl Future for PendingMutation {
    type Output = Result<Value, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Poll::Ready(Err(e)) => Poll::Ready(Err(RequestError::new(
                ErrorKind::Network,
                format!("mutation task cancelled: {e}"),
            ))),
        }
    }
}
