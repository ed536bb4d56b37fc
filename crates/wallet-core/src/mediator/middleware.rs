//! Request pipeline stages.
//!
//! Every request on a connection runs through an ordered list of
//! [`Middleware`] and ends at an [`Endpoint`]. A stage either short-circuits
//! with a [`Reply`] or hands the request on through [`Next`].

use super::rpc::Request;
use crate::error::{Result, WalletError};
use crate::types::{Origin, TabId};
use crate::vault::Vault;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Methods a page may call before it is authorized.
pub const BOOTSTRAP_METHODS: [&str; 3] = ["requestAccounts", "getCluster", "getState"];

/// A request plus the facts the pipeline established about its sender.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub request: Request,
    /// Verified origin of a page connection; `None` on the trusted pipeline
    pub origin: Option<Origin>,
    pub tab_id: Option<TabId>,
}

impl Envelope {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            origin: None,
            tab_id: None,
        }
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }

    pub fn require_origin(&self) -> Result<&Origin> {
        self.origin
            .as_ref()
            .ok_or_else(|| WalletError::InvalidParams("request carries no verified origin".to_string()))
    }
}

/// Result of dispatching one request.
pub enum Reply {
    /// Answer available now
    Ready(Result<Value>),
    /// Answer arrives when the user decides; `None` means it never will
    Deferred(BoxFuture<'static, Option<Result<Value>>>),
}

impl Reply {
    pub fn ready<T: Serialize>(result: Result<T>) -> Self {
        Reply::Ready(result.and_then(|value| serde_json::to_value(value).map_err(Into::into)))
    }

    pub fn error(error: WalletError) -> Self {
        Reply::Ready(Err(error))
    }

    /// Wait on an action's completion handle.
    pub fn deferred<T>(receiver: oneshot::Receiver<Result<T>>) -> Self
    where
        T: Serialize + Send + 'static,
    {
        Reply::Deferred(
            async move {
                match receiver.await {
                    Ok(result) => Some(
                        result.and_then(|value| serde_json::to_value(value).map_err(Into::into)),
                    ),
                    // Evicted without a decision
                    Err(_) => None,
                }
            }
            .boxed(),
        )
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Reply::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Final stage of a pipeline.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, envelope: &Envelope) -> Reply;
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, envelope: &mut Envelope, next: Next<'_>) -> Reply;
}

/// The rest of the pipeline after the current stage.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self { chain, endpoint }
    }

    pub async fn run(self, envelope: &mut Envelope) -> Reply {
        match self.chain.split_first() {
            Some((stage, rest)) => {
                stage
                    .handle(envelope, Next::new(rest, self.endpoint))
                    .await
            }
            None => self.endpoint.call(envelope).await,
        }
    }
}

/// Logs each request and failed replies.
pub struct LoggingMiddleware {
    label: &'static str,
}

impl LoggingMiddleware {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, envelope: &mut Envelope, next: Next<'_>) -> Reply {
        let method = envelope.request.method.clone();
        debug!(pipeline = self.label, %method, id = ?envelope.request.id, "request");
        let reply = next.run(envelope).await;
        match &reply {
            Reply::Ready(Err(e)) => warn!(pipeline = self.label, %method, code = e.code(), "request failed: {}", e),
            Reply::Deferred(_) => debug!(pipeline = self.label, %method, "awaiting user decision"),
            Reply::Ready(Ok(_)) => {}
        }
        reply
    }
}

/// Stamps the origin the transport verified, replacing anything the body claims.
pub struct OriginMiddleware {
    origin: Origin,
}

impl OriginMiddleware {
    pub fn new(origin: Origin) -> Self {
        Self { origin }
    }
}

#[async_trait]
impl Middleware for OriginMiddleware {
    async fn handle(&self, envelope: &mut Envelope, next: Next<'_>) -> Reply {
        if let Some(params) = envelope.request.params.as_object_mut() {
            params.remove("origin");
        }
        envelope.origin = Some(self.origin.clone());
        next.run(envelope).await
    }
}

/// Stamps the sender's tab, when it has one.
pub struct TabMiddleware {
    tab_id: Option<TabId>,
}

impl TabMiddleware {
    pub fn new(tab_id: Option<TabId>) -> Self {
        Self { tab_id }
    }
}

#[async_trait]
impl Middleware for TabMiddleware {
    async fn handle(&self, envelope: &mut Envelope, next: Next<'_>) -> Reply {
        envelope.tab_id = self.tab_id;
        next.run(envelope).await
    }
}

/// Rejects gated methods from origins the user has not authorized.
pub struct AuthorizationMiddleware {
    vault: Vault,
}

impl AuthorizationMiddleware {
    pub fn new(vault: Vault) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl Middleware for AuthorizationMiddleware {
    async fn handle(&self, envelope: &mut Envelope, next: Next<'_>) -> Reply {
        let method = envelope.method();
        if BOOTSTRAP_METHODS.contains(&method) {
            return next.run(envelope).await;
        }

        let authorized = envelope
            .origin
            .as_ref()
            .is_some_and(|origin| self.vault.is_authorized(origin));
        if !authorized {
            return Reply::error(WalletError::UnauthorizedOrigin {
                method: method.to_string(),
            });
        }
        next.run(envelope).await
    }
}
