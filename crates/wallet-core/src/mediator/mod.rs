//! Request mediation between connections and the wallet.
//!
//! Every logical stream handed to [`Mediator::connect`] becomes one RPC
//! pipeline. The sender identity supplied by the transport decides whether
//! the pipeline is trusted (the extension's own UI) or untrusted (a web
//! page); nothing in a request body can change that.
//!
//! ```text
//!   untrusted: logging -> origin tag -> tab tag -> authorization -> PageHandler
//!   trusted:   logging -> UiHandler
//! ```
//!
//! Requests on one stream are dispatched in arrival order. A request that
//! waits for a user decision is parked on its own task so it does not hold
//! up the requests behind it.

pub mod channel;
pub mod handlers;
pub mod middleware;
pub mod registry;
pub mod rpc;

pub use channel::{Frame, LogicalStream, Multiplexer, StreamPeer};
pub use handlers::{PageHandler, UiHandler};
pub use middleware::{
    AuthorizationMiddleware, BOOTSTRAP_METHODS, Endpoint, Envelope, LoggingMiddleware,
    Middleware, Next, OriginMiddleware, Reply, TabMiddleware,
};
pub use registry::{ConnectionId, ConnectionRegistry, OriginClass};
pub use rpc::{Id, Notification, Outbound, Request, Response, RpcError};

use crate::context::WalletContext;
use crate::error::Result;
use crate::types::{Origin, TabId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Extension URL schemes whose host is the extension id.
const EXTENSION_SCHEMES: [&str; 2] = ["chrome-extension", "moz-extension"];

/// Sender identity as reported by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    pub extension_id: Option<String>,
    pub url: Option<String>,
    pub tab_id: Option<TabId>,
}

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Piped,
    Closed,
}

/// Handle to a running connection pipeline.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub class: OriginClass,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl Connection {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the pipeline has shut down and cleaned up.
    pub async fn closed(mut self) {
        while *self.state.borrow_and_update() != ConnectionState::Closed {
            if self.state.changed().await.is_err() {
                break;
            }
        }
        if let Err(e) = self.task.await {
            warn!(connection = %self.id, "connection pipeline failed: {}", e);
        }
    }
}

/// Owns the connection registry and spawns one pipeline per connection.
#[derive(Clone)]
pub struct Mediator {
    ctx: Arc<WalletContext>,
    registry: Arc<ConnectionRegistry>,
}

impl Mediator {
    pub fn new(ctx: Arc<WalletContext>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(ctx.vault.clone()));
        Self { ctx, registry }
    }

    pub fn context(&self) -> &Arc<WalletContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Decide who is on the other end of a connection.
    ///
    /// Only pages of this extension itself are trusted. A content script of
    /// this extension running inside a web page reports the page's URL and is
    /// treated as that page.
    pub fn classify(&self, sender: &SenderInfo) -> Result<OriginClass> {
        let own_id = self.ctx.config.extension.id.as_str();
        let from_own_extension =
            !own_id.is_empty() && sender.extension_id.as_deref() == Some(own_id);

        match &sender.url {
            None if from_own_extension => Ok(OriginClass::Ui),
            Some(url) if from_own_extension && is_extension_page(url, own_id) => {
                Ok(OriginClass::Ui)
            }
            Some(url) => Ok(OriginClass::Page(Origin::from_url(url)?)),
            None => Err(crate::error::WalletError::InvalidParams(
                "sender has neither a url nor a trusted extension id".to_string(),
            )),
        }
    }

    /// Start the pipeline for one logical stream.
    pub fn connect(&self, sender: SenderInfo, stream: LogicalStream) -> Result<Connection> {
        let class = self.classify(&sender)?;
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let chain = self.chain_for(&class, sender.tab_id);
        let (ctx, registry) = (Arc::clone(&self.ctx), Arc::clone(&self.registry));
        let endpoint: Arc<dyn Endpoint> = match class {
            OriginClass::Ui => Arc::new(UiHandler::new(ctx, registry)),
            OriginClass::Page(_) => Arc::new(PageHandler::new(ctx, registry)),
        };

        let id = self
            .registry
            .register(class.clone(), sender.tab_id, stream.outgoing.clone());
        info!(connection = %id, origin = %class, "connection established");

        let pipeline = Pipeline {
            id,
            class: class.clone(),
            tab_id: sender.tab_id,
            chain,
            endpoint,
            ctx: Arc::clone(&self.ctx),
            registry: Arc::clone(&self.registry),
        };
        let task = tokio::spawn(pipeline.run(stream, state_tx));

        Ok(Connection {
            id,
            class,
            state: state_rx,
            task,
        })
    }

    /// Forward action queue changes to the UI as `actionsChanged` events.
    pub fn spawn_action_events(&self) -> JoinHandle<()> {
        let mut events = self.ctx.actions.subscribe();
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(changed) => {
                        registry.notify(
                            &OriginClass::Ui,
                            "actionsChanged",
                            json!({ "count": changed.count }),
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("action event forwarder lagged by {} events", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn chain_for(&self, class: &OriginClass, tab_id: Option<TabId>) -> Vec<Arc<dyn Middleware>> {
        match class {
            OriginClass::Ui => vec![Arc::new(LoggingMiddleware::new("ui"))],
            OriginClass::Page(origin) => vec![
                Arc::new(LoggingMiddleware::new("page")),
                Arc::new(OriginMiddleware::new(origin.clone())),
                Arc::new(TabMiddleware::new(tab_id)),
                Arc::new(AuthorizationMiddleware::new(self.ctx.vault.clone())),
            ],
        }
    }
}

fn is_extension_page(url: &str, extension_id: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => {
            EXTENSION_SCHEMES.contains(&parsed.scheme())
                && parsed.host_str() == Some(extension_id)
        }
        Err(_) => false,
    }
}

struct Pipeline {
    id: ConnectionId,
    class: OriginClass,
    tab_id: Option<TabId>,
    chain: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Endpoint>,
    ctx: Arc<WalletContext>,
    registry: Arc<ConnectionRegistry>,
}

impl Pipeline {
    async fn run(self, mut stream: LogicalStream, state: watch::Sender<ConnectionState>) {
        let _ = state.send(ConnectionState::Piped);

        while let Some(frame) = stream.incoming.recv().await {
            self.dispatch(frame, &stream.outgoing).await;
        }

        self.close();
        let _ = state.send(ConnectionState::Closed);
    }

    async fn dispatch(&self, frame: Value, outgoing: &mpsc::Sender<Outbound>) {
        let request: Request = match serde_json::from_value(frame.clone()) {
            Ok(request) => request,
            Err(e) => {
                debug!(connection = %self.id, "invalid request frame: {}", e);
                send(outgoing, Response::invalid_request(&frame, e.to_string())).await;
                return;
            }
        };

        let id = request.id.clone();
        let mut envelope = Envelope::new(request);
        let reply = Next::new(&self.chain, self.endpoint.as_ref())
            .run(&mut envelope)
            .await;

        // Notifications never get a response
        let Some(id) = id else {
            return;
        };

        match reply {
            Reply::Ready(result) => send(outgoing, respond(Some(id), result)).await,
            Reply::Deferred(pending) => {
                let outgoing = outgoing.clone();
                tokio::spawn(async move {
                    match pending.await {
                        Some(result) => send(&outgoing, respond(Some(id), result)).await,
                        None => debug!("pending request dropped without a decision"),
                    }
                });
            }
        }
    }

    /// Unregister and evict the actions this connection left behind.
    fn close(&self) {
        self.registry.unregister(&self.class, self.id);
        if let Some(origin) = self.class.origin() {
            let evicted = self
                .ctx
                .actions
                .delete_by_origin_and_tab(origin, self.tab_id.unwrap_or_default());
            if evicted > 0 {
                info!(connection = %self.id, %origin, evicted, "evicted pending actions");
            }
        }
        info!(connection = %self.id, origin = %self.class, "connection closed");
    }
}

fn respond(id: Option<Id>, result: Result<Value>) -> Response {
    match result {
        Ok(value) => Response::ok(id, value),
        Err(e) => Response::from_error(id, &e),
    }
}

async fn send(outgoing: &mpsc::Sender<Outbound>, response: Response) {
    if outgoing.send(Outbound::Response(response)).await.is_err() {
        debug!("response dropped: connection closed");
    }
}
